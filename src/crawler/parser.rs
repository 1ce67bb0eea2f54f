//! HTML parser for forum pages
//!
//! This module handles parsing HTML content to extract:
//! - Forum section links from the opinions page
//! - Topic links and the next-page link from forum listing pages
//! - Raw post fields and the next-page link from topic pages
//!
//! Everything returned is owned, so no `scraper::Html` value ever lives
//! across an await point.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Title of the "next page" link inside a pagination control
pub const NEXT_PAGE_LABEL: &str = "Dalej";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {}: {:?}", css, e))
}

static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static PAGINATION: LazyLock<Selector> = LazyLock::new(|| selector("div.pagination"));
static NEXT_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.postmenu[title][href]"));
static POST: LazyLock<Selector> = LazyLock::new(|| selector("ul.gradient_post"));
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| selector(r#"span[itemprop="author"]"#));
static USER_INFO: LazyLock<Selector> = LazyLock::new(|| selector("div.ll"));
static WEIGHT: LazyLock<Selector> = LazyLock::new(|| selector("span.important_inline"));
static POST_DATE: LazyLock<Selector> = LazyLock::new(|| selector("div.post_date"));
static GIVEN_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[itemprop="givenName"]"#));
static FAMILY_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[itemprop="familyName"]"#));
static VOTE_RATE: LazyLock<Selector> = LazyLock::new(|| selector("span.vote_rate"));
static RATING: LazyLock<Selector> = LazyLock::new(|| selector(r#"span[itemprop="ratingValue"]"#));
static REVIEW_BODY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[itemprop="reviewBody"]"#));
static COURSE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[style="font-weight: bold"]"#));

static RE_FACULTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Wydział:\s*(.*?)(?:\s{2,}|\n|$)").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Rok studiów:\s*(\d+)").unwrap());
static RE_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Waga opinii: x([\d.]+)").unwrap());
static RE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})(?:,\s*(\d{2}:\d{2}))?").unwrap());
static RE_COURSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Kurs: (.*?)(?:\s{2,}|\n|$)").unwrap());

/// Post fields as text, before any interpretation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPost {
    pub username: String,
    pub faculty: Option<String>,
    pub year: Option<String>,
    pub opinion_weight: Option<String>,
    /// `YYYY-MM-DD` or `YYYY-MM-DD, HH:MM`
    pub date: Option<String>,
    pub professor: String,
    pub rating: Option<String>,
    pub vote_rate: Option<String>,
    pub course: Option<String>,
    pub review: Option<String>,
}

/// Links found on one forum listing page
#[derive(Debug, Clone, Default)]
pub struct ForumPage {
    pub topic_hrefs: Vec<String>,
    pub next_page: Option<Url>,
}

/// Posts found on one topic page
#[derive(Debug, Clone, Default)]
pub struct TopicPage {
    pub posts: Vec<RawPost>,
    pub next_page: Option<Url>,
}

/// Collects hrefs containing the forum section marker
pub fn forum_hrefs(html: &str, marker: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    hrefs(&document)
        .filter(|href| href.contains(marker))
        .map(str::to_string)
        .collect()
}

/// Parses a forum listing page
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `page_url` - URL the page was served from, for resolving the next link
/// * `topic_marker` - Prefix every topic href starts with
pub fn parse_forum_page(html: &str, page_url: &Url, topic_marker: &str) -> ForumPage {
    let document = Html::parse_document(html);

    let topic_hrefs = hrefs(&document)
        .filter(|href| href.starts_with(topic_marker))
        .map(str::to_string)
        .collect();

    ForumPage {
        topic_hrefs,
        next_page: find_next_page(&document, page_url),
    }
}

/// Parses a topic page into raw posts
pub fn parse_topic_page(html: &str, page_url: &Url) -> TopicPage {
    let document = Html::parse_document(html);

    let posts = document.select(&POST).map(extract_raw_post).collect();

    TopicPage {
        posts,
        next_page: find_next_page(&document, page_url),
    }
}

fn hrefs(document: &Html) -> impl Iterator<Item = &str> {
    document
        .select(&LINK)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
}

/// Finds the "next page" link
///
/// Present only if the page has a pagination control with a link titled
/// `Dalej` inside it. The href is resolved against the page URL.
fn find_next_page(document: &Html, page_url: &Url) -> Option<Url> {
    let href = document
        .select(&PAGINATION)
        .flat_map(|pagination| pagination.select(&NEXT_LINK))
        .find(|link| link.value().attr("title") == Some(NEXT_PAGE_LABEL))?
        .value()
        .attr("href")?;

    match page_url.join(href.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("Invalid next page link {} on {}: {}", href, page_url, e);
            None
        }
    }
}

fn extract_raw_post(post: ElementRef<'_>) -> RawPost {
    let user_info = texts(post, &USER_INFO, "\n");
    let review_body = post.select(&REVIEW_BODY).next();

    let professor = format!(
        "{} {}",
        first_text(post, &GIVEN_NAME).unwrap_or_default(),
        first_text(post, &FAMILY_NAME).unwrap_or_default()
    )
    .trim()
    .to_string();

    let date = texts(post, &POST_DATE, " ").and_then(|text| {
        let caps = RE_DATE.captures(&text)?;
        Some(match caps.get(2) {
            Some(time) => format!("{}, {}", &caps[1], time.as_str()),
            None => caps[1].to_string(),
        })
    });

    let course = review_body.and_then(|body| {
        body.select(&COURSE)
            .filter_map(|span| capture(&RE_COURSE, &span.text().collect::<String>()))
            .next()
    });

    let review = review_body.map(|body| {
        body.text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    });

    RawPost {
        username: first_text(post, &AUTHOR).unwrap_or_default(),
        faculty: user_info.as_deref().and_then(|t| capture(&RE_FACULTY, t)),
        year: user_info.as_deref().and_then(|t| capture(&RE_YEAR, t)),
        opinion_weight: texts(post, &WEIGHT, " ").and_then(|t| capture(&RE_WEIGHT, &t)),
        date,
        professor,
        rating: first_text(post, &RATING),
        vote_rate: first_text(post, &VOTE_RATE),
        course,
        review,
    }
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// Text of every match, one text node per `separator`-joined piece
fn texts(scope: ElementRef<'_>, selector: &Selector, separator: &str) -> Option<String> {
    let pieces: Vec<&str> = scope
        .select(selector)
        .flat_map(|el| el.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join(separator))
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
