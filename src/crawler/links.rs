//! Forum and topic link handling
//!
//! Keyword filtering, forum id extraction and topic URL normalization.
//! Filtering works on the raw href as it appears in the page, lowercased.

use crate::config::KeywordConfig;
use crate::model::{ForumLink, TopicLink};
use std::collections::HashSet;
use url::Url;

/// Query parameter the forum uses for pagination offsets
const START_PARAM: &str = "start";

/// Keyword sets deciding which links are followed
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    excluded: Vec<String>,
    included: Vec<String>,
}

impl KeywordFilter {
    pub fn new<S: AsRef<str>>(excluded: &[S], included: &[S]) -> Self {
        let lower = |words: &[S]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            excluded: lower(excluded),
            included: lower(included),
        }
    }

    pub fn from_config(config: &KeywordConfig) -> Self {
        Self::new(config.excluded.as_slice(), config.included.as_slice())
    }

    /// Returns the first excluded keyword found in the link
    pub fn excluded_by(&self, link: &str) -> Option<&str> {
        let link = link.to_lowercase();
        self.excluded
            .iter()
            .find(|keyword| link.contains(keyword.as_str()))
            .map(String::as_str)
    }

    fn matches_included(&self, link: &str) -> bool {
        if self.included.is_empty() {
            return true;
        }
        let link = link.to_lowercase();
        self.included
            .iter()
            .any(|keyword| link.contains(keyword.as_str()))
    }

    /// Whether a forum section link should be visited
    ///
    /// Exclusion is checked first and always wins.
    pub fn allows_forum(&self, link: &str) -> bool {
        if let Some(keyword) = self.excluded_by(link) {
            tracing::info!("Skipping excluded forum {} (keyword '{}')", link, keyword);
            return false;
        }
        if !self.matches_included(link) {
            tracing::info!("Skipping forum without included keywords: {}", link);
            return false;
        }
        true
    }

    /// Whether a topic link should be visited
    pub fn allows_topic(&self, link: &str) -> bool {
        match self.excluded_by(link) {
            Some(keyword) => {
                tracing::info!("Skipping excluded topic {} (keyword '{}')", link, keyword);
                false
            }
            None => true,
        }
    }
}

/// Extracts the forum id from the token after the last comma
///
/// `"/f,opinie-o-prowadzacych,6"` yields `Some(6)`.
pub fn parse_forum_id(href: &str) -> Option<u64> {
    let token = href.rsplit(',').next()?.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Turns candidate hrefs from the opinions page into forum links
///
/// Ineligible links are dropped silently; links whose id is not numeric are
/// dropped with a warning. Each forum id is emitted once.
pub fn discover_forums<'a, I>(hrefs: I, filter: &KeywordFilter) -> Vec<ForumLink>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut forums = Vec::new();

    for href in hrefs {
        if !filter.allows_forum(href) {
            continue;
        }

        match parse_forum_id(href) {
            Some(forum_id) => {
                if seen.insert(forum_id) {
                    forums.push(ForumLink {
                        raw_href: href.to_string(),
                        forum_id,
                    });
                }
            }
            None => tracing::warn!("Could not extract forum ID from link: {}", href),
        }
    }

    forums
}

/// Builds the topic listing URL of a forum
pub fn forum_url(base: &Url, forum_path: &str, forum_id: u64) -> Result<Url, url::ParseError> {
    let mut url = base.join(forum_path)?;
    url.query_pairs_mut()
        .clear()
        .append_pair("f", &forum_id.to_string());
    Ok(url)
}

/// Resolves a topic href to its seed URL
///
/// The pagination offset is removed both when it trails the raw href
/// (`t,name,12&start=25`) and when it is a real query parameter, so every
/// paginated view of a topic collapses to the same URL. Fragments are
/// dropped as well.
pub fn normalize_topic_url(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();
    let href = match href.find(&format!("&{}=", START_PARAM)) {
        Some(idx) if !href[..idx].contains('?') => &href[..idx],
        _ => href,
    };

    let mut url = page_url.join(href).ok()?;
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != START_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Some(url)
}

/// Filters, normalizes and deduplicates topic hrefs found on one forum page
pub fn collect_topics<'a, I>(hrefs: I, filter: &KeywordFilter, page_url: &Url) -> Vec<TopicLink>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut topics = Vec::new();

    for href in hrefs {
        if !filter.allows_topic(href) {
            continue;
        }

        match normalize_topic_url(href, page_url) {
            Some(url) => {
                if seen.insert(url.clone()) {
                    tracing::debug!("Found new topic link: {}", url);
                    topics.push(TopicLink { url });
                }
            }
            None => tracing::warn!("Could not resolve topic link: {}", href),
        }
    }

    topics
}
