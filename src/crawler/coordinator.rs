//! Crawler coordinator - main crawl orchestration logic
//!
//! One call to `Crawler::run` is one crawl attempt:
//! - Log in with a fresh session
//! - Load the opinions page and discover forum sections
//! - Walk every forum's topic listing, page by page
//! - Walk every topic's posts, page by page, extracting and dispatching records
//!
//! Forum and topic traversals run as concurrent tasks; the shared throttle
//! bounds how many requests they have in flight.

use crate::config::{Config, Credentials};
use crate::crawler::extract::{extract_post, PostOutcome};
use crate::crawler::fetcher::{build_http_client, fetch_page, Page};
use crate::crawler::links::{collect_topics, discover_forums, forum_url, KeywordFilter};
use crate::crawler::paginator::PageChain;
use crate::crawler::parser::{forum_hrefs, parse_forum_page, parse_topic_page, RawPost};
use crate::crawler::session::Authenticator;
use crate::crawler::supervisor::AbortSignal;
use crate::crawler::throttle::AutoThrottle;
use crate::model::{ScanMode, TopicLink};
use crate::output::{FeedWriter, HarvestMetrics};
use crate::pipeline::Dispatcher;
use crate::{ConfigError, HarvestError};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;
use url::Url;

/// What one successful crawl attempt covered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub forums: usize,
    pub topics: usize,
}

/// State shared by every traversal task of one attempt
struct CrawlContext {
    client: Client,
    config: Arc<Config>,
    filter: KeywordFilter,
    throttle: AutoThrottle,
    dispatcher: Dispatcher,
    metrics: Arc<HarvestMetrics>,
    feed: Option<Arc<FeedWriter>>,
    mode: ScanMode,
    abort: Arc<AbortSignal>,
}

impl CrawlContext {
    /// Fetches a page through the throttle
    ///
    /// The abort signal is checked before every fetch.
    async fn fetch(&self, url: &Url) -> Result<Page, HarvestError> {
        if self.abort.is_aborted() {
            return Err(HarvestError::Cancelled);
        }

        let page = {
            let _permit = self.throttle.acquire().await;
            fetch_page(&self.client, url).await?
        };
        self.throttle.record_response(page.latency, page.status);
        tracing::debug!("Fetched {} ({}) in {:?}", page.url, page.status, page.latency);

        page.into_success()
    }

    fn handle_post(&self, raw: RawPost, page_url: &Url) {
        match extract_post(raw, page_url, &self.mode) {
            Ok(PostOutcome::Dispatch(record)) => {
                if let Some(feed) = &self.feed {
                    if let Err(e) = feed.append(&record) {
                        tracing::warn!("Failed to write feed line for {}: {}", page_url, e);
                    }
                }
                self.metrics.record_scraped(&record);
                self.dispatcher.dispatch(record);
            }
            Ok(PostOutcome::SkippedUndated) => {
                tracing::debug!("Skipping post without a date in {}", page_url);
            }
            Ok(PostOutcome::SkippedBeforeCheckpoint) => {
                tracing::trace!("Skipping post older than checkpoint in {}", page_url);
            }
            Err(e) => {
                self.metrics.record_error();
                tracing::error!("Error processing post in {}: {}", page_url, e);
            }
        }
    }
}

/// Walks one forum's listing pages and emits the topics found on them
async fn visit_forum(
    ctx: Arc<CrawlContext>,
    start: Url,
    topics: mpsc::UnboundedSender<TopicLink>,
) {
    let marker = ctx.config.forum.topic_link_marker.clone();
    let mut chain = PageChain::new(start);

    while let Some(page_url) = chain.next_page() {
        let page = match ctx.fetch(&page_url).await {
            Ok(page) => page,
            Err(HarvestError::Cancelled) => return,
            Err(e) => {
                tracing::error!("Failed to fetch forum page {}: {}", page_url, e);
                return;
            }
        };
        ctx.metrics.record_forum_page();

        let parsed = parse_forum_page(&page.body, &page.url, &marker);
        let found = collect_topics(
            parsed.topic_hrefs.iter().map(String::as_str),
            &ctx.filter,
            &page.url,
        );
        tracing::debug!("{} topics on {}", found.len(), page.url);

        for topic in found {
            if topics.send(topic).is_err() {
                return;
            }
        }

        if parsed.next_page.is_none() {
            tracing::info!("No more pages found for forum: {}", page.url);
        }
        chain.follow(parsed.next_page);
    }
}

/// Walks one topic's pages and handles every post on them
async fn visit_topic(ctx: Arc<CrawlContext>, topic: TopicLink) {
    let mut chain = PageChain::new(topic.url);

    while let Some(page_url) = chain.next_page() {
        let page = match ctx.fetch(&page_url).await {
            Ok(page) => page,
            Err(HarvestError::Cancelled) => return,
            Err(e) => {
                tracing::error!("Failed to fetch topic page {}: {}", page_url, e);
                return;
            }
        };
        ctx.metrics.record_topic_page();

        let parsed = parse_topic_page(&page.body, &page.url);
        tracing::debug!("{} posts on {}", parsed.posts.len(), page.url);

        for raw in parsed.posts {
            ctx.handle_post(raw, &page.url);
        }

        chain.follow(parsed.next_page);
    }
}

/// Main crawler structure
pub struct Crawler {
    config: Arc<Config>,
    credentials: Credentials,
    base: Url,
    mode: ScanMode,
    dispatcher: Dispatcher,
    metrics: Arc<HarvestMetrics>,
    feed: Option<Arc<FeedWriter>>,
    abort: Arc<AbortSignal>,
}

impl Crawler {
    /// Creates a new crawler
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `credentials` - Forum login
    /// * `mode` - Full scan, or incremental scan with the checkpoint read at start
    /// * `dispatcher` - Entry point of the pipeline
    /// * `metrics` - Shared crawl metrics
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to run
    /// * `Err(HarvestError)` - The forum base URL is invalid
    pub fn new(
        config: Arc<Config>,
        credentials: Credentials,
        mode: ScanMode,
        dispatcher: Dispatcher,
        metrics: Arc<HarvestMetrics>,
    ) -> Result<Self, HarvestError> {
        let base = Url::parse(&config.forum.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("{}: {}", config.forum.base_url, e))
        })?;

        Ok(Self {
            config,
            credentials,
            base,
            mode,
            dispatcher,
            metrics,
            feed: None,
            abort: Arc::new(AbortSignal::new()),
        })
    }

    /// Appends every dispatched record to a JSON-lines feed
    pub fn with_feed(mut self, feed: Arc<FeedWriter>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Uses an external abort signal, checked between page fetches
    pub fn with_abort_signal(mut self, abort: Arc<AbortSignal>) -> Self {
        self.abort = abort;
        self
    }

    /// Runs one crawl attempt
    ///
    /// Login or opinions page failures fail the attempt. Failures on
    /// individual forum or topic pages only end that traversal.
    pub async fn run(&self) -> Result<CrawlSummary, HarvestError> {
        if self.abort.is_aborted() {
            return Err(HarvestError::Cancelled);
        }
        tracing::info!("Starting {} crawl of {}", self.mode.label(), self.base);

        let client = build_http_client(&self.config.crawler, &self.config.user_agent)?;
        Authenticator::new(&client, &self.config.forum, &self.base)
            .login(&self.credentials)
            .await?;

        let ctx = Arc::new(CrawlContext {
            client,
            config: Arc::clone(&self.config),
            filter: KeywordFilter::from_config(&self.config.keywords),
            throttle: AutoThrottle::new(&self.config.crawler, &self.mode),
            dispatcher: self.dispatcher.clone(),
            metrics: Arc::clone(&self.metrics),
            feed: self.feed.clone(),
            mode: self.mode,
            abort: Arc::clone(&self.abort),
        });

        let opinions_url = self.base.join(&self.config.forum.opinions_path)?;
        let opinions = ctx.fetch(&opinions_url).await?;
        let hrefs = forum_hrefs(&opinions.body, &self.config.forum.forum_link_marker);
        let forums = discover_forums(hrefs.iter().map(String::as_str), &ctx.filter);
        if forums.is_empty() {
            tracing::warn!("No eligible forums found on {}", opinions.url);
        }

        let (topic_tx, mut topic_rx) = mpsc::unbounded_channel::<TopicLink>();
        let mut tasks = JoinSet::new();

        for forum in &forums {
            let url = forum_url(&self.base, &self.config.forum.forum_path, forum.forum_id)?;
            tracing::info!("Found forum link: {} -> {}", forum.raw_href, url);
            let span = tracing::info_span!("forum", url = %url);
            tasks.spawn(visit_forum(Arc::clone(&ctx), url, topic_tx.clone()).instrument(span));
        }
        drop(topic_tx);

        let mut seen_topics: HashSet<Url> = HashSet::new();
        let mut task_failure = None;

        loop {
            tokio::select! {
                Some(topic) = topic_rx.recv() => {
                    if seen_topics.insert(topic.url.clone()) {
                        let span = tracing::info_span!("topic", url = %topic.url);
                        tasks.spawn(visit_topic(Arc::clone(&ctx), topic).instrument(span));
                    }
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Crawl task failed: {}", e);
                        task_failure.get_or_insert_with(|| e.to_string());
                    }
                }
                else => break,
            }
        }

        if self.abort.is_aborted() {
            tracing::warn!("Crawl aborted");
            return Err(HarvestError::Cancelled);
        }
        if let Some(message) = task_failure {
            return Err(HarvestError::TaskJoin(message));
        }

        let summary = CrawlSummary {
            forums: forums.len(),
            topics: seen_topics.len(),
        };
        tracing::info!(
            "Crawl finished: {} forums, {} topics",
            summary.forums,
            summary.topics
        );
        Ok(summary)
    }
}
