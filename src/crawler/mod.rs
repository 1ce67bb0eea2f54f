//! Crawler module for the authenticated forum walk
//!
//! This module contains the crawling side of a harvest, including:
//! - HTTP fetching with an adaptive throttle
//! - Login and session handling
//! - Forum discovery, keyword filtering and pagination
//! - Post extraction against the incremental checkpoint
//! - Run-level retry supervision

mod coordinator;
mod extract;
mod fetcher;
mod links;
mod paginator;
mod parser;
mod session;
mod supervisor;
mod throttle;

pub use coordinator::{CrawlSummary, Crawler};
pub use extract::{extract_post, ExtractError, PostOutcome};
pub use fetcher::{build_http_client, fetch_page, submit_form, user_agent_string, Page};
pub use links::{
    collect_topics, discover_forums, forum_url, normalize_topic_url, parse_forum_id,
    KeywordFilter,
};
pub use paginator::PageChain;
pub use parser::{
    forum_hrefs, parse_forum_page, parse_topic_page, ForumPage, RawPost, TopicPage,
    NEXT_PAGE_LABEL,
};
pub use session::{find_login_form, login_fields, Authenticator, LoginForm};
pub use supervisor::{supervise, AbortSignal, RetryPolicy, Supervised};
pub use throttle::{AutoThrottle, ThrottlePermit};
