//! Data model shared by the crawler, the pipeline and the store
//!
//! # Components
//!
//! - `PostRecord`: one instructor opinion, the unit of work of the pipeline
//! - `ScanMode`: full scan or incremental scan against a checkpoint
//! - `FieldValue`: per-field extraction result (present / absent / malformed)
//! - `ForumLink` / `TopicLink`: links discovered while crawling

mod date;
mod field;

pub use date::{parse_post_date, post_date};
pub use field::FieldValue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Language value recorded when detection fails
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// A single opinion extracted from a forum post
///
/// The crawler owns the record until dispatch. After that the pipeline stage
/// currently holding it is the only writer of `language` and `vectors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Store-assigned identifier, set once the record has been persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub username: String,
    pub faculty: Option<String>,
    pub year: Option<u32>,
    pub opinion_weight: Option<f64>,

    #[serde(with = "post_date")]
    pub date: DateTime<Utc>,

    pub professor: String,

    /// Raw rating label as shown on the forum, not necessarily numeric
    pub rating: String,

    pub vote_rate: Option<f64>,
    pub course: Option<String>,
    pub review: String,
    pub post_url: String,

    /// Set by the language detection stage
    #[serde(default)]
    pub language: Option<String>,

    /// Set by the vectorization stage, empty when no embedding is computed
    #[serde(default)]
    pub vectors: Option<Vec<f32>>,
}

/// Whether a crawl visits everything or only what is newer than the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Full,
    Incremental {
        checkpoint: Option<DateTime<Utc>>,
    },
}

impl ScanMode {
    /// Returns true if a post with this date should be skipped
    pub fn skips(&self, date: &DateTime<Utc>) -> bool {
        match self {
            Self::Full => false,
            Self::Incremental {
                checkpoint: Some(checkpoint),
            } => date <= checkpoint,
            Self::Incremental { checkpoint: None } => false,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental { .. } => "incremental",
        }
    }
}

/// A forum section link found on the opinions page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumLink {
    pub raw_href: String,
    pub forum_id: u64,
}

/// A topic seed URL with its pagination offset removed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicLink {
    pub url: Url,
}
