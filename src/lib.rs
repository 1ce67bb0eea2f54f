//! Opinion-Harvest: an authenticated forum crawler with an enrichment pipeline
//!
//! This crate logs into a review forum, walks its forum and topic pages,
//! extracts one opinion record per post and pushes every record through an
//! asynchronous pipeline (language detection, vectorization, persistence).
//! Persisted records advance a checkpoint so later runs can skip what was
//! already harvested.

pub mod config;
pub mod crawler;
pub mod harvest;
pub mod inference;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod storage;

use thiserror::Error;

/// Main error type for Opinion-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Inference error: {0}")]
    Inference(#[from] inference::InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crawl aborted")]
    Cancelled,

    #[error("Crawl task failed: {0}")]
    TaskJoin(String),
}

impl HarvestError {
    /// Returns true if the retry supervisor should run the crawl again
    ///
    /// Configuration problems and operator aborts never go away by waiting.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Result type alias for Opinion-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use model::{PostRecord, ScanMode};
pub use pipeline::{Completion, PersistPolicy, Pipeline};
