//! Configuration module for Opinion-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and resolving the forum credentials from the environment.
//!
//! # Example
//!
//! ```no_run
//! use opinion_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Target language: {}", config.pipeline.target_language);
//! ```

mod credentials;
mod parser;
mod types;
mod validation;

// Re-export types
pub use credentials::Credentials;
pub use types::{
    Config, CrawlerConfig, CredentialsConfig, ForumConfig, KeywordConfig, OutputConfig,
    PersistPolicy, PipelineConfig, RetryConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
