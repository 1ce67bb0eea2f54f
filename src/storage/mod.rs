//! Storage module for persisting harvested opinions
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Review insertion with checkpoint advancement
//! - The last opinion date checkpoint used by incremental scans
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ReviewStore, StorageError, StorageResult};

use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Key of the checkpoint row in `scrape_metadata`
pub const LAST_OPINION_DATE: &str = "last_opinion_date";

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Result of a successful review insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReceipt {
    pub id: i64,
    pub checkpoint: DateTime<Utc>,
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub mode: String,
    pub status: RunStatus,
    pub attempts: u32,
    pub opinions_scraped: u64,
    pub opinions_errors: u64,
    pub error_message: Option<String>,
}

/// Counters written when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub attempts: u32,
    pub opinions_scraped: u64,
    pub opinions_errors: u64,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
