//! Storage traits and error types
//!
//! This module defines the trait interface for the review store and
//! associated error types.

use crate::model::PostRecord;
use crate::storage::{PersistReceipt, RunRecord, RunStatus, RunTotals};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Record already persisted with id {0}")]
    AlreadyPersisted(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp in store: {0}")]
    InvalidTimestamp(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for review store implementations
///
/// Every write is a single atomic statement or transaction, so concurrent
/// pipeline workers need no extra locking beyond exclusive access to the
/// connection itself.
pub trait ReviewStore {
    // ===== Reviews =====

    /// Inserts a review and advances the checkpoint in one transaction
    ///
    /// # Returns
    ///
    /// The assigned identifier and the checkpoint value after the update.
    /// Records that already carry an identifier are rejected with
    /// `StorageError::AlreadyPersisted`.
    fn persist_review(&mut self, record: &PostRecord) -> StorageResult<PersistReceipt>;

    /// Gets a review by its identifier
    fn get_review(&self, id: i64) -> StorageResult<Option<PostRecord>>;

    /// Counts stored reviews
    fn count_reviews(&self) -> StorageResult<u64>;

    // ===== Checkpoint =====

    /// Reads the last opinion date checkpoint
    fn last_opinion_date(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Max-merges a date into the checkpoint, creating it when absent
    ///
    /// Returns the checkpoint after the merge, which is never earlier than
    /// it was before.
    fn advance_checkpoint(&mut self, date: DateTime<Utc>) -> StorageResult<DateTime<Utc>>;

    // ===== Run Management =====

    /// Creates a new harvest run
    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with its outcome and totals
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts reviews per detected language
    fn count_by_language(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Counts distinct professors among stored reviews
    fn count_distinct_professors(&self) -> StorageResult<u64>;

    /// Counts distinct courses among stored reviews
    fn count_distinct_courses(&self) -> StorageResult<u64>;
}
