//! Statistics generation from the review store
//!
//! This module provides functionality for extracting and displaying
//! review store statistics and the outcome of the latest harvest run.

use crate::storage::{ReviewStore, RunRecord};
use crate::HarvestError;
use chrono::{DateTime, Utc};

/// Review store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Total number of stored reviews
    pub total_reviews: u64,

    /// Reviews per detected language, most frequent first
    pub reviews_by_language: Vec<(String, u64)>,

    pub distinct_professors: u64,

    pub distinct_courses: u64,

    /// Current checkpoint of incremental scans
    pub last_opinion_date: Option<DateTime<Utc>>,

    /// Most recent harvest run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The review store to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn ReviewStore) -> Result<StoreStatistics, HarvestError> {
    Ok(StoreStatistics {
        total_reviews: storage.count_reviews()?,
        reviews_by_language: storage.count_by_language()?,
        distinct_professors: storage.count_distinct_professors()?,
        distinct_courses: storage.count_distinct_courses()?,
        last_opinion_date: storage.last_opinion_date()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Review Store Statistics ===\n");

    println!("Overview:");
    println!("  Total reviews: {}", stats.total_reviews);
    println!("  Distinct professors: {}", stats.distinct_professors);
    println!("  Distinct courses: {}", stats.distinct_courses);
    match &stats.last_opinion_date {
        Some(date) => println!("  Last opinion date: {}", date.to_rfc3339()),
        None => println!("  Last opinion date: (none)"),
    }
    println!();

    if !stats.reviews_by_language.is_empty() {
        println!("Reviews by Language:");
        for (language, count) in &stats.reviews_by_language {
            let percentage = if stats.total_reviews > 0 {
                (*count as f64 / stats.total_reviews as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", language, count, percentage);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Mode: {}", run.mode);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Attempts: {}", run.attempts);
            println!(
                "  Opinions scraped: {} ({} errors)",
                run.opinions_scraped, run.opinions_errors
            );
            if let Some(message) = &run.error_message {
                println!("  Error: {}", message);
            }
        }
        None => println!("No harvest runs recorded"),
    }
}
