//! Output module for harvest reports and exports
//!
//! This module handles:
//! - Crawl metrics (counters and histograms) summarized in the logs
//! - The JSON-lines feed of extracted records
//! - Review store statistics for `--stats`

mod feed;
pub mod metrics;
pub mod stats;

pub use feed::FeedWriter;
pub use metrics::{HarvestMetrics, Histogram, MetricsSnapshot};
pub use stats::{load_statistics, print_statistics, StoreStatistics};
