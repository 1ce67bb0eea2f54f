//! In-process crawl metrics
//!
//! Counters and histograms written by the crawler and the pipeline workers.
//! Writes are fire-and-forget: nothing in the crawl or pipeline reads them
//! back, they are only summarized in the logs at the end of a harvest.

use crate::model::PostRecord;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Rating buckets, 1.0 to 5.0 in steps of 0.5
pub const RATING_BUCKETS: [f64; 9] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0];

pub const VOTE_RATE_BUCKETS: [f64; 10] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 20.0, 50.0, 100.0];

/// Language detection duration buckets (seconds)
pub const DETECTION_BUCKETS: [f64; 10] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0,
];

/// Fixed-bucket histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bounds: Vec<f64>,
    /// One count per bound plus a final overflow bucket
    counts: Vec<u64>,
    sum: f64,
}

impl Histogram {
    pub fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum: 0.0,
        }
    }

    pub fn observe(&mut self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[idx] += 1;
        self.sum += value;
    }

    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> Option<f64> {
        match self.count() {
            0 => None,
            n => Some(self.sum / n as f64),
        }
    }

    /// `(upper bound, observations <= bound)` pairs, overflow excluded
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .zip(&self.counts)
            .map(|(bound, count)| {
                running += count;
                (*bound, running)
            })
            .collect()
    }
}

#[derive(Debug)]
struct Distributions {
    rating: Histogram,
    vote_rate: Histogram,
    detection_seconds: Histogram,
    languages: BTreeMap<String, u64>,
    courses: HashSet<String>,
    professors: HashSet<String>,
}

/// Metrics of one harvest, shared by the crawler and the pipeline
#[derive(Debug)]
pub struct HarvestMetrics {
    opinions_scraped: AtomicU64,
    opinions_errors: AtomicU64,
    forum_pages: AtomicU64,
    topic_pages: AtomicU64,
    distributions: Mutex<Distributions>,
}

/// Point-in-time copy of the metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub opinions_scraped: u64,
    pub opinions_errors: u64,
    pub forum_pages: u64,
    pub topic_pages: u64,
    pub distinct_courses: u64,
    pub distinct_professors: u64,
    pub languages: BTreeMap<String, u64>,
    pub rating: Histogram,
    pub vote_rate: Histogram,
    pub detection_seconds: Histogram,
}

impl Default for HarvestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestMetrics {
    pub fn new() -> Self {
        Self {
            opinions_scraped: AtomicU64::new(0),
            opinions_errors: AtomicU64::new(0),
            forum_pages: AtomicU64::new(0),
            topic_pages: AtomicU64::new(0),
            distributions: Mutex::new(Distributions {
                rating: Histogram::new(&RATING_BUCKETS),
                vote_rate: Histogram::new(&VOTE_RATE_BUCKETS),
                detection_seconds: Histogram::new(&DETECTION_BUCKETS),
                languages: BTreeMap::new(),
                courses: HashSet::new(),
                professors: HashSet::new(),
            }),
        }
    }

    fn distributions(&self) -> MutexGuard<'_, Distributions> {
        self.distributions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a record handed to the pipeline
    pub fn record_scraped(&self, record: &PostRecord) {
        self.opinions_scraped.fetch_add(1, Ordering::Relaxed);

        let mut dist = self.distributions();

        if !record.rating.is_empty() {
            match record.rating.trim().replace(',', ".").parse::<f64>() {
                Ok(rating) => dist.rating.observe(rating),
                Err(_) => tracing::warn!("Invalid rating value: {}", record.rating),
            }
        }
        if let Some(vote_rate) = record.vote_rate {
            dist.vote_rate.observe(vote_rate);
        }
        if let Some(course) = &record.course {
            dist.courses.insert(course.clone());
        }
        if !record.professor.is_empty() {
            dist.professors.insert(record.professor.clone());
        }
    }

    /// Records a post that failed extraction
    pub fn record_error(&self) {
        self.opinions_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forum_page(&self) {
        self.forum_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_topic_page(&self) {
        self.topic_pages.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one language detection and how long it took
    pub fn record_language(&self, language: &str, elapsed: Duration) {
        let mut dist = self.distributions();
        *dist.languages.entry(language.to_string()).or_insert(0) += 1;
        dist.detection_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn opinions_scraped(&self) -> u64 {
        self.opinions_scraped.load(Ordering::Relaxed)
    }

    pub fn opinions_errors(&self) -> u64 {
        self.opinions_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let dist = self.distributions();
        MetricsSnapshot {
            opinions_scraped: self.opinions_scraped(),
            opinions_errors: self.opinions_errors(),
            forum_pages: self.forum_pages.load(Ordering::Relaxed),
            topic_pages: self.topic_pages.load(Ordering::Relaxed),
            distinct_courses: dist.courses.len() as u64,
            distinct_professors: dist.professors.len() as u64,
            languages: dist.languages.clone(),
            rating: dist.rating.clone(),
            vote_rate: dist.vote_rate.clone(),
            detection_seconds: dist.detection_seconds.clone(),
        }
    }
}

impl MetricsSnapshot {
    /// Writes the snapshot to the log
    pub fn log_summary(&self) {
        tracing::info!(
            "Opinions scraped: {}, errors: {}, forum pages: {}, topic pages: {}",
            self.opinions_scraped,
            self.opinions_errors,
            self.forum_pages,
            self.topic_pages
        );
        tracing::info!(
            "Distinct courses: {}, distinct professors: {}",
            self.distinct_courses,
            self.distinct_professors
        );
        for (language, count) in &self.languages {
            tracing::info!("Language {}: {}", language, count);
        }
        if let Some(mean) = self.rating.mean() {
            tracing::info!("Mean rating: {:.2} over {} opinions", mean, self.rating.count());
        }
        if let Some(mean) = self.detection_seconds.mean() {
            tracing::debug!("Mean language detection time: {:.4}s", mean);
        }
    }
}
