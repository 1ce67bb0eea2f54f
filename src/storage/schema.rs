//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the review store.
//! Timestamps that take part in comparisons (`reviews.date`,
//! `scrape_metadata.date`) are stored as UTC unix microseconds so that SQL `MAX`
//! orders them correctly.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    opinions_scraped INTEGER NOT NULL DEFAULT 0,
    opinions_errors INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

-- One row per persisted opinion
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    faculty TEXT,
    year INTEGER,
    opinion_weight REAL,
    date INTEGER NOT NULL,
    professor TEXT NOT NULL,
    rating TEXT NOT NULL,
    vote_rate REAL,
    course TEXT,
    review TEXT NOT NULL,
    post_url TEXT NOT NULL,
    language TEXT,
    vectors TEXT,
    inserted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_date ON reviews(date);
CREATE INDEX IF NOT EXISTS idx_reviews_professor ON reviews(professor);
CREATE INDEX IF NOT EXISTS idx_reviews_language ON reviews(language);

-- Keyed singletons such as the last opinion date checkpoint
CREATE TABLE IF NOT EXISTS scrape_metadata (
    id TEXT PRIMARY KEY,
    date INTEGER NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
