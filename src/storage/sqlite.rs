//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ReviewStore trait.

use crate::model::PostRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ReviewStore, StorageError, StorageResult};
use crate::storage::{
    PersistReceipt, RunRecord, RunStatus, RunTotals, LAST_OPINION_DATE,
};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw column values of a `reviews` row before conversion
struct ReviewRow {
    id: i64,
    username: String,
    faculty: Option<String>,
    year: Option<u32>,
    opinion_weight: Option<f64>,
    date: i64,
    professor: String,
    rating: String,
    vote_rate: Option<f64>,
    course: Option<String>,
    review: String,
    post_url: String,
    language: Option<String>,
    vectors: Option<String>,
}

impl ReviewRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            faculty: row.get(2)?,
            year: row.get(3)?,
            opinion_weight: row.get(4)?,
            date: row.get(5)?,
            professor: row.get(6)?,
            rating: row.get(7)?,
            vote_rate: row.get(8)?,
            course: row.get(9)?,
            review: row.get(10)?,
            post_url: row.get(11)?,
            language: row.get(12)?,
            vectors: row.get(13)?,
        })
    }

    fn into_record(self) -> StorageResult<PostRecord> {
        let vectors = match self.vectors {
            Some(json) => Some(serde_json::from_str::<Vec<f32>>(&json)?),
            None => None,
        };

        Ok(PostRecord {
            id: Some(self.id),
            username: self.username,
            faculty: self.faculty,
            year: self.year,
            opinion_weight: self.opinion_weight,
            date: from_timestamp(self.date)?,
            professor: self.professor,
            rating: self.rating,
            vote_rate: self.vote_rate,
            course: self.course,
            review: self.review,
            post_url: self.post_url,
            language: self.language,
            vectors,
        })
    }
}

fn from_timestamp(micros: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or(StorageError::InvalidTimestamp(micros))
}

fn upsert_checkpoint(conn: &Connection, date: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
    conn.execute(
        "INSERT INTO scrape_metadata (id, date) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET date = MAX(date, excluded.date)",
        params![LAST_OPINION_DATE, date.timestamp_micros()],
    )?;

    let stored: i64 = conn.query_row(
        "SELECT date FROM scrape_metadata WHERE id = ?1",
        params![LAST_OPINION_DATE],
        |row| row.get(0),
    )?;

    from_timestamp(stored)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        mode: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Failed),
        attempts: row.get(6)?,
        opinions_scraped: row.get::<_, i64>(7)? as u64,
        opinions_errors: row.get::<_, i64>(8)? as u64,
        error_message: row.get(9)?,
    })
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, mode, status, attempts,
     opinions_scraped, opinions_errors, error_message";

impl ReviewStore for SqliteStorage {
    // ===== Reviews =====

    fn persist_review(&mut self, record: &PostRecord) -> StorageResult<PersistReceipt> {
        if let Some(id) = record.id {
            return Err(StorageError::AlreadyPersisted(id));
        }

        let vectors = match &record.vectors {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO reviews (username, faculty, year, opinion_weight, date, professor,
             rating, vote_rate, course, review, post_url, language, vectors, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.username,
                record.faculty,
                record.year,
                record.opinion_weight,
                record.date.timestamp_micros(),
                record.professor,
                record.rating,
                record.vote_rate,
                record.course,
                record.review,
                record.post_url,
                record.language,
                vectors,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        let checkpoint = upsert_checkpoint(&tx, record.date)?;
        tx.commit()?;

        Ok(PersistReceipt { id, checkpoint })
    }

    fn get_review(&self, id: i64) -> StorageResult<Option<PostRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, faculty, year, opinion_weight, date, professor, rating,
                 vote_rate, course, review, post_url, language, vectors
                 FROM reviews WHERE id = ?1",
                params![id],
                ReviewRow::from_row,
            )
            .optional()?;

        row.map(ReviewRow::into_record).transpose()
    }

    fn count_reviews(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Checkpoint =====

    fn last_opinion_date(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let stored: Option<i64> = self
            .conn
            .query_row(
                "SELECT date FROM scrape_metadata WHERE id = ?1",
                params![LAST_OPINION_DATE],
                |row| row.get(0),
            )
            .optional()?;

        stored.map(from_timestamp).transpose()
    }

    fn advance_checkpoint(&mut self, date: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        upsert_checkpoint(&self.conn, date)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, mode, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, mode, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, attempts = ?3,
             opinions_scraped = ?4, opinions_errors = ?5, error_message = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.attempts,
                totals.opinions_scraped as i64,
                totals.opinions_errors as i64,
                error_message,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Statistics =====

    fn count_by_language(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(language, 'unknown'), COUNT(*) AS count FROM reviews
             GROUP BY 1 ORDER BY count DESC",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    fn count_distinct_professors(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT professor) FROM reviews WHERE professor != ''",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_distinct_courses(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT course) FROM reviews WHERE course IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn record(date: DateTime<Utc>) -> PostRecord {
        PostRecord {
            id: None,
            username: "anon".to_string(),
            faculty: Some("W4".to_string()),
            year: Some(3),
            opinion_weight: Some(1.5),
            date,
            professor: "Jan Kowalski".to_string(),
            rating: "4.5".to_string(),
            vote_rate: Some(2.0),
            course: Some("Analiza".to_string()),
            review: "Polecam".to_string(),
            post_url: "https://forum.example/t,x,1".to_string(),
            language: Some("pl".to_string()),
            vectors: Some(vec![0.25, -1.0]),
        }
    }

    #[test]
    fn test_persist_and_read_back() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let receipt = storage.persist_review(&record(day(2024, 2, 1))).unwrap();
        assert!(receipt.id > 0);
        assert_eq!(receipt.checkpoint, day(2024, 2, 1));

        let stored = storage.get_review(receipt.id).unwrap().unwrap();
        assert_eq!(stored.id, Some(receipt.id));
        assert_eq!(stored.date, day(2024, 2, 1));
        assert_eq!(stored.vectors, Some(vec![0.25, -1.0]));
        assert_eq!(stored.course.as_deref(), Some("Analiza"));
    }

    #[test]
    fn test_persisted_record_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut rec = record(day(2024, 2, 1));
        rec.id = Some(7);

        let result = storage.persist_review(&rec);
        assert!(matches!(result, Err(StorageError::AlreadyPersisted(7))));
        assert_eq!(storage.count_reviews().unwrap(), 0);
    }

    #[test]
    fn test_checkpoint_absent_initially() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.last_opinion_date().unwrap(), None);
    }

    #[test]
    fn test_checkpoint_never_regresses() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        storage.persist_review(&record(day(2024, 3, 1))).unwrap();
        let receipt = storage.persist_review(&record(day(2024, 1, 1))).unwrap();
        assert_eq!(receipt.checkpoint, day(2024, 3, 1));

        let after = storage.advance_checkpoint(day(2023, 6, 1)).unwrap();
        assert_eq!(after, day(2024, 3, 1));
        assert_eq!(storage.last_opinion_date().unwrap(), Some(day(2024, 3, 1)));

        let after = storage.advance_checkpoint(day(2024, 4, 1)).unwrap();
        assert_eq!(after, day(2024, 4, 1));
    }

    #[test]
    fn test_subsecond_date_is_covered_by_checkpoint() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::milliseconds(500);

        let receipt = storage.persist_review(&record(date)).unwrap();
        assert_eq!(receipt.checkpoint, date);

        let checkpoint = storage.last_opinion_date().unwrap().unwrap();
        assert!(checkpoint >= date);
        assert!(crate::model::ScanMode::Incremental {
            checkpoint: Some(checkpoint)
        }
        .skips(&date));

        let stored = storage.get_review(receipt.id).unwrap().unwrap();
        assert_eq!(stored.date, date);
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash", "incremental").unwrap();

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.mode, "incremental");

        let totals = RunTotals {
            attempts: 2,
            opinions_scraped: 10,
            opinions_errors: 1,
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &totals, None)
            .unwrap();

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Completed);
        assert_eq!(latest.attempts, 2);
        assert_eq!(latest.opinions_scraped, 10);
        assert!(latest.finished_at.is_some());
    }

    #[test]
    fn test_finish_unknown_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_run(42, RunStatus::Failed, &RunTotals::default(), Some("x"));
        assert!(matches!(result, Err(StorageError::RunNotFound(42))));
    }

    #[test]
    fn test_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.persist_review(&record(day(2024, 1, 1))).unwrap();

        let mut other = record(day(2024, 1, 2));
        other.professor = "Anna Nowak".to_string();
        other.course = None;
        other.language = Some("en".to_string());
        storage.persist_review(&other).unwrap();

        assert_eq!(storage.count_reviews().unwrap(), 2);
        assert_eq!(storage.count_distinct_professors().unwrap(), 2);
        assert_eq!(storage.count_distinct_courses().unwrap(), 1);

        let languages = storage.count_by_language().unwrap();
        assert_eq!(languages.len(), 2);
        assert!(languages.contains(&("pl".to_string(), 1)));
    }
}
