//! Integration tests for the enrichment pipeline
//!
//! Records are pushed through the worker pool into a SQLite store in a
//! temporary directory, with stub language detection and embeddings.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use opinion_harvest::inference::{Embedder, InferenceError};
use opinion_harvest::output::HarvestMetrics;
use opinion_harvest::pipeline::{
    DetectStage, LanguageDetector, PersistPolicy, PersistStage, Pipeline, SharedStore,
    VectorizeStage, WorkerPool, WriteSkip,
};
use opinion_harvest::storage::{
    PersistReceipt, ReviewStore, RunRecord, RunStatus, RunTotals, SqliteStorage, StorageError,
    StorageResult,
};
use opinion_harvest::{Completion, PostRecord};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Reads the language from the first word of the review: "en: ...", "pl: ..."
struct PrefixDetector;

impl LanguageDetector for PrefixDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let (language, _) = text.split_once(':')?;
        Some(language.to_string())
    }
}

/// Embeds everything except reviews containing "FAIL"
struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.contains("FAIL") {
            return Err(InferenceError::Embedding("model crashed".to_string()));
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

/// SQLite store whose writes fail for reviews containing "DISK"
struct FlakyDiskStore {
    inner: SqliteStorage,
}

impl ReviewStore for FlakyDiskStore {
    fn persist_review(&mut self, record: &PostRecord) -> StorageResult<PersistReceipt> {
        if record.review.contains("DISK") {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.persist_review(record)
    }

    fn get_review(&self, id: i64) -> StorageResult<Option<PostRecord>> {
        self.inner.get_review(id)
    }

    fn count_reviews(&self) -> StorageResult<u64> {
        self.inner.count_reviews()
    }

    fn last_opinion_date(&self) -> StorageResult<Option<DateTime<Utc>>> {
        self.inner.last_opinion_date()
    }

    fn advance_checkpoint(&mut self, date: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        self.inner.advance_checkpoint(date)
    }

    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<i64> {
        self.inner.create_run(config_hash, mode)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        self.inner.finish_run(run_id, status, totals, error_message)
    }

    fn count_by_language(&self) -> StorageResult<Vec<(String, u64)>> {
        self.inner.count_by_language()
    }

    fn count_distinct_professors(&self) -> StorageResult<u64> {
        self.inner.count_distinct_professors()
    }

    fn count_distinct_courses(&self) -> StorageResult<u64> {
        self.inner.count_distinct_courses()
    }
}

fn date(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap()
}

fn record(review: &str, date: DateTime<Utc>) -> PostRecord {
    PostRecord {
        id: None,
        username: "student".to_string(),
        faculty: Some("W8".to_string()),
        year: Some(2),
        opinion_weight: Some(1.0),
        date,
        professor: "Jan Kowalski".to_string(),
        rating: "4,5".to_string(),
        vote_rate: Some(3.0),
        course: Some("Fizyka".to_string()),
        review: review.to_string(),
        post_url: "https://forum.example/t,jan-kowalski,1".to_string(),
        language: None,
        vectors: None,
    }
}

struct Fixture {
    _dir: TempDir,
    storage: Arc<Mutex<SqliteStorage>>,
    pipeline: Arc<Pipeline>,
}

fn fixture(policy: PersistPolicy) -> Fixture {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Mutex::new(
        SqliteStorage::new(&dir.path().join("reviews.db")).unwrap(),
    ));
    let shared: SharedStore = storage.clone();

    let pipeline = Pipeline::new(
        DetectStage::new(
            Arc::new(PrefixDetector),
            "pl",
            policy,
            Arc::new(HarvestMetrics::new()),
        ),
        VectorizeStage::new(Arc::new(LengthEmbedder), 512),
        PersistStage::new(shared),
    );

    Fixture {
        _dir: dir,
        storage,
        pipeline: Arc::new(pipeline),
    }
}

#[tokio::test]
async fn test_only_target_language_reaches_store_by_default() {
    let fx = fixture(PersistPolicy::TargetLanguageOnly);
    let (dispatcher, pool) = WorkerPool::spawn(Arc::clone(&fx.pipeline), 3);

    assert!(dispatcher.dispatch(record("pl: świetny wykładowca", date(1, 10))));
    assert!(dispatcher.dispatch(record("en: great lecturer", date(3, 1))));
    assert!(dispatcher.dispatch(record("no language marker", date(3, 2))));
    assert!(dispatcher.dispatch(record("pl: FAIL przy wektoryzacji", date(3, 3))));
    assert!(dispatcher.dispatch(record("pl: polecam", date(2, 1))));
    drop(dispatcher);

    let report = pool.join().await;
    assert_eq!(report.persisted, 2);
    assert_eq!(report.dropped_non_target, 1);
    assert_eq!(report.dropped_unknown, 1);
    assert_eq!(report.vectorization_failed, 1);
    assert_eq!(report.processed(), 5);

    let storage = fx.storage.lock().unwrap();
    assert_eq!(storage.count_reviews().unwrap(), 2);
    // Only persisted records move the checkpoint
    assert_eq!(storage.last_opinion_date().unwrap(), Some(date(2, 1)));
    assert_eq!(
        storage.count_by_language().unwrap(),
        vec![("pl".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_all_languages_policy_stores_other_languages_without_vector() {
    let fx = fixture(PersistPolicy::AllLanguages);

    let completion = fx.pipeline.run(record("en: great lecturer", date(1, 5))).await;
    let Completion::Persisted(id) = completion else {
        panic!("expected persisted, got {:?}", completion);
    };

    let stored = fx.storage.lock().unwrap().get_review(id).unwrap().unwrap();
    assert_eq!(stored.language.as_deref(), Some("en"));
    assert_eq!(stored.vectors, Some(Vec::new()));
}

#[tokio::test]
async fn test_target_language_record_is_stored_with_vector() {
    let fx = fixture(PersistPolicy::TargetLanguageOnly);

    let completion = fx.pipeline.run(record("pl: bardzo dobrze", date(1, 5))).await;
    let Completion::Persisted(id) = completion else {
        panic!("expected persisted, got {:?}", completion);
    };

    let stored = fx.storage.lock().unwrap().get_review(id).unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.vectors, Some(vec![17.0, 1.0]));
    assert_eq!(stored.date, date(1, 5));
}

#[tokio::test]
async fn test_checkpoint_is_maximum_regardless_of_completion_order() {
    let fx = fixture(PersistPolicy::TargetLanguageOnly);
    let (dispatcher, pool) = WorkerPool::spawn(Arc::clone(&fx.pipeline), 4);

    let days = [14, 3, 28, 1, 19, 7, 22, 11];
    for day in days {
        dispatcher.dispatch(record("pl: opinia", date(2, day)));
    }
    drop(dispatcher);

    let report = pool.join().await;
    assert_eq!(report.persisted, days.len() as u64);
    assert_eq!(
        fx.storage.lock().unwrap().last_opinion_date().unwrap(),
        Some(date(2, 28))
    );
}

#[tokio::test]
async fn test_persisting_record_with_identifier_is_noop() {
    let fx = fixture(PersistPolicy::TargetLanguageOnly);

    let completion = fx.pipeline.run(record("pl: opinia", date(1, 5))).await;
    let Completion::Persisted(id) = completion else {
        panic!("expected persisted, got {:?}", completion);
    };

    let stored = fx.storage.lock().unwrap().get_review(id).unwrap().unwrap();
    let again = fx.pipeline.run(stored).await;

    assert!(matches!(again, Completion::NothingWritten(_)));
    assert_eq!(fx.storage.lock().unwrap().count_reviews().unwrap(), 1);
}

fn flaky_pipeline() -> (Arc<Mutex<FlakyDiskStore>>, Arc<Pipeline>) {
    let store = Arc::new(Mutex::new(FlakyDiskStore {
        inner: SqliteStorage::new_in_memory().unwrap(),
    }));
    let shared: SharedStore = store.clone();

    let pipeline = Pipeline::new(
        DetectStage::new(
            Arc::new(PrefixDetector),
            "pl",
            PersistPolicy::TargetLanguageOnly,
            Arc::new(HarvestMetrics::new()),
        ),
        VectorizeStage::new(Arc::new(LengthEmbedder), 512),
        PersistStage::new(shared),
    );
    (store, Arc::new(pipeline))
}

#[tokio::test]
async fn test_storage_fault_is_reported_as_nothing_written() {
    let (store, pipeline) = flaky_pipeline();

    let completion = pipeline.run(record("pl: DISK pełny", date(1, 5))).await;

    assert_eq!(
        completion,
        Completion::NothingWritten(WriteSkip::StorageFault)
    );
    let store = store.lock().unwrap();
    assert_eq!(store.count_reviews().unwrap(), 0);
    assert_eq!(store.last_opinion_date().unwrap(), None);
}

#[tokio::test]
async fn test_workers_keep_draining_after_storage_fault() {
    let (store, pipeline) = flaky_pipeline();
    let (dispatcher, pool) = WorkerPool::spawn(pipeline, 2);

    assert!(dispatcher.dispatch(record("pl: DISK pierwszy", date(4, 1))));
    assert!(dispatcher.dispatch(record("pl: dobry", date(1, 10))));
    assert!(dispatcher.dispatch(record("pl: DISK drugi", date(4, 2))));
    assert!(dispatcher.dispatch(record("pl: rzetelny", date(2, 1))));
    drop(dispatcher);

    let report = pool.join().await;
    assert_eq!(report.storage_faults, 2);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.processed(), 4);

    let store = store.lock().unwrap();
    assert_eq!(store.count_reviews().unwrap(), 2);
    // Failed writes never move the checkpoint
    assert_eq!(store.last_opinion_date().unwrap(), Some(date(2, 1)));
}
