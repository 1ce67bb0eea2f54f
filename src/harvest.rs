//! One harvest invocation, end to end
//!
//! Opens the review store, records the run in the ledger, reads the
//! checkpoint, starts the pipeline workers and runs the crawl under the retry
//! supervisor. Once the crawl is over the dispatcher is dropped, the workers
//! drain whatever was already queued and the run is closed in the ledger.

use crate::config::{Config, Credentials};
use crate::crawler::{supervise, AbortSignal, CrawlSummary, Crawler, RetryPolicy};
use crate::inference::{Embedder, InferenceClient};
use crate::model::ScanMode;
use crate::output::{FeedWriter, HarvestMetrics, MetricsSnapshot};
use crate::pipeline::{
    DetectStage, LanguageDetector, LinguaDetector, PersistStage, Pipeline, PipelineReport,
    SharedStore, VectorizeStage, WorkerPool,
};
use crate::storage::{open_storage, ReviewStore, RunStatus, RunTotals};
use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Outcome of a harvest invocation
#[derive(Debug)]
pub struct HarvestReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub attempts: u32,
    pub crawl: Option<CrawlSummary>,
    pub pipeline: PipelineReport,
    pub metrics: MetricsSnapshot,
    pub error: Option<String>,
}

/// Builder for a harvest invocation
///
/// The language detector and embedder default to lingua and the configured
/// inference service; both can be replaced.
pub struct Harvester {
    config: Arc<Config>,
    credentials: Credentials,
    detector: Option<Arc<dyn LanguageDetector>>,
    embedder: Option<Arc<dyn Embedder>>,
    abort: Arc<AbortSignal>,
}

impl Harvester {
    pub fn new(config: Config, credentials: Credentials) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            detector: None,
            embedder: None,
            abort: Arc::new(AbortSignal::new()),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_abort_signal(mut self, abort: Arc<AbortSignal>) -> Self {
        self.abort = abort;
        self
    }

    fn embedder(&self) -> Result<Option<Arc<dyn Embedder>>, HarvestError> {
        if let Some(embedder) = &self.embedder {
            return Ok(Some(Arc::clone(embedder)));
        }
        match &self.config.pipeline.inference_url {
            Some(url) => {
                let timeout = Duration::from_secs(self.config.crawler.request_timeout);
                let client = InferenceClient::new(url, timeout)?;
                Ok(Some(Arc::new(client)))
            }
            None => {
                tracing::warn!("No inference-url configured, records are stored without vectors");
                Ok(None)
            }
        }
    }

    /// Runs the harvest
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Fingerprint of the configuration, stored with the run
    /// * `full_scan` - Visit everything instead of only posts newer than the checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestReport)` - The run finished, successfully or not; see `status`
    /// * `Err(HarvestError)` - The store or the pipeline could not be set up
    pub async fn run(
        self,
        config_hash: &str,
        full_scan: bool,
    ) -> Result<HarvestReport, HarvestError> {
        let storage = open_storage(Path::new(&self.config.output.database_path))?;
        let storage = Arc::new(Mutex::new(storage));

        let (run_id, mode) = {
            let mut store = storage.lock().unwrap_or_else(PoisonError::into_inner);
            let mode = if full_scan {
                ScanMode::Full
            } else {
                ScanMode::Incremental {
                    checkpoint: store.last_opinion_date()?,
                }
            };
            (store.create_run(config_hash, mode.label())?, mode)
        };
        match mode {
            ScanMode::Incremental {
                checkpoint: Some(checkpoint),
            } => tracing::info!("Run {}: incremental scan after {}", run_id, checkpoint),
            ScanMode::Incremental { checkpoint: None } => {
                tracing::info!("Run {}: incremental scan without checkpoint", run_id)
            }
            ScanMode::Full => tracing::info!("Run {}: full scan", run_id),
        }

        let metrics = Arc::new(HarvestMetrics::new());
        let detector = match &self.detector {
            Some(detector) => Arc::clone(detector),
            None => Arc::new(LinguaDetector::new()) as Arc<dyn LanguageDetector>,
        };
        let vectorize = match self.embedder()? {
            Some(embedder) => VectorizeStage::new(embedder, self.config.pipeline.max_tokens),
            None => VectorizeStage::without_model(),
        };
        let shared: SharedStore = storage.clone();
        let pipeline = Pipeline::new(
            DetectStage::new(
                detector,
                &self.config.pipeline.target_language,
                self.config.pipeline.persist_policy,
                Arc::clone(&metrics),
            ),
            vectorize,
            PersistStage::new(shared),
        );
        let (dispatcher, pool) =
            WorkerPool::spawn(Arc::new(pipeline), self.config.pipeline.workers as usize);

        let feed = match &self.config.output.feed_path {
            Some(path) => Some(Arc::new(FeedWriter::open(Path::new(path))?)),
            None => None,
        };

        let mut crawler = Crawler::new(
            Arc::clone(&self.config),
            self.credentials.clone(),
            mode,
            dispatcher,
            Arc::clone(&metrics),
        )?
        .with_abort_signal(Arc::clone(&self.abort));
        if let Some(feed) = &feed {
            crawler = crawler.with_feed(Arc::clone(feed));
        }

        let policy = RetryPolicy::from_config(&self.config.retry);
        let supervised = supervise(&policy, &self.abort, |attempt| {
            let crawler = &crawler;
            async move {
                tracing::info!("Crawl attempt {} of run {}", attempt, run_id);
                crawler.run().await
            }
        })
        .await;

        // Closing the last dispatcher lets the workers drain and stop
        drop(crawler);
        let pipeline_report = pool.join().await;

        if let Some(feed) = &feed {
            if let Err(e) = feed.flush() {
                tracing::warn!("Failed to flush feed: {}", e);
            }
        }

        let snapshot = metrics.snapshot();
        snapshot.log_summary();
        tracing::info!("Pipeline finished: {:?}", pipeline_report);

        let (status, crawl, error) = match supervised.result {
            Ok(summary) => (RunStatus::Completed, Some(summary), None),
            Err(HarvestError::Cancelled) => {
                (RunStatus::Aborted, None, Some("aborted".to_string()))
            }
            Err(e) => (RunStatus::Failed, None, Some(e.to_string())),
        };

        let totals = RunTotals {
            attempts: supervised.attempts,
            opinions_scraped: metrics.opinions_scraped(),
            opinions_errors: metrics.opinions_errors(),
        };
        storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish_run(run_id, status, &totals, error.as_deref())?;
        tracing::info!(
            "Run {} {} after {} attempt(s)",
            run_id,
            status.to_db_string(),
            supervised.attempts
        );

        Ok(HarvestReport {
            run_id,
            status,
            attempts: supervised.attempts,
            crawl,
            pipeline: pipeline_report,
            metrics: snapshot,
            error,
        })
    }
}

/// Runs a harvest with the default detector and embedder
pub async fn harvest(
    config: Config,
    config_hash: &str,
    credentials: Credentials,
    full_scan: bool,
    abort: Arc<AbortSignal>,
) -> Result<HarvestReport, HarvestError> {
    Harvester::new(config, credentials)
        .with_abort_signal(abort)
        .run(config_hash, full_scan)
        .await
}
