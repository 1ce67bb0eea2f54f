//! Enrichment pipeline
//!
//! Every dispatched record runs through a fixed sequence of stages:
//!
//! ```text
//! DetectLanguage -> (target language) Vectorize -> Persist
//!                -> (other language, all-languages policy) Persist
//! ```
//!
//! Stages are statically typed; each one returns the next stage or a
//! terminal `Completion`, and the `Pipeline` driver performs the hand-off.
//! A pool of workers pulls records from a shared queue, so records finish in
//! no particular order while the stages of one record stay sequential.

mod detect;
mod persist;
mod vectorize;

pub use crate::config::PersistPolicy;
pub use detect::{DetectStage, LanguageDetector, LinguaDetector};
pub use persist::{PersistStage, SharedStore};
pub use vectorize::{truncate_to_tokens, VectorizeStage};

use crate::model::PostRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::Instrument;

/// A pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetectLanguage,
    Vectorize,
    Persist,
}

/// Why a record left the pipeline without reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NonTargetLanguage,
    UnknownLanguage,
    VectorizationFailed,
}

/// Why the persistence stage wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSkip {
    /// The record already carried a store identifier
    AlreadyPersisted,
    /// The store rejected the write; logged, not retried
    StorageFault,
}

/// Terminal result of one record's run through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Stored under the given identifier
    Persisted(i64),
    NothingWritten(WriteSkip),
    Dropped { stage: Stage, reason: DropReason },
}

/// What a stage hands back to the driver
#[derive(Debug)]
pub enum Transition {
    Forward(Stage, PostRecord),
    Finished(Completion),
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    async fn process(&self, record: PostRecord) -> Transition;
}

/// The stages of one deployment, wired together
pub struct Pipeline {
    detect: DetectStage,
    vectorize: VectorizeStage,
    persist: PersistStage,
}

impl Pipeline {
    pub fn new(detect: DetectStage, vectorize: VectorizeStage, persist: PersistStage) -> Self {
        Self {
            detect,
            vectorize,
            persist,
        }
    }

    fn stage(&self, stage: Stage) -> &dyn PipelineStage {
        match stage {
            Stage::DetectLanguage => &self.detect,
            Stage::Vectorize => &self.vectorize,
            Stage::Persist => &self.persist,
        }
    }

    /// Runs one record through every stage it qualifies for
    pub async fn run(&self, record: PostRecord) -> Completion {
        let mut stage = Stage::DetectLanguage;
        let mut record = record;

        loop {
            match self.stage(stage).process(record).await {
                Transition::Forward(next, forwarded) => {
                    tracing::trace!("{:?} -> {:?} for {}", stage, next, forwarded.post_url);
                    stage = next;
                    record = forwarded;
                }
                Transition::Finished(completion) => return completion,
            }
        }
    }
}

/// Counts of how records left the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub persisted: u64,
    pub already_persisted: u64,
    pub storage_faults: u64,
    pub dropped_non_target: u64,
    pub dropped_unknown: u64,
    pub vectorization_failed: u64,
}

impl PipelineReport {
    pub fn record(&mut self, completion: &Completion) {
        match completion {
            Completion::Persisted(_) => self.persisted += 1,
            Completion::NothingWritten(WriteSkip::AlreadyPersisted) => self.already_persisted += 1,
            Completion::NothingWritten(WriteSkip::StorageFault) => self.storage_faults += 1,
            Completion::Dropped { reason, .. } => match reason {
                DropReason::NonTargetLanguage => self.dropped_non_target += 1,
                DropReason::UnknownLanguage => self.dropped_unknown += 1,
                DropReason::VectorizationFailed => self.vectorization_failed += 1,
            },
        }
    }

    pub fn merge(&mut self, other: &PipelineReport) {
        self.persisted += other.persisted;
        self.already_persisted += other.already_persisted;
        self.storage_faults += other.storage_faults;
        self.dropped_non_target += other.dropped_non_target;
        self.dropped_unknown += other.dropped_unknown;
        self.vectorization_failed += other.vectorization_failed;
    }

    /// Total records that reached a terminal state
    pub fn processed(&self) -> u64 {
        self.persisted
            + self.already_persisted
            + self.storage_faults
            + self.dropped_non_target
            + self.dropped_unknown
            + self.vectorization_failed
    }
}

/// Hands records to the pipeline without waiting for them
///
/// Cloned into every crawl task. The queue is unbounded, so dispatch never
/// blocks the crawl.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<PostRecord>,
}

impl Dispatcher {
    /// Queues a record; returns false if the workers are gone
    pub fn dispatch(&self, record: PostRecord) -> bool {
        match self.tx.send(record) {
            Ok(()) => true,
            Err(mpsc::error::SendError(record)) => {
                tracing::error!("Pipeline closed, dropping record from {}", record.post_url);
                false
            }
        }
    }
}

/// Workers consuming the dispatch queue
pub struct WorkerPool {
    workers: JoinSet<PipelineReport>,
}

impl WorkerPool {
    /// Spawns `workers` pipeline workers and returns the dispatcher feeding them
    ///
    /// The pool drains once every `Dispatcher` clone has been dropped.
    pub fn spawn(pipeline: Arc<Pipeline>, workers: usize) -> (Dispatcher, WorkerPool) {
        let (tx, rx) = mpsc::unbounded_channel::<PostRecord>();
        let rx = Arc::new(Mutex::new(rx));
        let mut set = JoinSet::new();

        for worker_id in 0..workers.max(1) {
            let pipeline = Arc::clone(&pipeline);
            let rx = Arc::clone(&rx);

            set.spawn(
                async move {
                    let mut report = PipelineReport::default();
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(record) = next else { break };

                        let completion = pipeline.run(record).await;
                        report.record(&completion);
                    }
                    tracing::debug!("Worker finished: {:?}", report);
                    report
                }
                .instrument(tracing::debug_span!("pipeline_worker", worker_id)),
            );
        }

        (Dispatcher { tx }, WorkerPool { workers: set })
    }

    /// Waits for the queue to drain and every worker to stop
    pub async fn join(mut self) -> PipelineReport {
        let mut total = PipelineReport::default();
        while let Some(result) = self.workers.join_next().await {
            match result {
                Ok(report) => total.merge(&report),
                Err(e) => tracing::error!("Pipeline worker failed: {}", e),
            }
        }
        total
    }
}
