use crate::model::PostRecord;
use crate::pipeline::{Completion, PipelineStage, Transition, WriteSkip};
use crate::storage::ReviewStore;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Review store shared by all pipeline workers
pub type SharedStore = Arc<Mutex<dyn ReviewStore + Send>>;

/// Writes the record and advances the checkpoint
///
/// Records that already carry an identifier are skipped. Storage faults are
/// logged and reported as "nothing written"; they are not retried.
pub struct PersistStage {
    store: SharedStore,
}

impl PersistStage {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineStage for PersistStage {
    async fn process(&self, record: PostRecord) -> Transition {
        if let Some(id) = record.id {
            tracing::debug!("Record {} already persisted, skipping", id);
            return Transition::Finished(Completion::NothingWritten(WriteSkip::AlreadyPersisted));
        }

        let result = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .persist_review(&record);

        match result {
            Ok(receipt) => {
                tracing::debug!(
                    "Saved review {} from {}, last opinion date now {}",
                    receipt.id,
                    record.post_url,
                    receipt.checkpoint
                );
                Transition::Finished(Completion::Persisted(receipt.id))
            }
            Err(e) => {
                tracing::error!("Failed to save review from {}: {}", record.post_url, e);
                Transition::Finished(Completion::NothingWritten(WriteSkip::StorageFault))
            }
        }
    }
}
