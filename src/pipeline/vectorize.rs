use crate::inference::Embedder;
use crate::model::PostRecord;
use crate::pipeline::{Completion, DropReason, PipelineStage, Stage, Transition};
use async_trait::async_trait;
use std::sync::Arc;

/// Cuts text to at most `max_tokens` whitespace-separated tokens
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    text.split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the review embedding
///
/// Without an embedder (no inference service configured) records pass
/// through with an empty vector. A failed embedding ends the record's run;
/// it is neither retried nor stored.
pub struct VectorizeStage {
    embedder: Option<Arc<dyn Embedder>>,
    max_tokens: usize,
}

impl VectorizeStage {
    pub fn new(embedder: Arc<dyn Embedder>, max_tokens: usize) -> Self {
        Self {
            embedder: Some(embedder),
            max_tokens,
        }
    }

    /// Stage for deployments without a model
    pub fn without_model() -> Self {
        Self {
            embedder: None,
            max_tokens: 0,
        }
    }
}

#[async_trait]
impl PipelineStage for VectorizeStage {
    async fn process(&self, mut record: PostRecord) -> Transition {
        let Some(embedder) = &self.embedder else {
            record.vectors = Some(Vec::new());
            return Transition::Forward(Stage::Persist, record);
        };

        let text = truncate_to_tokens(&record.review, self.max_tokens);
        match embedder.embed(&text).await {
            Ok(vector) => {
                record.vectors = Some(vector);
                Transition::Forward(Stage::Persist, record)
            }
            Err(e) => {
                tracing::error!("Text vectorization error for {}: {}", record.post_url, e);
                Transition::Finished(Completion::Dropped {
                    stage: Stage::Vectorize,
                    reason: DropReason::VectorizationFailed,
                })
            }
        }
    }
}
