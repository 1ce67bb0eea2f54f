use crate::model::{PostRecord, UNKNOWN_LANGUAGE};
use crate::output::HarvestMetrics;
use crate::pipeline::{Completion, DropReason, PersistPolicy, PipelineStage, Stage, Transition};
use async_trait::async_trait;
use lingua::{Language, LanguageDetectorBuilder};
use std::sync::Arc;
use std::time::Instant;

/// Identifies the language of a text
///
/// Returns a lowercase ISO 639-1 code, or `None` when the text gives no
/// reliable answer.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Statistical language detector over every language lingua knows
pub struct LinguaDetector {
    inner: lingua::LanguageDetector,
}

impl LinguaDetector {
    pub fn new() -> Self {
        Self {
            inner: LanguageDetectorBuilder::from_all_languages().build(),
        }
    }

    /// Restricts detection to a known set of candidate languages
    pub fn with_languages(languages: &[Language]) -> Self {
        Self {
            inner: LanguageDetectorBuilder::from_languages(languages).build(),
        }
    }
}

impl Default for LinguaDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for LinguaDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let language = self.inner.detect_language_of(text)?;
        Some(language.iso_code_639_1().to_string())
    }
}

/// Sets `language` and decides where the record goes next
///
/// Target-language records go on to vectorization. Everything else, failed
/// detections included, is dropped or stored without a vector depending on
/// the persist policy.
pub struct DetectStage {
    detector: Arc<dyn LanguageDetector>,
    target_language: String,
    policy: PersistPolicy,
    metrics: Arc<HarvestMetrics>,
}

impl DetectStage {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        target_language: &str,
        policy: PersistPolicy,
        metrics: Arc<HarvestMetrics>,
    ) -> Self {
        Self {
            detector,
            target_language: target_language.to_lowercase(),
            policy,
            metrics,
        }
    }

    async fn identify(&self, text: &str) -> Option<String> {
        let detector = Arc::clone(&self.detector);
        let text = text.to_string();

        match tokio::task::spawn_blocking(move || detector.detect(&text)).await {
            Ok(language) => language,
            Err(e) => {
                tracing::error!("Language detection error: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl PipelineStage for DetectStage {
    async fn process(&self, mut record: PostRecord) -> Transition {
        let started = Instant::now();
        let detected = self.identify(&record.review).await;

        let language = match detected {
            Some(language) => language,
            None => {
                tracing::error!("Language detection failed for {}", record.post_url);
                UNKNOWN_LANGUAGE.to_string()
            }
        };
        self.metrics.record_language(&language, started.elapsed());

        let is_target = language == self.target_language;
        let reason = if language == UNKNOWN_LANGUAGE {
            DropReason::UnknownLanguage
        } else {
            DropReason::NonTargetLanguage
        };
        record.language = Some(language);

        if is_target {
            return Transition::Forward(Stage::Vectorize, record);
        }

        match self.policy {
            PersistPolicy::TargetLanguageOnly => {
                tracing::debug!(
                    "Not storing {:?} record from {}",
                    record.language,
                    record.post_url
                );
                Transition::Finished(Completion::Dropped {
                    stage: Stage::DetectLanguage,
                    reason,
                })
            }
            PersistPolicy::AllLanguages => {
                record.vectors = Some(Vec::new());
                Transition::Forward(Stage::Persist, record)
            }
        }
    }
}
