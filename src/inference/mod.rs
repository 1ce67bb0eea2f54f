//! Client for the model inference service
//!
//! The embedding and classification models run in a separate service. This
//! module talks to it over JSON/HTTP:
//!
//! - `GET /health` -> `{"status": "SERVING" | "NOT_SERVING"}`
//! - `POST /embed {"text"}` -> `{"vector"}`
//! - `POST /classify {"vector"}` -> `{"label", "confidence"}`

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors from the inference service
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Invalid inference URL: {0}")]
    InvalidUrl(String),

    #[error("Inference request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("Inference service returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Inference service is not serving")]
    NotServing,

    #[error("Inference service returned an empty vector")]
    EmptyVector,

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

/// Health of the inference service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

/// A classifier verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

/// Maps review text to a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Maps a vector to a label with a confidence
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, vector: &[f32]) -> Result<Prediction, InferenceError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct HealthResponse {
    status: ServingStatus,
}

/// HTTP client for the inference service
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base: Url,
}

impl InferenceClient {
    /// Creates a client for the service at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| InferenceError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport {
                endpoint: base.to_string(),
                source: e,
            })?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, name: &str) -> Result<Url, InferenceError> {
        self.base
            .join(name)
            .map_err(|e| InferenceError::InvalidUrl(e.to_string()))
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        endpoint: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<T, InferenceError> {
        let transport = |source| InferenceError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(InferenceError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json::<T>().await.map_err(transport)
    }

    /// Asks the service whether it can take requests
    pub async fn health(&self) -> Result<ServingStatus, InferenceError> {
        let endpoint = self.endpoint("health")?;
        let health: HealthResponse =
            Self::read_json(&endpoint, self.client.get(endpoint.clone())).await?;
        Ok(health.status)
    }

    /// Health check, then embed and classify one text
    pub async fn predict(&self, text: &str) -> Result<Prediction, InferenceError> {
        if self.health().await? != ServingStatus::Serving {
            return Err(InferenceError::NotServing);
        }
        let vector = Embedder::embed(self, text).await?;
        Classifier::classify(self, &vector).await
    }
}

#[async_trait]
impl Embedder for InferenceClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let endpoint = self.endpoint("embed")?;
        let request = self
            .client
            .post(endpoint.clone())
            .json(&EmbedRequest { text });
        let response: EmbedResponse = Self::read_json(&endpoint, request).await?;

        if response.vector.is_empty() {
            return Err(InferenceError::EmptyVector);
        }
        Ok(response.vector)
    }
}

#[async_trait]
impl Classifier for InferenceClient {
    async fn classify(&self, vector: &[f32]) -> Result<Prediction, InferenceError> {
        let endpoint = self.endpoint("classify")?;
        let request = self
            .client
            .post(endpoint.clone())
            .json(&ClassifyRequest { vector });
        Self::read_json(&endpoint, request).await
    }
}
