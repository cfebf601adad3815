use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider did not answer within the configured timeout.
    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
    /// Provider answered with vectors of an unexpected length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the client was configured with.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
///
/// The same client must be used at index time and at query time; collections record the
/// [`model_name`](EmbeddingClient::model_name) they were built with.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;
}

/// Deterministic embedding client that hashes bytes into a normalized vector.
///
/// Useful offline and in tests; similarity reflects shared byte content, not meaning.
pub struct HashEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a deterministic embedding client producing `dimension`-length vectors.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model,
            dimension = self.dimension,
            texts = texts.len(),
            "Generating hash embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedding client backed by the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Build a client for `model` served at `base_url`; every request honours `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("rusty-rag/embed")
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let expected_count = texts.len();
        tracing::debug!(model = %self.model, texts = expected_count, "Requesting Ollama embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    EmbeddingClientError::Timeout(self.timeout)
                } else {
                    EmbeddingClientError::GenerationFailed(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected_count {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected_count} embeddings, got {}",
                body.embeddings.len()
            )));
        }
        if let Some(vector) = body
            .embeddings
            .iter()
            .find(|vector| vector.len() != self.dimension)
        {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(body.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbeddingClient::new(
            config.embedding_model.clone(),
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.request_timeout(),
        )?)),
    }
}
