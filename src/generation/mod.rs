//! Language model adapters used to answer questions from assembled prompts.
//!
//! Answering is optional; without `GENERATION_MODEL` the engine still builds prompts and
//! callers bring their own model. The Ollama client mirrors the embedding adapter by issuing
//! HTTP requests directly to the runtime, once, with no retries.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while generating answers.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable or the endpoint is missing.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider did not answer within the configured timeout.
    #[error("Language model request timed out after {0:?}")]
    Timeout(Duration),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by answer-generating models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce a free-text answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the configured language model, if any.
pub fn get_language_model(
    config: &Config,
) -> Result<Option<Arc<dyn LanguageModel>>, GenerationError> {
    let Some(model) = config.generation_model.clone() else {
        return Ok(None);
    };
    let client = OllamaGenerationClient::new(
        config.ollama_url.clone(),
        model,
        config.request_timeout(),
    )?;
    Ok(Some(Arc::new(client)))
}

/// Ollama `/api/generate` client in non-streaming mode.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaGenerationClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("rusty-rag/answer")
            .timeout(timeout)
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::ProviderUnavailable(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(model = %self.model, chars = body.response.len(), "Answer generated");
        Ok(body.response.trim().to_string())
    }
}
