use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DB_ROOT: &str = "./DBs";
const DEFAULT_EMBEDDING_MODEL: &str = "hash-embedding";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_RETRIEVAL_K: usize = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding one sub-directory per collection.
    pub db_root: PathBuf,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider and recorded per collection.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime used for embeddings and answer generation.
    pub ollama_url: String,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between consecutive chunks of the same page.
    pub text_splitter_chunk_overlap: usize,
    /// Default number of neighbours retrieved when building prompts.
    pub retrieval_k: usize,
    /// Optional language model used to answer questions; answering is disabled when absent.
    pub generation_model: Option<String>,
    /// Timeout applied to every outbound provider request.
    pub request_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic, dependency-free byte hashing embedder.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = match load_env_optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::Hash,
        };

        let config = Self {
            db_root: load_env_optional("RAG_DB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_ROOT)),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            text_splitter_chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            text_splitter_chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            retrieval_k: parse_env("RETRIEVAL_K")?.unwrap_or(DEFAULT_RETRIEVAL_K),
            generation_model: load_env_optional("GENERATION_MODEL"),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            server_port: parse_env("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Timeout applied to outbound provider calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }
        if self.retrieval_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_K".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".into()));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        db_root = %config.db_root.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        generation_model = ?config.generation_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
