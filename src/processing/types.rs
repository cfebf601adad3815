//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError,
    generation::GenerationError,
    loader::LoadError,
    store::{ScoredChunk, StoreError},
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning pages into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every chunk.
    #[error("chunk overlap {overlap} must be smaller than chunk size {max_size}")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested maximum size.
        max_size: usize,
    },
}

/// Errors emitted by the indexing pipeline. Every stage failure aborts the run.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Documents could not be loaded.
    #[error("Failed to load documents: {0}")]
    Load(#[from] LoadError),
    /// Chunking step failed to segment the pages.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The collection could not be opened, read or written.
    #[error("Collection store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors emitted while retrieving context or answering questions.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The collection could not be opened or searched.
    #[error("Collection store failed: {0}")]
    Store(#[from] StoreError),
    /// The language model failed to answer.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationError),
    /// No language model is configured.
    #[error("Answer generation is disabled; set GENERATION_MODEL to enable it")]
    GenerationDisabled,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    /// Chunks newly written to the collection.
    pub added_count: usize,
    /// Pages returned by the loader.
    pub pages_loaded: usize,
    /// Chunks produced from those pages.
    pub chunks_total: usize,
    /// Chunks skipped because their identity was already stored.
    pub skipped_existing: usize,
    /// Skipped chunks whose stored content differs from the current text.
    pub stale_count: usize,
    /// Identities stored before the run.
    pub existing_before: usize,
}

/// Prompt assembled from retrieved context, with the ranked neighbours it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct RagPrompt {
    /// Rendered prompt ready for a language model.
    pub prompt: String,
    /// Retrieved chunks, best first.
    pub results: Vec<ScoredChunk>,
}

/// Model answer together with the identities of the chunks that grounded it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Free-text model response.
    pub answer: String,
    /// Chunk identities in rank order.
    pub sources: Vec<String>,
}

impl Answer {
    /// Render the answer followed by its source list.
    pub fn with_sources(&self) -> String {
        format!("{}\n\nSources: {:?}", self.answer, self.sources)
    }
}

/// Errors raised while wiring a [`RagService`](super::RagService) from configuration.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Embedding client could not be built.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Language model client could not be built.
    #[error("Failed to initialize language model: {0}")]
    Generation(#[from] GenerationError),
    /// Configured chunk bounds are unusable.
    #[error("Invalid chunk settings: {0}")]
    Chunking(#[from] ChunkingError),
}
