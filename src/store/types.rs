//! Shared types used by the collection store.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned while interacting with a collection.
///
/// Every variant names the collection it concerns.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection names must be a single, non-empty path component.
    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),
    /// Similarity search requires at least one neighbour.
    #[error("k must be a positive integer, got {0}")]
    InvalidK(usize),
    /// Filesystem access failed.
    #[error("Collection '{collection}' I/O failure at {path}: {source}")]
    Io {
        /// Collection being accessed.
        collection: String,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Persisted state could not be decoded.
    #[error("Collection '{collection}' is corrupt: {reason}")]
    Corrupt {
        /// Collection being read.
        collection: String,
        /// Decoder diagnostic.
        reason: String,
    },
    /// An upsert carried an identity that is already stored or repeated within the batch.
    #[error("Collection '{collection}' already contains chunk '{id}'")]
    DuplicateId {
        /// Collection being written.
        collection: String,
        /// Offending chunk identity.
        id: String,
    },
    /// A vector's length differs from the collection's recorded dimension.
    #[error("Collection '{collection}' stores {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Collection being accessed.
        collection: String,
        /// Dimension recorded in the manifest.
        expected: usize,
        /// Dimension supplied by the caller.
        actual: usize,
    },
    /// The collection was built with a different embedding model.
    #[error("Collection '{collection}' was built with embedding model '{expected}', not '{actual}'")]
    EmbeddingModelMismatch {
        /// Collection being accessed.
        collection: String,
        /// Model recorded in the manifest.
        expected: String,
        /// Model configured on this store.
        actual: String,
    },
    /// Query embedding failed.
    #[error("Failed to embed query for collection '{collection}': {source}")]
    Embedding {
        /// Collection being searched.
        collection: String,
        /// Embedding failure.
        #[source]
        source: crate::embedding::EmbeddingClientError,
    },
}

impl StoreError {
    /// True for failures caused by caller input rather than storage state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCollectionName(_) | Self::InvalidK(_)
        )
    }
}

/// Provenance stored next to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunk identity, `source:page:ordinal`.
    pub id: String,
    /// Document the chunk was carved from.
    pub source: String,
    /// Zero-based page number.
    pub page: usize,
    /// SHA-256 of the chunk text, hex encoded.
    pub content_hash: String,
    /// RFC 3339 timestamp of the write.
    pub indexed_at: String,
}

/// A chunk ready to be persisted.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// Provenance, including the identity used as key.
    pub metadata: ChunkMetadata,
    /// Embedding produced for `text`.
    pub vector: Vec<f32>,
}

/// A neighbour returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Stored chunk text.
    pub text: String,
    /// Stored provenance.
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query; higher ranks first.
    pub score: f32,
}

/// Size figures for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectionStats {
    /// Number of stored chunks.
    pub chunks: usize,
    /// Number of distinct source documents.
    pub sources: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub(crate) format_version: u32,
    pub(crate) embedding_model: String,
    pub(crate) dimension: usize,
}

/// Line of `ids.jsonl`: identity plus the hash needed for stale-content checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IdEntry {
    pub(crate) id: String,
    pub(crate) content_hash: String,
}

/// Line of `records.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub(crate) text: String,
    pub(crate) metadata: ChunkMetadata,
    pub(crate) vector: Vec<f32>,
}
