//! Persistent, file-backed vector collections.

pub mod collection;
pub mod types;

pub use collection::{CollectionHandle, IndexStore, validate_k};
pub use types::{ChunkMetadata, ChunkRecord, CollectionStats, ScoredChunk, StoreError};
