//! Indexing and retrieval pipeline: chunking, identity, dedup, embedding and prompt assembly.

pub mod chunking;
pub mod identity;
pub mod mappers;
pub mod retrieval;
mod service;
pub mod types;

pub use service::{RagApi, RagService};
pub use types::{
    Answer, ChunkingError, IndexSummary, ProcessingError, RagPrompt, RetrievalError,
    ServiceInitError,
};
