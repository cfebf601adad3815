#![deny(missing_docs)]

//! Core library for Rusty RAG: incremental PDF indexing and retrieval-augmented prompting.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Language models used to answer questions.
pub mod generation;
/// PDF loading into ordered pages.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Indexing and query metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// File-backed vector collections.
pub mod store;
