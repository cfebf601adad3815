//! RAG service coordinating loading, chunking, embedding, storage and retrieval.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    generation::{LanguageModel, get_language_model},
    loader::{DocumentLoader, LoadError, Page, PdfLoader},
    metrics::{IngestMetrics, MetricsSnapshot},
    processing::{
        chunking::{ChunkSettings, split_pages},
        identity::assign_ids,
        mappers::{build_records, current_timestamp_rfc3339, partition_new},
        retrieval::{self, DEFAULT_K},
        types::{
            Answer, IndexSummary, ProcessingError, RagPrompt, RetrievalError, ServiceInitError,
        },
    },
    store::{CollectionStats, IndexStore, StoreError},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Coordinates the indexing pipeline and retrieval over a directory of collections.
///
/// Runs against the same collection are serialized by an in-process lock; different
/// collections proceed independently. Construct the service once near process start and share
/// it through an `Arc`.
pub struct RagService {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingClient>,
    store: IndexStore,
    language_model: Option<Arc<dyn LanguageModel>>,
    chunk_settings: ChunkSettings,
    default_k: usize,
    metrics: Arc<IngestMetrics>,
    locks: CollectionLocks,
}

/// Abstraction over the service used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Index every page reachable from `source` into `collection`.
    async fn index(&self, source: &Path, collection: &str)
    -> Result<IndexSummary, ProcessingError>;

    /// Retrieve context for `query_text` and render the question-answering prompt.
    async fn build_prompt(
        &self,
        collection: &str,
        query_text: &str,
        k: Option<usize>,
    ) -> Result<RagPrompt, RetrievalError>;

    /// Answer `question` with the configured language model.
    async fn answer(
        &self,
        collection: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<Answer, RetrievalError>;

    /// Enumerate collections under the store root.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Remove a collection; returns whether it existed.
    async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RagService {
    /// Build a service from explicit parts.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingClient>,
        db_root: impl Into<PathBuf>,
        chunk_settings: ChunkSettings,
    ) -> Self {
        let store = IndexStore::new(db_root, embedder.clone());
        Self {
            loader,
            embedder,
            store,
            language_model: None,
            chunk_settings,
            default_k: DEFAULT_K,
            metrics: Arc::new(IngestMetrics::new()),
            locks: CollectionLocks::default(),
        }
    }

    /// Attach a language model used by [`RagService::answer`].
    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Override the neighbour count used when callers do not pass one.
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    /// Build the service described by `config`, with the PDF loader.
    pub fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let chunk_settings = ChunkSettings {
            max_size: config.text_splitter_chunk_size,
            overlap: config.text_splitter_chunk_overlap,
        };
        chunk_settings.validate()?;

        tracing::info!(provider = ?config.embedding_provider, model = %config.embedding_model, "Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let mut service = Self::new(
            Arc::new(PdfLoader::new()),
            embedder,
            config.db_root.clone(),
            chunk_settings,
        )
        .with_default_k(config.retrieval_k);

        if let Some(model) = get_language_model(config)? {
            tracing::info!("Answer generation enabled");
            service = service.with_language_model(model);
        }
        Ok(service)
    }

    /// Storage adapter shared by this service.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Index every page reachable from `source` into `collection`.
    ///
    /// Chunks whose identity is already stored are skipped, so re-running over unchanged
    /// input adds nothing. New chunks are embedded and written in a single upsert; any stage
    /// failure aborts the run before that write.
    pub async fn index(
        &self,
        source: &Path,
        collection: &str,
    ) -> Result<IndexSummary, ProcessingError> {
        let _guard = self.locks.acquire(collection).await;
        tracing::info!(collection, source = %source.display(), "Indexing documents");

        let pages = self.load_pages(source).await?;
        let chunks = split_pages(&pages, self.chunk_settings)?;
        let identified = assign_ids(chunks);
        let chunks_total = identified.len();

        let handle = self.store.open(collection).await?;
        let existing = self.store.existing_hashes(&handle).await?;
        tracing::info!(
            collection,
            existing = existing.len(),
            "Number of existing items in collection"
        );

        let partition = partition_new(identified, &existing);
        if partition.stale > 0 {
            tracing::warn!(
                collection,
                stale = partition.stale,
                "Stored chunks differ from current source text; delete the collection to refresh"
            );
        }

        let added_count = if partition.fresh.is_empty() {
            tracing::info!(collection, "No new chunks to add");
            0
        } else {
            let texts: Vec<String> = partition
                .fresh
                .iter()
                .map(|chunk| chunk.text.clone())
                .collect();
            let expected = texts.len();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != expected {
                return Err(EmbeddingClientError::InvalidResponse(format!(
                    "expected {expected} embeddings, received {}",
                    vectors.len()
                ))
                .into());
            }
            let records = build_records(partition.fresh, vectors, &current_timestamp_rfc3339());
            self.store.upsert(&handle, records).await?
        };

        let summary = IndexSummary {
            added_count,
            pages_loaded: pages.len(),
            chunks_total,
            skipped_existing: partition.skipped,
            stale_count: partition.stale,
            existing_before: existing.len(),
        };
        self.metrics
            .record_index(added_count as u64, partition.skipped as u64);
        tracing::info!(
            collection,
            added = summary.added_count,
            pages = summary.pages_loaded,
            chunks = summary.chunks_total,
            skipped = summary.skipped_existing,
            "Documents indexed"
        );
        Ok(summary)
    }

    /// Retrieve context for `query_text` and render the question-answering prompt.
    pub async fn build_prompt(
        &self,
        collection: &str,
        query_text: &str,
        k: Option<usize>,
    ) -> Result<RagPrompt, RetrievalError> {
        let k = k.unwrap_or(self.default_k);
        let prompt = retrieval::build_prompt(&self.store, collection, query_text, k).await?;
        self.metrics.record_query();
        Ok(prompt)
    }

    /// Answer `question` from the top `k` chunks of `collection`.
    ///
    /// Sources are the identities of the retrieved chunks, best first.
    pub async fn answer(
        &self,
        collection: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<Answer, RetrievalError> {
        let model = self
            .language_model
            .as_ref()
            .ok_or(RetrievalError::GenerationDisabled)?;
        let RagPrompt { prompt, results } = self.build_prompt(collection, question, k).await?;
        let answer = model.generate(&prompt).await?;
        let sources = results
            .into_iter()
            .map(|hit| hit.metadata.id)
            .collect();
        Ok(Answer { answer, sources })
    }

    /// Chunk and source counts for `collection`.
    pub async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, StoreError> {
        let handle = self.store.open(collection).await?;
        self.store.stats(&handle).await
    }

    /// Enumerate collections under the store root.
    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_collections().await
    }

    /// Remove a collection and everything stored in it.
    pub async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let _guard = self.locks.acquire(collection).await;
        self.store.delete(collection).await
    }

    /// Retrieve the current metrics snapshot for diagnostics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn load_pages(&self, source: &Path) -> Result<Vec<Page>, LoadError> {
        let loader = self.loader.clone();
        let path = source.to_path_buf();
        let task = tokio::task::spawn_blocking(move || loader.load(&path));
        let pages = task.await.map_err(|error| LoadError::Unparseable {
            path: source.to_path_buf(),
            reason: format!("extraction aborted: {error}"),
        })??;
        tracing::debug!(source = %source.display(), pages = pages.len(), "Pages loaded");
        Ok(pages)
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn index(
        &self,
        source: &Path,
        collection: &str,
    ) -> Result<IndexSummary, ProcessingError> {
        RagService::index(self, source, collection).await
    }

    async fn build_prompt(
        &self,
        collection: &str,
        query_text: &str,
        k: Option<usize>,
    ) -> Result<RagPrompt, RetrievalError> {
        RagService::build_prompt(self, collection, query_text, k).await
    }

    async fn answer(
        &self,
        collection: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<Answer, RetrievalError> {
        RagService::answer(self, collection, question, k).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        RagService::list_collections(self).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, StoreError> {
        RagService::delete_collection(self, collection).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }
}

/// Per-collection advisory locks for writers within this process.
///
/// An entry lives only while some caller holds or awaits it.
#[derive(Default)]
struct CollectionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
    async fn acquire(&self, collection: &str) -> CollectionGuard<'_> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(collection.to_string()).or_default().clone()
        };
        let mut guard = CollectionGuard {
            locks: self,
            collection: collection.to_string(),
            lock: Some(lock.clone()),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    fn release(&self, collection: &str) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(collection)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(collection);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held collection lock; prunes the map entry on drop when no one else wants it.
struct CollectionGuard<'a> {
    locks: &'a CollectionLocks,
    collection: String,
    lock: Option<Arc<AsyncMutex<()>>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for CollectionGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        self.lock.take();
        self.locks.release(&self.collection);
    }
}
