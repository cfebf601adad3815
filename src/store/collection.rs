//! On-disk collection store.
//!
//! Each collection is a directory under the store root:
//!
//! - `manifest.json`: format version, embedding model and vector dimension.
//! - `records.jsonl`: one line per chunk with text, metadata and vector.
//! - `ids.jsonl`: one line per committed chunk identity and its content hash.
//!
//! A chunk is committed once its identity line is flushed. Upserts flush records first and
//! identities second, so a crash between the two leaves orphan records that readers ignore.

use crate::embedding::EmbeddingClient;
use crate::store::types::{
    ChunkRecord, CollectionStats, IdEntry, Manifest, ScoredChunk, StoreError, StoredRecord,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.jsonl";
const IDS_FILE: &str = "ids.jsonl";

/// Adapter owning every collection under one root directory.
///
/// The store embeds queries itself, so it is bound to the embedding client whose vectors it
/// holds.
#[derive(Clone)]
pub struct IndexStore {
    root: PathBuf,
    embedder: Arc<dyn EmbeddingClient>,
}

/// Open collection, returned by [`IndexStore::open`].
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    name: String,
    dir: PathBuf,
    dimension: usize,
}

impl CollectionHandle {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the collection's files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl IndexStore {
    /// Create a store rooted at `root`; the directory is created lazily on first open.
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            root: root.into(),
            embedder,
        }
    }

    /// Root directory holding all collections.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open `name`, creating its directory and manifest when absent.
    pub async fn open(&self, name: &str) -> Result<CollectionHandle, StoreError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_error(name, &dir, source))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = match fs::read(&manifest_path).await {
            Ok(bytes) => {
                let manifest: Manifest =
                    serde_json::from_slice(&bytes).map_err(|error| StoreError::Corrupt {
                        collection: name.to_string(),
                        reason: format!("manifest: {error}"),
                    })?;
                if manifest.format_version != FORMAT_VERSION {
                    return Err(StoreError::Corrupt {
                        collection: name.to_string(),
                        reason: format!(
                            "unsupported format version {}",
                            manifest.format_version
                        ),
                    });
                }
                manifest
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                let manifest = Manifest {
                    format_version: FORMAT_VERSION,
                    embedding_model: self.embedder.model_name().to_string(),
                    dimension: self.embedder.dimension(),
                };
                write_manifest(name, &manifest_path, &manifest).await?;
                tracing::info!(collection = name, path = %dir.display(), "Collection created");
                manifest
            }
            Err(error) => return Err(io_error(name, &manifest_path, error)),
        };

        if manifest.embedding_model != self.embedder.model_name() {
            return Err(StoreError::EmbeddingModelMismatch {
                collection: name.to_string(),
                expected: manifest.embedding_model,
                actual: self.embedder.model_name().to_string(),
            });
        }

        Ok(CollectionHandle {
            name: name.to_string(),
            dir,
            dimension: manifest.dimension,
        })
    }

    /// Every committed chunk identity. Reads only the identity log, never chunk contents.
    pub async fn existing_ids(
        &self,
        handle: &CollectionHandle,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(read_id_entries(handle)
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Content hash of every committed chunk, keyed by identity.
    pub async fn existing_hashes(
        &self,
        handle: &CollectionHandle,
    ) -> Result<HashMap<String, String>, StoreError> {
        Ok(read_id_entries(handle)
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry.content_hash))
            .collect())
    }

    /// Durably persist `records`, keyed by their identity.
    ///
    /// Identities already present in the collection, or repeated within the batch, are
    /// rejected with [`StoreError::DuplicateId`] before anything is written. Both files are
    /// synced before the call returns.
    pub async fn upsert(
        &self,
        handle: &CollectionHandle,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut seen = self.existing_ids(handle).await?;
        for record in &records {
            if record.vector.len() != handle.dimension {
                return Err(StoreError::DimensionMismatch {
                    collection: handle.name.clone(),
                    expected: handle.dimension,
                    actual: record.vector.len(),
                });
            }
            if !seen.insert(record.metadata.id.clone()) {
                return Err(StoreError::DuplicateId {
                    collection: handle.name.clone(),
                    id: record.metadata.id.clone(),
                });
            }
        }

        let mut record_lines = Vec::with_capacity(records.len());
        let mut id_lines = Vec::with_capacity(records.len());
        for record in records {
            id_lines.push(encode_line(
                handle,
                &IdEntry {
                    id: record.metadata.id.clone(),
                    content_hash: record.metadata.content_hash.clone(),
                },
            )?);
            record_lines.push(encode_line(
                handle,
                &StoredRecord {
                    text: record.text,
                    metadata: record.metadata,
                    vector: record.vector,
                },
            )?);
        }

        let count = record_lines.len();
        append_lines(handle, &handle.file(RECORDS_FILE), &record_lines).await?;
        append_lines(handle, &handle.file(IDS_FILE), &id_lines).await?;
        tracing::debug!(collection = %handle.name, chunks = count, "Chunks persisted");
        Ok(count)
    }

    /// Up to `k` committed chunks nearest to `query_text`, best first.
    ///
    /// Scores are cosine similarities; equal scores keep insertion order.
    pub async fn similarity_search(
        &self,
        handle: &CollectionHandle,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        validate_k(k)?;

        let committed = self.existing_ids(handle).await?;
        if committed.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query_text.to_string()])
            .await
            .map_err(|source| StoreError::Embedding {
                collection: handle.name.clone(),
                source,
            })?;
        let query = vectors.pop().ok_or_else(|| StoreError::Embedding {
            collection: handle.name.clone(),
            source: crate::embedding::EmbeddingClientError::InvalidResponse(
                "no vector returned for query".into(),
            ),
        })?;
        if query.len() != handle.dimension {
            return Err(StoreError::DimensionMismatch {
                collection: handle.name.clone(),
                expected: handle.dimension,
                actual: query.len(),
            });
        }

        let records = read_committed_records(handle, &committed).await?;
        let mut scored: Vec<ScoredChunk> = records
            .into_iter()
            .map(|record| ScoredChunk {
                score: cosine_similarity(&query, &record.vector),
                text: record.text,
                metadata: record.metadata,
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Chunk and source counts, derived from the identity log.
    pub async fn stats(&self, handle: &CollectionHandle) -> Result<CollectionStats, StoreError> {
        let ids = self.existing_ids(handle).await?;
        let sources: HashSet<&str> = ids
            .iter()
            .filter_map(|id| id.rsplitn(3, ':').nth(2))
            .collect();
        Ok(CollectionStats {
            chunks: ids.len(),
            sources: sources.len(),
        })
    }

    /// Irreversibly remove all state for `name`. Returns whether anything was removed.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(collection = name, "Collection deleted");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::debug!(collection = name, "Delete requested for absent collection");
                Ok(false)
            }
            Err(error) => Err(io_error(name, &dir, error)),
        }
    }

    /// Names of all collections under the root, sorted. Directories without a manifest are
    /// not collections.
    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(io_error("*", &self.root, error)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| io_error("*", &self.root, error))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            let has_manifest = is_dir
                && fs::try_exists(entry.path().join(MANIFEST_FILE))
                    .await
                    .unwrap_or(false);
            if let (true, Some(name)) = (has_manifest, entry.file_name().to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reject non-positive neighbour counts before touching storage.
pub fn validate_k(k: usize) -> Result<(), StoreError> {
    if k == 0 {
        return Err(StoreError::InvalidK(k));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let trimmed = name.trim();
    let valid = !trimmed.is_empty()
        && trimmed == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

fn io_error(collection: &str, path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        collection: collection.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

fn encode_line<T: Serialize>(handle: &CollectionHandle, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|error| StoreError::Corrupt {
        collection: handle.name.clone(),
        reason: format!("failed to encode entry: {error}"),
    })
}

async fn write_manifest(
    collection: &str,
    path: &Path,
    manifest: &Manifest,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|error| StoreError::Corrupt {
        collection: collection.to_string(),
        reason: format!("failed to encode manifest: {error}"),
    })?;
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp)
        .await
        .map_err(|error| io_error(collection, &tmp, error))?;
    file.write_all(&bytes)
        .await
        .map_err(|error| io_error(collection, &tmp, error))?;
    file.sync_all()
        .await
        .map_err(|error| io_error(collection, &tmp, error))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|error| io_error(collection, path, error))
}

/// Append newline-terminated lines and sync. A torn final line left by an earlier crash is
/// terminated first so it cannot swallow the new data.
async fn append_lines(
    handle: &CollectionHandle,
    path: &Path,
    lines: &[String],
) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|error| io_error(&handle.name, path, error))?;

    let mut buffer = String::new();
    let len = file
        .metadata()
        .await
        .map_err(|error| io_error(&handle.name, path, error))?
        .len();
    if len > 0 {
        let mut last = [0_u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .await
            .map_err(|error| io_error(&handle.name, path, error))?;
        file.read_exact(&mut last)
            .await
            .map_err(|error| io_error(&handle.name, path, error))?;
        if last[0] != b'\n' {
            tracing::warn!(collection = %handle.name, path = %path.display(), "Terminating torn line");
            buffer.push('\n');
        }
    }

    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())
        .await
        .map_err(|error| io_error(&handle.name, path, error))?;
    file.sync_all()
        .await
        .map_err(|error| io_error(&handle.name, path, error))
}

async fn read_lines(handle: &CollectionHandle, path: &Path) -> Result<Vec<String>, StoreError> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(io_error(&handle.name, path, error)),
    };
    let mut lines = BufReader::new(file).lines();
    let mut collected = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|error| io_error(&handle.name, path, error))?
    {
        if !line.trim().is_empty() {
            collected.push(line);
        }
    }
    Ok(collected)
}

async fn read_id_entries(handle: &CollectionHandle) -> Result<Vec<IdEntry>, StoreError> {
    let path = handle.file(IDS_FILE);
    let mut entries = Vec::new();
    for line in read_lines(handle, &path).await? {
        match serde_json::from_str::<IdEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                tracing::warn!(collection = %handle.name, error = %error, "Skipping torn identity line");
            }
        }
    }
    Ok(entries)
}

/// Committed records in insertion order.
///
/// An identity can appear more than once only when an orphaned write preceded the committed
/// one, so the last occurrence wins.
async fn read_committed_records(
    handle: &CollectionHandle,
    committed: &HashSet<String>,
) -> Result<Vec<StoredRecord>, StoreError> {
    let path = handle.file(RECORDS_FILE);
    let mut candidates = Vec::new();
    for line in read_lines(handle, &path).await? {
        match serde_json::from_str::<StoredRecord>(&line) {
            Ok(record) if committed.contains(&record.metadata.id) => candidates.push(record),
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(collection = %handle.name, error = %error, "Skipping torn record line");
            }
        }
    }

    let mut seen = HashSet::new();
    let mut records: Vec<StoredRecord> = candidates
        .into_iter()
        .rev()
        .filter(|record| seen.insert(record.metadata.id.clone()))
        .collect();
    records.reverse();
    Ok(records)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
