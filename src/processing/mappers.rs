//! Dedup gate and record preparation between identity assignment and the store.

use crate::processing::identity::IdentifiedChunk;
use crate::store::{ChunkMetadata, ChunkRecord};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Chunks split by the dedup gate.
#[derive(Debug, Default)]
pub struct Partition {
    /// Chunks whose identity is not stored yet, in input order.
    pub fresh: Vec<IdentifiedChunk>,
    /// Chunks skipped because their identity is already stored.
    pub skipped: usize,
    /// Skipped chunks whose stored content hash differs from the current text.
    pub stale: usize,
}

/// Keep only chunks whose identity is absent from `existing` (identity to content hash).
///
/// Content never re-admits a chunk: a changed text under a known identity is counted as
/// stale and still skipped.
pub fn partition_new(chunks: Vec<IdentifiedChunk>, existing: &HashMap<String, String>) -> Partition {
    let mut partition = Partition::default();
    for chunk in chunks {
        match existing.get(chunk.id.as_str()) {
            None => partition.fresh.push(chunk),
            Some(stored_hash) => {
                partition.skipped += 1;
                if *stored_hash != compute_content_hash(&chunk.text) {
                    tracing::debug!(id = %chunk.id, "Stored chunk content differs from source");
                    partition.stale += 1;
                }
            }
        }
    }
    partition
}

/// Pair chunks with their vectors into store records stamped with `indexed_at`.
pub fn build_records(
    chunks: Vec<IdentifiedChunk>,
    vectors: Vec<Vec<f32>>,
    indexed_at: &str,
) -> Vec<ChunkRecord> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| ChunkRecord {
            metadata: ChunkMetadata {
                content_hash: compute_content_hash(&chunk.text),
                id: chunk.id.into(),
                source: chunk.source,
                page: chunk.page,
                indexed_at: indexed_at.to_string(),
            },
            text: chunk.text,
            vector,
        })
        .collect()
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for record metadata.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::chunking::PageChunk;
    use crate::processing::identity::assign_ids;

    fn identified(texts: &[&str]) -> Vec<IdentifiedChunk> {
        assign_ids(
            texts
                .iter()
                .map(|text| PageChunk {
                    source: "a.pdf".into(),
                    page: 0,
                    text: text.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn partition_keeps_unknown_identities_in_order() {
        let mut existing = HashMap::new();
        existing.insert("a.pdf:0:1".to_string(), compute_content_hash("beta"));

        let partition = partition_new(identified(&["alpha", "beta", "gamma"]), &existing);
        let fresh: Vec<&str> = partition.fresh.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fresh, vec!["a.pdf:0:0", "a.pdf:0:2"]);
        assert_eq!(partition.skipped, 1);
        assert_eq!(partition.stale, 0);
    }

    #[test]
    fn changed_content_under_known_identity_is_stale_not_fresh() {
        let mut existing = HashMap::new();
        existing.insert("a.pdf:0:0".to_string(), compute_content_hash("old text"));

        let partition = partition_new(identified(&["new text"]), &existing);
        assert!(partition.fresh.is_empty());
        assert_eq!(partition.skipped, 1);
        assert_eq!(partition.stale, 1);
    }

    #[test]
    fn records_carry_identity_and_hash() {
        let records = build_records(
            identified(&["alpha"]),
            vec![vec![0.5, 0.5]],
            "2025-01-01T00:00:00Z",
        );
        assert_eq!(records.len(), 1);
        let metadata = &records[0].metadata;
        assert_eq!(metadata.id, "a.pdf:0:0");
        assert_eq!(metadata.source, "a.pdf");
        assert_eq!(metadata.content_hash, compute_content_hash("alpha"));
        assert_eq!(records[0].vector, vec![0.5, 0.5]);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(compute_content_hash("Hello"), compute_content_hash("Hello"));
        assert_ne!(compute_content_hash("Hello"), compute_content_hash("hello"));
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
