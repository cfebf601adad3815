//! Deterministic chunk identities of the form `source:page:ordinal`.

use super::chunking::PageChunk;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a chunk within a collection; the sole dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Compose an identity from its provenance.
    pub fn new(source: &str, page: usize, ordinal: usize) -> Self {
        Self(format!("{}:{ordinal}", page_key(source, page)))
    }

    /// Borrow the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.0
    }
}

/// A chunk tagged with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedChunk {
    /// Identity derived from source, page and ordinal.
    pub id: ChunkId,
    /// Position of the chunk among adjacent chunks of the same page.
    pub ordinal: usize,
    /// Document the chunk came from.
    pub source: String,
    /// Zero-based page number.
    pub page: usize,
    /// Chunk text.
    pub text: String,
}

fn page_key(source: &str, page: usize) -> String {
    format!("{source}:{page}")
}

/// Tag each chunk with its identity in a single left-to-right pass.
///
/// The ordinal increments while consecutive chunks share a `source:page` key and resets to
/// zero whenever the key changes. Only adjacency matters: a page seen again after another
/// page restarts at zero, so callers must supply chunks in source, page, position order.
pub fn assign_ids(chunks: Vec<PageChunk>) -> Vec<IdentifiedChunk> {
    let mut last_page: Option<String> = None;
    let mut ordinal = 0_usize;

    chunks
        .into_iter()
        .map(|chunk| {
            let key = page_key(&chunk.source, chunk.page);
            if last_page.as_deref() == Some(key.as_str()) {
                ordinal += 1;
            } else {
                ordinal = 0;
            }
            let id = ChunkId::new(&chunk.source, chunk.page, ordinal);
            last_page = Some(key);
            IdentifiedChunk {
                id,
                ordinal,
                source: chunk.source,
                page: chunk.page,
                text: chunk.text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, page: usize, text: &str) -> PageChunk {
        PageChunk {
            source: source.to_string(),
            page,
            text: text.to_string(),
        }
    }

    #[test]
    fn ordinals_reset_on_adjacency_only() {
        let chunks = vec![
            chunk("A", 0, "a"),
            chunk("A", 0, "b"),
            chunk("B", 1, "c"),
            chunk("B", 1, "d"),
            chunk("A", 0, "e"),
        ];
        let identified = assign_ids(chunks);
        let ordinals: Vec<usize> = identified.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 0, 1, 0]);
        let ids: Vec<&str> = identified.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A:0:0", "A:0:1", "B:1:0", "B:1:1", "A:0:0"]);
    }

    #[test]
    fn identities_are_deterministic() {
        let build = || {
            vec![
                chunk("docs/report.pdf", 3, "x"),
                chunk("docs/report.pdf", 3, "y"),
                chunk("docs/report.pdf", 4, "z"),
            ]
        };
        assert_eq!(assign_ids(build()), assign_ids(build()));
    }

    #[test]
    fn assigned_ids_match_the_constructor() {
        let identified = assign_ids(vec![chunk("a.pdf", 3, "x"), chunk("a.pdf", 3, "y")]);
        for item in &identified {
            assert_eq!(item.id, ChunkId::new(&item.source, item.page, item.ordinal));
        }
    }

    #[test]
    fn page_change_within_source_resets() {
        let identified = assign_ids(vec![chunk("a", 0, "x"), chunk("a", 1, "y")]);
        assert_eq!(identified[1].id, ChunkId::new("a", 1, 0));
    }

    #[test]
    fn sources_containing_colons_keep_their_text() {
        let identified = assign_ids(vec![chunk("C:/docs/a.pdf", 2, "x")]);
        assert_eq!(identified[0].id.to_string(), "C:/docs/a.pdf:2:0");
        assert_eq!(identified[0].text, "x");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(assign_ids(Vec::new()).is_empty());
    }
}
