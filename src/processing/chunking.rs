//! Page splitting into bounded, overlapping chunks.
//!
//! Lengths are measured in characters. Each page is split independently with `semchunk-rs`,
//! which prefers paragraph, line, sentence and word boundaries before falling back to hard
//! cuts. The splitter runs with a budget of `max_size - overlap`; each piece is then widened
//! backwards over the page text by up to `overlap` characters, so every chunk is a contiguous
//! span of its page within `max_size`.
//!
//! Output order is page input order, then position within the page. Chunk identities depend
//! on that order.

use crate::loader::Page;
use semchunk_rs::Chunker;
use std::ops::Range;
use std::sync::Arc;

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Bounds applied by [`split_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    /// Maximum characters per chunk.
    pub max_size: usize,
    /// Characters shared with the previous chunk of the same page.
    pub overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkSettings {
    /// Validate the bounds: a positive size and an overlap strictly below it.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.overlap >= self.max_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap: self.overlap,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}

/// A chunk carved from one page, before identity assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// Document the chunk came from.
    pub source: String,
    /// Zero-based page number.
    pub page: usize,
    /// Chunk text, never empty.
    pub text: String,
}

/// Split `pages` into chunks in document, page, then position order.
///
/// Pages without text contribute nothing.
pub fn split_pages(
    pages: &[Page],
    settings: ChunkSettings,
) -> Result<Vec<PageChunk>, ChunkingError> {
    settings.validate()?;
    let counter = char_counter();

    let mut chunks = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        let pieces = chunk_text_with_counter(
            &page.text,
            settings.max_size,
            settings.overlap,
            counter.clone(),
        );
        chunks.extend(
            pieces
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .map(|text| PageChunk {
                    source: page.source.clone(),
                    page: page.page,
                    text,
                }),
        );
    }

    tracing::debug!(
        pages = pages.len(),
        chunks = chunks.len(),
        max_size = settings.max_size,
        overlap = settings.overlap,
        "Pages split"
    );
    Ok(chunks)
}

fn char_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn chunk_text_with_counter(
    text: &str,
    max_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let base_size = max_size.saturating_sub(overlap).max(1);
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    match locate_spans(text, &base_chunks) {
        Some(spans) => apply_overlap(text, &spans, max_size, overlap, &counter),
        None => {
            tracing::debug!(
                pieces = base_chunks.len(),
                "Chunk text not found in page; skipping overlap"
            );
            base_chunks
        }
    }
}

/// Byte range of every piece within `text`, searched left to right.
fn locate_spans(text: &str, pieces: &[String]) -> Option<Vec<Range<usize>>> {
    let mut cursor = 0;
    pieces
        .iter()
        .map(|piece| {
            let start = cursor + text[cursor..].find(piece.as_str())?;
            let end = start + piece.len();
            cursor = end;
            Some(start..end)
        })
        .collect()
}

/// Extend every span after the first backwards by up to `overlap` characters, never past the
/// start of its predecessor, and slice the result from `text`.
///
/// Each chunk is a contiguous span of the page; separators the splitter dropped between pieces
/// are kept as they appear in the page.
fn apply_overlap(
    text: &str,
    spans: &[Range<usize>],
    max_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(max_size.saturating_sub(1));
    let mut previous_start: Option<usize> = None;

    spans
        .iter()
        .map(|span| {
            let start = match previous_start {
                Some(floor) if effective_overlap > 0 => {
                    overlap_start(text, floor, span.start, effective_overlap)
                }
                _ => span.start,
            };
            previous_start = Some(span.start);
            trim_front_to(&text[start..span.end], max_size, counter).to_string()
        })
        .collect()
}

/// Byte offset `overlap` characters before `start`, clamped to `floor`.
fn overlap_start(text: &str, floor: usize, start: usize, overlap: usize) -> usize {
    text[floor..start]
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(floor, |(offset, _)| floor + offset)
}

/// Drop leading characters (and then leading whitespace) until `text` measures at most
/// `limit`.
fn trim_front_to<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    let trimmed = text.trim_start();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if counter.as_ref()(candidate) <= limit {
            return candidate;
        }
    }
    ""
}
