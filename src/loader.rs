//! Document loading: turns a PDF file or a directory of PDFs into ordered pages.
//!
//! Pages come out in source order (directory entries sorted by path) and then page order,
//! which the chunk identity fold relies on.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const PAGE_BREAK: char = '\x0C';

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Name of the document the page came from.
    pub source: String,
    /// Zero-based page number within the document.
    pub page: usize,
    /// Raw page text; may be empty.
    pub text: String,
}

/// Errors raised while loading documents.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The requested path does not exist.
    #[error("document path not found: {0}")]
    NotFound(PathBuf),
    /// The path exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The file was read but its text could not be extracted.
    #[error("failed to parse {path}: {reason}")]
    Unparseable {
        /// Path of the malformed document.
        path: PathBuf,
        /// Extractor diagnostic.
        reason: String,
    },
}

/// Source of pages for the indexing pipeline.
pub trait DocumentLoader: Send + Sync {
    /// Load every page reachable from `path`, a single document or a directory of documents.
    fn load(&self, path: &Path) -> Result<Vec<Page>, LoadError>;
}

/// Loader for PDF files backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl PdfLoader {
    /// Construct a PDF loader.
    pub const fn new() -> Self {
        Self
    }

    fn load_file(&self, path: &Path) -> Result<Vec<Page>, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let texts = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|error| {
            LoadError::Unparseable {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        })?;
        let source = path.display().to_string();
        let pages = if texts.len() == 1 && texts[0].contains(PAGE_BREAK) {
            split_pages(&source, &texts[0])
        } else {
            number_pages(&source, texts)
        };
        tracing::debug!(path = %path.display(), pages = pages.len(), "Loaded PDF");
        Ok(pages)
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        if !path.is_dir() {
            return self.load_file(path);
        }

        let files = collect_pdf_files(path)?;
        tracing::debug!(path = %path.display(), files = files.len(), "Scanning PDF directory");
        let mut pages = Vec::new();
        for file in files {
            pages.extend(self.load_file(&file)?);
        }
        Ok(pages)
    }
}

/// Number per-page texts from zero.
///
/// Pages keep their position even when empty so later page numbers stay aligned with the
/// document. Trailing empty pages are dropped.
pub fn number_pages(source: &str, texts: impl IntoIterator<Item = String>) -> Vec<Page> {
    let mut pages: Vec<Page> = texts
        .into_iter()
        .enumerate()
        .map(|(page, body)| Page {
            source: source.to_string(),
            page,
            text: body.trim().to_string(),
        })
        .collect();

    while pages.last().is_some_and(|page| page.text.is_empty()) {
        pages.pop();
    }
    pages
}

/// Split a single extracted text into pages on form feeds.
///
/// Used when the extractor reports one page whose text still carries page breaks.
pub fn split_pages(source: &str, text: &str) -> Vec<Page> {
    number_pages(source, text.split(PAGE_BREAK).map(str::to_string))
}

fn collect_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|error| LoadError::Io {
            path: error
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            source: error.into(),
        })?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
