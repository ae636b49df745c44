//! Split: partition a document into page-range chunks and write each one as
//! an independent temporary sub-document.
//!
//! ## Why real sub-documents?
//!
//! Workers are separate processes. Handing each one a small self-contained
//! PDF means a worker never opens the full document, a crash while parsing
//! one page range cannot corrupt another, and the chunk file doubles as the
//! unit of cleanup.
//!
//! Chunk files are named `pdfstruct_<doc token>_<uuid>.pdf`. The document
//! token scopes the cancellation sweep to one document; the per-chunk UUID
//! guarantees no two workers ever share a file, even across runs.

use crate::error::PdfStructError;
use crate::pipeline::pdfium;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix shared by every temp file this crate writes.
pub const TEMP_PREFIX: &str = "pdfstruct_";

/// A contiguous page range materialised as its own PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The document the pages came from.
    pub source: PathBuf,
    /// First page (1-indexed, inclusive).
    pub start_page: usize,
    /// Last page (1-indexed, inclusive).
    pub end_page: usize,
    /// The chunk sub-document.
    pub temp_path: PathBuf,
}

impl Chunk {
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }
}

/// Inclusive 1-indexed page ranges of at most `chunk_size` pages covering `1..=total_pages`.
pub fn plan_ranges(total_pages: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let size = chunk_size.max(1);
    (0..total_pages)
        .step_by(size)
        .map(|start| (start + 1, (start + size).min(total_pages)))
        .collect()
}

/// A fresh random token identifying one document run.
pub fn document_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Temp file prefix for every chunk of the document run `doc_token`.
pub fn document_prefix(doc_token: &str) -> String {
    format!("{TEMP_PREFIX}{doc_token}_")
}

pub fn chunk_file_name(doc_token: &str) -> String {
    format!("{}{}.pdf", document_prefix(doc_token), uuid::Uuid::new_v4().simple())
}

/// Staging directory for a document run's image assets.
pub fn asset_dir(temp_dir: &Path, doc_token: &str) -> PathBuf {
    temp_dir.join(format!("{}assets", document_prefix(doc_token)))
}

/// Split `source` into chunk sub-documents under `temp_dir`.
///
/// Runs on the blocking pool. On error, chunk files already written are
/// left for the caller's document sweep.
pub async fn split(
    source: &Path,
    password: Option<&str>,
    temp_dir: &Path,
    doc_token: &str,
    chunk_size: usize,
) -> Result<Vec<Chunk>, PdfStructError> {
    let source = source.to_path_buf();
    let password = password.map(str::to_string);
    let temp_dir = temp_dir.to_path_buf();
    let doc_token = doc_token.to_string();
    tokio::task::spawn_blocking(move || {
        split_blocking(&source, password.as_deref(), &temp_dir, &doc_token, chunk_size)
    })
    .await
    .map_err(|e| PdfStructError::Internal(format!("Split task panicked: {}", e)))?
}

fn split_blocking(
    source: &Path,
    password: Option<&str>,
    temp_dir: &Path,
    doc_token: &str,
    chunk_size: usize,
) -> Result<Vec<Chunk>, PdfStructError> {
    std::fs::create_dir_all(temp_dir).map_err(|e| PdfStructError::TempStorage {
        path: temp_dir.to_path_buf(),
        source: e,
    })?;

    let pdfium = pdfium::shared()?;
    let document = pdfium::open(pdfium, source, password)?;
    let total = document.pages().len() as usize;
    let split_err = |detail: String| PdfStructError::SplitFailed {
        path: source.to_path_buf(),
        detail,
    };

    let mut chunks = Vec::new();
    for (start, end) in plan_ranges(total, chunk_size) {
        let temp_path = temp_dir.join(chunk_file_name(doc_token));
        let mut sub = pdfium
            .create_new_pdf()
            .map_err(|e| split_err(format!("{e:?}")))?;
        sub.pages_mut()
            .copy_page_range_from_document(&document, (start - 1) as u16..=(end - 1) as u16, 0)
            .map_err(|e| split_err(format!("pages {start}-{end}: {e:?}")))?;
        sub.save_to_file(&temp_path)
            .map_err(|e| split_err(format!("writing {}: {e:?}", temp_path.display())))?;
        debug!(start, end, path = %temp_path.display(), "chunk written");
        chunks.push(Chunk {
            source: source.to_path_buf(),
            start_page: start,
            end_page: end,
            temp_path,
        });
    }
    info!(pages = total, chunks = chunks.len(), "document split");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_every_page_once() {
        assert_eq!(plan_ranges(5, 2), vec![(1, 2), (3, 4), (5, 5)]);
        assert_eq!(plan_ranges(4, 2), vec![(1, 2), (3, 4)]);
        assert_eq!(plan_ranges(1, 10), vec![(1, 1)]);
        assert!(plan_ranges(0, 2).is_empty());
        assert_eq!(plan_ranges(3, 0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn chunk_names_are_unique_and_scoped() {
        let token = document_token();
        let a = chunk_file_name(&token);
        let b = chunk_file_name(&token);
        assert_ne!(a, b);
        assert!(a.starts_with(&document_prefix(&token)));
        assert!(a.ends_with(".pdf"));
    }

    #[test]
    fn chunk_page_count() {
        let c = Chunk {
            source: PathBuf::from("a.pdf"),
            start_page: 3,
            end_page: 4,
            temp_path: PathBuf::from("/tmp/x.pdf"),
        };
        assert_eq!(c.page_count(), 2);
    }
}
