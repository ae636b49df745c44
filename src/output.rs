//! Result types returned by the conversion entry points.
//!
//! A document is processed as page-range chunks; each chunk yields one
//! [`ChunkResult`] holding the Markdown fragment of every page it covers, or
//! a [`ChunkError`] that is rendered as an inline marker. Chunks arrive in
//! completion order; [`reassemble`] restores page order.

use crate::config::PageSeparator;
use crate::error::ChunkError;
use serde::{Deserialize, Serialize};

/// The Markdown fragment recovered for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageFragment {
    /// 1-indexed page number in the source document.
    pub page: usize,
    pub markdown: String,
    /// Tables emitted (structured or legacy).
    pub tables: usize,
    /// Chart regions detected.
    pub charts: usize,
    /// Raster assets written for this page.
    pub images: usize,
    /// Body text came from the OCR engine.
    pub ocr_used: bool,
    /// Region fell back to a "Raw Data" block.
    pub raw_blocks: usize,
}

/// Outcome of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// First page of the chunk (1-indexed, inclusive).
    pub start_page: usize,
    /// Last page of the chunk (1-indexed, inclusive).
    pub end_page: usize,
    /// Per-page fragments in page order. Empty when `error` is set.
    pub pages: Vec<PageFragment>,
    /// Set when the chunk failed as a whole.
    pub error: Option<ChunkError>,
    /// Wall-clock time from dispatch to collection.
    pub duration_ms: u64,
}

impl ChunkResult {
    pub fn failed(start_page: usize, end_page: usize, error: ChunkError, duration_ms: u64) -> Self {
        Self {
            start_page,
            end_page,
            pages: Vec::new(),
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The chunk's Markdown: its pages joined by `separator`, or the error marker.
    pub fn markdown(&self, separator: &PageSeparator) -> String {
        if let Some(err) = &self.error {
            return err.marker(self.start_page, self.end_page);
        }
        let mut out = String::new();
        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page.page));
            }
            out.push_str(page.markdown.trim_end());
        }
        out
    }
}

/// Join chunk results into one document in page order.
///
/// The input may be in any order; the output depends only on the set of
/// results. Sorting is stable on `start_page`, which is unique per chunk.
pub fn reassemble(mut chunks: Vec<ChunkResult>, separator: &PageSeparator) -> (String, Vec<ChunkResult>) {
    chunks.sort_by_key(|c| c.start_page);
    let mut out = String::new();
    for chunk in &chunks {
        let body = chunk.markdown(separator);
        if body.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(&separator.render(chunk.start_page));
        }
        out.push_str(&body);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    (out, chunks)
}

/// A raster asset produced during conversion, relative to the document's output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Path as linked from the Markdown, e.g. `images/img_p3_1.png`.
    pub relative_path: String,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Document metadata, available without running the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Counters for one converted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    /// Pages covered by failed chunks.
    pub failed_pages: usize,
    pub tables: usize,
    pub charts: usize,
    pub images: usize,
    pub ocr_pages: usize,
    pub raw_blocks: usize,
    /// Watermark candidates that survived validation for this document.
    pub validated_watermarks: usize,
    pub split_duration_ms: u64,
    pub processing_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// Fold per-chunk counters into the stats.
    pub fn absorb(&mut self, chunks: &[ChunkResult]) {
        self.total_chunks = chunks.len();
        for c in chunks {
            if c.error.is_some() {
                self.failed_chunks += 1;
                self.failed_pages += c.end_page + 1 - c.start_page;
            }
            for p in &c.pages {
                self.tables += p.tables;
                self.charts += p.charts;
                self.images += p.images;
                self.raw_blocks += p.raw_blocks;
                if p.ocr_used {
                    self.ocr_pages += 1;
                }
            }
        }
    }
}

/// Everything a conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub markdown: String,
    /// Chunk results in page order.
    pub chunks: Vec<ChunkResult>,
    pub images: Vec<ImageAsset>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}
