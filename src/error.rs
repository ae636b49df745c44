//! Error types for the edgequake-pdfstruct library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfStructError`]: **Fatal**: the document cannot be processed at all
//!   (missing file, not a PDF, pdfium unavailable, output not writable).
//!   Returned as `Err(PdfStructError)` from the top-level `convert*`
//!   functions. In batch mode it aborts only the document that raised it.
//!
//! * [`ChunkError`]: **Non-fatal**: one page-range chunk failed (worker
//!   crashed, pdfium choked on a page) but every other chunk is fine. The
//!   controller renders it inline as an error marker covering that chunk's
//!   pages, so the rest of the document survives.
//!
//! Cancellation is modelled as [`PdfStructError::Cancelled`]: it is an exit
//! path, not a failure, and callers usually match on it explicitly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfstruct library.
///
/// Chunk-level failures use [`ChunkError`] and are stored in
/// [`crate::output::ChunkResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PdfStructError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A directory input contained no PDF files.
    #[error("No PDF files found under '{path}'")]
    NoDocuments { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password.
    #[error("PDF '{path}' is encrypted and cannot be opened without a password.")]
    PasswordRequired { path: PathBuf },

    /// Splitting the document into chunk sub-documents failed.
    #[error("Failed to split '{path}' into chunks: {detail}")]
    SplitFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file or its assets.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Temp storage for chunk files could not be prepared.
    #[error("Temp storage error at '{path}': {source}")]
    TempStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted tag list could not be read or written.
    #[error("Tag store error at '{path}': {detail}")]
    TagStore { path: PathBuf, detail: String },

    // ── Dictionary download errors ────────────────────────────────────────
    /// A frequency list could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// A frequency list download exceeded its timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Install pdfium system-wide (libpdfium.so / libpdfium.dylib / pdfium.dll).\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir-or-file to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Lifecycle ─────────────────────────────────────────────────────────
    /// The run was cancelled through its [`crate::cancel::CancellationToken`].
    /// No output was written for the current document.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfStructError {
    /// `true` for the cancellation exit path.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PdfStructError::Cancelled)
    }
}

/// A non-fatal error for a single chunk.
///
/// Serialisable because it crosses the worker-process boundary inside a
/// [`crate::pipeline::worker::WorkerReply`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ChunkError {
    /// The worker process could not be started.
    #[error("worker spawn failed: {detail}")]
    SpawnFailed { detail: String },

    /// The worker exited (or was killed) without replying.
    #[error("worker exited before replying ({status})")]
    WorkerExited { status: String },

    /// The worker replied with something that is not a valid reply line.
    #[error("worker protocol error: {detail}")]
    Protocol { detail: String },

    /// The chunk sub-document could not be opened by the worker.
    #[error("cannot open chunk '{path}': {detail}")]
    OpenFailed { path: PathBuf, detail: String },

    /// Extraction failed part-way through the chunk.
    #[error("page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },
}

impl ChunkError {
    /// The inline marker substituted for a failed chunk's page range.
    pub fn marker(&self, start_page: usize, end_page: usize) -> String {
        format!("[ERROR: Failed to process pages {start_page}-{end_page}: {self}]")
    }
}
