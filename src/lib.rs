//! # edgequake-pdfstruct
//!
//! Recover document structure from PDFs: tables, charts and heading-tagged
//! text, rendered as Markdown, using page geometry instead of a model.
//!
//! ## Why geometry?
//!
//! A PDF page is a bag of positioned glyphs and vector art. Tables are drawn
//! lines (or aligned whitespace), headings are larger fonts, charts are
//! curves. This crate reads those signals directly, which makes it fast,
//! deterministic and free to run offline. OCR is used only for pages whose
//! text layer is empty or garbled.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the file (or discover PDFs in a directory)
//!  ├─ 2. Pre-scan   validate watermark candidates on a page sample
//!  ├─ 3. Split      page-range chunks as temp sub-documents
//!  ├─ 4. Dispatch   one OS worker process per busy chunk (buffer_unordered)
//!  │     └─ per page: layout analysis → regions → tables / charts
//!  │                  → body text + headings → healing → cleaning
//!  ├─ 5. Reassemble sort chunk results by start page
//!  └─ 6. Cleanup    per-chunk guard + per-document sweep
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfstruct::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // host binaries must let worker processes take over first
//!     edgequake_pdfstruct::run_worker_if_requested();
//!
//!     let config = ConversionConfig::default();
//!     let output = convert("report.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} tables, {} failed chunks", output.stats.tables, output.stats.failed_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfstruct` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfstruct = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod heal;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod tags;
pub mod watermark;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationToken;
pub use config::{
    CleaningSettings, ConversionConfig, ConversionConfigBuilder, ExtractionSettings, OcrMode, OcrSettings,
    PageSeparator, WatermarkSettings, WorkerLaunch,
};
pub use convert::{
    convert, convert_batch, convert_batch_with_cancel, convert_sync, convert_to_file, convert_with_cancel, inspect,
    BatchReport,
};
pub use error::{ChunkError, PdfStructError};
pub use heal::TextHealer;
pub use layout::LayoutTuning;
pub use output::{ChunkResult, ConversionOutput, ConversionStats, DocumentMetadata, ImageAsset, PageFragment};
pub use pipeline::page::{process_page, MemoryPage, PageContext, PageSource};
pub use pipeline::stages::StageSet;
pub use pipeline::worker::run_worker_if_requested;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, ChunkStream};
pub use tags::TagStore;
pub use watermark::{ValidatedWatermarkSet, WatermarkAnalyzer};
