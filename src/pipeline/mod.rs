//! Everything between a PDF on disk and per-page Markdown fragments.
//!
//! [`crate::layout`] is pure geometry. This module owns the parts that touch
//! pdfium, the filesystem and other processes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ loader ──▶ pool ══▶ worker ──▶ extract ──▶ page ──▶ fragments
//! (validate) (split     (spawn,  (one per   (pdfium →   (stages:
//!             to temp    kill)    process)   primitives) layout, OCR,
//!             PDFs)                                      legacy, images)
//!                                    │
//!                                    └──▶ cleanup (chunk guard, sweeps)
//! ```
//!
//! 1. [`input`]: validate a file or discover PDFs in a directory
//! 2. [`loader`]: split the document into chunk sub-documents
//! 3. [`pool`]: supervisor side: worker processes, request/reply, kill on drop
//! 4. [`worker`]: worker side: serve chunk requests, delete the chunk file
//! 5. [`extract`]: pdfium page → [`crate::layout::PagePrimitives`]
//! 6. [`page`]: the per-page engine, configured by a [`stages::StageSet`]
//! 7. [`cleanup`]: retrying deletion and temp-dir sweeps
//!
//! [`ocr`], [`legacy`], [`postprocess`] and [`images`] are the optional
//! stages; [`render`] and [`pdfium`] are shared pdfium plumbing.

pub mod cleanup;
pub mod extract;
pub mod images;
pub mod input;
pub mod legacy;
pub mod loader;
pub mod ocr;
pub mod page;
pub mod pdfium;
pub mod pool;
pub mod postprocess;
pub mod render;
pub mod stages;
pub mod worker;
