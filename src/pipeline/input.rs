//! Input resolution: validate a single PDF or discover PDFs under a directory.
//!
//! ## Why check magic bytes here?
//!
//! pdfium reports a non-PDF as a generic parse failure. Checking for `%PDF`
//! before any worker is started gives callers a precise [`PdfStructError::NotAPdf`]
//! and keeps junk files from reaching the splitter.

use crate::error::PdfStructError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What a user-supplied path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File(PathBuf),
    /// PDFs found under a directory, sorted by path.
    Directory { root: PathBuf, files: Vec<PathBuf> },
}

/// Classify `path` and validate or discover its PDFs.
pub fn resolve(path: &Path, recursive: bool) -> Result<Input, PdfStructError> {
    if path.is_dir() {
        let files = discover(path, recursive)?;
        if files.is_empty() {
            return Err(PdfStructError::NoDocuments {
                path: path.to_path_buf(),
            });
        }
        return Ok(Input::Directory {
            root: path.to_path_buf(),
            files,
        });
    }
    validate_pdf(path)?;
    Ok(Input::File(path.to_path_buf()))
}

/// Check existence, readability and the `%PDF` magic.
pub fn validate_pdf(path: &Path) -> Result<(), PdfStructError> {
    if !path.exists() {
        return Err(PdfStructError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(PdfStructError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfStructError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PdfStructError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }
    debug!(path = %path.display(), "input validated");
    Ok(())
}

/// Files with a `.pdf` extension (any case) under `dir`, sorted.
pub fn discover(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, PdfStructError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => PdfStructError::PermissionDenied {
                path: current.clone(),
            },
            _ => PdfStructError::FileNotFound {
                path: current.clone(),
            },
        })?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %current.display(), error = %e, "unreadable directory entry skipped");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_pdf_name(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn is_pdf_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}
