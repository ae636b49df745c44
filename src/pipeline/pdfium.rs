//! pdfium library binding and document opening.
//!
//! Binding order: `PDFIUM_LIB_PATH` (a file or a directory), the working
//! directory, then the system library search path. Every pipeline stage that
//! touches pdfium goes through [`bind`] and [`open`] so binding failures and
//! password/corruption errors are reported the same way everywhere.
//!
//! pdfium keeps global library state, so one process binds exactly once and
//! every caller borrows the same [`Pdfium`] through [`shared`].

use crate::error::PdfStructError;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing at an existing pdfium library or its directory.
pub const PDFIUM_LIB_PATH: &str = "PDFIUM_LIB_PATH";

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium instance, bound on first use.
///
/// A failed bind is not cached; the next call tries again.
pub fn shared() -> Result<&'static Pdfium, PdfStructError> {
    PDFIUM.get_or_try_init(bind)
}

/// Bind to a pdfium shared library.
pub fn bind() -> Result<Pdfium, PdfStructError> {
    let bindings = bindings().map_err(|e| PdfStructError::PdfiumBindingFailed(format!("{e:?}")))?;
    debug!("pdfium bound");
    Ok(Pdfium::new(bindings))
}

fn bindings() -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
    if let Some(p) = std::env::var_os(PDFIUM_LIB_PATH).map(PathBuf::from) {
        let lib = if p.is_file() {
            p
        } else {
            Pdfium::pdfium_platform_library_name_at_path(&p)
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(b) => return Ok(b),
            Err(e) => warn!(path = %lib.display(), error = ?e, "{PDFIUM_LIB_PATH} not usable, trying defaults"),
        }
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
}

/// Open `path`, mapping pdfium errors onto the fatal error taxonomy.
pub fn open<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PdfStructError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            PdfStructError::PasswordRequired {
                path: path.to_path_buf(),
            }
        } else {
            PdfStructError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}
