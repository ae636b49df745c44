//! Page rasterisation and document metadata via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to drive from async contexts. The supervisor-side entry points here move
//! the work onto Tokio's blocking pool so the orchestration task never
//! stalls. Worker processes are synchronous and call the `_blocking`
//! variants directly.
//!
//! Rasters feed OCR and chart snapshots. Pages render at a fixed DPI (300 by
//! default) with the longest edge capped at [`MAX_EDGE_PX`].

use crate::error::PdfStructError;
use crate::output::DocumentMetadata;
use crate::pipeline::pdfium;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Longest raster edge in pixels, regardless of DPI.
pub const MAX_EDGE_PX: f32 = 8000.0;

/// Render `page` at `dpi`, capping the longest edge at [`MAX_EDGE_PX`].
pub fn render_page(page: &PdfPage<'_>, dpi: u32) -> Result<DynamicImage, PdfiumError> {
    let (w_px, h_px) = raster_size(page.width().value, page.height().value, dpi);
    let config = PdfRenderConfig::new()
        .set_target_width(w_px)
        .set_target_height(h_px)
        .render_form_data(true)
        .render_annotations(true);
    let bitmap = page.render_with_config(&config)?;
    let image = bitmap.as_image();
    debug!(dpi, width = image.width(), height = image.height(), "page rendered");
    Ok(image)
}

/// Pixel size of a `width_pt × height_pt` page at `dpi`, edge-capped.
pub fn raster_size(width_pt: f32, height_pt: f32, dpi: u32) -> (i32, i32) {
    let scale = dpi as f32 / 72.0;
    let mut w = (width_pt * scale).max(1.0);
    let mut h = (height_pt * scale).max(1.0);
    let longest = w.max(h);
    if longest > MAX_EDGE_PX {
        let ratio = MAX_EDGE_PX / longest;
        w *= ratio;
        h *= ratio;
    }
    (w.round() as i32, h.round() as i32)
}

/// Page count without loading any page content.
pub async fn page_count(pdf_path: &Path, password: Option<&str>) -> Result<usize, PdfStructError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        let pdfium = pdfium::shared()?;
        let document = pdfium::open(pdfium, &path, pwd.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| PdfStructError::Internal(format!("Page count task panicked: {}", e)))?
}

/// Extract document metadata from a PDF without rendering pages.
pub async fn extract_metadata(pdf_path: &Path, password: Option<&str>) -> Result<DocumentMetadata, PdfStructError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| PdfStructError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(pdf_path: &Path, password: Option<&str>) -> Result<DocumentMetadata, PdfStructError> {
    let pdfium = pdfium::shared()?;
    let document = pdfium::open(pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_300_dpi() {
        assert_eq!(raster_size(595.0, 842.0, 300), (2479, 3508));
    }

    #[test]
    fn posters_are_capped() {
        let (w, h) = raster_size(2384.0, 3370.0, 300);
        assert_eq!(h, MAX_EDGE_PX as i32);
        assert!(w < h);
    }
}
