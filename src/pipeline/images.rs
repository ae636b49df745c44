//! Raster assets: embedded images and chart snapshots written as PNG.
//!
//! Workers write assets into a per-document staging directory shared with
//! the supervisor; [`collect`] reads them back once every chunk is done. File
//! names carry the page number, so two workers never collide.
//!
//! PNG is lossless, which keeps text inside figures legible. Embedded images
//! whose PNG encoding is under [`MIN_IMAGE_BYTES`] are dropped: at that size
//! they are almost always bullets, rules or logo fragments.

use crate::error::PdfStructError;
use crate::layout::BoundingBox;
use crate::output::ImageAsset;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Smallest encoded PNG kept for an embedded image.
pub const MIN_IMAGE_BYTES: usize = 2048;

/// Directory name assets are linked under, relative to the Markdown file.
pub const IMAGES_DIR: &str = "images";

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

pub fn embedded_image_name(page: usize, n: usize) -> String {
    format!("img_p{page}_{n}.png")
}

pub fn chart_snapshot_name(page: usize, n: usize) -> String {
    format!("chart_p{page}_{n}.png")
}

/// Writes PNG assets into a staging directory and returns their Markdown links.
#[derive(Debug, Clone)]
pub struct AssetSink {
    dir: PathBuf,
}

impl AssetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write already-encoded PNG bytes as `name`; returns the relative link.
    pub fn write(&self, name: &str, png: &[u8]) -> std::io::Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(name), png)?;
        debug!(name, bytes = png.len(), "asset written");
        Ok(format!("{IMAGES_DIR}/{name}"))
    }

    /// Encode and write `img`, skipping it when the encoding is smaller than `min_bytes`.
    pub fn write_image(&self, name: &str, img: &DynamicImage, min_bytes: usize) -> Option<String> {
        let png = match encode_png(img) {
            Ok(png) => png,
            Err(e) => {
                warn!(name, error = %e, "PNG encoding failed, asset skipped");
                return None;
            }
        };
        if png.len() < min_bytes {
            debug!(name, bytes = png.len(), "image below size floor, skipped");
            return None;
        }
        match self.write(name, &png) {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(name, error = %e, "asset write failed");
                None
            }
        }
    }
}

/// Crop a page raster to `bbox` (page points, top-left origin).
///
/// Returns `None` when the box falls outside the raster or is degenerate.
pub fn crop_region(raster: &DynamicImage, bbox: &BoundingBox, page_width: f64, page_height: f64) -> Option<DynamicImage> {
    if page_width <= 0.0 || page_height <= 0.0 {
        return None;
    }
    let sx = f64::from(raster.width()) / page_width;
    let sy = f64::from(raster.height()) / page_height;
    let x0 = (bbox.x0 * sx).floor().max(0.0) as u32;
    let y0 = (bbox.y0 * sy).floor().max(0.0) as u32;
    let x1 = ((bbox.x1 * sx).ceil() as u32).min(raster.width());
    let y1 = ((bbox.y1 * sy).ceil() as u32).min(raster.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(raster.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

/// Read every PNG in a staging directory, sorted by name.
///
/// A missing directory yields no assets.
pub fn collect(dir: &Path) -> Result<Vec<ImageAsset>, PdfStructError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PdfStructError::TempStorage {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut assets = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let png = std::fs::read(&path).map_err(|source| PdfStructError::TempStorage {
            path: path.clone(),
            source,
        })?;
        assets.push(ImageAsset {
            relative_path: format!("{IMAGES_DIR}/{name}"),
            png,
        });
    }
    assets.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(assets)
}

/// Write assets under `out_dir`, creating `images/` as needed.
pub fn write_assets(out_dir: &Path, assets: &[ImageAsset]) -> Result<(), PdfStructError> {
    for asset in assets {
        let path = out_dir.join(&asset.relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PdfStructError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, &asset.png)
            .map_err(|source| PdfStructError::OutputWriteFailed { path, source })?;
    }
    Ok(())
}
