//! pdfium page → [`PagePrimitives`].
//!
//! This is the only place that knows PDF's bottom-left origin. Every
//! coordinate leaving this module is flipped to top-left page space.
//!
//! Path objects are decomposed into subpaths at each move-to:
//!
//! * two points → one [`Segment`] per edge
//! * an axis-aligned closed quadrilateral → a filled/stroked rect
//! * anything with a Bézier, or three or more free points → a [`Curve`]

use crate::layout::{BoundingBox, Curve, Glyph, PagePrimitives, Segment};
use crate::pipeline::page::PageSource;
use crate::pipeline::render;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

/// Corners within this many points count as axis-aligned for rect detection.
const RECT_TOLERANCE: f64 = 0.5;

/// A pdfium page with its primitives extracted up front.
pub struct PdfiumPage<'a> {
    page: PdfPage<'a>,
    number: usize,
    primitives: PagePrimitives,
    text: String,
}

impl<'a> PdfiumPage<'a> {
    /// Extract `page`, which is page `number` (1-indexed) of the source document.
    pub fn load(page: PdfPage<'a>, number: usize) -> Result<Self, PdfiumError> {
        let primitives = primitives(&page)?;
        let text = page.text()?.all();
        debug!(
            page = number,
            glyphs = primitives.glyphs.len(),
            segments = primitives.segments.len(),
            rects = primitives.rects.len(),
            curves = primitives.curves.len(),
            "page extracted"
        );
        Ok(Self {
            page,
            number,
            primitives,
            text,
        })
    }
}

impl PageSource for PdfiumPage<'_> {
    fn page_number(&self) -> usize {
        self.number
    }

    fn primitives(&self) -> &PagePrimitives {
        &self.primitives
    }

    fn text(&self) -> String {
        self.text.clone()
    }

    fn embedded_images(&self) -> Vec<DynamicImage> {
        let mut out = Vec::new();
        for object in self.page.objects().iter() {
            if let Some(image) = object.as_image_object() {
                match image.get_raw_image() {
                    Ok(img) => out.push(img),
                    Err(e) => warn!(page = self.number, error = ?e, "embedded image unreadable"),
                }
            }
        }
        out
    }

    fn render(&self, dpi: u32) -> Result<DynamicImage, String> {
        render::render_page(&self.page, dpi).map_err(|e| format!("{e:?}"))
    }
}

/// Glyphs and vector art of one page.
pub fn primitives(page: &PdfPage<'_>) -> Result<PagePrimitives, PdfiumError> {
    let width = f64::from(page.width().value);
    let height = f64::from(page.height().value);
    let mut out = PagePrimitives::new(width, height);
    out.glyphs = glyphs(page, height)?;
    for object in page.objects().iter() {
        let Some(path) = object.as_path_object() else {
            continue;
        };
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        let stroke = path.stroke_width().map(|w| f64::from(w.value)).unwrap_or(1.0);
        let page_box = BoundingBox::new(
            f64::from(bounds.left().value),
            height - f64::from(bounds.top().value),
            f64::from(bounds.right().value),
            height - f64::from(bounds.bottom().value),
        );
        let raw: Vec<RawPoint> = path
            .segments()
            .iter()
            .map(|s| RawPoint {
                kind: s.segment_type(),
                x: f64::from(s.x().value),
                y: f64::from(s.y().value),
                close: s.is_close(),
            })
            .collect();
        decompose(&raw, &page_box, stroke, &mut out);
    }
    Ok(out)
}

fn glyphs(page: &PdfPage<'_>, height: f64) -> Result<Vec<Glyph>, PdfiumError> {
    let text = page.text()?;
    let mut out = Vec::new();
    for ch in text.chars().iter() {
        let Some(s) = ch.unicode_string() else {
            continue;
        };
        if s.is_empty() || s.chars().all(char::is_control) {
            continue;
        }
        let Ok(rect) = ch.loose_bounds() else {
            continue;
        };
        let bbox = BoundingBox::new(
            f64::from(rect.left().value),
            height - f64::from(rect.top().value),
            f64::from(rect.right().value),
            height - f64::from(rect.bottom().value),
        );
        out.push(Glyph::new(s, bbox, f64::from(ch.scaled_font_size().value)));
    }
    Ok(out)
}

/// One path point in the object's own coordinate space.
#[derive(Debug, Clone, Copy)]
struct RawPoint {
    kind: PdfPathSegmentType,
    x: f64,
    y: f64,
    close: bool,
}

/// Map a path's raw points into `page_box` and classify each subpath.
///
/// Raw path coordinates are untransformed; the object's page-space bounds are
/// used to place them. This is exact for translate/scale/flip matrices, which
/// covers ruling lines and cell borders; rotated art only feeds the chart
/// heuristics, where extents matter more than exact angles.
fn decompose(raw: &[RawPoint], page_box: &BoundingBox, stroke: f64, out: &mut PagePrimitives) {
    if raw.is_empty() {
        return;
    }
    let (mut rx0, mut ry0, mut rx1, mut ry1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in raw {
        rx0 = rx0.min(p.x);
        ry0 = ry0.min(p.y);
        rx1 = rx1.max(p.x);
        ry1 = ry1.max(p.y);
    }
    let map = |p: &RawPoint| -> (f64, f64) {
        let x = if rx1 > rx0 {
            page_box.x0 + (p.x - rx0) / (rx1 - rx0) * page_box.width()
        } else {
            page_box.center().0
        };
        // raw y grows upwards, page y grows downwards
        let y = if ry1 > ry0 {
            page_box.y1 - (p.y - ry0) / (ry1 - ry0) * page_box.height()
        } else {
            page_box.center().1
        };
        (x, y)
    };

    let mut subpath: Vec<(f64, f64)> = Vec::new();
    let mut bezier = false;
    let mut closed = false;
    for p in raw {
        if p.kind == PdfPathSegmentType::MoveTo && !subpath.is_empty() {
            flush(&subpath, bezier, closed, stroke, out);
            subpath.clear();
            bezier = false;
            closed = false;
        }
        if p.kind == PdfPathSegmentType::BezierTo {
            bezier = true;
        }
        closed |= p.close;
        subpath.push(map(p));
    }
    flush(&subpath, bezier, closed, stroke, out);
}

fn flush(points: &[(f64, f64)], bezier: bool, closed: bool, stroke: f64, out: &mut PagePrimitives) {
    if points.len() < 2 {
        return;
    }
    if !bezier {
        if points.len() == 2 {
            let (a, b) = (points[0], points[1]);
            out.segments.push(Segment::new(a.0, a.1, b.0, b.1, stroke));
            return;
        }
        if let Some(rect) = as_rect(points, closed) {
            out.rects.push(rect);
            return;
        }
    }
    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for &(x, y) in points {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    out.curves.push(Curve {
        bbox: BoundingBox::new(x0, y0, x1, y1),
        points: points.len(),
    });
}

/// A closed four-corner subpath whose edges are all axis-aligned.
fn as_rect(points: &[(f64, f64)], closed: bool) -> Option<BoundingBox> {
    let mut corners: Vec<(f64, f64)> = points.to_vec();
    if corners.len() == 5 {
        let (first, last) = (corners[0], corners[4]);
        if (first.0 - last.0).abs() > RECT_TOLERANCE || (first.1 - last.1).abs() > RECT_TOLERANCE {
            return None;
        }
        corners.pop();
    } else if !(corners.len() == 4 && closed) {
        return None;
    }
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let horizontal = (a.1 - b.1).abs() <= RECT_TOLERANCE;
        let vertical = (a.0 - b.0).abs() <= RECT_TOLERANCE;
        if !horizontal && !vertical {
            return None;
        }
    }
    BoundingBox::enclosing(
        corners
            .iter()
            .map(|&(x, y)| BoundingBox::new(x, y, x, y))
            .collect::<Vec<_>>()
            .iter(),
    )
}

/// Plain text of selected pages (1-indexed), used by the watermark pre-scan.
///
/// Pages that fail to load contribute an empty string.
pub fn page_texts(document: &PdfDocument<'_>, pages: &[usize]) -> Vec<String> {
    let all = document.pages();
    let total = all.len() as usize;
    pages
        .iter()
        .filter(|&&p| p >= 1 && p <= total)
        .map(|&p| {
            all.get((p - 1) as u16)
                .and_then(|page| {
                    let text = page.text()?;
                    Ok(text.all())
                })
                .unwrap_or_else(|e| {
                    warn!(page = p, error = ?e, "page text unavailable for watermark scan");
                    String::new()
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(kind: PdfPathSegmentType, x: f64, y: f64) -> RawPoint {
        RawPoint {
            kind,
            x,
            y,
            close: false,
        }
    }

    use PdfPathSegmentType::{BezierTo, LineTo, MoveTo};

    #[test]
    fn two_point_subpaths_become_segments() {
        let raw = [pt(MoveTo, 0.0, 0.0), pt(LineTo, 100.0, 0.0), pt(MoveTo, 0.0, 0.0), pt(LineTo, 0.0, 50.0)];
        let mut out = PagePrimitives::new(200.0, 200.0);
        decompose(&raw, &BoundingBox::new(10.0, 20.0, 110.0, 70.0), 1.0, &mut out);
        assert_eq!(out.segments.len(), 2);
        let h = out.segments[0];
        assert_eq!((h.x0, h.x1), (10.0, 110.0));
        // raw y=0 is the bottom of the object box
        assert_eq!((h.y0, h.y1), (70.0, 70.0));
        let v = out.segments[1];
        assert_eq!((v.x0, v.x1), (10.0, 10.0));
        assert_eq!((v.y0, v.y1), (70.0, 20.0));
    }

    #[test]
    fn closed_quad_becomes_rect() {
        let mut last = pt(LineTo, 0.0, 10.0);
        last.close = true;
        let raw = [pt(MoveTo, 0.0, 0.0), pt(LineTo, 40.0, 0.0), pt(LineTo, 40.0, 10.0), last];
        let mut out = PagePrimitives::new(200.0, 200.0);
        decompose(&raw, &BoundingBox::new(0.0, 0.0, 40.0, 10.0), 0.0, &mut out);
        assert_eq!(out.rects, vec![BoundingBox::new(0.0, 0.0, 40.0, 10.0)]);
        assert!(out.segments.is_empty() && out.curves.is_empty());
    }

    #[test]
    fn beziers_become_curves() {
        let raw = [
            pt(MoveTo, 0.0, 0.0),
            pt(BezierTo, 10.0, 20.0),
            pt(BezierTo, 20.0, 20.0),
            pt(BezierTo, 30.0, 0.0),
        ];
        let mut out = PagePrimitives::new(200.0, 200.0);
        decompose(&raw, &BoundingBox::new(0.0, 0.0, 30.0, 20.0), 1.0, &mut out);
        assert_eq!(out.curves.len(), 1);
        assert_eq!(out.curves[0].points, 4);
        assert_eq!(out.curves[0].bbox, BoundingBox::new(0.0, 0.0, 30.0, 20.0));
    }

    #[test]
    fn open_polyline_is_a_curve_not_a_rect() {
        let raw = [pt(MoveTo, 0.0, 0.0), pt(LineTo, 10.0, 5.0), pt(LineTo, 20.0, 0.0)];
        let mut out = PagePrimitives::new(200.0, 200.0);
        decompose(&raw, &BoundingBox::new(0.0, 0.0, 20.0, 5.0), 1.0, &mut out);
        assert!(out.rects.is_empty());
        assert_eq!(out.curves.len(), 1);
    }
}
