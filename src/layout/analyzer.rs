//! Layout analysis: classify a page's vector primitives and project its words.
//!
//! ## Why classify lines by angle?
//!
//! Table borders are axis-aligned; chart art (trend lines, pie wedges, axis
//! ticks at an angle) is not. Splitting strokes into horizontal, vertical and
//! diagonal sets early lets the region detector build grids only from the
//! first two while using the third as a chart signal.
//!
//! ## Why erode words before projecting?
//!
//! Borderless tables separate columns with whitespace only. Projecting word
//! boxes onto the x axis gives an occupancy histogram whose empty runs are the
//! column gutters ("rivers"). Adjacent words in tight layouts almost touch, so
//! each box is shrunk a little first to force the gutters open.

use crate::layout::geometry::{BoundingBox, Curve, GridLine, PagePrimitives, Segment, Word};
use crate::layout::{reconstruct, LayoutTuning};
use tracing::debug;

/// Classified primitives of one page.
#[derive(Debug, Clone, Default)]
pub struct LayoutAnalysis {
    pub width: f64,
    pub height: f64,
    pub horizontal: Vec<GridLine>,
    pub vertical: Vec<GridLine>,
    pub diagonal: Vec<Segment>,
    pub rects: Vec<BoundingBox>,
    pub curves: Vec<Curve>,
    pub words: Vec<Word>,
}

/// Run the analyzer over one page.
pub fn analyze(page: &PagePrimitives, tuning: &LayoutTuning) -> LayoutAnalysis {
    let mut out = LayoutAnalysis {
        width: page.width,
        height: page.height,
        curves: page.curves.clone(),
        words: reconstruct::words(&page.glyphs, tuning),
        ..LayoutAnalysis::default()
    };

    for seg in &page.segments {
        if seg.length() <= 0.0 {
            continue;
        }
        let angle = seg.angle_degrees();
        let strength = seg.width.abs().max(tuning.min_line_strength);
        if angle < tuning.axis_tolerance_deg {
            let y = (seg.y0 + seg.y1) / 2.0;
            out.horizontal
                .push(GridLine::horizontal(y, seg.x0, seg.x1, strength));
        } else if (angle - 90.0).abs() < tuning.axis_tolerance_deg {
            let x = (seg.x0 + seg.x1) / 2.0;
            out.vertical
                .push(GridLine::vertical(x, seg.y0, seg.y1, strength));
        } else {
            out.diagonal.push(*seg);
        }
    }

    for rect in &page.rects {
        let (w, h) = (rect.width(), rect.height());
        let thin = tuning.thin_rect_max;
        if h <= thin && w > h {
            let (_, cy) = rect.center();
            out.horizontal
                .push(GridLine::horizontal(cy, rect.x0, rect.x1, h.max(tuning.min_line_strength)));
        } else if w <= thin && h > w {
            let (cx, _) = rect.center();
            out.vertical
                .push(GridLine::vertical(cx, rect.y0, rect.y1, w.max(tuning.min_line_strength)));
        } else if w > thin && h > thin {
            out.rects.push(*rect);
        }
    }

    debug!(
        h = out.horizontal.len(),
        v = out.vertical.len(),
        diag = out.diagonal.len(),
        rects = out.rects.len(),
        curves = out.curves.len(),
        words = out.words.len(),
        "layout analysed"
    );
    out
}

impl LayoutAnalysis {
    /// Curves large enough to be chart art rather than bullets or glyph outlines.
    pub fn significant_curves<'a>(&'a self, tuning: &'a LayoutTuning) -> impl Iterator<Item = &'a Curve> + 'a {
        self.curves.iter().filter(move |c| {
            c.bbox.width() > tuning.curve_min_extent || c.bbox.height() > tuning.curve_min_extent
        })
    }

    /// Whether the page is dominated by chart vector art.
    ///
    /// Must be checked before table detection: axis gridlines of a plotted
    /// chart otherwise look like a sparse bordered table.
    pub fn is_chart_dominant(&self, tuning: &LayoutTuning) -> bool {
        self.significant_curves(tuning).count() > tuning.page_curve_threshold
            || self.diagonal.len() > tuning.page_diagonal_threshold
    }
}

/// Column-boundary candidates from whitespace rivers.
///
/// The result always starts with `0.0` and ends with the page width; the
/// values in between are the midpoints of qualifying empty runs. Fewer than
/// three entries therefore means "no column structure".
pub fn whitespace_rivers<'a>(
    words: impl IntoIterator<Item = &'a Word>,
    page_width: f64,
    tuning: &LayoutTuning,
) -> Vec<f64> {
    if !(page_width.is_finite() && page_width >= 1.0) {
        return Vec::new();
    }
    let width = page_width as usize;
    let mut histogram = vec![0u32; width];
    let mut any = false;

    for w in words {
        any = true;
        let (mut x0, mut x1) = (w.bbox.x0.max(0.0) as usize, w.bbox.x1.max(0.0) as usize);
        let span = x1.saturating_sub(x0);
        if span > 6 {
            x0 += 2;
            x1 -= 2;
        } else if span > 2 {
            x0 += 1;
            x1 -= 1;
        }
        let x1 = x1.min(width - 1);
        if x0 < x1 {
            for slot in &mut histogram[x0..x1] {
                *slot += 1;
            }
        }
    }
    if !any {
        return Vec::new();
    }

    let mut rivers = vec![0.0];
    let mut run_start: Option<usize> = None;
    for (x, &count) in histogram.iter().enumerate() {
        if count <= tuning.river_noise {
            run_start.get_or_insert(x);
        } else if let Some(start) = run_start.take() {
            if x - start >= tuning.river_min_gap {
                rivers.push((start + x) as f64 / 2.0);
            }
        }
    }
    rivers.push(width as f64);
    rivers
}
