//! Geometric layout recovery: from raw page primitives to tables, charts and
//! heading-tagged text.
//!
//! Every stage here is a pure function of its inputs. Nothing touches pdfium,
//! the filesystem or the clock, which is what lets the whole engine be tested
//! with hand-built [`PagePrimitives`].
//!
//! ## Data Flow
//!
//! ```text
//! PagePrimitives ──▶ analyzer ──▶ regions ──▶ structure ──▶ markdown
//!   (glyphs, vector    (classify     (table/chart  (cells, rows,   (pipe tables)
//!    art, curves)       lines, rivers) candidates)  pruning)
//!         │
//!         └────────▶ reconstruct ──▶ text  (body text with heading levels,
//!                    (glyph→word→line)      masked against claimed regions)
//! ```

pub mod analyzer;
pub mod geometry;
pub mod markdown;
pub mod reconstruct;
pub mod regions;
pub mod structure;
pub mod text;

pub use geometry::{
    BoundingBox, ChartKind, ChartMarker, ContentType, Curve, Glyph, GridLine, GridStructure,
    Line, Matrix, Orientation, PagePrimitives, Region, Segment, TableRegion, Word,
};

use serde::{Deserialize, Serialize};

/// Empirical constants used by the layout stages.
///
/// The defaults were tuned on Turkish and English business documents with
/// dense kerning. None of them has a derivation; re-validate against a
/// labelled corpus before changing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutTuning {
    // ── Analyzer ─────────────────────────────────────────────────────────
    /// Lines within this many degrees of an axis count as axis-aligned.
    pub axis_tolerance_deg: f64,
    /// Floor applied to line weights.
    pub min_line_strength: f64,
    /// Filled rectangles thinner than this become grid lines.
    pub thin_rect_max: f64,
    /// Column-occupancy runs at or below this count are treated as empty.
    pub river_noise: u32,
    /// Minimum width of an empty run to count as a whitespace river.
    pub river_min_gap: usize,
    /// Curves smaller than this on both axes are ignored (bullets, glyph art).
    pub curve_min_extent: f64,
    /// Page is chart-dominant above this many significant curves.
    pub page_curve_threshold: usize,
    /// Page is chart-dominant above this many diagonal lines.
    pub page_diagonal_threshold: usize,

    // ── Reconstructor ────────────────────────────────────────────────────
    /// Glyph gap (as a fraction of font size) above which a new word starts.
    pub gap_fraction: f64,
    /// Vertical tolerance in points for two glyphs/words sharing a line.
    pub line_tolerance: f64,

    // ── Region detector ──────────────────────────────────────────────────
    /// Horizontal lines further apart than this start a new table.
    pub cluster_gap: f64,
    /// Fraction of page height skipped as header zone for borderless tables.
    pub header_skip: f64,
    /// Minimum word count before a borderless table is considered.
    pub borderless_min_words: usize,
    /// Region is a chart above this many curves inside it.
    pub region_curve_threshold: usize,
    /// Region is a chart above this many diagonal lines inside it.
    pub region_diagonal_threshold: usize,
    /// Overlap (of the smaller area) at which a lower-confidence region is dropped.
    pub overlap_threshold: f64,

    // ── Structure parser ─────────────────────────────────────────────────
    /// Rows below this fill ratio are dropped.
    pub fill_ratio: f64,
    /// Relaxed fill ratio for rows confirmed by a drawn grid line.
    pub sparse_rescue_ratio: f64,
    /// Distance in points within which a row counts as confirmed by a grid line.
    pub sparse_rescue_distance: f64,
    /// Columns filled in fewer than this fraction of rows are pruned.
    pub ghost_column_ratio: f64,
    /// Word gap in points that separates synthesised rows.
    pub row_gap: f64,

    // ── Page pre-filter ──────────────────────────────────────────────────
    /// Pages at or below this digit ratio skip borderless and legacy table passes.
    pub numeric_skip_ratio: f64,
    /// Pages above this digit ratio get a forced full-page borderless pass.
    pub numeric_force_ratio: f64,

    // ── Page structure ───────────────────────────────────────────────────
    /// Headings must be at least this many times the body size.
    pub heading_factor: f64,
    /// Headings must also exceed the body size by this many points.
    pub heading_min_delta: f64,
    /// Lines longer than this are never headings.
    pub heading_max_chars: usize,
    /// Top fraction of the page excluded from body text.
    pub header_zone: f64,
    /// Bottom fraction of the page excluded from body text.
    pub footer_zone: f64,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            axis_tolerance_deg: 10.0,
            min_line_strength: 0.5,
            thin_rect_max: 2.0,
            river_noise: 1,
            river_min_gap: 3,
            curve_min_extent: 10.0,
            page_curve_threshold: 5,
            page_diagonal_threshold: 10,
            gap_fraction: 0.20,
            line_tolerance: 3.0,
            cluster_gap: 50.0,
            header_skip: 0.15,
            borderless_min_words: 10,
            region_curve_threshold: 5,
            region_diagonal_threshold: 5,
            overlap_threshold: 0.3,
            fill_ratio: 0.3,
            sparse_rescue_ratio: 0.1,
            sparse_rescue_distance: 3.0,
            ghost_column_ratio: 0.15,
            row_gap: 3.0,
            numeric_skip_ratio: 0.15,
            numeric_force_ratio: 0.50,
            heading_factor: 1.3,
            heading_min_delta: 2.0,
            heading_max_chars: 150,
            header_zone: 0.02,
            footer_zone: 0.05,
        }
    }
}

impl LayoutTuning {
    /// Reject values that would make a stage degenerate.
    pub fn validate(&self) -> Result<(), String> {
        let fractions = [
            ("gap_fraction", self.gap_fraction),
            ("fill_ratio", self.fill_ratio),
            ("sparse_rescue_ratio", self.sparse_rescue_ratio),
            ("ghost_column_ratio", self.ghost_column_ratio),
            ("overlap_threshold", self.overlap_threshold),
            ("header_skip", self.header_skip),
            ("header_zone", self.header_zone),
            ("footer_zone", self.footer_zone),
        ];
        for (name, v) in fractions {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{name} must be within 0–1, got {v}"));
            }
        }
        if self.sparse_rescue_ratio > self.fill_ratio {
            return Err(format!(
                "sparse_rescue_ratio ({}) must not exceed fill_ratio ({})",
                self.sparse_rescue_ratio, self.fill_ratio
            ));
        }
        if self.header_zone + self.footer_zone >= 1.0 {
            return Err("header_zone + footer_zone must leave part of the page".into());
        }
        if self.heading_factor < 1.0 {
            return Err(format!("heading_factor must be ≥ 1, got {}", self.heading_factor));
        }
        Ok(())
    }
}

/// Fraction of non-whitespace characters in `text` that are ASCII digits.
pub fn digit_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut digits = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if c.is_ascii_digit() {
            digits += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        digits as f64 / total as f64
    }
}
