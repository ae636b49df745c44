//! Grid-based table parsing: words → cells → pruned [`Matrix`].
//!
//! ## Sparse-row rescue
//!
//! Rows are normally kept only when at least `fill_ratio` of their cells are
//! filled. Financial tables often have section rows with a single label
//! ("Assets") spanning the table; those fail the ratio but are drawn with a
//! real rule above them. A row whose top boundary lies within
//! `sparse_rescue_distance` of a drawn horizontal line therefore only needs
//! `sparse_rescue_ratio` (in practice: one cell).
//!
//! ## Pruning
//!
//! [`prune`] runs to a fixpoint, so `prune(parse(..)) == parse(..)`.

use crate::layout::geometry::{BoundingBox, Glyph, GridStructure, Matrix, TableRegion, Word};
use crate::layout::{reconstruct, LayoutTuning};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// A lone page number, optionally localised ("Page 3", "Sayfa 3/10", "- 12 -").
static FOOTER_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:page|sayfa|bölüm)\s*)?-?\s*\d+(?:\s*[-/]\s*\d+)?\s*-?$")
        .expect("valid footer regex")
});

/// Line tolerance used when a region falls back to raw lines.
const RAW_LINE_TOLERANCE: f64 = 5.0;
/// Expected words per 5000 square points of a text-bearing region.
const RAW_DENSITY_UNIT: f64 = 5000.0;
const RAW_MIN_DENSITY: f64 = 0.3;

/// Parse a table region into a pruned matrix.
pub fn parse(region: &TableRegion, glyphs: &[Glyph], tuning: &LayoutTuning) -> Matrix {
    let bbox = region.bbox();
    let words = reconstruct::words_in_bbox(glyphs, bbox, tuning);
    let empty = GridStructure::default();
    let grid = region.grid().unwrap_or(&empty);
    parse_words(&words, bbox, grid, tuning)
}

/// Core of [`parse`] over already reconstructed words.
pub fn parse_words(words: &[Word], bbox: &BoundingBox, grid: &GridStructure, tuning: &LayoutTuning) -> Matrix {
    if words.is_empty() {
        return Matrix::default();
    }

    let mut cols = grid.column_boundaries();
    if cols.len() < 2 {
        cols = vec![bbox.x0, bbox.x1];
    }
    let mut rows = grid.row_boundaries();
    if rows.len() < 2 {
        rows = synthesize_rows(words, tuning.row_gap);
    }
    let (n_rows, n_cols) = (rows.len() - 1, cols.len() - 1);

    let mut cells: Vec<Vec<Vec<&str>>> = vec![vec![Vec::new(); n_cols]; n_rows];
    let mut ordered: Vec<&Word> = words.iter().collect();
    ordered.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    for w in ordered {
        let (cx, cy) = w.center();
        if let (Some(r), Some(c)) = (slot(&rows, cy), slot(&cols, cx)) {
            cells[r][c].push(w.text.as_str());
        }
    }

    let mut kept = Vec::with_capacity(n_rows);
    for (i, row) in cells.into_iter().enumerate() {
        let row: Vec<String> = row.into_iter().map(|ws| ws.join(" ")).collect();
        let filled = row.iter().filter(|c| !c.trim().is_empty()).count();
        let threshold = if grid.near_horizontal_line(rows[i], tuning.sparse_rescue_distance) {
            tuning.sparse_rescue_ratio
        } else {
            tuning.fill_ratio
        };
        let ratio = filled as f64 / n_cols as f64;
        if filled > 0 && ratio >= threshold {
            kept.push(row);
        } else if filled > 0 {
            debug!(row = i, ratio, threshold, "sparse row dropped");
        }
    }

    prune(Matrix::from_rows(kept), tuning)
}

/// Index `i` with `bounds[i] <= v < bounds[i + 1]`; the outer edge is inclusive.
fn slot(bounds: &[f64], v: f64) -> Option<usize> {
    let last = bounds.len().checked_sub(1)?;
    if v == bounds[last] && last > 0 {
        return Some(last - 1);
    }
    bounds.windows(2).position(|w| w[0] <= v && v < w[1])
}

/// Row boundaries from word tops when the region has no drawn rows.
fn synthesize_rows(words: &[Word], gap: f64) -> Vec<f64> {
    let mut sorted: Vec<&Word> = words.iter().collect();
    sorted.sort_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0));

    let first = sorted[0];
    let mut bounds = vec![first.bbox.y0 - 1.0];
    let mut bottom = first.bbox.y1;
    for w in &sorted[1..] {
        if w.bbox.y0 > bottom + gap {
            bounds.push((bottom + w.bbox.y0) / 2.0);
            bottom = w.bbox.y1;
        } else {
            bottom = bottom.max(w.bbox.y1);
        }
    }
    bounds.push(bottom + 1.0);
    bounds
}

/// Drop empty rows, trailing page-number rows and ghost columns until stable.
pub fn prune(matrix: Matrix, tuning: &LayoutTuning) -> Matrix {
    let mut rows = matrix.into_rows();
    loop {
        let before = (rows.len(), rows.first().map(Vec::len).unwrap_or(0));
        rows.retain(|r| r.iter().any(|c| !c.trim().is_empty()));
        strip_footer_rows(&mut rows);
        rows = drop_ghost_columns(rows, tuning.ghost_column_ratio);
        let after = (rows.len(), rows.first().map(Vec::len).unwrap_or(0));
        if after == before {
            return Matrix::from_rows(rows);
        }
    }
}

fn strip_footer_rows(rows: &mut Vec<Vec<String>>) {
    while let Some(last) = rows.last() {
        let mut filled = last.iter().filter(|c| !c.trim().is_empty());
        let is_footer = match (filled.next(), filled.next()) {
            (Some(only), None) => FOOTER_ROW.is_match(only.trim()),
            _ => false,
        };
        if !is_footer {
            break;
        }
        rows.pop();
    }
}

fn drop_ghost_columns(rows: Vec<Vec<String>>, ratio: f64) -> Vec<Vec<String>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(Vec::len).unwrap_or(0);
    if n_rows == 0 || n_cols == 0 {
        return rows;
    }
    let mut keep: Vec<usize> = (0..n_cols)
        .filter(|&c| {
            let filled = rows.iter().filter(|r| !r[c].trim().is_empty()).count();
            filled as f64 / n_rows as f64 >= ratio
        })
        .collect();
    if keep.is_empty() {
        keep.push(0);
    }
    if keep.len() == n_cols {
        return rows;
    }
    rows.into_iter()
        .map(|r| keep.iter().map(|&c| r[c].clone()).collect())
        .collect()
}

/// Text lines of a region that failed to parse into a table.
///
/// Returns `None` when the region holds too little text for its size; such a
/// region is most likely a scanned image and is left to OCR.
pub fn raw_lines(bbox: &BoundingBox, glyphs: &[Glyph], tuning: &LayoutTuning) -> Option<Vec<String>> {
    let loose = LayoutTuning {
        line_tolerance: RAW_LINE_TOLERANCE,
        ..tuning.clone()
    };
    let inside: Vec<&Glyph> = glyphs
        .iter()
        .filter(|g| bbox.contains_point(g.bbox.x0, g.bbox.y0))
        .collect();
    let lines = reconstruct::lines_from(inside, &loose);
    let word_count: usize = lines.iter().map(|l| l.words.len()).sum();
    let expected = bbox.area() / RAW_DENSITY_UNIT * RAW_MIN_DENSITY;
    if word_count == 0 || (word_count as f64) < expected {
        debug!(word_count, expected, "region too sparse for raw fallback");
        return None;
    }
    Some(lines.iter().map(|l| l.text()).collect())
}
