//! Value types shared by every layout stage.
//!
//! All coordinates are in page space with the origin at the **top-left**
//! corner and `y` growing downwards, so `y0` is a box's top edge and `y1` its
//! bottom edge. The pdfium extraction layer converts from PDF's bottom-left
//! origin once; nothing downstream ever sees the other convention.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── BoundingBox ──────────────────────────────────────────────────────────

/// Axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Build a box, normalising swapped corners.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Inclusive point containment.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.x0 <= x && x <= self.x1 && self.y0 <= y && y <= self.y1
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        (x0 < x1 && y0 < y1).then_some(BoundingBox { x0, y0, x1, y1 })
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Intersection area as a fraction of the **smaller** box's area.
    ///
    /// Zero-area boxes never overlap anything.
    pub fn overlap_fraction(&self, other: &BoundingBox) -> f64 {
        let min_area = self.area().min(other.area());
        if min_area <= 0.0 {
            return 0.0;
        }
        self.intersection(other)
            .map(|i| i.area() / min_area)
            .unwrap_or(0.0)
    }

    /// `true` when the shared area covers at least `threshold` of the smaller box.
    pub fn overlaps(&self, other: &BoundingBox, threshold: f64) -> bool {
        self.overlap_fraction(other) >= threshold
    }

    /// Smallest box enclosing every box in `boxes`.
    pub fn enclosing<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
        boxes.into_iter().copied().reduce(|a, b| a.union(&b))
    }
}

// ── Glyphs, words, lines ─────────────────────────────────────────────────

/// One positioned character as decoded from the page's content stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub text: String,
    pub bbox: BoundingBox,
    /// Font size in points.
    pub size: f64,
}

impl Glyph {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, size: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            size,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

/// Glyphs merged under the gap threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bbox: BoundingBox,
    /// Mean font size of the constituent glyphs.
    pub size: f64,
}

impl Word {
    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }
}

/// Words sharing one vertical band, ordered left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub words: Vec<Word>,
    pub bbox: BoundingBox,
}

impl Line {
    pub fn from_words(words: Vec<Word>) -> Option<Self> {
        let bbox = BoundingBox::enclosing(words.iter().map(|w| &w.bbox))?;
        Some(Self { words, bbox })
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Largest word font size on the line.
    pub fn max_size(&self) -> f64 {
        self.words.iter().map(|w| w.size).fold(0.0, f64::max)
    }
}

// ── Vector primitives ────────────────────────────────────────────────────

/// A straight stroke as extracted from a path object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// Stroke width in points.
    pub width: f64,
}

impl Segment {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, width: f64) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            width,
        }
    }

    pub fn length(&self) -> f64 {
        (self.x1 - self.x0).hypot(self.y1 - self.y0)
    }

    /// Angle from the horizontal axis in degrees, folded into `0..=90`.
    pub fn angle_degrees(&self) -> f64 {
        let dx = (self.x1 - self.x0).abs();
        let dy = (self.y1 - self.y0).abs();
        if dx == 0.0 && dy == 0.0 {
            return 0.0;
        }
        dy.atan2(dx).to_degrees()
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x0, self.y0, self.x1, self.y1)
    }
}

/// A Bézier-bearing path, summarised by its extent and point count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub bbox: BoundingBox,
    pub points: usize,
}

/// Everything the layout stages need from one page.
///
/// Produced by [`crate::pipeline::extract`] from pdfium, or built by hand in
/// tests. Read-only input to the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagePrimitives {
    pub width: f64,
    pub height: f64,
    pub glyphs: Vec<Glyph>,
    pub segments: Vec<Segment>,
    pub rects: Vec<BoundingBox>,
    pub curves: Vec<Curve>,
}

impl PagePrimitives {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, self.width, self.height)
    }

    /// Concatenated glyph text in content-stream order, without separators.
    pub fn raw_text(&self) -> String {
        self.glyphs.iter().map(|g| g.text.as_str()).collect()
    }
}

// ── Grid ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A detected separator line.
///
/// `position` is the y coordinate for horizontal lines and the x coordinate
/// for vertical ones; `start..=end` is the span along the other axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLine {
    pub orientation: Orientation,
    pub position: f64,
    pub start: f64,
    pub end: f64,
    /// Line weight; virtual lines synthesised from whitespace use 0.
    pub strength: f64,
}

impl GridLine {
    pub fn horizontal(y: f64, x_start: f64, x_end: f64, strength: f64) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            position: y,
            start: x_start.min(x_end),
            end: x_start.max(x_end),
            strength,
        }
    }

    pub fn vertical(x: f64, y_start: f64, y_end: f64, strength: f64) -> Self {
        Self {
            orientation: Orientation::Vertical,
            position: x,
            start: y_start.min(y_end),
            end: y_start.max(y_end),
            strength,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.orientation == Orientation::Horizontal
    }

    /// Whether the line's span overlaps `lo..=hi`.
    pub fn spans(&self, lo: f64, hi: f64) -> bool {
        self.start <= hi && self.end >= lo
    }
}

/// Horizontal and vertical separators of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStructure {
    pub horizontal: Vec<GridLine>,
    pub vertical: Vec<GridLine>,
}

/// Positions closer than this collapse into one boundary (double-stroked borders).
const BOUNDARY_MERGE_DISTANCE: f64 = 1.0;

impl GridStructure {
    pub fn new(horizontal: Vec<GridLine>, vertical: Vec<GridLine>) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    /// Sorted, de-duplicated y positions of the horizontal lines.
    pub fn row_boundaries(&self) -> Vec<f64> {
        sorted_boundaries(self.horizontal.iter().map(|l| l.position))
    }

    /// Sorted, de-duplicated x positions of the vertical lines.
    pub fn column_boundaries(&self) -> Vec<f64> {
        sorted_boundaries(self.vertical.iter().map(|l| l.position))
    }

    /// Whether `y` lies within `tolerance` of a real horizontal line.
    pub fn near_horizontal_line(&self, y: f64, tolerance: f64) -> bool {
        self.horizontal
            .iter()
            .any(|l| (l.position - y).abs() < tolerance)
    }
}

fn sorted_boundaries(positions: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = positions.filter(|p| p.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v.dedup_by(|b, a| (*b - *a).abs() < BOUNDARY_MERGE_DISTANCE);
    v
}

// ── Regions ──────────────────────────────────────────────────────────────

/// Classification outcome for a candidate region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Table,
    Chart,
    Text,
}

/// Coarse chart family guessed from vector content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartKind {
    Pie,
    Bar,
    Line,
    Unknown,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChartKind::Pie => "pie",
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Unknown => "unknown",
        })
    }
}

/// A region classified as a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    bbox: BoundingBox,
    confidence: f64,
    grid: Option<GridStructure>,
    is_bordered: bool,
}

impl TableRegion {
    pub fn new(bbox: BoundingBox, confidence: f64, grid: Option<GridStructure>, is_bordered: bool) -> Self {
        Self {
            bbox,
            confidence,
            grid,
            is_bordered,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn grid(&self) -> Option<&GridStructure> {
        self.grid.as_ref()
    }

    pub fn is_bordered(&self) -> bool {
        self.is_bordered
    }
}

/// A region classified as a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMarker {
    bbox: BoundingBox,
    confidence: f64,
    kind: ChartKind,
}

impl ChartMarker {
    pub fn new(bbox: BoundingBox, confidence: f64, kind: ChartKind) -> Self {
        Self {
            bbox,
            confidence,
            kind,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }
}

/// A classified page region. The classification is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Table(TableRegion),
    Chart(ChartMarker),
}

impl Region {
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            Region::Table(t) => t.bbox(),
            Region::Chart(c) => c.bbox(),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Region::Table(t) => t.confidence(),
            Region::Chart(c) => c.confidence(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Region::Table(_) => ContentType::Table,
            Region::Chart(_) => ContentType::Chart,
        }
    }
}

// ── Matrix ───────────────────────────────────────────────────────────────

/// Row-major table cells with a uniform row width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    rows: Vec<Vec<String>>,
}

impl Matrix {
    /// Build a matrix, padding short rows with empty cells.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply `f` to every cell, keeping the shape.
    pub fn map_cells(self, mut f: impl FnMut(&str) -> String) -> Self {
        Self {
            rows: self
                .rows
                .into_iter()
                .map(|row| row.iter().map(|c| f(c.as_str())).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_normalises_corners() {
        let b = BoundingBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(b, BoundingBox::new(0.0, 5.0, 10.0, 20.0));
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 15.0);
        assert_eq!(b.center(), (5.0, 12.5));
    }

    #[test]
    fn overlap_uses_smaller_area() {
        let big = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let small = BoundingBox::new(90.0, 90.0, 110.0, 110.0);
        // 10x10 shared out of a 20x20 small box
        assert!((big.overlap_fraction(&small) - 0.25).abs() < 1e-9);
        assert!(!big.overlaps(&small, 0.3));
        assert!(big.overlaps(&BoundingBox::new(10.0, 10.0, 20.0, 20.0), 0.3));
    }

    #[test]
    fn zero_area_never_overlaps() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let flat = BoundingBox::new(0.0, 5.0, 10.0, 5.0);
        assert_eq!(a.overlap_fraction(&flat), 0.0);
    }

    #[test]
    fn segment_angle_is_folded() {
        assert_eq!(Segment::new(0.0, 0.0, 10.0, 0.0, 1.0).angle_degrees(), 0.0);
        assert!((Segment::new(0.0, 10.0, 0.0, 0.0, 1.0).angle_degrees() - 90.0).abs() < 1e-9);
        assert!((Segment::new(10.0, 0.0, 0.0, 10.0, 1.0).angle_degrees() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn grid_boundaries_merge_double_strokes() {
        let grid = GridStructure::new(
            vec![
                GridLine::horizontal(50.0, 0.0, 100.0, 1.0),
                GridLine::horizontal(10.0, 0.0, 100.0, 1.0),
                GridLine::horizontal(10.4, 0.0, 100.0, 1.0),
            ],
            vec![],
        );
        assert_eq!(grid.row_boundaries(), vec![10.0, 50.0]);
        assert!(grid.near_horizontal_line(12.0, 3.0));
        assert!(!grid.near_horizontal_line(30.0, 3.0));
    }

    #[test]
    fn matrix_pads_to_uniform_width() {
        let m = Matrix::from_rows(vec![
            vec!["a".into()],
            vec!["b".into(), "c".into(), "d".into()],
        ]);
        assert_eq!(m.column_count(), 3);
        assert!(m.rows().iter().all(|r| r.len() == 3));
        assert_eq!(m.rows()[0], vec!["a", "", ""]);
    }

    #[test]
    fn region_reports_content_type() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let t = Region::Table(TableRegion::new(bbox, 0.9, None, true));
        let c = Region::Chart(ChartMarker::new(bbox, 0.8, ChartKind::Bar));
        assert_eq!(t.content_type(), ContentType::Table);
        assert_eq!(c.content_type(), ContentType::Chart);
        assert_eq!(c.confidence(), 0.8);
    }
}
