//! Table and chart region detection.
//!
//! ## Passes
//!
//! ```text
//! chart-dominant page ──▶ one full-page ChartMarker, nothing else
//!        │ no
//!        ▼
//! bordered pass  (drawn grid lines, confidence 0.9)
//!        │ nothing found and borderless allowed
//!        ▼
//! borderless pass (whitespace rivers, confidence 0.7)
//!        │
//!        ▼
//! per-region chart reclassification + vector-cluster charts (0.8)
//!        │
//!        ▼
//! overlap resolution (confidence descending, ≥ 30 % of the smaller box)
//! ```
//!
//! A candidate that cannot be classified confidently is simply not emitted;
//! its text stays in the body. Emitting a malformed table is worse than
//! emitting a paragraph.

use crate::layout::analyzer::{whitespace_rivers, LayoutAnalysis};
use crate::layout::geometry::{
    BoundingBox, ChartKind, ChartMarker, Curve, GridLine, GridStructure, Region, TableRegion,
};
use crate::layout::LayoutTuning;
use tracing::debug;

const BORDERED_CONFIDENCE: f64 = 0.9;
const CHART_CONFIDENCE: f64 = 0.8;
const BORDERLESS_CONFIDENCE: f64 = 0.7;

/// Slack in points when matching vertical lines to a horizontal cluster's x extent.
const GRID_EDGE_SLACK: f64 = 2.0;
/// Vector boxes closer than this merge into one chart cluster.
const CHART_CLUSTER_GAP: f64 = 15.0;
/// Chart clusters smaller than this on either side are decoration.
const CHART_MIN_SIDE: f64 = 50.0;

/// Chart-type thresholds for [`chart_kind`].
const PIE_MIN_CURVES: usize = 10;
const BAR_MIN_RECTS: usize = 5;
const LINE_MIN_POINTS: usize = 10;

/// Detect every table and chart region on a page.
///
/// `allow_borderless` comes from the page's numeric pre-filter: text-heavy
/// pages only get the bordered pass.
pub fn detect(analysis: &LayoutAnalysis, tuning: &LayoutTuning, allow_borderless: bool) -> Vec<Region> {
    if analysis.is_chart_dominant(tuning) {
        debug!("chart-dominant page, skipping table detection");
        return vec![Region::Chart(page_chart(analysis, tuning))];
    }

    let mut candidates: Vec<Region> = detect_bordered(analysis, tuning)
        .into_iter()
        .map(|t| reclassify(analysis, t, tuning))
        .collect();

    let has_table = candidates.iter().any(|r| matches!(r, Region::Table(_)));
    if !has_table && allow_borderless {
        let zone = BoundingBox::new(0.0, 0.0, analysis.width, analysis.height);
        if let Some(t) = detect_borderless(analysis, tuning, &zone, 3) {
            candidates.push(reclassify(analysis, t, tuning));
        }
    }

    candidates.extend(chart_clusters(analysis, tuning).into_iter().map(Region::Chart));
    resolve_overlaps(candidates, tuning.overlap_threshold)
}

/// Full-page borderless pass for strongly numeric pages where nothing else was found.
///
/// The zone skips the top 10 % and bottom 5 % of the page, and a single
/// river (two boundaries) is accepted.
pub fn forced_borderless(analysis: &LayoutAnalysis, tuning: &LayoutTuning) -> Option<TableRegion> {
    let zone = BoundingBox::new(0.0, analysis.height * 0.10, analysis.width, analysis.height * 0.95);
    detect_borderless(analysis, tuning, &zone, 2)
}

// ── Bordered ─────────────────────────────────────────────────────────────

/// Tables drawn with explicit grid lines.
pub fn detect_bordered(analysis: &LayoutAnalysis, tuning: &LayoutTuning) -> Vec<TableRegion> {
    let mut horizontal = analysis.horizontal.clone();
    horizontal.sort_by(|a, b| a.position.total_cmp(&b.position));

    let mut tables = Vec::new();
    for cluster in cluster_by_position(&horizontal, tuning.cluster_gap) {
        if cluster.len() < 2 {
            continue;
        }
        let y_lo = cluster[0].position;
        let y_hi = cluster[cluster.len() - 1].position;
        let x_lo = cluster.iter().map(|l| l.start).fold(f64::INFINITY, f64::min) - GRID_EDGE_SLACK;
        let x_hi = cluster.iter().map(|l| l.end).fold(f64::NEG_INFINITY, f64::max) + GRID_EDGE_SLACK;

        let vertical: Vec<GridLine> = analysis
            .vertical
            .iter()
            .filter(|v| v.spans(y_lo, y_hi) && v.position >= x_lo && v.position <= x_hi)
            .copied()
            .collect();

        let grid = GridStructure::new(cluster.to_vec(), vertical);
        let rows = grid.row_boundaries();
        let cols = grid.column_boundaries();
        if rows.len() < 2 || cols.len() < 2 {
            debug!(rows = rows.len(), cols = cols.len(), "line cluster too sparse for a grid");
            continue;
        }
        let bbox = BoundingBox::new(cols[0], rows[0], cols[cols.len() - 1], rows[rows.len() - 1]);
        tables.push(TableRegion::new(bbox, BORDERED_CONFIDENCE, Some(grid), true));
    }
    tables
}

/// Split position-sorted lines into clusters separated by more than `gap`.
fn cluster_by_position(lines: &[GridLine], gap: f64) -> Vec<&[GridLine]> {
    let mut clusters = Vec::new();
    let mut start = 0;
    for i in 1..=lines.len() {
        if i == lines.len() || lines[i].position - lines[i - 1].position > gap {
            if start < i {
                clusters.push(&lines[start..i]);
            }
            start = i;
        }
    }
    clusters
}

// ── Borderless ───────────────────────────────────────────────────────────

/// A table inferred from whitespace rivers among the words inside `zone`.
///
/// Words in the page's header band are excluded from the river projection
/// unless that leaves nothing. `min_boundaries` counts the page edges.
pub fn detect_borderless(
    analysis: &LayoutAnalysis,
    tuning: &LayoutTuning,
    zone: &BoundingBox,
    min_boundaries: usize,
) -> Option<TableRegion> {
    let in_zone: Vec<_> = analysis
        .words
        .iter()
        .filter(|w| {
            let (cx, cy) = w.center();
            zone.contains_point(cx, cy)
        })
        .collect();
    if in_zone.len() < tuning.borderless_min_words {
        return None;
    }

    let header_limit = analysis.height * tuning.header_skip;
    let mut data: Vec<_> = in_zone
        .iter()
        .copied()
        .filter(|w| w.bbox.y0 > header_limit)
        .collect();
    if data.is_empty() {
        data = in_zone;
    }

    let rivers = whitespace_rivers(data.iter().copied(), analysis.width, tuning);
    if rivers.len() < min_boundaries.max(2) {
        debug!(boundaries = rivers.len(), "not enough whitespace rivers");
        return None;
    }

    let y_lo = data.iter().map(|w| w.bbox.y0).fold(f64::INFINITY, f64::min);
    let y_hi = data.iter().map(|w| w.bbox.y1).fold(f64::NEG_INFINITY, f64::max);
    let vertical = rivers
        .iter()
        .map(|&x| GridLine::vertical(x, y_lo, y_hi, 0.0))
        .collect();
    let bbox = BoundingBox::new(rivers[0], y_lo, rivers[rivers.len() - 1], y_hi);
    Some(TableRegion::new(
        bbox,
        BORDERLESS_CONFIDENCE,
        Some(GridStructure::new(Vec::new(), vertical)),
        false,
    ))
}

// ── Charts ───────────────────────────────────────────────────────────────

/// Guess the chart family from the vector art inside it.
pub fn chart_kind(curves: &[&Curve], rect_count: usize) -> ChartKind {
    if curves.len() > PIE_MIN_CURVES {
        ChartKind::Pie
    } else if rect_count > BAR_MIN_RECTS {
        ChartKind::Bar
    } else if curves.iter().any(|c| c.points > LINE_MIN_POINTS) {
        ChartKind::Line
    } else {
        ChartKind::Unknown
    }
}

/// The single marker emitted for a chart-dominant page.
pub fn page_chart(analysis: &LayoutAnalysis, tuning: &LayoutTuning) -> ChartMarker {
    let curves: Vec<&Curve> = analysis.significant_curves(tuning).collect();
    let kind = chart_kind(&curves, analysis.rects.len());
    ChartMarker::new(
        BoundingBox::new(0.0, 0.0, analysis.width, analysis.height),
        CHART_CONFIDENCE,
        kind,
    )
}

/// Re-check a table candidate for chart art inside its box.
fn reclassify(analysis: &LayoutAnalysis, table: TableRegion, tuning: &LayoutTuning) -> Region {
    let bbox = *table.bbox();
    let curves: Vec<&Curve> = analysis
        .curves
        .iter()
        .filter(|c| bbox.contains_point(c.bbox.x0, c.bbox.y0))
        .collect();
    let diagonals = analysis
        .diagonal
        .iter()
        .filter(|s| {
            let b = s.bbox();
            bbox.contains_point(b.x0, b.y0)
        })
        .count();

    if curves.len() > tuning.region_curve_threshold || diagonals > tuning.region_diagonal_threshold {
        let rects = analysis.rects.iter().filter(|r| bbox.contains(r)).count();
        let kind = chart_kind(&curves, rects);
        debug!(curves = curves.len(), diagonals, %kind, "table candidate reclassified as chart");
        Region::Chart(ChartMarker::new(bbox, CHART_CONFIDENCE, kind))
    } else {
        Region::Table(table)
    }
}

/// Charts that sit outside any table candidate: clusters of curves and diagonals.
fn chart_clusters(analysis: &LayoutAnalysis, tuning: &LayoutTuning) -> Vec<ChartMarker> {
    let mut boxes: Vec<BoundingBox> = analysis
        .significant_curves(tuning)
        .map(|c| c.bbox)
        .chain(analysis.diagonal.iter().map(|s| s.bbox()))
        .collect();

    let mut clusters = Vec::new();
    while let Some(mut current) = boxes.pop() {
        loop {
            let before = boxes.len();
            boxes.retain(|b| {
                if near(&current, b, CHART_CLUSTER_GAP) {
                    current = current.union(b);
                    false
                } else {
                    true
                }
            });
            if boxes.len() == before {
                break;
            }
        }
        clusters.push(current);
    }

    clusters
        .into_iter()
        .filter(|c| c.width() >= CHART_MIN_SIDE && c.height() >= CHART_MIN_SIDE)
        .filter_map(|bbox| {
            let curves: Vec<&Curve> = analysis
                .significant_curves(tuning)
                .filter(|c| bbox.contains(&c.bbox))
                .collect();
            let diagonals = analysis
                .diagonal
                .iter()
                .filter(|s| bbox.contains(&s.bbox()))
                .count();
            if curves.len() <= tuning.region_curve_threshold && diagonals <= tuning.region_diagonal_threshold {
                return None;
            }
            let rects = analysis.rects.iter().filter(|r| bbox.contains(r)).count();
            Some(ChartMarker::new(bbox, CHART_CONFIDENCE, chart_kind(&curves, rects)))
        })
        .collect()
}

fn near(a: &BoundingBox, b: &BoundingBox, gap: f64) -> bool {
    !(a.x1 + gap < b.x0 || b.x1 + gap < a.x0 || a.y1 + gap < b.y0 || b.y1 + gap < a.y0)
}

// ── Overlap ──────────────────────────────────────────────────────────────

/// Keep regions in confidence order, dropping any that overlap an accepted one.
pub fn resolve_overlaps(mut regions: Vec<Region>, threshold: f64) -> Vec<Region> {
    regions.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    let mut accepted: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if accepted
            .iter()
            .any(|kept| kept.bbox().overlaps(region.bbox(), threshold))
        {
            debug!(content = ?region.content_type(), "region dropped by overlap");
            continue;
        }
        accepted.push(region);
    }
    accepted
}
