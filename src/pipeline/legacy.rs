//! Legacy table solver: a whitespace-stream fallback for numeric pages where
//! region detection and structure parsing found no usable table.
//!
//! The built-in [`StreamSolver`] groups words into text lines, splits each
//! line into cells at wide gaps, and takes the longest run of consecutive
//! multi-cell lines as the table. Column anchors come from clustering the
//! left edges of all cells in that run. Whatever it produces must still pass
//! [`validate_table`] before it is emitted.

use crate::layout::{reconstruct, BoundingBox, Line, LayoutTuning, Matrix, PagePrimitives};
use tracing::debug;

/// A table recovered by a legacy solver, with the area it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTable {
    pub matrix: Matrix,
    pub bbox: BoundingBox,
}

/// Fallback table extraction for a single page.
pub trait LegacyTableSolver: Send + Sync {
    fn solve(&self, page: &PagePrimitives, tuning: &LayoutTuning) -> Option<LegacyTable>;
}

/// Whitespace-stream table extraction.
#[derive(Debug, Clone)]
pub struct StreamSolver {
    /// Word gap, as a multiple of the word's font size, that starts a new cell.
    pub cell_gap_factor: f64,
    /// Cell left edges within this many points share a column.
    pub column_tolerance: f64,
    /// Consecutive multi-cell lines needed for a table.
    pub min_rows: usize,
}

impl Default for StreamSolver {
    fn default() -> Self {
        Self {
            cell_gap_factor: 1.0,
            column_tolerance: 10.0,
            min_rows: 2,
        }
    }
}

struct Cell {
    text: String,
    x0: f64,
}

impl StreamSolver {
    fn cells(&self, line: &Line) -> Vec<Cell> {
        let mut cells: Vec<Cell> = Vec::new();
        let mut prev_x1: Option<f64> = None;
        for word in &line.words {
            let gap = prev_x1.map(|x1| word.bbox.x0 - x1);
            match (gap, cells.last_mut()) {
                (Some(g), Some(cell)) if g < word.size * self.cell_gap_factor => {
                    cell.text.push(' ');
                    cell.text.push_str(&word.text);
                }
                _ => cells.push(Cell {
                    text: word.text.clone(),
                    x0: word.bbox.x0,
                }),
            }
            prev_x1 = Some(word.bbox.x1);
        }
        cells
    }

    fn anchors(&self, rows: &[Vec<Cell>]) -> Vec<f64> {
        let mut xs: Vec<f64> = rows.iter().flatten().map(|c| c.x0).collect();
        xs.sort_by(f64::total_cmp);
        let mut anchors: Vec<f64> = Vec::new();
        for x in xs {
            match anchors.last() {
                Some(&a) if x - a <= self.column_tolerance => {}
                _ => anchors.push(x),
            }
        }
        anchors
    }
}

impl LegacyTableSolver for StreamSolver {
    fn solve(&self, page: &PagePrimitives, tuning: &LayoutTuning) -> Option<LegacyTable> {
        let lines = reconstruct::lines(&page.glyphs, tuning);
        let split: Vec<Vec<Cell>> = lines.iter().map(|l| self.cells(l)).collect();

        // longest run of consecutive lines with at least two cells
        let (mut best, mut run_start) = ((0usize, 0usize), None::<usize>);
        for (i, cells) in split.iter().enumerate() {
            if cells.len() >= 2 {
                let start = *run_start.get_or_insert(i);
                if i + 1 - start > best.1 - best.0 {
                    best = (start, i + 1);
                }
            } else {
                run_start = None;
            }
        }
        let (from, to) = best;
        if to - from < self.min_rows {
            debug!(rows = to - from, "stream solver found no table run");
            return None;
        }

        let run: Vec<Vec<Cell>> = split.into_iter().skip(from).take(to - from).collect();
        let anchors = self.anchors(&run);
        let rows: Vec<Vec<String>> = run
            .iter()
            .map(|cells| {
                let mut row = vec![String::new(); anchors.len()];
                for cell in cells {
                    let col = anchors.iter().rposition(|&a| a <= cell.x0 + self.column_tolerance).unwrap_or(0);
                    if !row[col].is_empty() {
                        row[col].push(' ');
                    }
                    row[col].push_str(&cell.text);
                }
                row
            })
            .collect();
        let bbox = BoundingBox::enclosing(lines[from..to].iter().map(|l| &l.bbox))?;
        Some(LegacyTable {
            matrix: Matrix::from_rows(rows),
            bbox,
        })
    }
}

/// Cells longer than this read as paragraphs, not table data.
const PARAGRAPH_CELL_CHARS: usize = 60;
const MAX_PARAGRAPH_CELLS: f64 = 0.30;
const MAX_EMPTY_CELLS: f64 = 0.85;
const MAX_COLUMN_SPREAD: usize = 3;

/// Whether a solver's matrix looks like a real table rather than prose.
///
/// Requires at least two rows and two columns, at most 30 % paragraph-length
/// cells among the non-empty ones, at most 85 % empty cells overall, and
/// per-row filled-cell counts that vary by no more than 3×.
pub fn validate_table(matrix: &Matrix) -> bool {
    if matrix.row_count() < 2 || matrix.column_count() < 2 {
        return false;
    }
    let mut filled = 0usize;
    let mut long = 0usize;
    let mut slots = 0usize;
    let mut per_row = Vec::with_capacity(matrix.row_count());
    for row in matrix.rows() {
        slots += row.len();
        let mut n = 0;
        for cell in row {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            n += 1;
            if cell.chars().count() > PARAGRAPH_CELL_CHARS {
                long += 1;
            }
        }
        filled += n;
        if n > 0 {
            per_row.push(n);
        }
    }
    if filled > 0 && long as f64 / filled as f64 > MAX_PARAGRAPH_CELLS {
        debug!(long, filled, "legacy table rejected: paragraph cells");
        return false;
    }
    if slots > 0 && (slots - filled) as f64 / slots as f64 > MAX_EMPTY_CELLS {
        debug!(filled, slots, "legacy table rejected: too sparse");
        return false;
    }
    if let (Some(&max), Some(&min)) = (per_row.iter().max(), per_row.iter().min()) {
        if max > min * MAX_COLUMN_SPREAD {
            debug!(max, min, "legacy table rejected: ragged rows");
            return false;
        }
    }
    true
}
