//! Markdown rendering of recovered structures.

use crate::layout::geometry::{ChartKind, Matrix};

/// Render a matrix as a GFM pipe table; the first row is the header.
///
/// Returns `None` for an empty matrix. Pipes inside cells are escaped and
/// embedded newlines collapse to spaces so a cell never breaks its row.
pub fn pipe_table(matrix: &Matrix) -> Option<String> {
    let rows = matrix.rows();
    let (header, body) = rows.split_first()?;
    let width = matrix.column_count();
    if width == 0 {
        return None;
    }

    let mut out = String::new();
    push_row(&mut out, header);
    out.push('|');
    for _ in 0..width {
        out.push_str(" --- |");
    }
    out.push('\n');
    for row in body {
        push_row(&mut out, row);
    }
    Some(out)
}

fn push_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_cell(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Fenced block for a region whose text could not be parsed as a table.
pub fn raw_block(page: usize, index: usize, lines: &[String]) -> String {
    let mut out = format!("**Raw Data {page}-{index}**\n\n```text\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("```\n");
    out
}

/// Image link for a chart snapshot, or a placeholder comment when no snapshot was taken.
pub fn chart_marker(kind: ChartKind, link: Option<&str>) -> String {
    match link {
        Some(path) => format!("![Chart ({kind})]({path})\n"),
        None => format!("<!-- chart: {kind} -->\n"),
    }
}

/// Heading line at `level` (1–3).
pub fn heading(level: u8, text: &str) -> String {
    let hashes = "#".repeat(usize::from(level.clamp(1, 6)));
    format!("{hashes} {text}")
}
