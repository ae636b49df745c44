//! Glyph → word → line reconstruction.
//!
//! PDF content streams position every glyph individually; many producers
//! never emit space characters, and tight kerning in Turkish fonts leaves
//! gaps *inside* words that are nearly as wide as gaps *between* them. A
//! fixed point threshold fails one way or the other, so the merge threshold
//! scales with the glyph's own font size:
//!
//! ```text
//! gap ≤ size × gap_fraction   → same word
//! gap >  size × gap_fraction  → new word
//! ```
//!
//! A whitespace glyph always ends the current word, regardless of width.

use crate::layout::geometry::{BoundingBox, Glyph, Line, Word};
use crate::layout::LayoutTuning;

/// Reconstruct words from the glyphs whose top-left corner lies inside `bbox`.
pub fn words_in_bbox(glyphs: &[Glyph], bbox: &BoundingBox, tuning: &LayoutTuning) -> Vec<Word> {
    let inside: Vec<&Glyph> = glyphs
        .iter()
        .filter(|g| bbox.contains_point(g.bbox.x0, g.bbox.y0))
        .collect();
    lines_from(inside, tuning)
        .into_iter()
        .flat_map(|l| l.words)
        .collect()
}

/// Reconstruct every glyph of `glyphs` into words, in reading order.
pub fn words(glyphs: &[Glyph], tuning: &LayoutTuning) -> Vec<Word> {
    lines(glyphs, tuning).into_iter().flat_map(|l| l.words).collect()
}

/// Reconstruct lines of words, top to bottom.
pub fn lines(glyphs: &[Glyph], tuning: &LayoutTuning) -> Vec<Line> {
    lines_from(glyphs.iter().collect(), tuning)
}

/// Core of the reconstructor, over an already-filtered glyph set.
pub fn lines_from(mut glyphs: Vec<&Glyph>, tuning: &LayoutTuning) -> Vec<Line> {
    glyphs.retain(|g| !g.text.is_empty() && g.bbox.x0.is_finite() && g.bbox.y0.is_finite());
    glyphs.sort_by(|a, b| {
        a.bbox
            .y0
            .round()
            .total_cmp(&b.bbox.y0.round())
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    group_rows(glyphs, tuning.line_tolerance)
        .into_iter()
        .filter_map(|mut row| {
            row.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            Line::from_words(merge_row(&row, tuning.gap_fraction))
        })
        .collect()
}

/// Split y-sorted glyphs into rows whose tops stay within `tolerance` of the row's first glyph.
fn group_rows(glyphs: Vec<&Glyph>, tolerance: f64) -> Vec<Vec<&Glyph>> {
    let mut rows: Vec<Vec<&Glyph>> = Vec::new();
    let mut row_top = f64::NEG_INFINITY;
    for g in glyphs {
        match rows.last_mut() {
            Some(row) if (g.bbox.y0 - row_top).abs() <= tolerance => row.push(g),
            _ => {
                row_top = g.bbox.y0;
                rows.push(vec![g]);
            }
        }
    }
    rows
}

/// Merge one x-sorted row of glyphs into words.
fn merge_row(row: &[&Glyph], gap_fraction: f64) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Vec<&Glyph> = Vec::new();

    for &g in row {
        if g.is_whitespace() {
            flush(&mut current, &mut words);
            continue;
        }
        if let Some(prev) = current.last() {
            let gap = g.bbox.x0 - prev.bbox.x1;
            if gap > prev.size * gap_fraction {
                flush(&mut current, &mut words);
            }
        }
        current.push(g);
    }
    flush(&mut current, &mut words);
    words
}

fn flush(current: &mut Vec<&Glyph>, out: &mut Vec<Word>) {
    if current.is_empty() {
        return;
    }
    let text: String = current.iter().map(|g| g.text.as_str()).collect();
    let Some(bbox) = BoundingBox::enclosing(current.iter().map(|g| &g.bbox)) else {
        return;
    };
    let size = current.iter().map(|g| g.size).sum::<f64>() / current.len() as f64;
    out.push(Word { text, bbox, size });
    current.clear();
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Lay out `text` as glyphs starting at (x, y), `advance` points apart.
    pub(crate) fn glyph_run(text: &str, x: f64, y: f64, size: f64, advance: f64) -> Vec<Glyph> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                let x0 = x + i as f64 * advance;
                Glyph::new(
                    c.to_string(),
                    BoundingBox::new(x0, y, x0 + advance * 0.9, y + size),
                    size,
                )
            })
            .collect()
    }

    #[test]
    fn tight_glyphs_merge_into_one_word() {
        let glyphs = glyph_run("Güç", 10.0, 10.0, 10.0, 5.0);
        let w = words(&glyphs, &LayoutTuning::default());
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].text, "Güç");
        assert_eq!(w[0].size, 10.0);
    }

    #[test]
    fn gap_above_fraction_splits_words() {
        let mut glyphs = glyph_run("ab", 10.0, 10.0, 10.0, 5.0);
        // "b" ends at 19.5; a gap of 3 > 10 * 0.20
        glyphs.extend(glyph_run("cd", 22.5, 10.0, 10.0, 5.0));
        let w = words(&glyphs, &LayoutTuning::default());
        let texts: Vec<_> = w.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd"]);
    }

    #[test]
    fn gap_fraction_is_tunable() {
        let mut glyphs = glyph_run("ab", 10.0, 10.0, 10.0, 5.0);
        glyphs.extend(glyph_run("cd", 22.5, 10.0, 10.0, 5.0));
        let loose = LayoutTuning {
            gap_fraction: 0.5,
            ..LayoutTuning::default()
        };
        assert_eq!(words(&glyphs, &loose)[0].text, "abcd");
    }

    #[test]
    fn whitespace_glyph_breaks_words() {
        let glyphs = glyph_run("a b", 10.0, 10.0, 10.0, 5.0);
        let texts: Vec<_> = words(&glyphs, &LayoutTuning::default())
            .into_iter()
            .map(|w| w.text)
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn lines_follow_vertical_position() {
        let mut glyphs = glyph_run("second", 10.0, 40.0, 10.0, 5.0);
        glyphs.extend(glyph_run("first", 10.0, 10.0, 10.0, 5.0));
        // slight baseline jitter stays on the same line
        glyphs.extend(glyph_run("x", 60.0, 11.5, 10.0, 5.0));
        let ls = lines(&glyphs, &LayoutTuning::default());
        assert_eq!(ls.len(), 2);
        assert_eq!(ls[0].text(), "first x");
        assert_eq!(ls[1].text(), "second");
    }

    #[test]
    fn bbox_filter_uses_top_left_corner() {
        let mut glyphs = glyph_run("in", 10.0, 10.0, 10.0, 5.0);
        glyphs.extend(glyph_run("out", 200.0, 10.0, 10.0, 5.0));
        let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let w = words_in_bbox(&glyphs, &region, &LayoutTuning::default());
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].text, "in");
    }
}
