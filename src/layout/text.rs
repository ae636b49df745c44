//! Page structure extraction: body text with heading levels.
//!
//! ## Pipeline
//!
//! ```text
//! glyphs ─▶ mask (claimed regions, header/footer zones)
//!        ─▶ reconstruct lines
//!        ─▶ drop minority-size runs matching a validated watermark
//!        ─▶ classify headings against the modal body size
//!        ─▶ heal (language detected once per page)
//! ```
//!
//! Masking keeps table and chart text from reappearing as body text. The
//! watermark filter is deliberately narrow: a run in a smaller or larger
//! font is only removed when it matches a watermark validated for this
//! document, so bold or italic emphasis survives.

use crate::heal::TextHealer;
use crate::layout::geometry::{BoundingBox, Glyph, Line, PagePrimitives, Word};
use crate::layout::markdown;
use crate::layout::reconstruct;
use crate::layout::LayoutTuning;
use crate::watermark::ValidatedWatermarkSet;
use std::collections::HashMap;
use tracing::debug;

/// One output line of body text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Heading level 1–3, `None` for body text.
    pub heading: Option<u8>,
    /// Largest font size on the line.
    pub size: f64,
}

/// Body text of one page, top to bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub lines: Vec<TextLine>,
    /// Modal line size used as the heading baseline; 0 for an empty page.
    pub body_size: f64,
}

impl PageText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Plain text, one line per line.
    pub fn plain(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Markdown: headings as `#` lines separated by blank lines, body lines as-is.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line.heading {
                Some(level) => {
                    if !out.is_empty() && !out.ends_with("\n\n") {
                        out.push('\n');
                    }
                    out.push_str(&markdown::heading(level, &line.text));
                    out.push_str("\n\n");
                }
                None => {
                    out.push_str(&line.text);
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Extract heading-tagged body text from `page`, skipping `claimed` regions.
pub fn extract(
    page: &PagePrimitives,
    claimed: &[BoundingBox],
    watermarks: &ValidatedWatermarkSet,
    healer: &TextHealer,
    tuning: &LayoutTuning,
) -> PageText {
    let visible = visible_glyphs(page, claimed, tuning);
    let mut lines = reconstruct::lines_from(visible, tuning);

    if !watermarks.is_empty() {
        lines = lines
            .into_iter()
            .filter_map(|line| strip_minority_watermarks(line, watermarks))
            .collect();
    }

    let body_size = modal_size(&lines);
    let raw: Vec<(String, Option<u8>, f64)> = lines
        .iter()
        .map(|l| {
            let text = l.text();
            let level = heading_level(l.max_size(), body_size, text.chars().count(), tuning);
            (text, level, l.max_size())
        })
        .collect();

    let joined = raw.iter().map(|(t, _, _)| t.as_str()).collect::<Vec<_>>().join("\n");
    let lang = healer.detect_language(&joined);
    debug!(lines = raw.len(), body_size, %lang, "page text reconstructed");

    let lines = raw
        .into_iter()
        .map(|(text, heading, size)| TextLine {
            text: healer.heal_line(&text, lang),
            heading,
            size,
        })
        .filter(|l| !l.text.trim().is_empty())
        .collect();
    PageText { lines, body_size }
}

/// Glyphs whose centre lies outside every claimed region and inside the body zone.
fn visible_glyphs<'a>(page: &'a PagePrimitives, claimed: &[BoundingBox], tuning: &LayoutTuning) -> Vec<&'a Glyph> {
    let top = page.height * tuning.header_zone;
    let bottom = page.height * (1.0 - tuning.footer_zone);
    page.glyphs
        .iter()
        .filter(|g| {
            let (cx, cy) = g.bbox.center();
            cy >= top && cy <= bottom && !claimed.iter().any(|r| r.contains_point(cx, cy))
        })
        .collect()
}

/// Most frequent line size, at 0.1pt resolution; ties go to the smaller size.
pub fn modal_size(lines: &[Line]) -> f64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for l in lines {
        let size = l.max_size();
        if size > 0.0 && size.is_finite() {
            *counts.entry((size * 10.0).round() as i64).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(sa, ca), (sb, cb)| ca.cmp(cb).then(sb.cmp(sa)))
        .map(|(s, _)| s as f64 / 10.0)
        .unwrap_or(0.0)
}

/// Heading level for a line of `size` over a `body` baseline.
///
/// A heading must clear both the relative factor and the absolute delta, and
/// stay under the length cap. Above 2× body it is H1, above 1.5× H2, else H3.
pub fn heading_level(size: f64, body: f64, chars: usize, tuning: &LayoutTuning) -> Option<u8> {
    if body <= 0.0 || chars == 0 || chars >= tuning.heading_max_chars {
        return None;
    }
    if size < body * tuning.heading_factor || size - body < tuning.heading_min_delta {
        return None;
    }
    let ratio = size / body;
    Some(if ratio > 2.0 {
        1
    } else if ratio > 1.5 {
        2
    } else {
        3
    })
}

/// Remove words of a minority size cluster whose text matches a watermark.
///
/// Words are clustered by rounded size; the dominant cluster holds the most
/// characters. Returns `None` when nothing is left of the line.
fn strip_minority_watermarks(line: Line, watermarks: &ValidatedWatermarkSet) -> Option<Line> {
    let mut weight: HashMap<i64, usize> = HashMap::new();
    for w in &line.words {
        *weight.entry(size_key(w)).or_default() += w.text.chars().count();
    }
    if weight.len() < 2 {
        return Some(line);
    }
    let Some(dominant) = weight
        .iter()
        .max_by(|(ka, a), (kb, b)| a.cmp(b).then(kb.cmp(ka)))
        .map(|(k, _)| *k)
    else {
        return Some(line);
    };

    let doomed: Vec<i64> = weight
        .keys()
        .copied()
        .filter(|&k| k != dominant)
        .filter(|&k| {
            let run: String = line
                .words
                .iter()
                .filter(|w| size_key(w) == k)
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            watermarks.matches_fragment(&run)
        })
        .collect();
    if doomed.is_empty() {
        return Some(line);
    }

    debug!(clusters = doomed.len(), "minority-size watermark run removed");
    let words: Vec<Word> = line
        .words
        .into_iter()
        .filter(|w| !doomed.contains(&size_key(w)))
        .collect();
    Line::from_words(words)
}

fn size_key(w: &Word) -> i64 {
    w.size.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::reconstruct::tests::glyph_run;

    fn page(glyphs: Vec<Glyph>) -> PagePrimitives {
        let mut p = PagePrimitives::new(600.0, 800.0);
        p.glyphs = glyphs;
        p
    }

    fn run(text: &str, x: f64, y: f64, size: f64) -> Vec<Glyph> {
        // whitespace glyphs in `text` split words
        glyph_run(text, x, y, size, size * 0.5)
    }

    fn extract_default(p: &PagePrimitives, claimed: &[BoundingBox], wm: &ValidatedWatermarkSet) -> PageText {
        extract(p, claimed, wm, TextHealer::shared(), &LayoutTuning::default())
    }

    #[test]
    fn large_short_line_is_a_heading() {
        let mut g = run("Introduction", 50.0, 100.0, 24.0);
        g.extend(run("body text one", 50.0, 140.0, 10.0));
        g.extend(run("body text two", 50.0, 160.0, 10.0));
        g.extend(run("body text three", 50.0, 180.0, 10.0));
        let t = extract_default(&page(g), &[], &ValidatedWatermarkSet::empty());
        assert_eq!(t.body_size, 10.0);
        assert_eq!(t.lines[0].heading, Some(1));
        assert_eq!(t.lines[0].text, "Introduction");
        assert!(t.lines[1..].iter().all(|l| l.heading.is_none()));
        assert!(t.to_markdown().starts_with("# Introduction\n\nbody text one\n"));
    }

    #[test]
    fn heading_needs_absolute_delta_too() {
        let tuning = LayoutTuning::default();
        // 1.5x but only 1.5pt above a 3pt body
        assert_eq!(heading_level(4.5, 3.0, 10, &tuning), None);
        assert_eq!(heading_level(13.0, 10.0, 10, &tuning), Some(3));
        assert_eq!(heading_level(16.0, 10.0, 10, &tuning), Some(2));
        assert_eq!(heading_level(21.0, 10.0, 10, &tuning), Some(1));
        // long emphasised sentence
        assert_eq!(heading_level(21.0, 10.0, 150, &tuning), None);
        assert_eq!(heading_level(21.0, 0.0, 10, &tuning), None);
    }

    #[test]
    fn claimed_regions_are_masked() {
        let mut g = run("kept line", 50.0, 100.0, 10.0);
        g.extend(run("table cell", 50.0, 300.0, 10.0));
        let claimed = [BoundingBox::new(40.0, 290.0, 300.0, 320.0)];
        let t = extract_default(&page(g), &claimed, &ValidatedWatermarkSet::empty());
        assert_eq!(t.plain(), "kept line");
    }

    #[test]
    fn header_and_footer_zones_are_masked() {
        let mut g = run("running header", 50.0, 2.0, 10.0);
        g.extend(run("content", 50.0, 400.0, 10.0));
        g.extend(run("42", 300.0, 785.0, 10.0));
        let t = extract_default(&page(g), &[], &ValidatedWatermarkSet::empty());
        assert_eq!(t.plain(), "content");
    }

    #[test]
    fn minority_watermark_run_is_removed() {
        let mut g = run("quarterly results are strong", 50.0, 100.0, 10.0);
        g.extend(run("DRAFT", 300.0, 100.0, 6.0));
        let wm = ValidatedWatermarkSet::new(vec!["draft".to_string()]);
        let t = extract_default(&page(g), &[], &wm);
        assert_eq!(t.plain(), "quarterly results are strong");
    }

    #[test]
    fn minority_emphasis_without_watermark_is_kept() {
        let mut g = run("quarterly results are strong", 50.0, 100.0, 10.0);
        g.extend(run("IMPORTANT", 300.0, 100.0, 6.0));
        let wm = ValidatedWatermarkSet::new(vec!["draft".to_string()]);
        let t = extract_default(&page(g), &[], &wm);
        assert!(t.plain().ends_with("IMPORTANT"));
    }

    #[test]
    fn minority_word_shared_with_a_watermark_is_kept() {
        let mut g = run("for staff", 50.0, 100.0, 10.0);
        g.extend(run("use", 300.0, 100.0, 6.0));
        let wm = ValidatedWatermarkSet::new(vec!["Internal Use Only".to_string()]);
        let t = extract_default(&page(g), &[], &wm);
        assert!(t.plain().ends_with("use"), "{}", t.plain());
    }

    #[test]
    fn dominant_cluster_is_never_stripped() {
        let g = run("draft notes", 50.0, 100.0, 10.0);
        let wm = ValidatedWatermarkSet::new(vec!["draft".to_string()]);
        let t = extract_default(&page(g), &[], &wm);
        assert_eq!(t.plain(), "draft notes");
    }

    #[test]
    fn modal_size_prefers_smaller_on_tie() {
        let tuning = LayoutTuning::default();
        let mut g = run("a", 10.0, 10.0, 12.0);
        g.extend(run("b", 10.0, 40.0, 10.0));
        let lines = reconstruct::lines(&g, &tuning);
        assert_eq!(modal_size(&lines), 10.0);
        assert_eq!(modal_size(&[]), 0.0);
    }

    #[test]
    fn body_lines_are_healed() {
        let g = run("t he report", 50.0, 100.0, 10.0);
        let t = extract_default(&page(g), &[], &ValidatedWatermarkSet::empty());
        assert_eq!(t.plain(), "the report");
    }
}
