//! Post-processing: deterministic line-level cleanup of recovered body text.
//!
//! ## Why is post-processing necessary?
//!
//! Geometry-based extraction is faithful to the page, including the parts a
//! reader never wants in the Markdown:
//!
//! - Machine-translation banners stamped on every page
//! - A lone page number left at the bottom of the body after footer masking
//! - Watermark text drawn in the body font, which the minority-font filter
//!   in [`crate::layout::text`] cannot see
//! - Zero-width and BOM characters from copy-pasted source documents
//!
//! Each rule is a pure `&str → String` pass, independently testable. Tables
//! never pass through here; only body text and OCR text do.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule sees `\n` only.
//! Line-dropping rules run before the page-number rule, so a number exposed
//! by a removed banner is still recognised as trailing. Blank-line collapse
//! runs last.

use crate::config::CleaningSettings;
use crate::watermark::ValidatedWatermarkSet;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Compiled cleaning rules for one document.
#[derive(Debug, Clone)]
pub struct Cleaner {
    blacklist: Vec<Regex>,
    watermarks: ValidatedWatermarkSet,
    strip_page_numbers: bool,
}

impl Cleaner {
    /// Compile `settings`; an invalid blacklist pattern names itself in the error.
    pub fn new(settings: &CleaningSettings, watermarks: ValidatedWatermarkSet) -> Result<Self, String> {
        Ok(Self {
            blacklist: settings.compile()?,
            watermarks,
            strip_page_numbers: settings.strip_page_numbers,
        })
    }

    /// Apply every rule in order.
    pub fn clean(&self, input: &str) -> String {
        let s = normalise_line_endings(input);
        let s = remove_invisible_chars(&s);
        let s = self.drop_blacklisted(&s);
        let s = self.drop_watermark_lines(&s);
        let s = trim_trailing_whitespace(&s);
        let s = if self.strip_page_numbers {
            strip_trailing_page_number(&s)
        } else {
            s
        };
        collapse_blank_lines(&s).trim().to_string()
    }

    fn drop_blacklisted(&self, input: &str) -> String {
        if self.blacklist.is_empty() {
            return input.to_string();
        }
        keep_lines(input, |line| {
            let garbage = self.blacklist.iter().any(|re| re.is_match(line));
            if garbage {
                debug!(line, "blacklisted line dropped");
            }
            !garbage
        })
    }

    fn drop_watermark_lines(&self, input: &str) -> String {
        if self.watermarks.is_empty() {
            return input.to_string();
        }
        keep_lines(input, |line| !is_watermark_line(line, &self.watermarks))
    }
}

fn keep_lines(input: &str, keep: impl Fn(&str) -> bool) -> String {
    input.lines().filter(|l| keep(l)).collect::<Vec<_>>().join("\n")
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Watermark lines ──────────────────────────────────────────────────
//
// A line is a watermark line when nothing alphanumeric is left after every
// validated pattern is cut out of it. "TASLAK" and "- TASLAK -" go; a
// sentence that merely mentions the word stays untouched.

fn is_watermark_line(line: &str, watermarks: &ValidatedWatermarkSet) -> bool {
    if !watermarks.matches(line) {
        return false;
    }
    let mut rest = line.to_lowercase();
    for pattern in watermarks.patterns() {
        let pattern = pattern.to_lowercase();
        if !pattern.is_empty() {
            rest = rest.replace(&pattern, "");
        }
    }
    // patterns may have been matched across spacing differences
    let squashed: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
    let leftover = watermarks
        .patterns()
        .iter()
        .fold(squashed, |acc, p| {
            let p: String = p.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
            if p.is_empty() {
                acc
            } else {
                acc.replace(&p, "")
            }
        });
    !leftover.chars().any(char::is_alphanumeric)
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trailing standalone page number ─────────────────────────────────

static RE_TRAILING_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\n)\s*\d+\s*$").unwrap());

fn strip_trailing_page_number(input: &str) -> String {
    RE_TRAILING_PAGE_NUMBER.replace(input, "").to_string()
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner(watermarks: &[&str]) -> Cleaner {
        Cleaner::new(
            &CleaningSettings::default(),
            ValidatedWatermarkSet::new(watermarks.iter().map(|s| s.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_blacklisted_banners_are_dropped() {
        let input = "Intro line\nMachine Translated by Google\nBody text\ntranslated BY someone";
        assert_eq!(cleaner(&[]).clean(input), "Intro line\nBody text");
    }

    #[test]
    fn test_trailing_page_number() {
        assert_eq!(strip_trailing_page_number("Body text\n  12  "), "Body text");
        assert_eq!(strip_trailing_page_number("7"), "");
        // a number inside a sentence is not a page number
        assert_eq!(strip_trailing_page_number("Revenue grew 12"), "Revenue grew 12");
    }

    #[test]
    fn test_page_numbers_kept_when_disabled() {
        let settings = CleaningSettings {
            strip_page_numbers: false,
            ..CleaningSettings::default()
        };
        let c = Cleaner::new(&settings, ValidatedWatermarkSet::empty()).unwrap();
        assert_eq!(c.clean("Body\n3"), "Body\n3");
    }

    #[test]
    fn test_watermark_lines() {
        let wm = ValidatedWatermarkSet::new(vec!["TASLAK".to_string()]);
        assert!(is_watermark_line("TASLAK", &wm));
        assert!(is_watermark_line("- T A S L A K -", &wm));
        assert!(!is_watermark_line("Bu belge taslak halindedir", &wm));
        assert!(!is_watermark_line("Unrelated", &wm));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_full_pipeline() {
        let input = "# Title\r\n\r\nSome text   \nCONFIDENTIAL\n\n\n\nGoogle Translate\nMore text\n\n4\n";
        let out = cleaner(&["confidential"]).clean(input);
        assert_eq!(out, "# Title\n\nSome text\n\nMore text");
    }
}
