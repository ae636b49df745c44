//! OCR collaborator: trigger heuristic and the Tesseract CLI engine.
//!
//! The engine sees the chunk sub-document path, the 1-indexed page number
//! within it and the text already extracted from that page. It returns
//! replacement text, or the extracted text unchanged when it has nothing
//! better. The caller decides what to do with a difference.

use crate::config::OcrSettings;
use crate::heal::{Dictionary, Language};
use crate::pipeline::page::PageSource;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Pages with less extracted text than this are always OCR'd in auto mode.
pub const MIN_TEXT_CHARS: usize = 50;
/// Pages whose space-to-length ratio is below this look like merged words.
pub const MIN_SPACE_RATIO: f64 = 0.05;

/// Whether extracted text is poor enough to warrant OCR.
///
/// Fires on empty text, fewer than [`MIN_TEXT_CHARS`] characters, or a
/// space ratio below [`MIN_SPACE_RATIO`].
pub fn needs_ocr(text: &str) -> bool {
    let stripped = text.trim();
    let len = stripped.chars().count();
    if len < MIN_TEXT_CHARS {
        return true;
    }
    let spaces = stripped.chars().filter(|&c| c == ' ').count();
    (spaces as f64 / len as f64) < MIN_SPACE_RATIO
}

/// One page handed to an [`OcrEngine`].
pub struct OcrPage<'a> {
    /// The chunk sub-document containing the page.
    pub pdf: &'a Path,
    /// 1-indexed page number within `pdf`.
    pub page: usize,
    /// Text already extracted from the page.
    pub extracted: &'a str,
    /// Access to the page raster.
    pub source: &'a dyn PageSource,
}

/// Produces replacement text for a page.
pub trait OcrEngine: Send + Sync {
    /// Text for `page`, or `page.extracted` unchanged when OCR has nothing better.
    fn recognize(&self, page: &OcrPage<'_>) -> Result<String, String>;
}

/// Tesseract driven through its command-line interface.
///
/// Renders the page at the configured DPI, converts it to grayscale, and
/// runs a short list of page-segmentation strategies, keeping the best
/// scoring output. Scoring favours many real words: dictionary hits, long
/// average word length and a high alphanumeric ratio.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    languages: String,
    dpi: u32,
    dictionary: Option<Dictionary>,
}

/// Tesseract argument sets tried in order.
const STRATEGIES: &[&[&str]] = &[
    &["--oem", "1", "--psm", "6"],
    &["--oem", "1", "--psm", "6", "-c", "thresholding_method=2", "-c", "thresholding_kfactor=0.3"],
    &["--oem", "1", "--psm", "11", "-c", "thresholding_method=2", "-c", "thresholding_kfactor=0.3"],
];

/// A strategy scoring at least this ends the search early.
const GOOD_ENOUGH_SCORE: i64 = 40;

impl TesseractCli {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            languages: settings.languages.clone(),
            dpi: settings.dpi,
            dictionary: None,
        }
    }

    /// Score candidates by dictionary hits too.
    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    fn run(&self, image: &Path, extra: &[&str]) -> Result<String, String> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .args(extra)
            .output()
            .map_err(|e| format!("cannot run {}: {e}", self.binary.display()))?;
        if !output.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn score(&self, text: &str) -> i64 {
        let base = score_text(text);
        match &self.dictionary {
            Some(dict) if base > 0 => base + dictionary_bonus(text, dict),
            _ => base,
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, page: &OcrPage<'_>) -> Result<String, String> {
        let raster = page.source.render(self.dpi)?.grayscale();
        let file = tempfile::Builder::new()
            .prefix("pdfstruct_ocr_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| format!("temp image: {e}"))?;
        raster
            .save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| format!("temp image: {e}"))?;

        let mut best: Option<(i64, String)> = None;
        let mut last_err = None;
        for args in STRATEGIES {
            match self.run(file.path(), args) {
                Ok(text) => {
                    let score = self.score(&text);
                    debug!(page = page.page, ?args, score, "OCR strategy scored");
                    if best.as_ref().is_none_or(|(s, _)| score > *s) {
                        best = Some((score, text));
                    }
                    if score >= GOOD_ENOUGH_SCORE {
                        break;
                    }
                }
                Err(e) => {
                    warn!(page = page.page, error = %e, "OCR strategy failed");
                    last_err = Some(e);
                }
            }
        }
        match best {
            Some((_, text)) => Ok(clean_output(&text)),
            None => Err(last_err.unwrap_or_else(|| "no OCR strategy ran".into())),
        }
    }
}

/// Heuristic quality of OCR output; higher is better, never negative.
pub fn score_text(text: &str) -> i64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0;
    }
    let mut score = words.len() as i64;
    let avg_len = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64;
    if avg_len > 4.0 {
        score += 10;
    }
    let short = words.iter().filter(|w| w.chars().count() <= 2).count();
    if short * 2 > words.len() {
        score -= 20;
    }
    let total = text.chars().count();
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    if total > 0 && (alnum as f64 / total as f64) < 0.5 {
        score -= 15;
    }
    score.max(0)
}

fn dictionary_bonus(text: &str, dict: &Dictionary) -> i64 {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return 0;
    }
    let hits = words
        .iter()
        .filter(|w| {
            dict.contains(Language::English, w) || dict.contains(Language::Turkish, w)
        })
        .count();
    (hits * 20 / words.len()) as i64
}

/// Trim trailing whitespace per line and drop runs of blank lines.
fn clean_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank += 1;
            if blank > 1 {
                continue;
            }
        } else {
            blank = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
