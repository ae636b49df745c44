//! Frequency-based watermark validation.
//!
//! ## Why validate user patterns?
//!
//! Users register candidate watermark strings once (see [`crate::tags`]) and
//! convert many documents. A pattern that stamps every page of one document
//! may be ordinary content in the next ("Confidential" in a heading, a
//! company name in a table). Before any chunk is dispatched the analyzer
//! samples the document and keeps only the candidates that recur on enough
//! of the sampled pages. The surviving [`ValidatedWatermarkSet`] is computed
//! once, cloned read-only into every worker, and never recomputed.
//!
//! ## Sampling
//!
//! ```text
//! pages 1..=head_pages, then head_pages + stride, head_pages + 2·stride, …
//! ```

use crate::config::WatermarkSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Candidate patterns confirmed to recur across the sampled pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedWatermarkSet {
    patterns: Vec<String>,
}

impl ValidatedWatermarkSet {
    /// Set of already-confirmed patterns; blank entries are dropped.
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        let mut patterns: Vec<String> = patterns
            .into_iter()
            .filter(|p| !normalize(p).is_empty())
            .collect();
        patterns.dedup();
        Self { patterns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether `text` contains a validated pattern, ignoring case and whitespace.
    pub fn matches(&self, text: &str) -> bool {
        let hay = normalize(text);
        !hay.is_empty() && self.patterns.iter().any(|p| hay.contains(&normalize(p)))
    }

    /// Whether a text fragment is a watermark or a visible piece of one.
    ///
    /// Minority-font runs are often split across lines, so a fragment also
    /// matches when it is a whole-word slice of a pattern covering at least
    /// [`MIN_FRAGMENT_SHARE`] of the pattern's characters. A lone common
    /// word of a longer pattern ("use" in "Internal Use Only") never matches.
    pub fn matches_fragment(&self, fragment: &str) -> bool {
        let frag = normalize(fragment);
        if frag.is_empty() {
            return false;
        }
        self.patterns.iter().any(|p| {
            let pattern = normalize(p);
            frag.contains(&pattern) || is_pattern_piece(&frag, p, &pattern)
        })
    }
}

/// Smallest share of a pattern's characters a partial fragment must cover.
pub const MIN_FRAGMENT_SHARE: f64 = 0.5;

/// `frag` sits inside `normalized` on word boundaries of `pattern` and is
/// long enough to be distinctive.
fn is_pattern_piece(frag: &str, pattern: &str, normalized: &str) -> bool {
    let (frag_len, pattern_len) = (frag.chars().count(), normalized.chars().count());
    if frag_len < 3 || (frag_len as f64) < pattern_len as f64 * MIN_FRAGMENT_SHARE {
        return false;
    }
    // byte offsets in `normalized` where a pattern word starts or ends
    let mut boundaries = vec![0];
    for word in pattern.split_whitespace() {
        let last = boundaries.last().copied().unwrap_or(0);
        boundaries.push(last + normalize(word).len());
    }
    normalized
        .match_indices(frag)
        .any(|(start, m)| boundaries.contains(&start) && boundaries.contains(&(start + m.len())))
}

/// Lowercase with every whitespace character removed.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Samples a document's pages and validates candidate patterns against them.
#[derive(Debug, Clone)]
pub struct WatermarkAnalyzer {
    settings: WatermarkSettings,
}

impl WatermarkAnalyzer {
    pub fn new(settings: WatermarkSettings) -> Self {
        Self { settings }
    }

    /// 1-indexed page numbers to sample out of `page_count`.
    pub fn sample_pages(&self, page_count: usize) -> Vec<usize> {
        let head = self.settings.head_pages.min(page_count);
        let stride = self.settings.stride.max(1);
        let mut pages: Vec<usize> = (1..=head).collect();
        let mut next = head + stride;
        while next <= page_count {
            pages.push(next);
            next += stride;
        }
        pages
    }

    /// Keep the candidates whose hit ratio over `sampled_texts` meets the threshold.
    ///
    /// Matching is a case-insensitive literal search per page; a page counts
    /// once however often the pattern occurs on it. With no sampled pages
    /// nothing validates.
    pub fn validate<I, S>(&self, candidates: &[String], sampled_texts: I) -> ValidatedWatermarkSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles: Vec<(&String, String)> = candidates
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| (c, c.to_lowercase()))
            .collect();
        if needles.is_empty() {
            return ValidatedWatermarkSet::empty();
        }

        let mut hits = vec![0usize; needles.len()];
        let mut sampled = 0usize;
        for text in sampled_texts {
            sampled += 1;
            let page = text.as_ref().to_lowercase();
            for (count, (_, needle)) in hits.iter_mut().zip(&needles) {
                if page.contains(needle.as_str()) {
                    *count += 1;
                }
            }
        }
        if sampled == 0 {
            return ValidatedWatermarkSet::empty();
        }

        let mut validated = Vec::new();
        for ((pattern, _), count) in needles.iter().zip(hits) {
            let ratio = count as f64 / sampled as f64;
            if ratio >= self.settings.threshold {
                validated.push((*pattern).clone());
            } else {
                debug!(pattern = %pattern, ratio, "candidate watermark ignored for this document");
            }
        }
        info!(
            candidates = needles.len(),
            validated = validated.len(),
            sampled,
            "watermark pre-scan complete"
        );
        ValidatedWatermarkSet::new(validated)
    }
}
