//! Frequency dictionaries used to confirm merges.
//!
//! Two sources are combined:
//!
//! * the core lists compiled into the binary (`data/*_core.txt`, a few
//!   thousand common words per language), and
//! * full frequency lists (`en_freq.txt`, `tr_freq.txt`) in the public
//!   `word count` format, read from a dictionary directory. The user data
//!   directory is searched by default; see [`Dictionary::default_dir`] and
//!   the `fetch` feature for populating it.
//!
//! Only the word is kept; counts matter for ranking suggestions, and the
//! healer never suggests, it only confirms exact matches.

use crate::error::PdfStructError;
use crate::heal::language::Language;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EMBEDDED_EN: &str = include_str!("../../data/en_core.txt");
const EMBEDDED_TR: &str = include_str!("../../data/tr_core.txt");

/// File names looked up inside a dictionary directory.
pub const LIST_FILES: [(Language, &str); 2] = [(Language::English, "en_freq.txt"), (Language::Turkish, "tr_freq.txt")];

/// Exact-match word sets per language.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    en: HashSet<String>,
    tr: HashSet<String>,
}

impl Dictionary {
    /// The word lists compiled into the binary.
    pub fn embedded() -> Self {
        let mut d = Self::default();
        d.extend(Language::English, EMBEDDED_EN);
        d.extend(Language::Turkish, EMBEDDED_TR);
        d
    }

    /// Embedded lists plus whatever is installed in [`Self::default_dir`].
    ///
    /// An unreadable installed list is logged and skipped.
    pub fn installed() -> Self {
        let Some(dir) = Self::default_dir().filter(|d| d.is_dir()) else {
            return Self::embedded();
        };
        match Self::with_dir(&dir) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "installed dictionaries unusable, using embedded lists");
                Self::embedded()
            }
        }
    }

    /// `<data dir>/edgequake-pdfstruct/dictionaries`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("edgequake-pdfstruct").join("dictionaries"))
    }

    /// Embedded lists plus `en_freq.txt` / `tr_freq.txt` from `dir` when present.
    pub fn with_dir(dir: &Path) -> Result<Self, PdfStructError> {
        let mut d = Self::embedded();
        for (lang, name) in LIST_FILES {
            let path = dir.join(name);
            if !path.exists() {
                debug!(path = %path.display(), "no external dictionary");
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| {
                PdfStructError::InvalidConfig(format!("cannot read dictionary '{}': {e}", path.display()))
            })?;
            let before = d.len(lang);
            d.extend(lang, &text);
            info!(%lang, added = d.len(lang) - before, path = %path.display(), "dictionary loaded");
        }
        Ok(d)
    }

    /// Add every valid entry of a `word count` listing.
    pub fn extend(&mut self, lang: Language, listing: &str) {
        let set = self.set_mut(lang);
        for line in listing.lines() {
            if let Some(word) = listing_word(line) {
                set.insert(word);
            }
        }
    }

    /// Case-insensitive exact lookup.
    pub fn contains(&self, lang: Language, word: &str) -> bool {
        let set = match lang {
            Language::English => &self.en,
            Language::Turkish => &self.tr,
        };
        set.contains(&word.to_lowercase())
    }

    pub fn len(&self, lang: Language) -> usize {
        match lang {
            Language::English => self.en.len(),
            Language::Turkish => self.tr.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.en.is_empty() && self.tr.is_empty()
    }

    fn set_mut(&mut self, lang: Language) -> &mut HashSet<String> {
        match lang {
            Language::English => &mut self.en,
            Language::Turkish => &mut self.tr,
        }
    }
}

/// The lowercased word of one listing line, if it is a usable entry.
///
/// Single letters, numbers and tokens with punctuation (`don't`, `e-mail`)
/// are rejected; `#` comment lines fall out the same way.
pub fn listing_word(line: &str) -> Option<String> {
    let word = line.split_whitespace().next()?.to_lowercase();
    (word.chars().count() > 1 && word.chars().all(char::is_alphabetic)).then_some(word)
}
