//! Dictionary-backed repair of spacing defects in extracted text.
//!
//! ## Why a separate healing stage?
//!
//! Word reconstruction works from geometry alone. Fonts with wide tracking
//! still leave intra-word gaps above the merge threshold (`t he`, `k e l i m e`)
//! and line-wrap hyphens survive extraction (`prob- lem`). Those defects are
//! linguistic, so they are fixed with linguistic evidence: stop words pick the
//! language, and a frequency dictionary confirms every merge.
//!
//! ## Pass order
//!
//! ```text
//! particles ─▶ suffixes (tr) ─▶ hyphens ─▶ explosions ─▶ sliding merge
//! ```
//!
//! The dictionary is built once per process and shared through an `Arc`;
//! building the sets from a full frequency list is the expensive part.

pub mod dictionary;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod language;
pub mod rules;

pub use dictionary::Dictionary;
pub use language::Language;

use crate::error::PdfStructError;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;

static INSTALLED: Lazy<TextHealer> = Lazy::new(|| TextHealer::new(Dictionary::installed()));

/// Language-aware spacing repair.
#[derive(Debug, Clone)]
pub struct TextHealer {
    dictionary: Arc<Dictionary>,
    fallback: Language,
}

impl TextHealer {
    pub fn new(dictionary: Dictionary) -> Self {
        Self {
            dictionary: Arc::new(dictionary),
            fallback: Language::default(),
        }
    }

    /// Healer over the embedded and installed word lists, built on first use.
    pub fn shared() -> &'static TextHealer {
        &INSTALLED
    }

    /// Healer over the embedded lists plus any found in `dir`; the shared
    /// healer when `dir` is `None`.
    pub fn load(dir: Option<&Path>) -> Result<Self, PdfStructError> {
        match dir {
            Some(dir) => Ok(Self::new(Dictionary::with_dir(dir)?)),
            None => Ok(Self::shared().clone()),
        }
    }

    /// Language assumed when text does not read as English.
    pub fn with_fallback(mut self, fallback: Language) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> Language {
        self.fallback
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn detect_language(&self, text: &str) -> Language {
        language::detect(text, self.fallback)
    }

    /// Heal a block of text, detecting its language once; line breaks are preserved.
    pub fn heal(&self, text: &str) -> String {
        let lang = self.detect_language(text);
        self.heal_in(text, lang)
    }

    /// Heal a block of text in a known language.
    pub fn heal_in(&self, text: &str, lang: Language) -> String {
        text.split('\n')
            .map(|line| self.heal_line(line, lang))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run every pass over one line.
    pub fn heal_line(&self, line: &str, lang: Language) -> String {
        if line.trim().chars().count() < 3 {
            return line.to_string();
        }
        let d = &self.dictionary;
        let mut s = rules::particles(line, lang, d);
        if lang == Language::Turkish {
            s = rules::suffixes(&s, d);
        }
        s = rules::hyphens(&s, lang, d);
        s = rules::explosions(&s, lang, d);
        rules::sliding_merge(&s, lang, d)
    }
}

impl Default for TextHealer {
    fn default() -> Self {
        Self::shared().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heal(s: &str) -> String {
        TextHealer::new(Dictionary::embedded()).heal(s)
    }

    #[test]
    fn standalone_words_are_never_consumed() {
        assert_eq!(heal("a book"), "a book");
        assert_eq!(heal("Plan B"), "Plan B");
        assert_eq!(heal("I am"), "I am");
        assert_eq!(heal("A Blok"), "A Blok");
        assert_eq!(heal("User X verification"), "User X verification");
    }

    #[test]
    fn turkish_conjunction_is_rejoined() {
        let h = heal("v e");
        assert!(h.contains("ve"));
        assert!(!h.contains("v e"));
    }

    #[test]
    fn english_article_is_rejoined() {
        assert!(heal("t he").contains("the"));
        assert!(heal("t he quick brown fox").starts_with("the quick"));
    }

    #[test]
    fn turkish_repairs() {
        assert!(heal("d ü ş ü n c e").contains("düşünce"));
        assert!(heal("yap ı lar").contains("yapılar"));
        assert!(heal("bu kitap lar çok güzel").contains("kitaplar"));
        assert!(heal("bu bir k e l i m e örneğidir").contains("kelime"));
        assert!(heal("bu bir prob- lem").contains("problem"));
    }

    #[test]
    fn mixed_line_keeps_plan_b() {
        let h = heal("Plan B de t he implementation succeeded.");
        assert!(h.contains("Plan B"));
        assert!(h.contains("the"));
    }

    #[test]
    fn newlines_are_preserved() {
        let h = heal("satır bir\nsatır iki\nsatır üç");
        assert_eq!(h.matches('\n').count(), 2);
        assert_eq!(heal(""), "");
        assert_eq!(heal("ab"), "ab");
    }

    #[test]
    fn general_vocabulary_is_repaired() {
        assert_eq!(heal("the q u a l i t y of"), "the quality of");
        assert_eq!(heal("the in for mation is"), "the information is");
        assert!(heal("bu bir k a l i t e raporu ve").contains("kalite"));
        assert!(heal("bu bir ç a l ı ş m a ve").contains("çalışma"));
    }

    #[test]
    fn contraction_before_a_pronoun_is_kept() {
        assert_eq!(heal("Isn't he coming to the meeting?"), "Isn't he coming to the meeting?");
        assert_eq!(heal("She didn't see her report"), "She didn't see her report");
    }

    #[test]
    fn lists_from_a_dictionary_dir_extend_repairs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tr_freq.txt"), "zeytinyağı 812\nkooperatif 640\n").unwrap();
        let healer = TextHealer::load(Some(dir.path())).unwrap();
        let line = "bu bir z e y t i n y a ğ ı ve";
        assert!(healer.heal(line).contains("zeytinyağı"));
        assert!(!heal(line).contains("zeytinyağı"));
    }

    #[test]
    fn fallback_language_is_configurable() {
        let text = "bu kitap ve diğer şeyler için";
        let healer = TextHealer::new(Dictionary::embedded());
        assert_eq!(healer.detect_language(text), Language::Turkish);
        assert_eq!(healer.with_fallback(Language::English).detect_language(text), Language::English);
    }
}
