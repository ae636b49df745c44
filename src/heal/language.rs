//! Stop-word language detection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Languages the healer carries dictionaries and rules for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    #[default]
    Turkish,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" | "eng" | "english" => Ok(Language::English),
            "tr" | "tur" | "turkish" => Ok(Language::Turkish),
            other => Err(format!("unsupported language '{other}' (expected en or tr)")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::English => "en",
            Language::Turkish => "tr",
        })
    }
}

const STOPS_EN: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "it", "you", "that", "for", "are", "on", "with", "as", "at",
];

const STOPS_TR: &[&str] = &[
    "ve", "bir", "bu", "için", "ile", "de", "da", "ki", "ne", "gibi", "her", "çok", "en", "daha",
];

/// Letters that only occur in Turkish among the two supported languages.
const TURKISH_LETTERS: &[char] = &['ç', 'ğ', 'ı', 'ş', 'İ', 'Ç', 'Ğ', 'Ş', 'ö', 'ü', 'Ö', 'Ü'];

/// Detect the language of `text`.
///
/// Each language scores one point per distinct stop word present; Turkish
/// also scores a point when Turkish-only letters appear. Glyph-exploded
/// tokens are read both ways: runs of single letters are joined (`v e` reads
/// as `ve`) and a single letter is joined to the token after it (`t he` reads
/// as `the`). A tie or an English majority yields English; anything else
/// yields `fallback`.
pub fn detect(text: &str, fallback: Language) -> Language {
    let words = candidate_words(text);

    let en = STOPS_EN.iter().filter(|w| words.contains(**w)).count();
    let mut tr = STOPS_TR.iter().filter(|w| words.contains(**w)).count();
    if text.chars().any(|c| TURKISH_LETTERS.contains(&c)) {
        tr += 1;
    }

    if en >= tr {
        Language::English
    } else {
        fallback
    }
}

/// Lowercased tokens plus their single-letter rejoins.
fn candidate_words(text: &str) -> HashSet<String> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut words: HashSet<String> = tokens.iter().cloned().collect();
    let mut run = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if is_single_letter(token) {
            run.push_str(token);
            if let Some(next) = tokens.get(i + 1) {
                words.insert(format!("{token}{next}"));
            }
        } else if !run.is_empty() {
            words.insert(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        words.insert(run);
    }
    words
}

fn is_single_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_tr(text: &str) -> Language {
        detect(text, Language::Turkish)
    }

    #[test]
    fn turkish_stop_words_win() {
        assert_eq!(detect_tr("bu kitap ve diğer şeyler için yazılmıştır"), Language::Turkish);
    }

    #[test]
    fn english_stop_words_win() {
        assert_eq!(detect_tr("the book and other things are written for you"), Language::English);
    }

    #[test]
    fn tie_defaults_to_english() {
        assert_eq!(detect_tr(""), Language::English);
        assert_eq!(detect_tr("Plan B"), Language::English);
        assert_eq!(detect_tr("the ve"), Language::English);
    }

    #[test]
    fn exploded_conjunction_is_recognised() {
        assert_eq!(detect_tr("v e"), Language::Turkish);
        assert_eq!(detect_tr("kitap v e kalem"), Language::Turkish);
    }

    #[test]
    fn exploded_article_is_recognised() {
        assert_eq!(detect_tr("Plan B de t he implementation succeeded."), Language::English);
    }

    #[test]
    fn english_majority_over_mixed_text() {
        assert_eq!(detect_tr("the and of to in için ve"), Language::English);
    }

    #[test]
    fn non_english_text_takes_the_configured_fallback() {
        let text = "bu kitap ve diğer şeyler için yazılmıştır";
        assert_eq!(detect(text, Language::English), Language::English);
        // ties never reach the fallback
        assert_eq!(detect("Plan B", Language::Turkish), Language::English);
    }

    #[test]
    fn language_names_parse() {
        assert_eq!("tr".parse::<Language>().unwrap(), Language::Turkish);
        assert_eq!("English".parse::<Language>().unwrap(), Language::English);
        assert!("de".parse::<Language>().is_err());
    }
}
