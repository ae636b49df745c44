//! The individual repair passes, each a pure `&str → String` function.
//!
//! Every pass is conservative: when the dictionary cannot confirm a merge the
//! original tokens are returned untouched. Token passes only rebuild a line
//! when they actually merged something, so untouched lines keep their exact
//! spacing.

use crate::heal::dictionary::Dictionary;
use crate::heal::language::Language;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Particles ────────────────────────────────────────────────────────────

/// High-frequency words that PDF producers split after their first letter.
const PARTICLES_EN: &[(&str, &str)] = &[
    ("t", "he"),
    ("t", "hat"),
    ("t", "his"),
    ("t", "hey"),
    ("w", "ith"),
    ("w", "hich"),
    ("w", "ill"),
    ("s", "he"),
    ("o", "f"),
    ("f", "or"),
];

const PARTICLES_TR: &[(&str, &str)] = &[
    ("v", "e"),
    ("d", "e"),
    ("d", "a"),
    ("k", "i"),
    ("b", "u"),
    ("b", "ir"),
    ("ş", "u"),
    ("n", "e"),
    ("e", "n"),
    ("i", "le"),
    ("y", "a"),
];

fn particle_patterns(pairs: &[(&str, &str)]) -> Vec<Regex> {
    pairs
        .iter()
        .map(|(head, tail)| Regex::new(&format!(r"(?i)(^|\s)({head}) ({tail})\b")).expect("valid particle regex"))
        .collect()
}

static RE_PARTICLES_EN: Lazy<Vec<Regex>> = Lazy::new(|| particle_patterns(PARTICLES_EN));
static RE_PARTICLES_TR: Lazy<Vec<Regex>> = Lazy::new(|| particle_patterns(PARTICLES_TR));

/// Rejoin split particles (`v e` → `ve`, `t he` → `the`).
///
/// The head letter must start a token, so a contraction's tail (`isn't he`)
/// is never taken for one, and the joined form must be a dictionary word.
/// Pairs inside a longer run of single letters are left to [`explosions`].
pub fn particles(line: &str, lang: Language, dict: &Dictionary) -> String {
    let patterns = match lang {
        Language::English => &*RE_PARTICLES_EN,
        Language::Turkish => &*RE_PARTICLES_TR,
    };
    let mut out = line.to_string();
    for re in patterns {
        if !re.is_match(&out) {
            continue;
        }
        let replaced = re.replace_all(&out, |caps: &Captures<'_>| {
            let joined = format!("{}{}", &caps[2], &caps[3]);
            let (start, end) = (caps.get(2).map_or(0, |m| m.start()), caps.get(0).map_or(0, |m| m.end()));
            let exploded = out[..start].split_whitespace().next_back().is_some_and(is_single_letter)
                || out[end..].split_whitespace().next().is_some_and(is_single_letter);
            if !exploded && dict.contains(lang, &joined) && !dict.contains(lang, &caps[2]) {
                format!("{}{joined}", &caps[1])
            } else {
                caps[0].to_string()
            }
        });
        out = replaced.into_owned();
    }
    out
}

// ── Suffix reattachment ──────────────────────────────────────────────────

/// Turkish suffixes that appear detached from their stem. Standalone clitics
/// written apart by rule (`de`, `da`, `ki`, `mi`) are deliberately absent.
const SUFFIXES_TR: &[&str] = &[
    "ı", "i", "u", "ü", "lar", "ler", "ları", "leri", "dan", "den", "tan", "ten", "daki", "deki",
    "nın", "nin", "nun", "nün", "ın", "in", "un", "ün", "ya", "ye", "yı", "yi", "dır", "dir", "dur",
    "dür", "lık", "lik", "luk", "lük", "sı", "si", "su", "sü",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VowelClass {
    Back,
    Front,
}

fn vowel_class(c: char) -> Option<VowelClass> {
    match c {
        'a' | 'ı' | 'o' | 'u' | 'A' | 'I' | 'O' | 'U' => Some(VowelClass::Back),
        'e' | 'i' | 'ö' | 'ü' | 'E' | 'İ' | 'Ö' | 'Ü' => Some(VowelClass::Front),
        _ => None,
    }
}

/// Whether `suffix` may follow `stem` under two-way vowel harmony.
pub fn harmonizes(stem: &str, suffix: &str) -> bool {
    let last = stem.chars().rev().find_map(vowel_class);
    let first = suffix.chars().find_map(vowel_class);
    matches!((last, first), (Some(a), Some(b)) if a == b)
}

/// Reattach detached Turkish suffixes (`kitap lar` → `kitaplar`).
///
/// A merge needs the dictionary to know the result and the stem's last
/// vowel to agree with the suffix's first vowel.
pub fn suffixes(line: &str, dict: &Dictionary) -> String {
    merge_tokens(line, |left, right| {
        let lower = right.to_lowercase();
        SUFFIXES_TR.contains(&lower.as_str())
            && is_word(left)
            && harmonizes(left, &lower)
            && dict.contains(Language::Turkish, &format!("{left}{right}"))
    })
}

// ── Hyphen breaks ────────────────────────────────────────────────────────

static RE_HYPHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zçğıöşü]{3,})\s?-\s?([a-zçğıöşü]{3,})").expect("valid hyphen regex"));

/// Join line-wrap hyphenation (`prob- lem` → `problem`).
///
/// English keeps real compounds (`well-known`) unless the dictionary knows
/// the joined form.
pub fn hyphens(line: &str, lang: Language, dict: &Dictionary) -> String {
    RE_HYPHEN
        .replace_all(line, |caps: &Captures<'_>| {
            let joined = format!("{}{}", &caps[1], &caps[2]);
            if lang == Language::Turkish || dict.contains(lang, &joined) {
                joined
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

// ── Single-glyph explosions ──────────────────────────────────────────────

/// Shortest run of single letters treated as an exploded word.
const MIN_EXPLOSION: usize = 3;

/// Collapse glyph-exploded words (`k e l i m e` → `kelime`) the dictionary knows.
///
/// Within a run the longest dictionary word starting at each position wins;
/// letters that do not form a known word stay separate.
pub fn explosions(line: &str, lang: Language, dict: &Dictionary) -> String {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut changed = false;
    let mut i = 0;
    while i < tokens.len() {
        let run = tokens[i..].iter().take_while(|t| is_single_letter(t)).count();
        if run < MIN_EXPLOSION {
            out.push(tokens[i].to_string());
            i += 1;
            continue;
        }
        let letters = &tokens[i..i + run];
        let mut j = 0;
        while j < run {
            let found = (MIN_EXPLOSION..=run - j)
                .rev()
                .map(|len| letters[j..j + len].concat())
                .find(|w| dict.contains(lang, w));
            match found {
                Some(word) => {
                    j += word.chars().count();
                    out.push(word);
                    changed = true;
                }
                None => {
                    out.push(letters[j].to_string());
                    j += 1;
                }
            }
        }
        i += run;
    }
    if changed {
        out.join(" ")
    } else {
        line.to_string()
    }
}

// ── Sliding merge ────────────────────────────────────────────────────────

/// Short function words that are complete on their own and never merge.
const STANDALONE_EN: &[&str] = &[
    "a", "i", "an", "the", "of", "to", "in", "is", "on", "at", "as", "it", "or", "by", "be",
];
const STANDALONE_TR: &[&str] = &[
    "o", "ve", "de", "da", "ki", "mi", "mı", "mu", "mü", "bu", "şu", "ne", "en", "bir",
];

/// Passes of the sliding merge; a merged token can merge again on the next pass.
const MAX_MERGE_PASSES: usize = 3;

/// Widest run of adjacent tokens considered for one merge.
const MAX_MERGE_WINDOW: usize = 3;

/// Merge adjacent fragments whose concatenation is a dictionary word.
///
/// At each position the widest accepted window wins, so `in for mation`
/// becomes `information` rather than `in formation`. A window merges only
/// when the joined form is known and at least one of its parts is not a word
/// on its own (`is land` stays apart). Two-token merges additionally never
/// consume a standalone function word (`a book`).
pub fn sliding_merge(line: &str, lang: Language, dict: &Dictionary) -> String {
    let standalone = match lang {
        Language::English => STANDALONE_EN,
        Language::Turkish => STANDALONE_TR,
    };
    let mut current = line.to_string();
    for _ in 0..MAX_MERGE_PASSES {
        match merge_pass(&current, lang, dict, standalone) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// One left-to-right pass; `None` when nothing merged.
fn merge_pass(line: &str, lang: Language, dict: &Dictionary, standalone: &[&str]) -> Option<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut changed = false;
    let mut i = 0;
    while i < tokens.len() {
        let widest = MAX_MERGE_WINDOW.min(tokens.len() - i);
        let accepted = (2..=widest)
            .rev()
            .find(|&n| window_merges(&tokens[i..i + n], lang, dict, standalone));
        match accepted {
            Some(n) => {
                out.push(tokens[i..i + n].concat());
                changed = true;
                i += n;
            }
            None => {
                out.push(tokens[i].to_string());
                i += 1;
            }
        }
    }
    changed.then(|| out.join(" "))
}

fn window_merges(window: &[&str], lang: Language, dict: &Dictionary, standalone: &[&str]) -> bool {
    let Some((&last, init)) = window.split_last() else {
        return false;
    };
    let (last, _) = split_trailing_punct(last);
    if !init.iter().all(|t| is_word(t)) || !is_word(last) {
        return false;
    }
    let parts: Vec<String> = init
        .iter()
        .copied()
        .chain(std::iter::once(last))
        .map(str::to_lowercase)
        .collect();
    if parts.iter().all(|p| dict.contains(lang, p)) || !dict.contains(lang, &parts.concat()) {
        return false;
    }
    parts.len() > 2 || !parts.iter().any(|p| standalone.contains(&p.as_str()))
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Left-to-right token merge. `accept(left, right)` sees the merged-so-far left token.
fn merge_tokens(line: &str, mut accept: impl FnMut(&str, &str) -> bool) -> String {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((first, rest)) = tokens.split_first() else {
        return line.to_string();
    };
    let mut out: Vec<String> = vec![first.to_string()];
    let mut changed = false;
    for &tok in rest {
        let (word, trailing) = split_trailing_punct(tok);
        let merged = match out.last_mut() {
            Some(last) if !word.is_empty() && accept(last.as_str(), word) => {
                last.push_str(word);
                last.push_str(trailing);
                true
            }
            _ => false,
        };
        if merged {
            changed = true;
        } else {
            out.push(tok.to_string());
        }
    }
    if changed {
        out.join(" ")
    } else {
        line.to_string()
    }
}

fn split_trailing_punct(tok: &str) -> (&str, &str) {
    let end = tok.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
    tok.split_at(end)
}

fn is_word(tok: &str) -> bool {
    !tok.is_empty() && tok.chars().all(char::is_alphabetic)
}

fn is_single_letter(tok: &str) -> bool {
    let mut chars = tok.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}
