//! Text Normalization
//!
//! Cleans raw transcripts before wake-word detection and command matching:
//! lower-casing, punctuation cleanup, whitespace collapsing, recognizer
//! corrections and wake-phrase stripping.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Wake phrases used when the configuration does not override them
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["hey jarvis", "hello jarvis", "jarvis", "hey j.a.r.v.i.s"];

lazy_static! {
    /// Spelled-out acronyms such as "j.a.r.v.i.s"
    static ref DOTTED_WORD: Regex = Regex::new(r"\b(?:[a-z]\.){2,}[a-z]?").unwrap();
}

/// Normalizes spoken text and recognizes wake phrases
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    /// Wake phrases as token lists, longest first
    wake_phrases: Vec<Vec<String>>,
    /// Manual corrections from config
    corrections: Vec<(String, String)>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_PHRASES.iter().copied(), HashMap::new())
    }
}

impl TextNormalizer {
    /// Create a new text normalizer
    pub fn new<I, S>(wake_phrases: I, corrections: HashMap<String, String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases: Vec<Vec<String>> = Vec::new();
        for phrase in wake_phrases {
            let tokens: Vec<String> = clean(phrase.as_ref())
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if !tokens.is_empty() && !phrases.contains(&tokens) {
                phrases.push(tokens);
            }
        }
        phrases.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut corrections: Vec<(String, String)> = corrections
            .into_iter()
            .map(|(from, to)| (clean(&from), clean(&to)))
            .filter(|(from, _)| !from.is_empty())
            .collect();
        // Longer corrections first so overlapping keys resolve deterministically
        corrections.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            wake_phrases: phrases,
            corrections,
        }
    }

    /// Lower-case, de-punctuate, correct and collapse whitespace, keeping wake phrases
    pub fn canonical(&self, text: &str) -> String {
        let cleaned = clean(text);
        if cleaned.is_empty() || self.corrections.is_empty() {
            return cleaned;
        }

        let mut padded = format!(" {} ", cleaned);
        for (from, to) in &self.corrections {
            padded = padded.replace(&format!(" {} ", from), &format!(" {} ", to));
        }
        collapse_whitespace(&padded)
    }

    /// Normalize text for classification (wake phrases removed)
    pub fn normalize(&self, text: &str) -> String {
        let canonical = self.canonical(text);
        let tokens: Vec<&str> = canonical.split_whitespace().collect();
        self.strip_wake_phrases(&tokens).join(" ")
    }

    /// Check whether the text contains any configured wake phrase
    pub fn contains_wake_phrase(&self, text: &str) -> bool {
        self.split_wake_phrase(text).is_some()
    }

    /// Find the first wake phrase and return the normalized command spoken after it
    ///
    /// Returns `None` when no wake phrase is present, and `Some("")` when the
    /// utterance was only the wake phrase.
    pub fn split_wake_phrase(&self, text: &str) -> Option<String> {
        let canonical = self.canonical(text);
        let tokens: Vec<&str> = canonical.split_whitespace().collect();

        for start in 0..tokens.len() {
            if let Some(len) = self.wake_phrase_at(&tokens, start) {
                let remainder = self.strip_wake_phrases(&tokens[start + len..]);
                return Some(remainder.join(" "));
            }
        }
        None
    }

    /// Configured wake phrases in canonical form
    pub fn wake_phrases(&self) -> Vec<String> {
        self.wake_phrases.iter().map(|p| p.join(" ")).collect()
    }

    /// Length in tokens of the longest wake phrase starting at `start`
    fn wake_phrase_at(&self, tokens: &[&str], start: usize) -> Option<usize> {
        self.wake_phrases
            .iter()
            .find(|phrase| {
                tokens.len() - start >= phrase.len()
                    && phrase
                        .iter()
                        .zip(&tokens[start..])
                        .all(|(expected, token)| expected == token)
            })
            .map(Vec::len)
    }

    fn strip_wake_phrases<'a>(&self, tokens: &[&'a str]) -> Vec<&'a str> {
        let mut kept = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            match self.wake_phrase_at(tokens, i) {
                Some(len) => i += len,
                None => {
                    kept.push(tokens[i]);
                    i += 1;
                }
            }
        }
        kept
    }
}

/// Lower-case, fold dotted acronyms, drop sentence punctuation, collapse whitespace
fn clean(text: &str) -> String {
    let lower = text.to_lowercase();
    let folded = DOTTED_WORD.replace_all(&lower, |caps: &regex::Captures| caps[0].replace('.', ""));

    let chars: Vec<char> = folded.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            ',' | '!' | '?' | ';' | ':' | '"' | '\u{201c}' | '\u{201d}' => out.push(' '),
            // Keep decimal points ("2.5", ".5"), drop sentence dots
            '.' => {
                let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if next_is_digit {
                    out.push('.');
                } else {
                    out.push(' ');
                }
            }
            '\u{2019}' => out.push('\''),
            _ => out.push(c),
        }
    }

    collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
