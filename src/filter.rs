//! Chat content filter
//!
//! Masks banned words with asterisks of equal length. Matching is
//! case-sensitive and substring-based; words are applied in the order
//! they appear in the configuration.

use crate::config::SharedConfig;

#[derive(Debug, Clone)]
pub struct ContentFilter {
    config: SharedConfig,
}

impl ContentFilter {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Mask every banned word in `text`
    ///
    /// Reads the banned-word list through one snapshot, so a concurrent
    /// reload applies either entirely or not at all.
    pub fn filter(&self, text: &str) -> String {
        let snapshot = self.config.snapshot();
        mask(text, &snapshot.sensitive)
    }
}

/// Replace each occurrence of each word with `*` repeated per character
pub fn mask(text: &str, words: &[String]) -> String {
    let mut out = text.to_string();
    for word in words.iter().filter(|w| !w.is_empty()) {
        if out.contains(word.as_str()) {
            out = out.replace(word.as_str(), &"*".repeat(word.chars().count()));
        }
    }
    out
}

/// Trailing characters that end a sentence rather than a nickname
const SENTENCE_PUNCTUATION: [char; 6] = [',', '.', '!', '?', ';', ':'];

/// `@name` tokens in chat text, de-duplicated, in order of appearance
pub fn mentions(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let Some(name) = token.strip_prefix('@') else {
            continue;
        };
        let name = name.trim_end_matches(&SENTENCE_PUNCTUATION[..]);
        if !name.is_empty() && !found.iter().any(|n| n == name) {
            found.push(name.to_string());
        }
    }
    found
}
