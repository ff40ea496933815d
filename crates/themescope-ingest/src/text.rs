//! Tokenization and stop-words shared by term extraction, naming and queries.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

/// Common English function words plus social-media noise.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "cannot", "could", "couldn", "did", "didn", "do",
        "does", "doesn", "doing", "don", "down", "during", "each", "even", "ever", "every",
        "few", "for", "from", "further", "get", "gets", "got", "had", "hadn", "has", "hasn",
        "have", "haven", "having", "he", "her", "here", "hers", "herself", "him", "himself",
        "his", "how", "i", "if", "im", "in", "into", "is", "isn", "it", "its", "itself",
        "just", "ll", "me", "more", "most", "much", "must", "my", "myself", "no", "nor", "not",
        "now", "of", "off", "on", "once", "one", "only", "or", "other", "our", "ours",
        "ourselves", "out", "over", "own", "really", "re", "same", "she", "should", "shouldn",
        "so", "some", "still", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
        "too", "under", "until", "up", "us", "ve", "very", "was", "wasn", "we", "were",
        "weren", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
        "with", "won", "would", "wouldn", "you", "your", "yours", "yourself", "yourselves",
        // social noise
        "rt", "amp", "via", "http", "https", "www", "com", "lol", "pls", "please", "thanks",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Lowercased content words: split on anything non-alphanumeric, keep tokens
/// of two or more characters that contain a letter and are not stop-words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| {
            w.chars().count() >= 2
                && w.chars().any(char::is_alphabetic)
                && !is_stop_word(w)
        })
        .collect()
}

/// Query vocabulary from a theme name: like [`tokenize`], but numbers are
/// kept (`"iOS 17 update"` keeps `17`).
pub fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| {
            (w.chars().count() >= 2 || w.chars().all(|c| c.is_numeric())) && !is_stop_word(w)
        })
        .collect()
}

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cut `text` to at most `max_chars` characters on a char boundary,
/// preferring the last word break, and mark the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > max_chars / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", cut.trim_end())
}
