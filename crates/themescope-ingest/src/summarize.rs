//! Heuristic extractive summaries.
//!
//! Sentences are scored by position, length, overlap with caller-supplied
//! hint terms and a handful of indicator words. Selected sentences keep their
//! original order so the summary reads naturally.

use std::collections::HashSet;

use crate::text::{tokenize, truncate_chars};

const INDICATOR_WORDS: &[&str] = &[
    "because", "problem", "issue", "always", "never", "worst", "best", "love", "hate",
    "finally", "again", "every", "overall", "main", "key", "important",
];

/// Split text into sentences on `.`, `!` or `?` followed by whitespace, and
/// on line breaks.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => chars
                .peek()
                .map(|(_, next)| next.is_whitespace())
                .unwrap_or(false),
            '\n' => true,
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }
    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }
    sentences
}

fn score_sentence(sentence: &str, position: usize, total: usize, hints: &HashSet<String>) -> i32 {
    let mut score = 0i32;

    if position < 2 {
        score += 2 - position as i32;
    }
    if total > 4 && position + 1 == total {
        score += 1;
    }

    let len = sentence.chars().count();
    if (40..=200).contains(&len) {
        score += 2;
    } else if len > 200 {
        score += 1;
    }

    let tokens = tokenize(sentence);
    let hint_hits = tokens.iter().filter(|t| hints.contains(*t)).count();
    score += (hint_hits.min(4) * 2) as i32;

    let indicators = tokens
        .iter()
        .filter(|t| INDICATOR_WORDS.contains(&t.as_str()))
        .count();
    score += indicators.min(2) as i32;

    score
}

/// Pick up to `max_sentences` of the highest scoring sentences of `text`,
/// returned in their original order. Sentences of fewer than 15 characters are
/// ignored unless nothing else is left.
pub fn extract_key_sentences(text: &str, max_sentences: usize, hint_terms: &[String]) -> Vec<String> {
    if max_sentences == 0 {
        return Vec::new();
    }
    let all = split_sentences(text);
    let mut sentences: Vec<(usize, &str)> = all
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| s.chars().count() >= 15)
        .collect();
    if sentences.is_empty() {
        sentences = all.iter().copied().enumerate().collect();
    }
    if sentences.is_empty() {
        return Vec::new();
    }

    let hints: HashSet<String> = hint_terms.iter().map(|t| t.to_lowercase()).collect();
    let total = all.len();
    let mut scored: Vec<(i32, usize, &str)> = sentences
        .iter()
        .map(|&(i, s)| (score_sentence(s, i, total, &hints), i, s))
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(max_sentences);
    scored.sort_by_key(|(_, i, _)| *i);
    scored.into_iter().map(|(_, _, s)| s.to_string()).collect()
}

/// Extractive summary capped at `max_chars`.
pub fn summarize_extractive(
    text: &str,
    max_sentences: usize,
    max_chars: usize,
    hint_terms: &[String],
) -> String {
    let mut summary = String::new();
    for sentence in extract_key_sentences(text, max_sentences, hint_terms) {
        let candidate_len = summary.chars().count() + sentence.chars().count() + 1;
        if !summary.is_empty() && candidate_len > max_chars {
            break;
        }
        if !summary.is_empty() {
            summary.push(' ');
        }
        summary.push_str(&sentence);
    }
    truncate_chars(&summary, max_chars)
}
