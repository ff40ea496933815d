//! Raw record normalization.
//!
//! Records arrive as arbitrary JSON from several source platforms. The
//! normalizer finds the best text field, cleans it, drops short and duplicate
//! entries, and assigns a stable identifier.

use std::collections::HashSet;

use scraper::{Html, Node};
use serde_json::Value;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

use themescope_core::{DiscoveryConfig, Document};

use crate::text::content_hash;

/// Content-bearing field names, most specific first.
const CONTENT_FIELDS: &[&str] = &["content", "text", "message", "body", "description", "title"];

/// Containers commonly wrapping the payload of a post.
const NESTED_CONTAINERS: &[&str] = &["source", "data", "payload", "document", "item"];

const ID_FIELDS: &[&str] = &["id", "_id", "uuid", "documentId", "postId", "post_id"];

/// Outcome of a normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub documents: Vec<Document>,
    /// Records with no text of at least the minimum length.
    pub dropped_short: usize,
    /// Records whose cleaned text repeated an earlier record.
    pub dropped_duplicate: usize,
}

impl NormalizeReport {
    pub fn dropped(&self) -> usize {
        self.dropped_short + self.dropped_duplicate
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    min_text_chars: usize,
    max_depth: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            max_depth: 6,
        }
    }
}

impl Normalizer {
    pub fn new(min_text_chars: usize, max_depth: usize) -> Self {
        Self {
            min_text_chars,
            max_depth,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.min_text_chars, config.max_scan_depth)
    }

    /// Turn raw records into documents, keeping the first of any exact
    /// duplicates. Never fails; unusable records are counted and skipped.
    pub fn normalize(&self, records: Vec<Value>) -> NormalizeReport {
        let mut report = NormalizeReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, raw) in records.into_iter().enumerate() {
            let Some(text) = self.extract_text(&raw) else {
                report.dropped_short += 1;
                continue;
            };
            if !seen.insert(content_hash(&text)) {
                report.dropped_duplicate += 1;
                continue;
            }
            let id = extract_id(&raw).unwrap_or_else(|| format!("doc-{}", index));
            report.documents.push(Document { id, text, raw });
        }

        if report.dropped() > 0 {
            info!(
                "Normalization dropped {} records (short={}, duplicate={})",
                report.dropped(),
                report.dropped_short,
                report.dropped_duplicate
            );
        }
        debug!("Normalized {} documents", report.documents.len());
        report
    }

    /// Best-effort cleaned text for one record, or `None` when nothing long
    /// enough exists.
    pub fn extract_text(&self, raw: &Value) -> Option<String> {
        if let Value::String(s) = raw {
            return self.accept(s);
        }

        if let Some(text) = self.from_fields(raw) {
            return Some(text);
        }
        for container in NESTED_CONTAINERS {
            if let Some(text) = raw.get(container).and_then(|inner| self.from_fields(inner)) {
                return Some(text);
            }
        }

        let mut best: Option<&str> = None;
        longest_plausible(raw, 0, self.max_depth, &mut best);
        best.and_then(|s| self.accept(s))
    }

    fn from_fields(&self, value: &Value) -> Option<String> {
        let obj = value.as_object()?;
        CONTENT_FIELDS
            .iter()
            .filter_map(|field| obj.get(*field).and_then(Value::as_str))
            .find_map(|s| self.accept(s))
    }

    fn accept(&self, s: &str) -> Option<String> {
        let cleaned = clean_text(s);
        (cleaned.chars().count() >= self.min_text_chars).then_some(cleaned)
    }
}

/// Depth-first scan for the longest string that looks like prose.
fn longest_plausible<'a>(value: &'a Value, depth: usize, max_depth: usize, best: &mut Option<&'a str>) {
    if depth > max_depth {
        return;
    }
    match value {
        Value::String(s) => {
            let plausible = s.contains(char::is_whitespace) && !is_url(s);
            if plausible && best.map_or(true, |b| s.chars().count() > b.chars().count()) {
                *best = Some(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                longest_plausible(item, depth + 1, max_depth, best);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                longest_plausible(item, depth + 1, max_depth, best);
            }
        }
        _ => {}
    }
}

fn is_url(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("www.")
}

fn extract_id(raw: &Value) -> Option<String> {
    let lookup = |value: &Value| {
        ID_FIELDS.iter().find_map(|field| match value.get(*field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    lookup(raw).or_else(|| raw.get("source").and_then(lookup))
}

/// Strip markup, apply NFKC, drop control and zero-width characters, and
/// collapse whitespace.
pub fn clean_text(input: &str) -> String {
    let stripped = if looks_like_markup(input) {
        strip_markup(input)
    } else {
        input.to_string()
    };

    let normalized: String = stripped
        .nfkc()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !is_zero_width(*c))
        .collect();

    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

fn looks_like_markup(s: &str) -> bool {
    let bytes = s.as_bytes();
    let tag = bytes.windows(2).any(|w| {
        w[0] == b'<' && (w[1].is_ascii_alphabetic() || w[1] == b'/' || w[1] == b'!')
    });
    let entity = s.match_indices('&').any(|(i, _)| {
        s[i + 1..]
            .chars()
            .take(10)
            .position(|c| c == ';')
            .map_or(false, |p| p > 0)
    });
    tag || entity
}

/// Text nodes of an HTML fragment, skipping script and style contents.
fn strip_markup(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let mut parts: Vec<&str> = Vec::new();
    for node in fragment.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .map_or(false, |el| matches!(el.name(), "script" | "style"));
        if !hidden {
            parts.push(text);
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_priority() {
        let n = Normalizer::default();
        let raw = json!({"title": "A title long enough", "content": "Actual post content here"});
        assert_eq!(n.extract_text(&raw).unwrap(), "Actual post content here");
    }

    #[test]
    fn test_short_field_falls_through() {
        let n = Normalizer::default();
        let raw = json!({"content": "ok", "message": "the message body is longer"});
        assert_eq!(n.extract_text(&raw).unwrap(), "the message body is longer");
    }

    #[test]
    fn test_nested_container() {
        let n = Normalizer::default();
        let raw = json!({"id": 7, "source": {"text": "Nested text for the post"}});
        assert_eq!(n.extract_text(&raw).unwrap(), "Nested text for the post");
        assert_eq!(extract_id(&raw).unwrap(), "7");
    }

    #[test]
    fn test_depth_first_fallback() {
        let n = Normalizer::default();
        let raw = json!({
            "meta": {"link": "https://example.com/a very long url with spaces"},
            "deep": [{"x": {"caption": "the caption with several words"}}, "short one"]
        });
        assert_eq!(
            n.extract_text(&raw).unwrap(),
            "the caption with several words"
        );
    }

    #[test]
    fn test_fallback_respects_depth() {
        let n = Normalizer::new(10, 1);
        let raw = json!({"a": {"b": {"c": "buried too deep to be found"}}});
        assert!(n.extract_text(&raw).is_none());
    }

    #[test]
    fn test_clean_html_and_unicode() {
        let cleaned = clean_text(
            "<p>Battery&nbsp;life is <b>terrible</b></p><script>var x = 1;</script>\u{200B}",
        );
        assert_eq!(cleaned, "Battery life is terrible");
        // NFKC folds compatibility forms
        assert_eq!(clean_text("ｆｕｌｌ width\t\n text"), "full width text");
    }

    #[test]
    fn test_plain_text_with_angle_bracket_untouched() {
        assert_eq!(clean_text("price < 5 and rating > 4"), "price < 5 and rating > 4");
    }

    #[test]
    fn test_normalize_drops_and_dedupes() {
        let n = Normalizer::default();
        let report = n.normalize(vec![
            json!({"id": "a", "text": "Screen cracked after one drop"}),
            json!({"id": "b", "text": "  Screen   cracked after one drop "}),
            json!({"id": "c", "text": "short"}),
            json!(42),
            json!("A bare string record works too"),
        ]);
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.documents[0].id, "a");
        assert_eq!(report.documents[1].id, "doc-4");
        assert_eq!(report.dropped_duplicate, 1);
        assert_eq!(report.dropped_short, 2);
        assert_eq!(report.dropped(), 3);
    }

    #[test]
    fn test_normalize_empty() {
        let report = Normalizer::default().normalize(Vec::new());
        assert!(report.documents.is_empty());
        assert_eq!(report.dropped(), 0);
    }
}
