//! Prompt construction and response parsing for generative calls.
//!
//! Kept apart from the network seam so both halves can be tested without a
//! backend.

use std::collections::HashSet;

use serde_json::Value;

use themescope_core::RunContext;
use themescope_ingest::truncate_chars;

use crate::exemplars::ThemeExemplar;

/// A generated theme label with its short rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLabel {
    pub name: String,
    pub rationale: String,
}

impl CandidateLabel {
    /// Text embedded for label/cluster matching.
    pub fn embedding_text(&self) -> String {
        if self.rationale.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.rationale)
        }
    }
}

const REPRESENTATIVE_CHARS: usize = 400;

pub fn label_prompt(
    context: &RunContext,
    exemplars: &[ThemeExemplar],
    max_labels: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Propose the themes most likely to structure the online conversation described below.\n\n",
    );
    prompt.push_str(&format!("Request: {}\n", context.refined_query.trim()));
    if !context.keywords.is_empty() {
        prompt.push_str(&format!("Keywords: {}\n", context.keywords.join(", ")));
    }
    if !context.filters.is_empty() {
        let filters: Vec<String> = context
            .filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.join("|")))
            .collect();
        prompt.push_str(&format!("Filters: {}\n", filters.join("; ")));
    }

    if !exemplars.is_empty() {
        prompt.push_str("\nThemes found in similar past analyses:\n");
        for ex in exemplars {
            prompt.push_str(&format!("- {}: {}", ex.name, ex.description));
            if !ex.keywords.is_empty() {
                prompt.push_str(&format!(" (keywords: {})", ex.keywords.join(", ")));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "\nRules:\n\
         - At most {} themes, each a short noun phrase of 2 to 5 words.\n\
         - Do not use brand or company names in theme names.\n\
         - Themes must be distinct from each other.\n\
         - Respond only with a JSON array of objects with \"name\" and \"description\" \
         (one sentence explaining the theme).\n",
        max_labels
    ));
    prompt
}

pub fn description_prompt(label: &CandidateLabel, representatives: &[&str]) -> String {
    let mut prompt = format!(
        "Write a 1 to 3 sentence description of the theme \"{}\".\n",
        label.name
    );
    if !label.rationale.is_empty() {
        prompt.push_str(&format!("Initial idea: {}\n", label.rationale));
    }
    prompt.push_str("Posts that best represent it:\n");
    for (i, text) in representatives.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, truncate_chars(text, REPRESENTATIVE_CHARS)));
    }
    prompt.push_str(
        "Describe what people say, without quoting posts and without brand names. \
         Respond with the description only.",
    );
    prompt
}

pub fn summary_prompt(text: &str, hints: &[String]) -> String {
    let mut prompt = String::from("Summarize the following post in one or two sentences.\n");
    if !hints.is_empty() {
        prompt.push_str(&format!("Focus on: {}\n", hints.join(", ")));
    }
    prompt.push_str(&format!("Post: {}\nRespond with the summary only.", text));
    prompt
}

/// Parse a label response: a JSON array of `{name, description}` objects,
/// possibly wrapped in prose or a Markdown code fence, or failing that a
/// bulleted `Name: rationale` list. Entries without a name are skipped and
/// names are deduplicated case-insensitively.
pub fn parse_labels(response: &str, max_labels: usize) -> Vec<CandidateLabel> {
    let raw = match embedded_json_array(response) {
        Some(items) => items.iter().filter_map(label_from_value).collect(),
        None => labels_from_lines(response),
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|l| seen.insert(l.name.to_lowercase()))
        .take(max_labels)
        .collect()
}

fn embedded_json_array(response: &str) -> Option<Vec<Value>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<Value>>(&response[start..=end]).ok()
}

fn label_from_value(value: &Value) -> Option<CandidateLabel> {
    let (name, rationale) = match value {
        Value::String(s) => (s.as_str(), ""),
        Value::Object(obj) => {
            let field = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .unwrap_or_default()
            };
            (
                field(&["name", "theme", "label", "title"]),
                field(&["description", "rationale", "reason"]),
            )
        }
        _ => return None,
    };
    let name = clean_name(name);
    (!name.is_empty()).then(|| CandidateLabel {
        name,
        rationale: rationale.trim().to_string(),
    })
}

fn labels_from_lines(response: &str) -> Vec<CandidateLabel> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let body = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let digits = line.chars().take_while(char::is_ascii_digit).count();
                    (digits > 0)
                        .then(|| line[digits..].strip_prefix(". ").or_else(|| line[digits..].strip_prefix(") ")))
                        .flatten()
                })?;
            let (name, rationale) = body.split_once(':').unwrap_or((body, ""));
            let name = clean_name(name);
            (!name.is_empty()).then(|| CandidateLabel {
                name,
                rationale: rationale.trim().to_string(),
            })
        })
        .collect()
}

fn clean_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
