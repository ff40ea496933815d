//! Documents and run-scoped context shared by every pipeline stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field restrictions such as `source: [TWITTER, INSTAGRAM]`, kept ordered so
/// anything derived from them is deterministic.
pub type Filters = BTreeMap<String, Vec<String>>;

/// One retrieved item after normalization. Immutable for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque external identifier.
    pub id: String,
    /// Cleaned text content, never empty.
    pub text: String,
    /// Original payload, kept for rendering and not read by the pipeline.
    pub raw: serde_json::Value,
}

/// Conversational context a run is conditioned on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    pub refined_query: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub filters: Filters,
    /// Terms the caller wants excluded from synthesized queries.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl RunContext {
    pub fn new(refined_query: impl Into<String>) -> Self {
        Self {
            refined_query: refined_query.into(),
            ..Default::default()
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_exclusions<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Text used to retrieve exemplars and to score query relevance.
    pub fn search_text(&self) -> String {
        if self.keywords.is_empty() {
            self.refined_query.trim().to_string()
        } else {
            format!("{} {}", self.refined_query.trim(), self.keywords.join(" "))
                .trim()
                .to_string()
        }
    }
}
