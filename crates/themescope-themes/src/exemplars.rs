//! Prior-theme exemplars retrieved to ground label generation.

use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::info;

use themescope_core::Result;
use themescope_infer::{cosine, EmbeddingProvider};

/// A theme from an earlier analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeExemplar {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

impl ThemeExemplar {
    fn embedding_text(&self) -> String {
        let mut text = format!("{}: {}", self.name, self.description);
        if !self.keywords.is_empty() {
            text.push(' ');
            text.push_str(&self.keywords.join(" "));
        }
        text
    }
}

/// In-memory cosine index over embedded exemplars.
#[derive(Default)]
pub struct ExemplarIndex {
    entries: Vec<(ThemeExemplar, Array1<f32>)>,
}

impl ExemplarIndex {
    /// Read a JSON array of exemplars.
    pub fn load_exemplars(path: &Path) -> Result<Vec<ThemeExemplar>> {
        let raw = std::fs::read_to_string(path)?;
        let exemplars: Vec<ThemeExemplar> = serde_json::from_str(&raw)?;
        Ok(exemplars)
    }

    /// Embed every exemplar once.
    pub async fn build(exemplars: Vec<ThemeExemplar>, embedder: &EmbeddingProvider) -> Result<Self> {
        let texts: Vec<String> = exemplars.iter().map(ThemeExemplar::embedding_text).collect();
        let vectors = embedder.embed_all(&texts).await?;
        info!("Indexed {} theme exemplars", exemplars.len());
        Ok(Self::from_parts(exemplars.into_iter().zip(vectors).collect()))
    }

    pub fn from_parts(entries: Vec<(ThemeExemplar, Array1<f32>)>) -> Self {
        Self { entries }
    }

    /// Up to `k` exemplars closest to `query`, most similar first; ties keep
    /// insertion order.
    pub fn search(&self, query: &Array1<f32>, k: usize) -> Vec<&ThemeExemplar> {
        let mut scored: Vec<(f64, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (cosine(query, v), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| &self.entries[i].0)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
