//! Theme candidates and final themes.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Pre-selection theme produced by a namer and filled in by the scorer.
#[derive(Debug, Clone)]
pub struct ThemeCandidate {
    pub name: String,
    pub description: String,
    /// `None` for generated labels kept without a matching cluster.
    pub source_cluster_id: Option<i32>,
    pub document_indices: Vec<usize>,
    pub top_terms: Vec<String>,
    /// Extra vocabulary contributed by the namer (label words, exemplar keywords).
    pub keywords: Vec<String>,
    pub centroid: Array1<f32>,
    /// Mean cosine of members to the centroid (or to the label embedding for
    /// cluster-less themes), in `[0, 1]`.
    pub avg_similarity: f64,
    /// Label-to-cluster similarity for matched generated labels.
    pub match_similarity: Option<f64>,
    pub query_similarity: f64,
    pub keyword_alignment: f64,
    pub confidence_score: f64,
}

impl ThemeCandidate {
    pub fn new(name: impl Into<String>, description: impl Into<String>, centroid: Array1<f32>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source_cluster_id: None,
            document_indices: Vec::new(),
            top_terms: Vec::new(),
            keywords: Vec::new(),
            centroid,
            avg_similarity: 0.0,
            match_similarity: None,
            query_similarity: 0.0,
            keyword_alignment: 0.0,
            confidence_score: 0.0,
        }
    }

    pub fn document_count(&self) -> usize {
        self.document_indices.len()
    }
}

/// Selected theme. Serializes to exactly the six public fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub description: String,
    pub document_count: usize,
    pub avg_similarity: f64,
    pub confidence_score: f64,
    pub boolean_query: String,
    #[serde(skip)]
    pub source_cluster_id: Option<i32>,
    #[serde(skip)]
    pub document_indices: Vec<usize>,
    #[serde(skip)]
    pub top_terms: Vec<String>,
}

impl Theme {
    pub fn from_candidate(candidate: ThemeCandidate, boolean_query: String) -> Self {
        Self {
            document_count: candidate.document_count(),
            name: candidate.name,
            description: candidate.description,
            avg_similarity: candidate.avg_similarity,
            confidence_score: candidate.confidence_score,
            boolean_query,
            source_cluster_id: candidate.source_cluster_id,
            document_indices: candidate.document_indices,
            top_terms: candidate.top_terms,
        }
    }
}
