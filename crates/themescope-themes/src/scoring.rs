//! Confidence scoring, ranking and diverse top-N selection.

use std::cmp::Ordering;
use std::collections::HashSet;

use ndarray::Array1;
use tracing::debug;

use themescope_core::{DiscoveryConfig, ScoreWeights};
use themescope_infer::cosine;
use themescope_ingest::tokenize;

use crate::candidate::ThemeCandidate;

/// Share of `keywords` present in the candidate's vocabulary. A multi-word
/// keyword that is only partly present earns half credit.
pub fn keyword_alignment(keywords: &[String], candidate: &ThemeCandidate) -> f64 {
    let mut vocabulary: HashSet<String> = tokenize(&candidate.name).into_iter().collect();
    vocabulary.extend(tokenize(&candidate.description));
    vocabulary.extend(candidate.top_terms.iter().map(|t| t.to_lowercase()));
    vocabulary.extend(candidate.keywords.iter().map(|t| t.to_lowercase()));

    let mut counted = 0usize;
    let mut credit = 0.0;
    for keyword in keywords {
        let words = tokenize(keyword);
        if words.is_empty() {
            continue;
        }
        counted += 1;
        let hits = words.iter().filter(|w| vocabulary.contains(*w)).count();
        if hits == words.len() {
            credit += 1.0;
        } else if hits > 0 && words.len() > 1 {
            credit += 0.5;
        }
    }
    if counted == 0 {
        0.0
    } else {
        credit / counted as f64
    }
}

/// `|A ∩ B| / min(|A|, |B|)` over lower-cased term sets. Empty sets never
/// overlap.
pub fn term_overlap(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<String> = a.iter().map(|t| t.to_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|t| t.to_lowercase()).collect();
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / smaller as f64
}

pub struct ThemeScorer {
    weights: ScoreWeights,
    total_documents: usize,
    query_embedding: Option<Array1<f32>>,
    keywords: Vec<String>,
}

impl ThemeScorer {
    pub fn new(weights: ScoreWeights, total_documents: usize) -> Self {
        Self {
            weights,
            total_documents,
            query_embedding: None,
            keywords: Vec::new(),
        }
    }

    /// Embedding of the refined query; without one, query relevance is 0.
    pub fn with_query_embedding(mut self, embedding: Array1<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn with_keywords(mut self, keywords: &[String]) -> Self {
        self.keywords = keywords.to_vec();
        self
    }

    /// Fill `query_similarity`, `keyword_alignment` and `confidence_score`.
    pub fn score(&self, candidate: &mut ThemeCandidate) {
        let w = &self.weights;
        let count = if self.total_documents == 0 {
            0.0
        } else {
            (candidate.document_count() as f64 / self.total_documents as f64).min(1.0)
        };
        let cohesion = match candidate.match_similarity {
            Some(matched) => (candidate.avg_similarity + matched) / 2.0,
            None => candidate.avg_similarity,
        };
        candidate.query_similarity = self
            .query_embedding
            .as_ref()
            .map(|q| cosine(&candidate.centroid, q).max(0.0))
            .unwrap_or(0.0);
        candidate.keyword_alignment = keyword_alignment(&self.keywords, candidate);

        candidate.confidence_score = w.document_count * count
            + w.cohesion * cohesion
            + w.query_relevance * candidate.query_similarity
            + w.keyword_alignment * candidate.keyword_alignment;
        debug!(
            "Scored {:?}: count={:.3} cohesion={:.3} query={:.3} keywords={:.3} -> {:.4}",
            candidate.name,
            count,
            cohesion,
            candidate.query_similarity,
            candidate.keyword_alignment,
            candidate.confidence_score
        );
    }

    pub fn score_all(&self, candidates: &mut [ThemeCandidate]) {
        for candidate in candidates.iter_mut() {
            self.score(candidate);
        }
    }
}

/// Confidence desc, then document count desc, then source cluster id asc
/// with cluster-less candidates last.
fn rank_order(a: &ThemeCandidate, b: &ThemeCandidate) -> Ordering {
    b.confidence_score
        .total_cmp(&a.confidence_score)
        .then(b.document_count().cmp(&a.document_count()))
        .then(match (a.source_cluster_id, b.source_cluster_id) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

pub struct ThemeSelector {
    pub max_themes: usize,
    pub min_themes: usize,
    /// Candidates whose top terms overlap an already selected theme by more
    /// than this are skipped.
    pub diversity_overlap: f64,
}

impl ThemeSelector {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            max_themes: config.max_themes,
            min_themes: config.min_themes,
            diversity_overlap: config.diversity_overlap,
        }
    }

    pub fn rank(candidates: &mut [ThemeCandidate]) {
        candidates.sort_by(rank_order);
    }

    /// Pick up to `max_themes` scored candidates in rank order.
    ///
    /// Near-duplicates are skipped while scanning. If that leaves fewer than
    /// `min_themes` (capped at `max_themes`), the best skipped candidates are
    /// taken back in. Never pads: with fewer candidates, all are returned.
    pub fn select(&self, candidates: Vec<ThemeCandidate>) -> Vec<ThemeCandidate> {
        let mut ranked: Vec<ThemeCandidate> = candidates
            .into_iter()
            .filter(|c| c.source_cluster_id.map_or(true, |id| id >= 0))
            .filter(|c| c.document_count() > 0)
            .collect();
        Self::rank(&mut ranked);

        let mut selected: Vec<ThemeCandidate> = Vec::new();
        let mut skipped: Vec<ThemeCandidate> = Vec::new();
        for candidate in ranked {
            if selected.len() >= self.max_themes {
                break;
            }
            let duplicate = selected
                .iter()
                .any(|s| term_overlap(&s.top_terms, &candidate.top_terms) > self.diversity_overlap);
            if duplicate {
                debug!("Skipping near-duplicate theme {:?}", candidate.name);
                skipped.push(candidate);
            } else {
                selected.push(candidate);
            }
        }

        let floor = self.min_themes.min(self.max_themes);
        if selected.len() < floor && !skipped.is_empty() {
            let missing = floor - selected.len();
            selected.extend(skipped.into_iter().take(missing));
            Self::rank(&mut selected);
        }
        selected
    }
}
