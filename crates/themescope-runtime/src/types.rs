//! Runtime types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use themescope_core::NamingStrategy;
use themescope_themes::Theme;

/// Pipeline stage, named in deadline warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Normalization,
    Embedding,
    Clustering,
    Naming,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalization => "normalization",
            Stage::Embedding => "embedding",
            Stage::Clustering => "clustering",
            Stage::Naming => "naming",
        }
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Raw records received.
    pub total_records: usize,
    /// Documents that survived normalization.
    pub total_documents: usize,
    /// Records dropped as empty, too short or duplicate.
    pub dropped_documents: usize,
    /// Non-noise clusters, after any degenerate retry.
    pub clusters_found: usize,
    pub noise_documents: usize,
    pub candidates_generated: usize,
    pub themes_selected: usize,
    pub avg_confidence_score: f64,
    /// Strategy that actually named the themes, after any fallback.
    pub strategy_used: NamingStrategy,
    pub elapsed_ms: u64,
}

impl AnalysisSummary {
    pub fn new(run_id: Uuid, total_records: usize, strategy: NamingStrategy) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            total_records,
            total_documents: 0,
            dropped_documents: 0,
            clusters_found: 0,
            noise_documents: 0,
            candidates_generated: 0,
            themes_selected: 0,
            avg_confidence_score: 0.0,
            strategy_used: strategy,
            elapsed_ms: 0,
        }
    }
}

/// Outcome of `discover_themes`.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    /// Selected themes, best first.
    pub themes: Vec<Theme>,
    pub warnings: Vec<String>,
    /// Clustering found no usable structure; themes (if any) are a catch-all.
    pub degenerate: bool,
    /// The deadline cut the run short.
    pub partial: bool,
    pub summary: AnalysisSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_shape() {
        let result = DiscoveryResult {
            themes: Vec::new(),
            warnings: vec!["no usable documents".into()],
            degenerate: true,
            partial: false,
            summary: AnalysisSummary::new(Uuid::new_v4(), 0, NamingStrategy::Statistical),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["themes"].as_array().unwrap().is_empty());
        assert_eq!(json["degenerate"], true);
        assert_eq!(json["summary"]["strategy_used"], "statistical");
        assert!(json["summary"]["run_id"].is_string());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Embedding.as_str(), "embedding");
        assert_eq!(serde_json::to_value(Stage::Naming).unwrap(), "naming");
    }
}
