//! Discovery run configuration.
//!
//! Values come from three layers: built-in defaults, an optional JSON file,
//! then `THEMESCOPE_*` environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Which namer turns clusters into theme candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// Names from cluster terms, descriptions from one representative document.
    Statistical,
    /// LLM-proposed labels reconciled against clusters by embedding similarity.
    LlmGuided,
}

impl NamingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingStrategy::Statistical => "statistical",
            NamingStrategy::LlmGuided => "llm_guided",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "statistical" => Some(Self::Statistical),
            "llm_guided" | "llm-guided" | "llm" => Some(Self::LlmGuided),
            _ => None,
        }
    }
}

/// Weights of the confidence score components. All must be non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Normalized document count.
    pub document_count: f64,
    /// Cluster cohesion (`avg_similarity`, blended with match similarity).
    pub cohesion: f64,
    /// Similarity of the theme centroid to the refined query.
    pub query_relevance: f64,
    /// Share of context keywords present in the theme vocabulary.
    pub keyword_alignment: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            document_count: 0.25,
            cohesion: 0.40,
            query_relevance: 0.25,
            keyword_alignment: 0.10,
        }
    }
}

impl ScoreWeights {
    fn components(&self) -> [f64; 4] {
        [
            self.document_count,
            self.cohesion,
            self.query_relevance,
            self.keyword_alignment,
        ]
    }
}

/// Cluster engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Smallest group HDBSCAN reports as a cluster.
    pub min_cluster_size: usize,
    /// Neighbourhood size used for core distances.
    pub min_samples: usize,
    /// Target dimensionality before clustering.
    pub reduced_dimensions: usize,
    /// Seed for the projection's initial vectors.
    pub seed: u64,
    /// Number of top terms kept per cluster.
    pub top_terms: usize,
    /// Number of representative documents kept per cluster.
    pub representative_docs: usize,
    /// A term is dropped from a cluster's top terms when its relative
    /// frequency in the noise group exceeds this multiple of its relative
    /// frequency in the cluster.
    pub noise_term_ratio: f64,
    /// Re-cluster once with a smaller `min_cluster_size` when degenerate.
    pub retry_on_degenerate: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            reduced_dimensions: 10,
            seed: 42,
            top_terms: 10,
            representative_docs: 3,
            noise_term_ratio: 2.0,
            retry_on_degenerate: true,
        }
    }
}

/// Configuration of a single `discover_themes` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub strategy: NamingStrategy,
    /// Upper bound on returned themes.
    pub max_themes: usize,
    /// Minimum viable theme count when enough candidates exist.
    pub min_themes: usize,
    /// Minimum cosine similarity for label/cluster matches.
    pub min_similarity: f64,
    /// Wall-clock budget for the whole run.
    #[serde(with = "duration_secs")]
    pub deadline: Duration,
    /// Keep LLM labels that matched no cluster as cluster-less themes.
    pub keep_unmatched_labels: bool,
    pub max_candidate_labels: usize,
    /// Prior-theme exemplars retrieved for label generation.
    pub exemplar_count: usize,
    /// Top-term overlap above which a candidate counts as a near-duplicate.
    pub diversity_overlap: f64,
    /// Records whose extracted text is shorter than this are dropped.
    pub min_text_chars: usize,
    /// Depth bound for the nested-record text scan.
    pub max_scan_depth: usize,
    pub embed_batch_size: usize,
    /// Worker pool size for embedding batches and per-theme generation.
    pub max_concurrency: usize,
    /// Length cap for truncated fallback descriptions.
    pub summary_max_chars: usize,
    pub weights: ScoreWeights,
    pub cluster: ClusterConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy: NamingStrategy::Statistical,
            max_themes: 10,
            min_themes: 5,
            min_similarity: 0.3,
            deadline: Duration::from_secs(120),
            keep_unmatched_labels: false,
            max_candidate_labels: 15,
            exemplar_count: 10,
            diversity_overlap: 0.7,
            min_text_chars: 10,
            max_scan_depth: 6,
            embed_batch_size: 32,
            max_concurrency: 4,
            summary_max_chars: 300,
            weights: ScoreWeights::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Load from a JSON file (missing file → defaults), then apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<DiscoveryConfig>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No discovery config at {}, using defaults", path.display());
                DiscoveryConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = DiscoveryConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `THEMESCOPE_*` overrides read through `lookup`.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("THEMESCOPE_STRATEGY") {
            match NamingStrategy::parse(&v) {
                Some(s) => self.strategy = s,
                None => warn!("Ignoring unknown THEMESCOPE_STRATEGY={}", v),
            }
        }
        if let Some(v) = lookup("THEMESCOPE_MAX_THEMES") {
            match v.trim().parse() {
                Ok(n) => self.max_themes = n,
                Err(_) => warn!("Ignoring invalid THEMESCOPE_MAX_THEMES={}", v),
            }
        }
        if let Some(v) = lookup("THEMESCOPE_MIN_SIMILARITY") {
            match v.trim().parse() {
                Ok(x) => self.min_similarity = x,
                Err(_) => warn!("Ignoring invalid THEMESCOPE_MIN_SIMILARITY={}", v),
            }
        }
        if let Some(v) = lookup("THEMESCOPE_DEADLINE_SECS") {
            match v.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    self.deadline = Duration::from_secs_f64(secs)
                }
                _ => warn!("Ignoring invalid THEMESCOPE_DEADLINE_SECS={}", v),
            }
        }
        if let Some(v) = lookup("THEMESCOPE_KEEP_UNMATCHED") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.keep_unmatched_labels = true,
                "0" | "false" | "no" => self.keep_unmatched_labels = false,
                _ => warn!("Ignoring invalid THEMESCOPE_KEEP_UNMATCHED={}", v),
            }
        }
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_themes == 0 {
            return Err(Error::Config("max_themes must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::Config(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.diversity_overlap) {
            return Err(Error::Config(format!(
                "diversity_overlap must be within [0, 1], got {}",
                self.diversity_overlap
            )));
        }
        let weights = self.weights.components();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("score weights must be non-negative".into()));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(Error::Config("at least one score weight must be positive".into()));
        }
        if self.embed_batch_size == 0 || self.max_concurrency == 0 {
            return Err(Error::Config(
                "embed_batch_size and max_concurrency must be at least 1".into(),
            ));
        }
        if self.cluster.min_cluster_size < 2 {
            return Err(Error::Config("cluster.min_cluster_size must be at least 2".into()));
        }
        if self.deadline.is_zero() {
            return Err(Error::Config("deadline must be positive".into()));
        }
        Ok(())
    }
}

/// `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("deadline must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
