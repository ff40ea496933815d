//! `discover_themes`: normalize → embed → cluster → name → score → select →
//! synthesize queries, under one caller-supplied deadline.
//!
//! Only an unreachable embedding backend aborts a run. Everything else
//! degrades into warnings plus a smaller valid result.

use std::sync::Arc;

use serde_json::Value;
use tokio::task;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use themescope_chat::{HttpGenerator, LLMConfig, TextGenerator};
use themescope_cluster::{ClusterEngine, Clustering};
use themescope_core::{DiscoveryConfig, Error, NamingStrategy, Result, RunContext};
use themescope_infer::{EmbeddingCache, EmbeddingConfig, EmbeddingProvider, HttpEmbedder};
use themescope_ingest::Normalizer;
use themescope_themes::{
    ExemplarIndex, ExtractiveSummarizer, LlmGuidedNamer, NamingInput, QuerySynthesizer,
    StatisticalNamer, Summarizer, Theme, ThemeCandidate, ThemeNamer, ThemeScorer, ThemeSelector,
};

use crate::types::{AnalysisSummary, DiscoveryResult, Stage};

/// Name of the single theme returned when clustering finds no structure.
pub const CATCH_ALL_THEME: &str = "General Conversation";

/// Theme discovery entry point. Holds the backends; every run is independent.
pub struct ThemeDiscovery {
    embedder: EmbeddingProvider,
    generator: Option<Arc<dyn TextGenerator>>,
    exemplars: Option<Arc<ExemplarIndex>>,
    summarizer: Arc<dyn Summarizer>,
}

impl ThemeDiscovery {
    pub fn new(embedder: EmbeddingProvider) -> Self {
        Self {
            embedder,
            generator: None,
            exemplars: None,
            summarizer: Arc::new(ExtractiveSummarizer::default()),
        }
    }

    /// HTTP backends with a shared embedding cache. A generative backend that
    /// cannot be configured only disables LLM-guided naming.
    pub fn connect(embedding: EmbeddingConfig, llm: Option<&LLMConfig>) -> Result<Self> {
        let backend = HttpEmbedder::new(embedding)?;
        let embedder = EmbeddingProvider::new(Arc::new(backend))
            .with_cache(Arc::new(EmbeddingCache::default_cache()));
        let mut discovery = Self::new(embedder);
        if let Some(llm) = llm {
            match HttpGenerator::from_config(llm) {
                Ok(generator) => discovery = discovery.with_generator(Arc::new(generator)),
                Err(e) => warn!("LLM-guided naming disabled: {}", e),
            }
        }
        Ok(discovery)
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_exemplars(mut self, index: Arc<ExemplarIndex>) -> Self {
        self.exemplars = Some(index);
        self
    }

    /// Summarizer for statistical descriptions (extractive by default).
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn embedder(&self) -> &EmbeddingProvider {
        &self.embedder
    }

    /// Discover themes in `records` for the conversation in `context`.
    ///
    /// Returns `Err` only for an invalid `config` or an unavailable embedding
    /// backend.
    pub async fn discover_themes(
        &self,
        records: Vec<Value>,
        context: &RunContext,
        config: &DiscoveryConfig,
    ) -> Result<DiscoveryResult> {
        config.validate()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("discover_themes", run_id = %run_id);
        self.run(run_id, records, context, config).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        records: Vec<Value>,
        context: &RunContext,
        config: &DiscoveryConfig,
    ) -> Result<DiscoveryResult> {
        let deadline = Instant::now() + config.deadline;
        let mut state = RunState::new(AnalysisSummary::new(run_id, records.len(), config.strategy));
        info!(
            "Theme discovery started: records={}, strategy={}",
            records.len(),
            config.strategy.as_str()
        );

        // Normalize
        let normalizer = Normalizer::from_config(config);
        let normalizing = task::spawn_blocking(move || normalizer.normalize(records));
        let normalized = match timeout_at(deadline, normalizing).await {
            Ok(joined) => joined
                .map_err(|e| Error::Internal(format!("normalization task failed: {}", e)))?,
            Err(_) => return Ok(state.deadline_exceeded(Stage::Normalization)),
        };
        state.summary.total_documents = normalized.documents.len();
        state.summary.dropped_documents = normalized.dropped();
        let documents = normalized.documents;
        if documents.is_empty() {
            warn!("No usable documents after normalization");
            state.degenerate = true;
            state.warnings.push("no usable documents".into());
            return Ok(state.finish(Vec::new()));
        }

        // Embed documents and the refined query
        let embedder = self
            .embedder
            .clone()
            .with_batching(config.embed_batch_size, config.max_concurrency);
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embedded = timeout_at(deadline, async {
            let vectors = embedder.embed_all(&texts).await?;
            let query = match context.refined_query.trim() {
                "" => None,
                q => Some(embedder.embed_one(q).await?),
            };
            Ok::<_, Error>((vectors, query))
        })
        .await;
        let (embeddings, query_embedding) = match embedded {
            Ok(result) => result.map_err(|e| {
                error!("Embedding failed, aborting run: {}", e);
                e
            })?,
            Err(_) => return Ok(state.deadline_exceeded(Stage::Embedding)),
        };

        // Cluster
        let engine = ClusterEngine::new(config.cluster.clone());
        let task_engine = engine.clone();
        let clustered = timeout_at(
            deadline,
            task::spawn_blocking(move || {
                let (clustering, warnings) = cluster_documents(&task_engine, &texts, &embeddings);
                (texts, embeddings, clustering, warnings)
            }),
        )
        .await;
        let (texts, embeddings, clustering, cluster_warnings) = match clustered {
            Ok(joined) => {
                joined.map_err(|e| Error::Internal(format!("clustering task failed: {}", e)))?
            }
            Err(_) => return Ok(state.deadline_exceeded(Stage::Clustering)),
        };
        state.warnings.extend(cluster_warnings);
        state.summary.clusters_found = clustering.clusters.len();
        state.summary.noise_documents = clustering.noise_count();

        // Name
        let mut candidates: Vec<ThemeCandidate> = Vec::new();
        let statistical = StatisticalNamer::new(self.summarizer.clone());
        let namer = self.namer(config, &embedder, statistical.clone(), &mut state.warnings);
        state.summary.strategy_used = namer.strategy();
        if clustering.degenerate {
            warn!(
                "Degenerate clustering ({} clusters); using a single catch-all theme",
                clustering.clusters.len()
            );
            state.degenerate = true;
            state.summary.strategy_used = NamingStrategy::Statistical;
            state.warnings.push(format!(
                "clustering was degenerate ({} clusters); returned a single catch-all theme",
                clustering.clusters.len()
            ));

            let fallback = Clustering {
                clusters: vec![engine.catch_all(&texts, &embeddings)],
                noise: None,
                degenerate: true,
            };
            let input = NamingInput {
                documents: &documents,
                embeddings: &embeddings,
                clustering: &fallback,
                context,
                config,
            };
            let naming = statistical.name_cluster(&fallback.clusters[0], input);
            match timeout_at(deadline, naming).await {
                Ok((mut candidate, warning)) => {
                    candidate.name = CATCH_ALL_THEME.to_string();
                    candidate.source_cluster_id = None;
                    candidates.push(candidate);
                    state.warnings.extend(warning);
                }
                Err(_) => state.deadline_exceeded_keep_going(Stage::Naming),
            }
        } else {
            let input = NamingInput {
                documents: &documents,
                embeddings: &embeddings,
                clustering: &clustering,
                context,
                config,
            };
            match timeout_at(deadline, namer.name_themes(input, &mut candidates)).await {
                Ok(Ok(outcome)) => {
                    state.summary.strategy_used = outcome.strategy_used;
                    state.warnings.extend(outcome.warnings);
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!("Naming failed, aborting run: {}", e);
                    return Err(e);
                }
                Ok(Err(e)) => {
                    warn!("Naming failed: {}", e);
                    state.warnings.push(format!("naming failed: {}", e));
                }
                Err(_) => state.deadline_exceeded_keep_going(Stage::Naming),
            }
        }
        state.summary.candidates_generated = candidates.len();
        info!("Naming complete: {} candidates", candidates.len());

        // Score, select, synthesize queries
        let mut scorer = ThemeScorer::new(config.weights.clone(), documents.len())
            .with_keywords(&context.keywords);
        if let Some(query) = query_embedding {
            scorer = scorer.with_query_embedding(query);
        }
        scorer.score_all(&mut candidates);
        let selected = ThemeSelector::from_config(config).select(candidates);

        let synthesizer = QuerySynthesizer::default();
        let mut themes = Vec::with_capacity(selected.len());
        for candidate in selected {
            match synthesizer.for_candidate(&candidate, context) {
                Ok(query) => themes.push(Theme::from_candidate(candidate, query)),
                Err(e) => {
                    warn!("Omitting theme {:?}: {}", candidate.name, e);
                    state
                        .warnings
                        .push(format!("omitted theme \"{}\": {}", candidate.name, e));
                }
            }
        }
        Ok(state.finish(themes))
    }

    fn namer(
        &self,
        config: &DiscoveryConfig,
        embedder: &EmbeddingProvider,
        statistical: StatisticalNamer,
        warnings: &mut Vec<String>,
    ) -> Box<dyn ThemeNamer> {
        match (config.strategy, &self.generator) {
            (NamingStrategy::LlmGuided, Some(generator)) => {
                let mut namer = LlmGuidedNamer::new(generator.clone(), embedder.clone(), statistical);
                if let Some(index) = &self.exemplars {
                    namer = namer.with_exemplars(index.clone());
                }
                Box::new(namer)
            }
            (NamingStrategy::LlmGuided, None) => {
                warn!("LLM-guided naming requested without a generative backend");
                warnings.push("no generative backend configured; used statistical naming".into());
                Box::new(statistical)
            }
            (NamingStrategy::Statistical, _) => Box::new(statistical),
        }
    }
}

/// Cluster, retrying once with a relaxed engine when the first result is
/// degenerate. Clustering errors become a degenerate result.
fn cluster_documents(
    engine: &ClusterEngine,
    texts: &[String],
    embeddings: &[ndarray::Array1<f32>],
) -> (Clustering, Vec<String>) {
    let mut warnings = Vec::new();
    let mut clustering = match engine.cluster(texts, embeddings) {
        Ok(clustering) => clustering,
        Err(e) => {
            warn!("Clustering failed: {}", e);
            warnings.push(format!("clustering failed: {}", e));
            Clustering {
                degenerate: true,
                ..Default::default()
            }
        }
    };

    if clustering.degenerate && engine.config().retry_on_degenerate {
        let relaxed = engine.relaxed();
        let min_cluster_size = relaxed.config().min_cluster_size;
        if min_cluster_size < engine.config().min_cluster_size {
            info!("Retrying clustering with min_cluster_size={}", min_cluster_size);
            match relaxed.cluster(texts, embeddings) {
                Ok(retry) if !retry.degenerate => {
                    warnings.push(format!(
                        "initial clustering was degenerate; retried with min_cluster_size {}",
                        min_cluster_size
                    ));
                    clustering = retry;
                }
                Ok(_) => info!("Relaxed clustering is still degenerate"),
                Err(e) => warn!("Relaxed clustering failed: {}", e),
            }
        }
    }
    (clustering, warnings)
}

struct RunState {
    summary: AnalysisSummary,
    warnings: Vec<String>,
    degenerate: bool,
    partial: bool,
    clock: std::time::Instant,
}

impl RunState {
    fn new(summary: AnalysisSummary) -> Self {
        Self {
            summary,
            warnings: Vec::new(),
            degenerate: false,
            partial: false,
            clock: std::time::Instant::now(),
        }
    }

    fn deadline_exceeded_keep_going(&mut self, stage: Stage) {
        warn!("Deadline exceeded during {}", stage.as_str());
        self.partial = true;
        self.warnings
            .push(format!("deadline exceeded during {}", stage.as_str()));
    }

    /// Stop with whatever was finished: nothing, before naming.
    fn deadline_exceeded(mut self, stage: Stage) -> DiscoveryResult {
        self.deadline_exceeded_keep_going(stage);
        self.finish(Vec::new())
    }

    fn finish(mut self, themes: Vec<Theme>) -> DiscoveryResult {
        self.summary.themes_selected = themes.len();
        self.summary.avg_confidence_score = if themes.is_empty() {
            0.0
        } else {
            themes.iter().map(|t| t.confidence_score).sum::<f64>() / themes.len() as f64
        };
        self.summary.elapsed_ms = self.clock.elapsed().as_millis() as u64;
        info!(
            "Theme discovery complete: themes={}, candidates={}, degenerate={}, partial={}, elapsed={}ms",
            themes.len(),
            self.summary.candidates_generated,
            self.degenerate,
            self.partial,
            self.summary.elapsed_ms
        );
        DiscoveryResult {
            themes,
            warnings: self.warnings,
            degenerate: self.degenerate,
            partial: self.partial,
            summary: self.summary,
        }
    }
}
