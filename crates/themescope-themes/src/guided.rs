//! Label-guided naming with statistical fallback: generated labels
//! reconciled with statistical clusters.
//!
//! 1. Ask the generator for candidate labels, conditioned on the run context
//!    and on prior-theme exemplars when an index is available.
//! 2. Embed labels and match them one-to-one to cluster centroids, greedily
//!    by descending cosine similarity above `min_similarity`.
//! 3. Describe each matched pair from the label rationale and the cluster's
//!    representative documents.
//!
//! Label generation failures, unusable responses and "nothing matched" all
//! fall back to the statistical namer over the same clusters.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use ndarray::Array1;
use tracing::{debug, info, warn};

use themescope_chat::TextGenerator;
use themescope_cluster::{class_top_terms, Cluster};
use themescope_core::{NamingStrategy, Result};
use themescope_infer::{centroid, cosine, EmbeddingProvider};
use themescope_ingest::tokenize;

use crate::candidate::ThemeCandidate;
use crate::exemplars::{ExemplarIndex, ThemeExemplar};
use crate::namer::{NamingInput, NamingOutcome, ThemeNamer};
use crate::prompts::{description_prompt, label_prompt, parse_labels, CandidateLabel};
use crate::statistical::StatisticalNamer;

const CLUSTERLESS_TOP_TERMS: usize = 10;

/// A label matched to a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelMatch {
    pub label: usize,
    /// Position in `Clustering::clusters`.
    pub cluster: usize,
    pub similarity: f64,
}

/// One-to-one greedy assignment. All pairs at or above `min_similarity` are
/// ranked by similarity (ties: label index, then cluster id) and taken while
/// neither side is used yet. Result is ordered by cluster position.
pub fn match_labels(
    labels: &[Array1<f32>],
    clusters: &[Cluster],
    min_similarity: f64,
) -> Vec<LabelMatch> {
    let mut pairs: Vec<LabelMatch> = Vec::new();
    for (li, label) in labels.iter().enumerate() {
        for (ci, cluster) in clusters.iter().enumerate() {
            let similarity = cosine(label, &cluster.centroid);
            if similarity >= min_similarity {
                pairs.push(LabelMatch {
                    label: li,
                    cluster: ci,
                    similarity,
                });
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.label.cmp(&b.label))
            .then(clusters[a.cluster].cluster_id.cmp(&clusters[b.cluster].cluster_id))
    });

    let mut used_labels = HashSet::new();
    let mut used_clusters = HashSet::new();
    let mut matches: Vec<LabelMatch> = pairs
        .into_iter()
        .filter(|m| {
            if used_labels.contains(&m.label) || used_clusters.contains(&m.cluster) {
                return false;
            }
            used_labels.insert(m.label);
            used_clusters.insert(m.cluster);
            true
        })
        .collect();
    matches.sort_by_key(|m| m.cluster);
    matches
}

pub struct LlmGuidedNamer {
    generator: Arc<dyn TextGenerator>,
    embedder: EmbeddingProvider,
    exemplars: Option<Arc<ExemplarIndex>>,
    fallback: StatisticalNamer,
}

impl LlmGuidedNamer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: EmbeddingProvider,
        fallback: StatisticalNamer,
    ) -> Self {
        Self {
            generator,
            embedder,
            exemplars: None,
            fallback,
        }
    }

    pub fn with_exemplars(mut self, index: Arc<ExemplarIndex>) -> Self {
        self.exemplars = Some(index);
        self
    }

    async fn retrieve_exemplars(&self, input: NamingInput<'_>) -> Result<Vec<ThemeExemplar>> {
        let Some(index) = self.exemplars.as_deref() else {
            return Ok(Vec::new());
        };
        let query = input.context.search_text();
        if index.is_empty() || query.is_empty() || input.config.exemplar_count == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(&query).await?;
        let hits: Vec<ThemeExemplar> = index
            .search(&query_vec, input.config.exemplar_count)
            .into_iter()
            .cloned()
            .collect();
        debug!("Retrieved {} exemplars", hits.len());
        Ok(hits)
    }

    /// Generated labels, or the reason there are none.
    async fn generate_labels(
        &self,
        input: NamingInput<'_>,
        exemplars: &[ThemeExemplar],
    ) -> std::result::Result<Vec<CandidateLabel>, String> {
        let max_labels = input.config.max_candidate_labels.max(1);
        let prompt = label_prompt(input.context, exemplars, max_labels);
        let response = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| format!("label generation failed: {}", e))?;
        let labels = parse_labels(&response, max_labels);
        if labels.is_empty() {
            return Err("label generation returned no usable labels".into());
        }
        info!("Generated {} candidate labels", labels.len());
        Ok(labels)
    }

    async fn describe(
        &self,
        label: &CandidateLabel,
        cluster: &Cluster,
        input: NamingInput<'_>,
    ) -> (String, Option<String>) {
        let representatives: Vec<&str> = cluster
            .representative_documents
            .iter()
            .map(|&i| input.text(i))
            .collect();
        let prompt = description_prompt(label, &representatives);
        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), None),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty response".into(),
                };
                warn!("Description for {:?} failed: {}", label.name, reason);
                let fallback = if label.rationale.is_empty() {
                    label.name.clone()
                } else {
                    label.rationale.clone()
                };
                let warning = format!(
                    "description generation failed for \"{}\"; used label rationale",
                    label.name
                );
                (fallback, Some(warning))
            }
        }
    }

    /// Cluster-less theme for a label nobody matched: documents outside every
    /// matched cluster that are close enough to the label.
    fn clusterless_candidate(
        &self,
        label: &CandidateLabel,
        label_vec: &Array1<f32>,
        claimed: &HashSet<usize>,
        input: NamingInput<'_>,
    ) -> Option<ThemeCandidate> {
        let min_similarity = input.config.min_similarity;
        let scored: Vec<(usize, f64)> = input
            .embeddings
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed.contains(i))
            .map(|(i, e)| (i, cosine(e, label_vec)))
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();
        if scored.is_empty() {
            return None;
        }

        let members: Vec<usize> = scored.iter().map(|(i, _)| *i).collect();
        let avg = scored.iter().map(|(_, s)| s).sum::<f64>() / scored.len() as f64;
        let center = centroid(members.iter().map(|&i| &input.embeddings[i]))?;
        let tokens: Vec<Vec<String>> = input.documents.iter().map(|d| tokenize(&d.text)).collect();
        let top_terms = class_top_terms(
            &tokens,
            std::slice::from_ref(&members),
            &[],
            CLUSTERLESS_TOP_TERMS,
            input.config.cluster.noise_term_ratio,
        )
        .into_iter()
        .next()
        .unwrap_or_default();

        let description = if label.rationale.is_empty() {
            label.name.clone()
        } else {
            label.rationale.clone()
        };
        let mut candidate = ThemeCandidate::new(label.name.clone(), description, center);
        candidate.document_indices = members;
        candidate.top_terms = top_terms;
        candidate.keywords = tokenize(&label.name);
        candidate.avg_similarity = avg.clamp(0.0, 1.0);
        Some(candidate)
    }

    async fn run(
        &self,
        input: NamingInput<'_>,
        sink: &mut Vec<ThemeCandidate>,
    ) -> Result<NamingOutcome> {
        let exemplars = self.retrieve_exemplars(input).await?;
        let labels = match self.generate_labels(input, &exemplars).await {
            Ok(labels) => labels,
            Err(reason) => return Ok(self.fall_back(input, sink, reason).await),
        };

        let label_texts: Vec<String> = labels.iter().map(CandidateLabel::embedding_text).collect();
        let label_vecs = self.embedder.embed_all(&label_texts).await?;

        let clusters = &input.clustering.clusters;
        let matches = match_labels(&label_vecs, clusters, input.config.min_similarity);
        info!(
            "Matched {} of {} labels to {} clusters",
            matches.len(),
            labels.len(),
            clusters.len()
        );

        let claimed: HashSet<usize> = matches
            .iter()
            .flat_map(|m| clusters[m.cluster].member_indices.iter().copied())
            .collect();
        let mut extra = Vec::new();
        if input.config.keep_unmatched_labels {
            let matched_labels: HashSet<usize> = matches.iter().map(|m| m.label).collect();
            for (li, label) in labels.iter().enumerate() {
                if matched_labels.contains(&li) {
                    continue;
                }
                match self.clusterless_candidate(label, &label_vecs[li], &claimed, input) {
                    Some(candidate) => extra.push(candidate),
                    None => debug!("Discarding unmatched label {:?}", label.name),
                }
            }
        }

        if matches.is_empty() && extra.is_empty() {
            return Ok(self
                .fall_back(input, sink, "no generated label matched a cluster".into())
                .await);
        }

        let mut outcome = NamingOutcome::new(NamingStrategy::LlmGuided);
        let jobs: Vec<BoxFuture<'_, (&LabelMatch, String, Option<String>)>> = matches
            .iter()
            .map(|m| {
                let label = &labels[m.label];
                let cluster = &clusters[m.cluster];
                async move {
                    let (description, warning) = self.describe(label, cluster, input).await;
                    (m, description, warning)
                }
                .boxed()
            })
            .collect();
        let mut described = stream::iter(jobs).buffered(input.config.max_concurrency.max(1));

        while let Some((m, description, warning)) = described.next().await {
            let label = &labels[m.label];
            let cluster = &clusters[m.cluster];
            let mut candidate =
                ThemeCandidate::new(label.name.clone(), description, cluster.centroid.clone());
            candidate.source_cluster_id = Some(cluster.cluster_id);
            candidate.document_indices = cluster.member_indices.clone();
            candidate.top_terms = cluster.top_terms.clone();
            candidate.keywords = tokenize(&label.name);
            candidate.avg_similarity = cluster.cohesion;
            candidate.match_similarity = Some(m.similarity.clamp(0.0, 1.0));
            sink.push(candidate);
            outcome.warnings.extend(warning);
        }
        sink.extend(extra);
        Ok(outcome)
    }

    async fn fall_back(
        &self,
        input: NamingInput<'_>,
        sink: &mut Vec<ThemeCandidate>,
        reason: String,
    ) -> NamingOutcome {
        warn!("{}; falling back to statistical naming", reason);
        let mut outcome = NamingOutcome::new(NamingStrategy::Statistical);
        outcome
            .warnings
            .push(format!("{}; fell back to statistical naming", reason));
        outcome.warnings.extend(self.fallback.name_all(input, sink).await);
        outcome
    }
}

impl ThemeNamer for LlmGuidedNamer {
    fn strategy(&self) -> NamingStrategy {
        NamingStrategy::LlmGuided
    }

    fn name_themes<'a>(
        &'a self,
        input: NamingInput<'a>,
        sink: &'a mut Vec<ThemeCandidate>,
    ) -> BoxFuture<'a, Result<NamingOutcome>> {
        Box::pin(self.run(input, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistical::test_support::{cluster, fixture};
    use ndarray::array;
    use std::collections::HashMap;
    use themescope_core::{Error, RunContext};
    use themescope_infer::EmbedderBackend;

    /// Maps known texts to fixed vectors, everything else to `[0, 0, 1]`.
    struct TableEmbedder(HashMap<String, Vec<f32>>);

    impl EmbedderBackend for TableEmbedder {
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
            Box::pin(async move {
                Ok(texts
                    .iter()
                    .map(|t| self.0.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
                    .collect())
            })
        }

        fn dimension(&self) -> Option<usize> {
            Some(3)
        }

        fn model_id(&self) -> &str {
            "table"
        }
    }

    /// Answers label prompts with a fixed response and description prompts
    /// with a canned description.
    struct ScriptedGenerator {
        labels: std::result::Result<String, ()>,
        descriptions_fail: bool,
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                if prompt.starts_with("Propose") {
                    return self
                        .labels
                        .clone()
                        .map_err(|_| Error::generative_unavailable("503"));
                }
                if self.descriptions_fail {
                    return Err(Error::generative_unavailable("503"));
                }
                Ok("People describe this at length.".to_string())
            })
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn embedder() -> EmbeddingProvider {
        let table: HashMap<String, Vec<f32>> = [
            ("Battery life: Phones dying early", vec![1.0, 0.0, 0.0]),
            ("Cracked screens: Fragile glass", vec![0.0, 1.0, 0.0]),
            ("Gift scams: Fake giveaways", vec![0.0, 0.0, 1.0]),
            ("Unrelated: Nothing", vec![-1.0, 0.0, 0.0]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        EmbeddingProvider::new(Arc::new(TableEmbedder(table)))
    }

    fn namer(labels: std::result::Result<&str, ()>, descriptions_fail: bool) -> LlmGuidedNamer {
        let generator = ScriptedGenerator {
            labels: labels.map(str::to_string),
            descriptions_fail,
        };
        LlmGuidedNamer::new(Arc::new(generator), embedder(), StatisticalNamer::default())
    }

    const LABELS: &str = r#"[
        {"name": "Cracked screens", "description": "Fragile glass"},
        {"name": "Battery life", "description": "Phones dying early"},
        {"name": "Gift scams", "description": "Fake giveaways"}
    ]"#;

    #[test]
    fn test_match_labels_one_to_one() {
        let clusters = vec![
            cluster(0, vec![0], &[], array![1.0, 0.0, 0.0]),
            cluster(1, vec![1], &[], array![0.0, 1.0, 0.0]),
        ];
        let labels = vec![
            array![0.9f32, 0.1, 0.0],
            array![1.0f32, 0.0, 0.0],
            array![0.0f32, 0.0, 1.0],
        ];
        let matches = match_labels(&labels, &clusters, 0.3);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label, 1);
        assert_eq!(matches[0].cluster, 0);

        // the weaker label cannot claim a used cluster, even above threshold
        let matches = match_labels(&labels, &clusters, 0.05);
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].label, matches[0].cluster), (1, 0));
        assert_eq!((matches[1].label, matches[1].cluster), (0, 1));
    }

    #[tokio::test]
    async fn test_labels_matched_to_clusters() {
        let (documents, embeddings, clustering, config) = fixture();
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };
        let mut sink = Vec::new();
        let outcome = namer(Ok(LABELS), false)
            .name_themes(input, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.strategy_used, NamingStrategy::LlmGuided);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].name, "Battery life");
        assert_eq!(sink[0].source_cluster_id, Some(0));
        assert_eq!(sink[1].name, "Cracked screens");
        assert_eq!(sink[1].description, "People describe this at length.");
        assert!(sink[0].match_similarity.unwrap() > 0.9);
        // "Gift scams" matches no cluster and is discarded by default
        assert!(sink.iter().all(|c| c.name != "Gift scams"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_guided_naming_with_exemplars_on_worker_thread() {
        let handle = tokio::spawn(async move {
            let (documents, embeddings, clustering, config) = fixture();
            let context = RunContext::new("phone complaints").with_keywords(["battery"]);
            let exemplar = ThemeExemplar {
                name: "Battery life".into(),
                description: "Phones dying early".into(),
                keywords: vec!["battery".into()],
                related_topics: Vec::new(),
            };
            let index = ExemplarIndex::from_parts(vec![(exemplar, array![0.0f32, 0.0, 1.0])]);
            let namer = namer(Ok(LABELS), false).with_exemplars(Arc::new(index));
            let input = NamingInput {
                documents: &documents,
                embeddings: &embeddings,
                clustering: &clustering,
                context: &context,
                config: &config,
            };
            let mut sink = Vec::new();
            let outcome = namer.name_themes(input, &mut sink).await.unwrap();
            let names: Vec<String> = sink.into_iter().map(|c| c.name).collect();
            (outcome.strategy_used, names)
        });

        let (strategy, names) = handle.await.unwrap();
        assert_eq!(strategy, NamingStrategy::LlmGuided);
        assert_eq!(names, vec!["Battery life", "Cracked screens"]);
    }

    #[tokio::test]
    async fn test_unmatched_label_kept_without_cluster() {
        let (documents, embeddings, clustering, mut config) = fixture();
        config.keep_unmatched_labels = true;
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };
        let mut sink = Vec::new();
        namer(Ok(LABELS), false)
            .name_themes(input, &mut sink)
            .await
            .unwrap();

        let scam = sink.iter().find(|c| c.name == "Gift scams").unwrap();
        assert_eq!(scam.source_cluster_id, None);
        assert_eq!(scam.document_indices, vec![4]);
        assert_eq!(scam.description, "Fake giveaways");
    }

    #[tokio::test]
    async fn test_description_failure_uses_rationale() {
        let (documents, embeddings, clustering, config) = fixture();
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };
        let mut sink = Vec::new();
        let outcome = namer(Ok(LABELS), true)
            .name_themes(input, &mut sink)
            .await
            .unwrap();
        assert_eq!(sink[0].description, "Phones dying early");
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back_to_statistical() {
        let (documents, embeddings, clustering, config) = fixture();
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };

        let mut guided = Vec::new();
        let outcome = namer(Err(()), false)
            .name_themes(input, &mut guided)
            .await
            .unwrap();
        let mut statistical = Vec::new();
        StatisticalNamer::default()
            .name_themes(input, &mut statistical)
            .await
            .unwrap();

        assert_eq!(outcome.strategy_used, NamingStrategy::Statistical);
        assert!(outcome.warnings[0].contains("fell back"));
        let names = |c: &[ThemeCandidate]| c.iter().map(|x| x.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&guided), names(&statistical));
        assert_eq!(guided[1].description, statistical[1].description);
    }

    #[tokio::test]
    async fn test_no_match_falls_back() {
        let (documents, embeddings, clustering, config) = fixture();
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };
        let mut sink = Vec::new();
        let outcome = namer(Ok(r#"[{"name": "Unrelated", "description": "Nothing"}]"#), false)
            .name_themes(input, &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.strategy_used, NamingStrategy::Statistical);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].name, "Battery, Drains, Update");
    }
}
