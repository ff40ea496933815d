//! Statistical cluster naming: names straight from cluster vocabulary.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use themescope_cluster::Cluster;
use themescope_core::{NamingStrategy, Result};
use themescope_ingest::truncate_chars;

use crate::candidate::ThemeCandidate;
use crate::namer::{NamingInput, NamingOutcome, ThemeNamer};
use crate::summarizer::{ExtractiveSummarizer, Summarizer};

const NAME_TERMS: usize = 3;

/// Deterministic name from the leading top terms: `"Battery, Drain, Charger"`.
pub fn statistical_name(top_terms: &[String], cluster_id: i32) -> String {
    let words: Vec<String> = top_terms.iter().take(NAME_TERMS).map(|t| title_case(t)).collect();
    if words.is_empty() {
        format!("Topic {}", cluster_id)
    } else {
        words.join(", ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Clone)]
pub struct StatisticalNamer {
    summarizer: Arc<dyn Summarizer>,
}

impl Default for StatisticalNamer {
    fn default() -> Self {
        Self::new(Arc::new(ExtractiveSummarizer::default()))
    }
}

impl StatisticalNamer {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }

    /// Candidate for one cluster plus a warning if the description had to
    /// fall back to truncated text.
    pub async fn name_cluster(
        &self,
        cluster: &Cluster,
        input: NamingInput<'_>,
    ) -> (ThemeCandidate, Option<String>) {
        let name = statistical_name(&cluster.top_terms, cluster.cluster_id);
        let max_chars = input.config.summary_max_chars;
        let representative = cluster
            .representative_documents
            .first()
            .map(|&i| input.text(i))
            .unwrap_or_default();

        let (description, warning) = match self
            .summarizer
            .summarize(representative, &cluster.top_terms, max_chars)
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => (summary, None),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty summary".to_string(),
                };
                warn!("Summary failed for cluster {}: {}", cluster.cluster_id, reason);
                (
                    truncate_chars(representative, max_chars),
                    Some(format!(
                        "summary failed for cluster {}; used truncated representative text",
                        cluster.cluster_id
                    )),
                )
            }
        };

        let mut candidate = ThemeCandidate::new(name, description, cluster.centroid.clone());
        candidate.source_cluster_id = Some(cluster.cluster_id);
        candidate.document_indices = cluster.member_indices.clone();
        candidate.top_terms = cluster.top_terms.clone();
        candidate.avg_similarity = cluster.cohesion;
        (candidate, warning)
    }

    /// Name every non-noise cluster, pushing candidates in cluster order.
    pub async fn name_all(
        &self,
        input: NamingInput<'_>,
        sink: &mut Vec<ThemeCandidate>,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        let jobs: Vec<BoxFuture<'_, (ThemeCandidate, Option<String>)>> = input
            .clustering
            .clusters
            .iter()
            .filter(|c| !c.is_noise())
            .map(|cluster| self.name_cluster(cluster, input).boxed())
            .collect();
        let mut named = stream::iter(jobs).buffered(input.config.max_concurrency.max(1));

        while let Some((candidate, warning)) = named.next().await {
            debug!("Named cluster {:?} as {:?}", candidate.source_cluster_id, candidate.name);
            sink.push(candidate);
            warnings.extend(warning);
        }
        warnings
    }
}

impl ThemeNamer for StatisticalNamer {
    fn strategy(&self) -> NamingStrategy {
        NamingStrategy::Statistical
    }

    fn name_themes<'a>(
        &'a self,
        input: NamingInput<'a>,
        sink: &'a mut Vec<ThemeCandidate>,
    ) -> BoxFuture<'a, Result<NamingOutcome>> {
        Box::pin(async move {
            let mut outcome = NamingOutcome::new(NamingStrategy::Statistical);
            outcome.warnings = self.name_all(input, sink).await;
            Ok(outcome)
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::{array, Array1};
    use themescope_cluster::{Cluster, Clustering};
    use themescope_core::{DiscoveryConfig, Document};

    pub fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.into(),
            text: text.into(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn cluster(id: i32, members: Vec<usize>, terms: &[&str], centroid: Array1<f32>) -> Cluster {
        Cluster {
            cluster_id: id,
            representative_documents: members.iter().copied().take(3).collect(),
            member_indices: members,
            top_terms: terms.iter().map(|t| t.to_string()).collect(),
            centroid,
            cohesion: 0.9,
        }
    }

    /// Two clusters along the x and y axes, one noise document along z.
    pub fn fixture() -> (Vec<Document>, Vec<Array1<f32>>, Clustering, DiscoveryConfig) {
        let documents = vec![
            doc("0", "The battery drains overnight even when idle."),
            doc("1", "Battery life dropped after the update."),
            doc("2", "The screen cracked after a small drop."),
            doc("3", "Cracked screen glass again this week."),
            doc("4", "Win a free gift card today!"),
        ];
        let embeddings = vec![
            array![1.0f32, 0.0, 0.0],
            array![0.99, 0.1, 0.0],
            array![0.0, 1.0, 0.0],
            array![0.1, 0.99, 0.0],
            array![0.0, 0.0, 1.0],
        ];
        let clustering = Clustering {
            clusters: vec![
                cluster(0, vec![0, 1], &["battery", "drains", "update"], array![1.0, 0.05, 0.0]),
                cluster(1, vec![2, 3], &["screen", "cracked", "glass"], array![0.05, 1.0, 0.0]),
            ],
            noise: Some(cluster(-1, vec![4], &["gift"], array![0.0, 0.0, 1.0])),
            degenerate: false,
        };
        (documents, embeddings, clustering, DiscoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::fixture;
    use super::*;
    use themescope_core::{Error, RunContext};

    struct FailingSummarizer;

    impl Summarizer for FailingSummarizer {
        fn summarize<'a>(
            &'a self,
            _text: &'a str,
            _hints: &'a [String],
            _max_chars: usize,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async { Err(Error::Generation("model offline".into())) })
        }
    }

    #[test]
    fn test_statistical_name() {
        let terms = vec!["battery".to_string(), "drain".into(), "charger".into(), "cable".into()];
        assert_eq!(statistical_name(&terms, 0), "Battery, Drain, Charger");
        assert_eq!(statistical_name(&[], 4), "Topic 4");
        assert_eq!(statistical_name(&["écran".to_string()], 1), "Écran");
    }

    #[tokio::test]
    async fn test_names_every_cluster_but_noise() {
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
        let outcome = StatisticalNamer::default()
            .name_themes(input, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.strategy_used, NamingStrategy::Statistical);
        assert!(outcome.warnings.is_empty());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].name, "Battery, Drains, Update");
        assert_eq!(sink[0].source_cluster_id, Some(0));
        assert_eq!(sink[1].document_indices, vec![2, 3]);
        assert!(sink[0].description.contains("battery drains overnight"));
        assert!((sink[0].avg_similarity - 0.9).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_naming_on_worker_thread() {
        let handle = tokio::spawn(async move {
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
            StatisticalNamer::default()
                .name_themes(input, &mut sink)
                .await
                .unwrap();
            sink.into_iter().map(|c| c.source_cluster_id).collect::<Vec<_>>()
        });
        assert_eq!(handle.await.unwrap(), vec![Some(0), Some(1)]);
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_truncated_text() {
        let (documents, embeddings, clustering, mut config) = fixture();
        config.summary_max_chars = 20;
        let context = RunContext::new("phone complaints");
        let input = NamingInput {
            documents: &documents,
            embeddings: &embeddings,
            clustering: &clustering,
            context: &context,
            config: &config,
        };
        let namer = StatisticalNamer::new(Arc::new(FailingSummarizer));
        let mut sink = Vec::new();
        let outcome = namer.name_themes(input, &mut sink).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].description, "The battery drains...");
        assert_eq!(outcome.warnings.len(), 2);
    }
}
