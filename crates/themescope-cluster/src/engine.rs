//! Cluster engine.

use std::collections::BTreeMap;

use hdbscan::{Hdbscan, HdbscanHyperParams};
use ndarray::Array1;
use tracing::{debug, info, warn};

use themescope_core::{ClusterConfig, Error, Result};
use themescope_infer::{centroid, cosine, l2_normalize, mean_similarity};
use themescope_ingest::tokenize;

use crate::reduce::pca_project;
use crate::terms::class_top_terms;

/// Reserved id of the outlier group.
pub const NOISE_CLUSTER_ID: i32 = -1;

/// A group of documents. Member, representative and centroid data refer to
/// the document order the engine was called with.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: i32,
    pub member_indices: Vec<usize>,
    pub top_terms: Vec<String>,
    /// Members nearest the centroid, closest first.
    pub representative_documents: Vec<usize>,
    pub centroid: Array1<f32>,
    /// Mean cosine similarity of members to the centroid, in `[0, 1]`.
    pub cohesion: f64,
}

impl Cluster {
    pub fn is_noise(&self) -> bool {
        self.cluster_id == NOISE_CLUSTER_ID
    }

    pub fn len(&self) -> usize {
        self.member_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_indices.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Clustering {
    /// Non-noise clusters, ordered by id.
    pub clusters: Vec<Cluster>,
    pub noise: Option<Cluster>,
    /// Fewer than two non-noise clusters.
    pub degenerate: bool,
}

impl Clustering {
    pub fn noise_count(&self) -> usize {
        self.noise.as_ref().map_or(0, Cluster::len)
    }

    /// Every cluster including the noise group, noise last.
    pub fn all(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().chain(self.noise.iter())
    }
}

#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Same engine with a smaller minimum cluster size, used for the single
    /// retry after a degenerate result.
    pub fn relaxed(&self) -> Self {
        let mut config = self.config.clone();
        config.min_cluster_size = (config.min_cluster_size / 2).max(2);
        config.min_samples = config.min_samples.min(config.min_cluster_size);
        Self { config }
    }

    /// Group `embeddings` (parallel to `texts`) into clusters plus noise.
    pub fn cluster(&self, texts: &[String], embeddings: &[Array1<f32>]) -> Result<Clustering> {
        if texts.len() != embeddings.len() {
            return Err(Error::Clustering(format!(
                "{} texts but {} embeddings",
                texts.len(),
                embeddings.len()
            )));
        }
        if embeddings.is_empty() {
            return Ok(Clustering {
                degenerate: true,
                ..Default::default()
            });
        }

        let labels = self.assign_labels(embeddings);

        // Renumber by lowest member index so ids do not depend on the
        // clusterer's internal label order.
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        let mut noise_members = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            if label < 0 {
                noise_members.push(i);
            } else {
                groups.entry(label).or_default().push(i);
            }
        }
        let mut member_sets: Vec<Vec<usize>> = groups.into_values().collect();
        member_sets.sort_by_key(|members| members.first().copied().unwrap_or(usize::MAX));

        let tokens: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        let terms = class_top_terms(
            &tokens,
            &member_sets,
            &noise_members,
            self.config.top_terms,
            self.config.noise_term_ratio,
        );

        let clusters: Vec<Cluster> = member_sets
            .into_iter()
            .zip(terms)
            .enumerate()
            .map(|(id, (members, top_terms))| self.build_cluster(id as i32, members, top_terms, embeddings))
            .collect();

        let noise = (!noise_members.is_empty()).then(|| {
            let noise_terms = class_top_terms(
                &tokens,
                std::slice::from_ref(&noise_members),
                &[],
                self.config.top_terms,
                self.config.noise_term_ratio,
            );
            let top_terms = noise_terms.into_iter().next().unwrap_or_default();
            self.build_cluster(NOISE_CLUSTER_ID, noise_members, top_terms, embeddings)
        });

        let degenerate = clusters.len() < 2;
        info!(
            "Clustering: {} clusters, {} noise documents{}",
            clusters.len(),
            noise.as_ref().map_or(0, Cluster::len),
            if degenerate { " (degenerate)" } else { "" }
        );
        Ok(Clustering {
            clusters,
            noise,
            degenerate,
        })
    }

    /// A single cluster holding every document, with id 0.
    pub fn catch_all(&self, texts: &[String], embeddings: &[Array1<f32>]) -> Cluster {
        let members: Vec<usize> = (0..embeddings.len()).collect();
        let tokens: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        let top_terms = class_top_terms(
            &tokens,
            std::slice::from_ref(&members),
            &[],
            self.config.top_terms,
            self.config.noise_term_ratio,
        )
        .into_iter()
        .next()
        .unwrap_or_default();
        self.build_cluster(0, members, top_terms, embeddings)
    }

    /// HDBSCAN labels per document; negative means noise.
    fn assign_labels(&self, embeddings: &[Array1<f32>]) -> Vec<i32> {
        let n = embeddings.len();
        let min_cluster_size = self.config.min_cluster_size.max(2);
        if n < min_cluster_size {
            debug!("{} documents is below min_cluster_size {}", n, min_cluster_size);
            return vec![NOISE_CLUSTER_ID; n];
        }

        let normalized: Vec<Array1<f32>> = embeddings
            .iter()
            .map(|e| {
                let mut v = e.clone();
                l2_normalize(&mut v);
                v
            })
            .collect();
        let dim = normalized[0].len();
        let target = self.config.reduced_dimensions;
        let features: Vec<Vec<f32>> = if target > 0 && dim > target && n > target {
            debug!("Projecting {} → {} dimensions", dim, target);
            pca_project(&normalized, target, self.config.seed)
        } else {
            normalized.iter().map(|v| v.to_vec()).collect()
        };

        let min_samples = self.config.min_samples.clamp(1, n - 1);
        let params = HdbscanHyperParams::builder()
            .min_cluster_size(min_cluster_size)
            .min_samples(min_samples)
            .build();
        match Hdbscan::new(&features, params).cluster() {
            Ok(labels) => labels,
            Err(e) => {
                warn!("HDBSCAN failed, treating all documents as noise: {:?}", e);
                vec![NOISE_CLUSTER_ID; n]
            }
        }
    }

    fn build_cluster(
        &self,
        cluster_id: i32,
        member_indices: Vec<usize>,
        top_terms: Vec<String>,
        embeddings: &[Array1<f32>],
    ) -> Cluster {
        let dim = embeddings.first().map_or(0, |e| e.len());
        let center = centroid(member_indices.iter().map(|&i| &embeddings[i]))
            .unwrap_or_else(|| Array1::zeros(dim));
        let cohesion = mean_similarity(member_indices.iter().map(|&i| &embeddings[i]), &center);

        let mut by_closeness: Vec<(f64, usize)> = member_indices
            .iter()
            .map(|&i| (cosine(&embeddings[i], &center), i))
            .collect();
        by_closeness.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        let representative_documents = by_closeness
            .into_iter()
            .take(self.config.representative_docs.max(1))
            .map(|(_, i)| i)
            .collect();

        Cluster {
            cluster_id,
            member_indices,
            top_terms,
            representative_documents,
            centroid: center,
            cohesion,
        }
    }
}
