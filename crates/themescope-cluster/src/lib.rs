//! Themescope Cluster: unsupervised grouping of document embeddings.
//!
//! Pipeline: L2 normalize → PCA projection (when the space is larger than the
//! target) → HDBSCAN → renumbering → per-cluster centroid, cohesion,
//! representatives and class-based TF-IDF terms.

pub mod engine;
pub mod reduce;
pub mod terms;

pub use engine::{Cluster, ClusterEngine, Clustering, NOISE_CLUSTER_ID};
pub use reduce::pca_project;
pub use terms::class_top_terms;
