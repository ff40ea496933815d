//! Themescope Infer: embedding backends, content-hash cache, batched provider.
//!
//! `EmbeddingProvider` is the only entry point the pipeline uses. Backends
//! implement `EmbedderBackend`; `HttpEmbedder` covers OpenAI-compatible
//! endpoints and tests plug in deterministic stubs.

pub mod cache;
pub mod embedder;
pub mod provider;
pub mod vector;

pub use cache::EmbeddingCache;
pub use embedder::{EmbedderBackend, EmbeddingConfig, HttpEmbedder};
pub use provider::EmbeddingProvider;
pub use vector::{centroid, cosine, l2_normalize, mean_similarity};
