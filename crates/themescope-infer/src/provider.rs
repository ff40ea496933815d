//! Batched, cached embedding of document and label text.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use ndarray::Array1;
use tracing::{debug, info};

use themescope_core::{Backend, Error, Result};

use crate::cache::EmbeddingCache;
use crate::embedder::EmbedderBackend;
use crate::vector::l2_normalize;

/// Wraps an [`EmbedderBackend`] with batching, bounded order-preserving
/// concurrency, validation, L2 normalization and an optional shared cache.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: Arc<dyn EmbedderBackend>,
    cache: Option<Arc<EmbeddingCache>>,
    batch_size: usize,
    max_concurrency: usize,
}

impl EmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbedderBackend>) -> Self {
        Self {
            backend,
            cache: None,
            batch_size: 32,
            max_concurrency: 4,
        }
    }

    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_batching(mut self, batch_size: usize, max_concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Embed every text, preserving input order. All vectors share one
    /// dimension and have unit length (zero vectors excepted).
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Array1<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.backend.model_id().to_string();
        let keys: Vec<String> = texts
            .iter()
            .map(|t| EmbeddingCache::key(&model, t))
            .collect();

        let mut slots: Vec<Option<Array1<f32>>> = keys
            .iter()
            .map(|k| self.cache.as_ref().and_then(|c| c.get(k)))
            .collect();
        let missing: Vec<usize> = (0..texts.len()).filter(|&i| slots[i].is_none()).collect();
        let hits = texts.len() - missing.len();

        if !missing.is_empty() {
            let pending: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let jobs: Vec<BoxFuture<'_, Result<Vec<Vec<f32>>>>> = pending
                .chunks(self.batch_size)
                .map(|chunk| self.embed_chunk(chunk).boxed())
                .collect();
            let batches: Vec<Vec<Vec<f32>>> = stream::iter(jobs)
                .buffered(self.max_concurrency)
                .try_collect()
                .await?;

            for (&index, raw) in missing.iter().zip(batches.into_iter().flatten()) {
                let mut vector = Array1::from_vec(raw);
                l2_normalize(&mut vector);
                if let Some(cache) = &self.cache {
                    cache.put(keys[index].clone(), vector.clone());
                }
                slots[index] = Some(vector);
            }
        }

        let vectors: Vec<Array1<f32>> = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::embedding_unavailable(format!("no vector for text {}", i)))
            })
            .collect::<Result<_>>()?;
        self.check_dimensions(&vectors)?;

        if missing.is_empty() {
            debug!("All {} embeddings served from cache", texts.len());
        } else {
            info!(
                "Embedded {} texts ({} cached, dim={})",
                texts.len(),
                hits,
                vectors[0].len()
            );
        }
        Ok(vectors)
    }

    async fn embed_chunk(&self, chunk: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.backend.embed_batch(chunk).await.map_err(as_backend_error)?;
        if vectors.len() != chunk.len() {
            return Err(Error::embedding_unavailable(format!(
                "backend returned {} vectors for {} texts",
                vectors.len(),
                chunk.len()
            )));
        }
        Ok(vectors)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Array1<f32>> {
        let mut vectors = self.embed_all(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding_unavailable("empty embedding response"))
    }

    fn check_dimensions(&self, vectors: &[Array1<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let dim = self.backend.dimension().unwrap_or(first.len());
        if dim == 0 {
            return Err(Error::embedding_unavailable("zero-dimensional embeddings"));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::embedding_unavailable(format!(
                "dimension mismatch: expected {}, got {}",
                dim,
                bad.len()
            )));
        }
        Ok(())
    }
}

/// Everything the backend raises counts as the backend being unavailable.
fn as_backend_error(err: Error) -> Error {
    match err {
        Error::BackendUnavailable {
            backend: Backend::Embedding,
            ..
        } => err,
        other => Error::embedding_unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as `[len, 1.0]`, counting backend calls.
    struct LengthEmbedder {
        calls: AtomicUsize,
        texts_seen: AtomicUsize,
    }

    impl LengthEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts_seen: AtomicUsize::new(0),
            }
        }
    }

    impl EmbedderBackend for LengthEmbedder {
        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            Box::pin(async move { Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect()) })
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    struct BrokenEmbedder;

    impl EmbedderBackend for BrokenEmbedder {
        fn embed_batch<'a>(&'a self, _texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
            Box::pin(async { Err(Error::Http("connection refused".into())) })
        }

        fn dimension(&self) -> Option<usize> {
            None
        }

        fn model_id(&self) -> &str {
            "broken"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let backend = Arc::new(LengthEmbedder::new());
        let provider = EmbeddingProvider::new(backend.clone()).with_batching(3, 2);
        let vectors = provider.embed_all(&texts(10)).await.unwrap();

        assert_eq!(vectors.len(), 10);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
        for (i, v) in vectors.iter().enumerate() {
            let len = (i + 1) as f32;
            let norm = (len * len + 1.0).sqrt();
            assert!((v[0] - len / norm).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_cache_skips_known_texts() {
        let backend = Arc::new(LengthEmbedder::new());
        let cache = Arc::new(EmbeddingCache::default_cache());
        let provider = EmbeddingProvider::new(backend.clone()).with_cache(cache.clone());

        provider.embed_all(&texts(4)).await.unwrap();
        let again = provider.embed_all(&texts(6)).await.unwrap();

        assert_eq!(again.len(), 6);
        assert_eq!(backend.texts_seen.load(Ordering::SeqCst), 6);
        assert_eq!(cache.len(), 6);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let provider = EmbeddingProvider::new(Arc::new(BrokenEmbedder));
        let err = provider.embed_all(&texts(2)).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_input_never_calls_backend() {
        let provider = EmbeddingProvider::new(Arc::new(BrokenEmbedder));
        assert!(provider.embed_all(&[]).await.unwrap().is_empty());
    }
}
