//! Embedding backend trait and the HTTP implementation.
//!
//! `HttpEmbedder` speaks the OpenAI-compatible `/v1/embeddings` protocol,
//! which also covers most self-hosted embedding servers.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use themescope_core::{Error, Result};

/// Source of raw embedding vectors.
///
/// Implementations return one vector per input, in input order, all of the
/// same dimension. Any transport failure should surface as
/// `Error::BackendUnavailable`.
pub trait EmbedderBackend: Send + Sync {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    /// Expected vector dimension, if known up front.
    fn dimension(&self) -> Option<usize>;

    /// Identifier of the model, used to key the cache.
    fn model_id(&self) -> &str;
}

/// Configuration for the HTTP embedding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub dimension: Option<usize>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/embeddings".into(),
            model: "text-embedding-3-small".into(),
            api_key: String::new(),
            dimension: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    /// Fill empty fields from `THEMESCOPE_EMBEDDING_URL`,
    /// `THEMESCOPE_EMBEDDING_MODEL` and `OPENAI_API_KEY`.
    pub fn with_env_fallback(mut self) -> Self {
        if let Ok(url) = std::env::var("THEMESCOPE_EMBEDDING_URL") {
            if !url.is_empty() {
                self.url = url;
            }
        }
        if let Ok(model) = std::env::var("THEMESCOPE_EMBEDDING_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if self.api_key.is_empty() {
            self.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        self
    }
}

pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.config.model,
            "input": texts,
        });
        debug!("Embedding {} texts via {}", texts.len(), self.config.url);

        let mut request = self.client.post(&self.config.url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::embedding_unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding_unavailable(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding_unavailable(format!("malformed response: {}", e)))?;
        parse_embedding_response(parsed, texts.len())
    }
}

impl EmbedderBackend for HttpEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.request(texts))
    }

    fn dimension(&self) -> Option<usize> {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Reorder by `index` and check that every input got exactly one vector.
fn parse_embedding_response(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in response.data {
        let slot = match slots.get_mut(datum.index) {
            Some(slot) if slot.is_none() => slot,
            _ => {
                return Err(Error::embedding_unavailable(format!(
                    "unexpected embedding index {}",
                    datum.index
                )))
            }
        };
        *slot = Some(datum.embedding);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| Error::embedding_unavailable(format!("missing embedding {}", i)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]}"#,
        )
        .unwrap();
        let vectors = parse_embedding_response(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_missing_vector_is_backend_error() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        let err = parse_embedding_response(response, 2).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_config_defaults() {
        let config: EmbeddingConfig = serde_json::from_str(r#"{"model": "bge-small"}"#).unwrap();
        assert_eq!(config.model, "bge-small");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.url.ends_with("/v1/embeddings"));
    }
}
