//! Description summarizers for a single representative document.

use std::sync::Arc;

use futures::future::BoxFuture;

use themescope_chat::TextGenerator;
use themescope_core::{Error, Result};
use themescope_ingest::{summarize_extractive, truncate_chars};

pub trait Summarizer: Send + Sync {
    /// Summary of `text` of at most `max_chars` characters. `hints` are the
    /// cluster's top terms.
    fn summarize<'a>(
        &'a self,
        text: &'a str,
        hints: &'a [String],
        max_chars: usize,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Key-sentence extraction; deterministic and offline.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    pub max_sentences: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self { max_sentences: 2 }
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize<'a>(
        &'a self,
        text: &'a str,
        hints: &'a [String],
        max_chars: usize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let summary = summarize_extractive(text, self.max_sentences, max_chars, hints);
            if summary.is_empty() {
                return Err(Error::Generation("no sentences to extract".into()));
            }
            Ok(summary)
        })
    }
}

/// Abstractive summary from a generative backend.
pub struct GenerativeSummarizer {
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

impl Summarizer for GenerativeSummarizer {
    fn summarize<'a>(
        &'a self,
        text: &'a str,
        hints: &'a [String],
        max_chars: usize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let prompt = crate::prompts::summary_prompt(text, hints);
            let summary = self.generator.generate(&prompt).await?;
            let summary = summary.trim();
            if summary.is_empty() {
                return Err(Error::Generation("empty summary".into()));
            }
            Ok(truncate_chars(summary, max_chars))
        })
    }
}
