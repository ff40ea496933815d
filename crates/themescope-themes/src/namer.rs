//! The naming seam shared by both strategies.

use futures::future::BoxFuture;
use ndarray::Array1;

use themescope_cluster::Clustering;
use themescope_core::{DiscoveryConfig, Document, NamingStrategy, Result, RunContext};

use crate::candidate::ThemeCandidate;

/// Everything a namer reads. Borrowed, immutable for the duration of a run.
#[derive(Clone, Copy)]
pub struct NamingInput<'a> {
    pub documents: &'a [Document],
    /// Parallel to `documents`.
    pub embeddings: &'a [Array1<f32>],
    pub clustering: &'a Clustering,
    pub context: &'a RunContext,
    pub config: &'a DiscoveryConfig,
}

impl<'a> NamingInput<'a> {
    pub fn text(&self, index: usize) -> &'a str {
        self.documents
            .get(index)
            .map(|d| d.text.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NamingOutcome {
    /// Which strategy actually produced the candidates.
    pub strategy_used: NamingStrategy,
    pub warnings: Vec<String>,
}

impl NamingOutcome {
    pub fn new(strategy_used: NamingStrategy) -> Self {
        Self {
            strategy_used,
            warnings: Vec::new(),
        }
    }
}

/// Turns clusters into theme candidates.
///
/// Finished candidates are pushed onto `sink` one at a time, so a caller that
/// abandons the future (deadline) keeps everything completed so far. Only
/// fatal errors are returned as `Err`; recoverable problems become warnings.
pub trait ThemeNamer: Send + Sync {
    fn strategy(&self) -> NamingStrategy;

    fn name_themes<'a>(
        &'a self,
        input: NamingInput<'a>,
        sink: &'a mut Vec<ThemeCandidate>,
    ) -> BoxFuture<'a, Result<NamingOutcome>>;
}
