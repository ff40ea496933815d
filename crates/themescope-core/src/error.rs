//! Error types for theme discovery.

use std::fmt;

use thiserror::Error;

/// External backend a run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Embedding,
    Generative,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Embedding => write!(f, "embedding"),
            Backend::Generative => write!(f, "generative"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input error: {0}")]
    Input(String),

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: Backend, reason: String },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Cannot synthesize query: {0}")]
    Synthesis(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn embedding_unavailable(reason: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend: Backend::Embedding,
            reason: reason.into(),
        }
    }

    pub fn generative_unavailable(reason: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            backend: Backend::Generative,
            reason: reason.into(),
        }
    }

    /// True for the only error class that aborts a discovery run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable {
                backend: Backend::Embedding,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
