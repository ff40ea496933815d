//! Themescope Core: errors, run configuration, documents and run context.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{ClusterConfig, DiscoveryConfig, NamingStrategy, ScoreWeights};
pub use error::{Backend, Error, Result};
pub use types::{Document, Filters, RunContext};
