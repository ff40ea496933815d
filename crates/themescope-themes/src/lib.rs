//! Themescope Themes: from clusters to named, scored, query-backed themes.
//!
//! Two naming strategies share one [`ThemeNamer`] seam:
//! - [`StatisticalNamer`]: names from cluster terms, descriptions from the
//!   most representative document.
//! - [`LlmGuidedNamer`]: generated labels reconciled with clusters by
//!   embedding similarity, falling back to the statistical namer.
//!
//! [`ThemeScorer`] and [`ThemeSelector`] rank and trim candidates;
//! [`QuerySynthesizer`] writes the boolean query for each survivor.

pub mod candidate;
pub mod exemplars;
pub mod guided;
pub mod namer;
pub mod prompts;
pub mod query;
pub mod scoring;
pub mod statistical;
pub mod summarizer;

pub use candidate::{Theme, ThemeCandidate};
pub use exemplars::{ExemplarIndex, ThemeExemplar};
pub use guided::LlmGuidedNamer;
pub use namer::{NamingInput, NamingOutcome, ThemeNamer};
pub use query::{tokenize_query, validate_query, QuerySynthesizer, QueryToken};
pub use scoring::{keyword_alignment, term_overlap, ThemeScorer, ThemeSelector};
pub use statistical::{statistical_name, StatisticalNamer};
pub use summarizer::{ExtractiveSummarizer, GenerativeSummarizer, Summarizer};
