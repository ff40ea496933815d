//! Themescope Runtime: the `discover_themes` entry point.
//!
//! Runs the whole pipeline for one document set under a deadline and turns
//! every recoverable failure into a warning on the result.

pub mod discovery;
pub mod types;

pub use discovery::{ThemeDiscovery, CATCH_ALL_THEME};
pub use types::*;
