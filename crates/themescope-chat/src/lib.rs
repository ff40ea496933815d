//! Themescope Chat: generative text backends.
//!
//! The pipeline only sees [`TextGenerator`]; which provider answers is a
//! configuration concern resolved by [`LLMConfig`].

pub mod config;
pub mod generator;
pub mod types;

pub use config::LLMConfig;
pub use generator::{HttpGenerator, TextGenerator};
pub use types::{ChatMessage, LLMProvider};
