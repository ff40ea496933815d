//! Themescope Ingest: raw record normalization, tokenization, extractive summaries.

pub mod normalize;
pub mod summarize;
pub mod text;

pub use normalize::{clean_text, NormalizeReport, Normalizer};
pub use summarize::{extract_key_sentences, summarize_extractive};
pub use text::{content_hash, is_stop_word, query_terms, tokenize, truncate_chars};
