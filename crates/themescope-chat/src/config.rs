//! Generative backend configuration and provider selection.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::LLMProvider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Generative backend settings, usually stored as `llm-config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// `auto`, `openai`, `anthropic` or `groq`.
    pub preferred_provider: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_model: String,
    pub groq_model: String,
    /// Low by default; theme labels should be stable across runs.
    pub temperature: f64,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: "auto".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.into(),
            groq_model: DEFAULT_GROQ_MODEL.into(),
            temperature: 0.2,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl LLMConfig {
    /// Load from file, falling back to defaults, then fill missing API keys
    /// from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` and `GROQ_API_KEY`.
    pub fn load(config_path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(config_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", config_path.display(), e);
                LLMConfig::default()
            }),
            Err(_) => LLMConfig::default(),
        };
        config.fill_keys_from(|key| std::env::var(key).ok());
        if let Some((provider, model, _)) = config.resolve_provider() {
            info!("Generative backend: {} ({})", provider, model);
        }
        config
    }

    fn fill_keys_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.openai_api_key.is_none() {
            self.openai_api_key = non_empty("OPENAI_API_KEY");
        }
        if self.anthropic_api_key.is_none() {
            self.anthropic_api_key = non_empty("ANTHROPIC_API_KEY");
        }
        if self.groq_api_key.is_none() {
            self.groq_api_key = non_empty("GROQ_API_KEY");
        }
    }

    /// Provider, model and key to use, or `None` when nothing is configured.
    pub fn resolve_provider(&self) -> Option<(LLMProvider, String, String)> {
        let openai = || {
            self.openai_api_key
                .as_ref()
                .map(|k| (LLMProvider::OpenAI, self.openai_model.clone(), k.clone()))
        };
        let anthropic = || {
            self.anthropic_api_key
                .as_ref()
                .map(|k| (LLMProvider::Anthropic, self.anthropic_model.clone(), k.clone()))
        };
        let groq = || {
            self.groq_api_key
                .as_ref()
                .map(|k| (LLMProvider::Groq, self.groq_model.clone(), k.clone()))
        };

        match self.preferred_provider.as_str() {
            "openai" => openai(),
            "anthropic" => anthropic(),
            "groq" => groq(),
            // Auto mode: Anthropic > Groq > OpenAI
            "auto" => anthropic().or_else(groq).or_else(openai),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_anthropic_then_groq() {
        let mut config = LLMConfig {
            openai_api_key: Some("sk-o".into()),
            groq_api_key: Some("gk".into()),
            ..Default::default()
        };
        let (provider, model, key) = config.resolve_provider().unwrap();
        assert_eq!(provider, LLMProvider::Groq);
        assert_eq!(model, DEFAULT_GROQ_MODEL);
        assert_eq!(key, "gk");

        config.anthropic_api_key = Some("ak".into());
        assert_eq!(config.resolve_provider().unwrap().0, LLMProvider::Anthropic);
    }

    #[test]
    fn test_explicit_provider_requires_key() {
        let config = LLMConfig {
            preferred_provider: "openai".into(),
            groq_api_key: Some("gk".into()),
            ..Default::default()
        };
        assert!(config.resolve_provider().is_none());
    }

    #[test]
    fn test_keys_from_env_lookup() {
        let mut config = LLMConfig::default();
        config.fill_keys_from(|k| match k {
            "GROQ_API_KEY" => Some("from-env".into()),
            "OPENAI_API_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.groq_api_key.as_deref(), Some("from-env"));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm-config.json");
        std::fs::write(&path, r#"{"preferred_provider": "groq", "groq_model": "llama-3.1-8b-instant"}"#)
            .unwrap();
        let config = LLMConfig::load(&path);
        assert_eq!(config.preferred_provider, "groq");
        assert_eq!(config.groq_model, "llama-3.1-8b-instant");
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
    }
}
