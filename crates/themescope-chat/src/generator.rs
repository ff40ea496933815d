//! Single-shot text generation.
//!
//! OpenAI and Groq share the chat-completions format; Anthropic uses the
//! Messages API with a separate `system` field.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use themescope_core::{Error, Result};

use crate::config::LLMConfig;
use crate::types::{ChatMessage, LLMProvider};

/// `generate(prompt) -> text`. Implementations must be safe to call
/// concurrently.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    fn model(&self) -> &str;
}

const SYSTEM_PROMPT: &str =
    "You are an analyst of social media conversations. Answer exactly in the requested format.";

pub struct HttpGenerator {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: usize,
}

impl HttpGenerator {
    /// Build from a resolved configuration; fails when no provider has a key.
    pub fn from_config(config: &LLMConfig) -> Result<Self> {
        let (provider, model, api_key) = config
            .resolve_provider()
            .ok_or_else(|| Error::generative_unavailable("no provider configured"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            provider,
            model,
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let request = match self.provider {
            LLMProvider::OpenAI | LLMProvider::Groq => self
                .client
                .post(self.provider.endpoint())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&openai_body(&messages, &self.model, self.temperature, self.max_tokens)),
            LLMProvider::Anthropic => self
                .client
                .post(self.provider.endpoint())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&anthropic_body(&messages, &self.model, self.temperature, self.max_tokens)),
        };

        debug!("Generating with {} model {}", self.provider, self.model);
        let response = request
            .send()
            .await
            .map_err(|e| Error::generative_unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generative_unavailable(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {}", e)))?;
        extract_text(self.provider, &parsed)
    }
}

impl TextGenerator for HttpGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.complete(prompt))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn openai_body(messages: &[ChatMessage], model: &str, temperature: f64, max_tokens: usize) -> Value {
    let msgs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();
    json!({
        "model": model,
        "messages": msgs,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

fn anthropic_body(messages: &[ChatMessage], model: &str, temperature: f64, max_tokens: usize) -> Value {
    let system: Option<&str> = messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str());
    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if let Some(sys) = system {
        body["system"] = json!(sys);
    }
    body
}

fn extract_text(provider: LLMProvider, response: &Value) -> Result<String> {
    let text = match provider {
        LLMProvider::OpenAI | LLMProvider::Groq => response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string),
        LLMProvider::Anthropic => response["content"].as_array().map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        }),
    };
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(Error::Generation("empty completion".into())),
    }
}
