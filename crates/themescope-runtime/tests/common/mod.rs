//! Deterministic backends and a synthetic conversation for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use themescope_chat::TextGenerator;
use themescope_core::{Error, Result};
use themescope_infer::{EmbedderBackend, EmbeddingProvider};
use themescope_runtime::ThemeDiscovery;
use themescope_themes::Summarizer;

pub const DIM: usize = 8;
pub const QUERY: &str = "phone battery problems";

/// Text → vector lookup; unknown text maps to `fallback`.
pub struct MapEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    delay: Option<Duration>,
}

impl MapEmbedder {
    pub fn new(table: HashMap<String, Vec<f32>>) -> Self {
        let mut fallback = vec![0.0; DIM];
        fallback[DIM - 1] = 1.0;
        Self {
            table,
            fallback,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl EmbedderBackend for MapEmbedder {
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(texts
                .iter()
                .map(|t| self.table.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
                .collect())
        })
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIM)
    }

    fn model_id(&self) -> &str {
        "map"
    }
}

pub struct DownEmbedder;

impl EmbedderBackend for DownEmbedder {
    fn embed_batch<'a>(&'a self, _texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async { Err(Error::Http("connection refused".into())) })
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn model_id(&self) -> &str {
        "down"
    }
}

/// Every call fails.
pub struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Err(Error::generative_unavailable("503 Service Unavailable")) })
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Proposes the three scenario themes plus one nobody talks about.
pub struct ScriptedGenerator;

pub const LABELS: [(&str, &str); 4] = [
    ("Battery drain", "Phones dying overnight"),
    ("Cracked screens", "Glass breaking after small drops"),
    ("Late deliveries", "Parcels arriving days late"),
    ("Price hikes", "Subscriptions getting more expensive"),
];

impl TextGenerator for ScriptedGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if prompt.starts_with("Propose") {
                let labels: Vec<Value> = LABELS
                    .iter()
                    .map(|(name, description)| json!({ "name": name, "description": description }))
                    .collect();
                Ok(format!("```json\n{}\n```", Value::Array(labels)))
            } else {
                Ok("Owners describe this problem in detail.".to_string())
            }
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Instant for battery posts, stalls on everything else.
pub struct StallingSummarizer;

impl Summarizer for StallingSummarizer {
    fn summarize<'a>(
        &'a self,
        text: &'a str,
        _hints: &'a [String],
        _max_chars: usize,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if !text.contains("battery") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(text.to_string())
        })
    }
}

fn lcg(seed: u64) -> impl FnMut() -> f32 {
    let mut state = seed;
    move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
    }
}

fn axis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[index] = 1.0;
    v
}

/// 50 records: three topical groups of 15 along e0, e1 and e2 with
/// increasing spread, plus five unrelated posts along e3..e7.
pub struct Scenario {
    pub records: Vec<Value>,
    pub table: HashMap<String, Vec<f32>>,
}

pub fn scenario() -> Scenario {
    let groups: [(&str, f32); 3] = [
        ("my phone battery drains overnight and the charger gets hot", 0.005),
        ("the screen cracked again and the glass shattered after a small drop", 0.02),
        ("the courier delivery was late and the parcel arrived damaged", 0.05),
    ];
    let mut next = lcg(7);
    let mut records = Vec::new();
    let mut table = HashMap::new();

    for (g, (body, spread)) in groups.iter().enumerate() {
        for i in 0..15 {
            let text = format!("Post {}: {}", g * 15 + i, body);
            let mut v = axis(g);
            for x in v.iter_mut() {
                *x += spread * next();
            }
            records.push(json!({ "id": format!("p-{}-{}", g, i), "text": text }));
            table.insert(text, v);
        }
    }

    let noise = [
        "Win a free cruise by sharing this post today",
        "Local bakery opens a new branch downtown on Friday",
        "Election debate scheduled for next Tuesday evening",
        "Recipe of the week: slow roasted tomatoes with basil",
        "Marathon route closes several streets this weekend",
    ];
    for (k, text) in noise.iter().enumerate() {
        // nested payload exercises the normalizer's container search
        records.push(json!({ "id": format!("n-{}", k), "data": { "message": text } }));
        table.insert(text.to_string(), axis(3 + k));
    }

    table.insert(QUERY.to_string(), vec![1.0, 0.4, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let labels = [axis(0), axis(1), axis(2), axis(6)];
    for ((name, description), v) in LABELS.iter().zip(labels) {
        table.insert(format!("{}: {}", name, description), v);
    }

    Scenario { records, table }
}

pub fn discovery(table: HashMap<String, Vec<f32>>) -> ThemeDiscovery {
    ThemeDiscovery::new(EmbeddingProvider::new(Arc::new(MapEmbedder::new(table))))
}

pub fn discovery_with(embedder: impl EmbedderBackend + 'static) -> ThemeDiscovery {
    ThemeDiscovery::new(EmbeddingProvider::new(Arc::new(embedder)))
}
