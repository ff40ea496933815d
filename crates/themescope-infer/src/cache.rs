//! Content-hash keyed embedding cache.
//!
//! Entries live in a `DashMap` so concurrent runs read without blocking each
//! other; insertion order is tracked separately for FIFO eviction.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ndarray::Array1;
use parking_lot::Mutex;

use themescope_ingest::content_hash;

struct CacheEntry {
    embedding: Array1<f32>,
    inserted_at: Instant,
}

/// Thread-safe embedding cache keyed by `sha256(model_id || text)`.
pub struct EmbeddingCache {
    entries: DashMap<String, CacheEntry>,
    order: Mutex<VecDeque<String>>,
    max_size: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::with_capacity(max_size),
            order: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// 10k entries, one hour TTL.
    pub fn default_cache() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }

    pub fn key(model_id: &str, text: &str) -> String {
        content_hash(&format!("{}\u{0}{}", model_id, text))
    }

    /// Cached vector for `key`, or `None` on miss or expiry.
    pub fn get(&self, key: &str) -> Option<Array1<f32>> {
        {
            let entry = self.entries.get(key)?;
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.embedding.clone());
            }
        }
        self.expire(key);
        None
    }

    /// Drop an expired entry together with its place in the eviction queue.
    /// A concurrent `put` may have refreshed it; that entry stays.
    fn expire(&self, key: &str) {
        let mut order = self.order.lock();
        let ttl = self.ttl;
        if self
            .entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= ttl)
            .is_some()
        {
            order.retain(|queued| queued != key);
        }
    }

    pub fn put(&self, key: String, embedding: Array1<f32>) {
        let mut order = self.order.lock();
        let fresh = CacheEntry {
            embedding,
            inserted_at: Instant::now(),
        };
        if self.entries.insert(key.clone(), fresh).is_some() {
            return;
        }
        order.push_back(key);
        while self.entries.len() > self.max_size {
            match order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let mut order = self.order.lock();
        self.entries.clear();
        order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(3600));
        let key = EmbeddingCache::key("model-a", "hello world");
        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), array![1.0, 2.0, 3.0]);
        assert_eq!(cache.get(&key).unwrap(), array![1.0, 2.0, 3.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_depends_on_model() {
        assert_ne!(
            EmbeddingCache::key("model-a", "same text"),
            EmbeddingCache::key("model-b", "same text")
        );
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = EmbeddingCache::new(2, Duration::from_secs(3600));
        cache.put("a".into(), array![1.0]);
        cache.put("b".into(), array![2.0]);
        cache.put("c".into(), array![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_expiry_releases_queue_slot() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(1));
        for _ in 0..50 {
            cache.put("same".into(), array![1.0]);
            std::thread::sleep(Duration::from_millis(3));
            assert!(cache.get("same").is_none());
        }
        assert!(cache.is_empty());
        assert!(cache.order.lock().is_empty());
    }

    #[test]
    fn test_refreshed_entry_keeps_its_queue_position() {
        let cache = EmbeddingCache::new(2, Duration::from_millis(200));
        cache.put("a".into(), array![1.0]);
        std::thread::sleep(Duration::from_millis(250));
        cache.put("b".into(), array![2.0]);
        assert!(cache.get("a").is_none());

        // "a" is now newer than "b", so "b" goes first
        cache.put("a".into(), array![3.0]);
        cache.put("c".into(), array![4.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap(), array![3.0]);
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(1));
        cache.put("ephemeral".into(), array![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("ephemeral").is_none());
        assert!(cache.is_empty());
    }
}
