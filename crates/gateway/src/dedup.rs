//! Result deduplication
//!
//! A request is identified by a [`Fingerprint`]: the SHA-256 digest of the
//! canonical JSON form of `{model, prompt, sentence_count}`. Canonical means
//! object keys are emitted in lexicographic order at every level, so the
//! digest never depends on field insertion order.
//!
//! [`DedupCache`] maps fingerprints to finalized answers in the shared store
//! with a TTL independent of the rate-limit window. The cache is best-effort:
//! store failures are logged and treated as misses, never as request errors.
//! Failed inferences are never cached.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use quill_config::CacheConfig;

use crate::store::KeyValueStore;

// ============================================================================
// Fingerprint
// ============================================================================

/// Deterministic identifier of a logically distinct request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a generation request
    pub fn compute(prompt: &str, sentence_count: u32, model: &str) -> Self {
        Self::of_value(&json!({
            "model": model,
            "prompt": prompt,
            "sentence_count": sentence_count,
        }))
    }

    /// Fingerprint an arbitrary JSON value by its canonical form
    pub fn of_value(value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Lowercase hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with object keys sorted at every depth and no whitespace
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ============================================================================
// Dedup Cache
// ============================================================================

/// Statistics for the dedup cache
#[derive(Debug, Default)]
pub struct DedupCacheStats {
    /// Lookups that returned a stored answer
    pub hits: AtomicU64,
    /// Lookups that found nothing
    pub misses: AtomicU64,
    /// Answers written
    pub insertions: AtomicU64,
    /// Store failures (treated as misses or skipped writes)
    pub store_errors: AtomicU64,
}

impl DedupCacheStats {
    /// Get hit rate as a percentage (0.0 - 100.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total > 0.0 {
            (hits / total) * 100.0
        } else {
            0.0
        }
    }
}

/// Fingerprint → answer cache over the shared store
pub struct DedupCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    enabled: bool,
    stats: DedupCacheStats,
}

impl DedupCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        debug!(
            store = store.name(),
            enabled = config.enabled,
            ttl_secs = config.ttl_secs,
            "Creating dedup cache"
        );

        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
            stats: DedupCacheStats::default(),
        }
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("cache:{}", fingerprint.as_str())
    }

    /// Look up a still-fresh answer
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<String> {
        if !self.enabled {
            return None;
        }

        match self.store.get(&Self::key(fingerprint)).await {
            Ok(Some(text)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %fingerprint, "Dedup cache hit");
                Some(text)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %fingerprint, "Dedup cache miss");
                None
            }
            Err(e) => {
                self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Dedup cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store an answer with the configured TTL
    pub async fn store(&self, fingerprint: &Fingerprint, text: &str) {
        self.store_with_ttl(fingerprint, text, self.ttl).await;
    }

    /// Store an answer with a custom TTL
    ///
    /// Overwrites any previous entry; concurrent writers for the same
    /// fingerprint resolve as last write wins.
    pub async fn store_with_ttl(&self, fingerprint: &Fingerprint, text: &str, ttl: Duration) {
        if !self.enabled {
            return;
        }

        match self
            .store
            .set(&Self::key(fingerprint), text, Some(ttl))
            .await
        {
            Ok(()) => {
                self.stats.insertions.fetch_add(1, Ordering::Relaxed);
                trace!(
                    fingerprint = %fingerprint,
                    ttl_secs = ttl.as_secs(),
                    "Cached answer"
                );
            }
            Err(e) => {
                self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Failed to cache answer"
                );
            }
        }
    }

    pub fn stats(&self) -> &DedupCacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::compute("What is Rust?", 3, "model-a");
        let b = Fingerprint::compute("What is Rust?", 3, "model-a");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = Fingerprint::compute("What is Rust?", 3, "model-a");
        assert_ne!(base, Fingerprint::compute("What is Go?", 3, "model-a"));
        assert_ne!(base, Fingerprint::compute("What is Rust?", 4, "model-a"));
        assert_ne!(base, Fingerprint::compute("What is Rust?", 3, "model-b"));
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let mut forward = serde_json::Map::new();
        forward.insert("model".to_string(), json!("m"));
        forward.insert("prompt".to_string(), json!("p"));
        forward.insert("sentence_count".to_string(), json!(2));

        let mut backward = serde_json::Map::new();
        backward.insert("sentence_count".to_string(), json!(2));
        backward.insert("prompt".to_string(), json!("p"));
        backward.insert("model".to_string(), json!("m"));

        let a = Fingerprint::of_value(&Value::Object(forward));
        let b = Fingerprint::of_value(&Value::Object(backward));
        assert_eq!(a, b);
        assert_eq!(a, Fingerprint::compute("p", 2, "m"));
    }

    #[test]
    fn test_canonical_form() {
        let mut out = String::new();
        write_canonical(
            &json!({"b": [1, {"d": null, "c": "x\"y"}], "a": true}),
            &mut out,
        );
        assert_eq!(out, r#"{"a":true,"b":[1,{"c":"x\"y","d":null}]}"#);
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        // Plain concatenation of fields would make these equal
        let a = Fingerprint::compute("ab", 1, "c");
        let b = Fingerprint::compute("a", 1, "bc");
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_and_expiry() {
        let cache = DedupCache::new(
            Arc::new(MemoryStore::new()),
            &CacheConfig {
                enabled: true,
                ttl_secs: 120,
            },
        );
        let fp = Fingerprint::compute("p", 2, "m");

        assert_eq!(cache.lookup(&fp).await, None);
        cache.store(&fp, "A. B.").await;
        assert_eq!(cache.lookup(&fp).await.as_deref(), Some("A. B."));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(cache.lookup(&fp).await, None);

        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().insertions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = DedupCache::new(
            Arc::new(MemoryStore::new()),
            &CacheConfig {
                enabled: false,
                ttl_secs: 120,
            },
        );
        let fp = Fingerprint::compute("p", 2, "m");
        cache.store(&fp, "A.").await;
        assert_eq!(cache.lookup(&fp).await, None);
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn incr_window(&self, _key: &str, _window: Duration) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn set_if_absent(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_misses() {
        let cache = DedupCache::new(Arc::new(BrokenStore), &CacheConfig::default());
        let fp = Fingerprint::compute("p", 2, "m");

        cache.store(&fp, "A.").await;
        assert_eq!(cache.lookup(&fp).await, None);
        assert_eq!(cache.stats().store_errors.load(Ordering::Relaxed), 2);
        assert!((cache.stats().hit_rate() - 0.0).abs() < f64::EPSILON);
    }
}
