//! Process-local store
//!
//! Each operation holds the shard lock of its key for its whole duration,
//! which makes `incr_window` and `set_if_absent` atomic within the process.
//! Expired entries are dropped when next touched, or by `purge_expired`,
//! which the gateway runs periodically.
//!
//! Uses `tokio::time::Instant` so tests can drive expiry with a paused clock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-memory [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new("0", Some(window)));

        if entry.is_expired(now) {
            *entry = MemoryEntry::new("0", Some(window));
        }

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::operation("incr_window", "value is not an integer"))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(MemoryEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        trace!(removed = removed, "Purged expired entries");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_incr_window_creates_and_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_window("k", WINDOW).await.unwrap(), 1);
        assert_eq!(store.incr_window("k", WINDOW).await.unwrap(), 2);
        assert_eq!(store.incr_window("other", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_window_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("k", "hello", None).await.unwrap();
        assert!(store.incr_window("k", WINDOW).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_window_keeps_expiry_and_restarts_after_it() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_window("k", WINDOW).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.incr_window("k", WINDOW).await.unwrap(), 2);

        // Expiry was set when the key was created, not pushed out by the second increment
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr_window("k", WINDOW).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_window_counter_always_expires() {
        let store = MemoryStore::new();
        store.incr_window("k", WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_respects_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        assert!(store
            .set_if_absent("k", "first", Some(Duration::from_secs(1)))
            .await
            .unwrap());
        assert!(!store.set_if_absent("k", "second", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.set_if_absent("k", "third", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_drops_idle_clients() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .incr_window(&format!("ratelimit:client-{}", i), Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 1000);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.purge_expired(), 1000);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set("short", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set("forever", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_is_atomic() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.incr_window("shared", WINDOW).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("shared").await.unwrap().as_deref(), Some("800"));
    }
}
