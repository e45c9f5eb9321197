//! Per-client request rate limiting
//!
//! Two strategies are available:
//!
//! # Fixed Window (default)
//!
//! One counter per client in the shared store:
//! 1. `incr_window ratelimit:{client}`: the store creates the counter with the
//!    window as its expiry and increments it in one atomic step
//! 2. Allow if count <= max_requests
//!
//! Only the request that creates the counter sets the expiry, so concurrent
//! first requests never race on conflicting expiries, and a failed call can
//! never leave a counter behind without one. Because the counter lives in
//! the store, the limit holds across every process sharing it.
//!
//! # Sliding Window
//!
//! An in-process timestamp log per client, pruned to the window on each
//! check. Counts are not shared between processes, so this is only correct
//! for single-process deployments. Idle clients are dropped by
//! [`ClientRateLimiter::purge_expired`].
//!
//! Both strategies count every checked request, including ones that are
//! throttled or later rejected by the budget check.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use quill_common::ClientId;
use quill_config::{RateLimitConfig, RateLimitStrategy};

use crate::store::{KeyValueStore, StoreError};

/// Rate limiter outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Request is allowed
    Allowed,
    /// Request is rate limited
    Limited,
}

/// Detailed rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitCheckInfo {
    /// Whether the request is allowed or limited
    pub outcome: RateLimitOutcome,
    /// Request count in the current window, this request included
    pub current_count: u64,
    /// Maximum requests allowed per window
    pub limit: u32,
}

impl RateLimitCheckInfo {
    fn new(current_count: u64, limit: u32) -> Self {
        let outcome = if current_count > limit as u64 {
            RateLimitOutcome::Limited
        } else {
            RateLimitOutcome::Allowed
        };
        Self {
            outcome,
            current_count,
            limit,
        }
    }

    /// Remaining requests in the current window (0 if over limit)
    pub fn remaining(&self) -> u32 {
        (self.limit as u64).saturating_sub(self.current_count) as u32
    }
}

/// Statistics for rate limiting
#[derive(Debug, Default)]
pub struct RateLimitStats {
    /// Total requests checked
    pub total_checks: AtomicU64,
    /// Requests allowed
    pub allowed: AtomicU64,
    /// Requests limited
    pub limited: AtomicU64,
    /// Store errors
    pub store_errors: AtomicU64,
}

impl RateLimitStats {
    pub fn record_check(&self, outcome: RateLimitOutcome) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RateLimitOutcome::Allowed => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
            }
            RateLimitOutcome::Limited => {
                self.limited.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A per-client request gate
#[async_trait]
pub trait ClientRateLimiter: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Count this request against the client's window and decide
    async fn check(&self, client: &ClientId) -> Result<RateLimitCheckInfo, StoreError>;

    /// Statistics
    fn stats(&self) -> &RateLimitStats;

    /// Drop state kept for clients whose window has fully elapsed.
    /// Returns how many clients were dropped.
    fn purge_expired(&self) -> usize {
        0
    }
}

// ============================================================================
// Fixed Window (shared store)
// ============================================================================

/// Store-backed fixed-window limiter
pub struct FixedWindowLimiter {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
    max_requests: u32,
    stats: RateLimitStats,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, window: Duration, max_requests: u32) -> Self {
        Self {
            store,
            window,
            max_requests,
            stats: RateLimitStats::default(),
        }
    }

    fn key(client: &ClientId) -> String {
        format!("ratelimit:{}", client.as_str())
    }
}

#[async_trait]
impl ClientRateLimiter for FixedWindowLimiter {
    fn name(&self) -> &'static str {
        "fixed-window"
    }

    async fn check(&self, client: &ClientId) -> Result<RateLimitCheckInfo, StoreError> {
        let key = Self::key(client);

        let count = match self.store.incr_window(&key, self.window).await {
            Ok(count) => count,
            Err(e) => {
                self.stats.record_store_error();
                return Err(e);
            }
        };

        let info = RateLimitCheckInfo::new(count.max(0) as u64, self.max_requests);

        trace!(
            client_id = %client,
            count = count,
            max_requests = self.max_requests,
            outcome = ?info.outcome,
            "Fixed window rate limit check"
        );

        self.stats.record_check(info.outcome);
        Ok(info)
    }

    fn stats(&self) -> &RateLimitStats {
        &self.stats
    }
}

// ============================================================================
// Sliding Window (process-local)
// ============================================================================

/// In-process sliding-window limiter
pub struct SlidingWindowLimiter {
    clients: DashMap<String, VecDeque<Instant>>,
    window: Duration,
    max_requests: u32,
    stats: RateLimitStats,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            clients: DashMap::new(),
            window,
            max_requests,
            stats: RateLimitStats::default(),
        }
    }

    /// Number of clients with a timestamp log
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl ClientRateLimiter for SlidingWindowLimiter {
    fn name(&self) -> &'static str {
        "sliding-window"
    }

    async fn check(&self, client: &ClientId) -> Result<RateLimitCheckInfo, StoreError> {
        let now = Instant::now();
        let count = {
            let mut log = self.clients.entry(client.as_str().to_string()).or_default();
            while let Some(oldest) = log.front() {
                if now.duration_since(*oldest) >= self.window {
                    log.pop_front();
                } else {
                    break;
                }
            }
            log.push_back(now);
            log.len() as u64
        };

        let info = RateLimitCheckInfo::new(count, self.max_requests);

        trace!(
            client_id = %client,
            count = count,
            max_requests = self.max_requests,
            outcome = ?info.outcome,
            "Sliding window rate limit check"
        );

        self.stats.record_check(info.outcome);
        Ok(info)
    }

    fn stats(&self) -> &RateLimitStats {
        &self.stats
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients.retain(|_, log| {
            log.back()
                .map(|newest| now.duration_since(*newest) < self.window)
                .unwrap_or(false)
        });
        let removed = before.saturating_sub(self.clients.len());
        trace!(removed = removed, "Dropped idle sliding window clients");
        removed
    }
}

/// Create the rate limiter selected by configuration
pub fn create_rate_limiter(
    config: &RateLimitConfig,
    store: Arc<dyn KeyValueStore>,
) -> Arc<dyn ClientRateLimiter> {
    let window = Duration::from_secs(config.window_secs);

    match config.strategy {
        RateLimitStrategy::FixedWindow => {
            debug!(
                store = store.name(),
                window_secs = config.window_secs,
                max_requests = config.max_requests,
                "Created fixed window rate limiter"
            );
            Arc::new(FixedWindowLimiter::new(store, window, config.max_requests))
        }
        RateLimitStrategy::SlidingWindow => {
            info!(
                window_secs = config.window_secs,
                max_requests = config.max_requests,
                "Created process-local sliding window rate limiter; limits are not shared between processes"
            );
            Arc::new(SlidingWindowLimiter::new(window, config.max_requests))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicBool;

    /// Applies the first increment, then reports it as failed, like a reply
    /// lost after the store committed the transaction
    struct LostReplyStore {
        inner: MemoryStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for LostReplyStore {
        fn name(&self) -> &'static str {
            "lost-reply"
        }
        async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
            let count = self.inner.incr_window(key, window).await?;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            Ok(count)
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<bool, StoreError> {
            self.inner.set_if_absent(key, value, ttl).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn fixed(max_requests: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            max_requests,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_admits_up_to_max() {
        let limiter = fixed(5);
        let client = ClientId::from("client-a");

        for n in 1..=5 {
            let info = limiter.check(&client).await.unwrap();
            assert_eq!(info.outcome, RateLimitOutcome::Allowed, "request {}", n);
            assert_eq!(info.current_count, n);
        }

        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.outcome, RateLimitOutcome::Limited);
        assert_eq!(info.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_resets_after_window() {
        let limiter = fixed(2);
        let client = ClientId::from("client-a");

        limiter.check(&client).await.unwrap();
        limiter.check(&client).await.unwrap();
        assert_eq!(
            limiter.check(&client).await.unwrap().outcome,
            RateLimitOutcome::Limited
        );

        tokio::time::advance(Duration::from_secs(61)).await;

        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.outcome, RateLimitOutcome::Allowed);
        assert_eq!(info.current_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_window_starts_at_first_request() {
        let limiter = fixed(1);
        let client = ClientId::from("client-a");

        limiter.check(&client).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        // Later requests do not push the expiry out
        assert_eq!(
            limiter.check(&client).await.unwrap().outcome,
            RateLimitOutcome::Limited
        );
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(
            limiter.check(&client).await.unwrap().outcome,
            RateLimitOutcome::Allowed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_resets_after_failed_first_request() {
        let store = Arc::new(LostReplyStore {
            inner: MemoryStore::new(),
            fail_next: AtomicBool::new(true),
        });
        let limiter = FixedWindowLimiter::new(store, Duration::from_secs(60), 2);
        let client = ClientId::from("client-a");

        assert!(limiter.check(&client).await.is_err());
        assert_eq!(limiter.stats().store_errors.load(Ordering::Relaxed), 1);

        // The failed request still opened the window
        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.current_count, 2);
        assert_eq!(info.outcome, RateLimitOutcome::Allowed);
        assert_eq!(
            limiter.check(&client).await.unwrap().outcome,
            RateLimitOutcome::Limited
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.outcome, RateLimitOutcome::Allowed);
        assert_eq!(info.current_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_separate_clients() {
        let limiter = fixed(1);
        limiter.check(&ClientId::from("a")).await.unwrap();
        assert_eq!(
            limiter.check(&ClientId::from("a")).await.unwrap().outcome,
            RateLimitOutcome::Limited
        );
        assert_eq!(
            limiter.check(&ClientId::from("b")).await.unwrap().outcome,
            RateLimitOutcome::Allowed
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fixed_window_concurrent_admits_exactly_max() {
        let limiter = Arc::new(fixed(5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.check(&ClientId::from("burst")).await.unwrap().outcome
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() == RateLimitOutcome::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
        assert_eq!(limiter.stats().limited.load(Ordering::Relaxed), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_prunes_old_requests() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(10), 2);
        let client = ClientId::from("client-a");

        limiter.check(&client).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.check(&client).await.unwrap();
        assert_eq!(
            limiter.check(&client).await.unwrap().outcome,
            RateLimitOutcome::Limited
        );

        // First request ages out; the log still holds the two later ones
        tokio::time::advance(Duration::from_secs(5)).await;
        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.current_count, 3);
        assert_eq!(info.outcome, RateLimitOutcome::Limited);

        tokio::time::advance(Duration::from_secs(11)).await;
        let info = limiter.check(&client).await.unwrap();
        assert_eq!(info.current_count, 1);
        assert_eq!(info.outcome, RateLimitOutcome::Allowed);
        assert_eq!(limiter.client_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_purges_idle_clients() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 5);
        for i in 0..1000 {
            limiter
                .check(&ClientId::new(format!("client-{}", i)))
                .await
                .unwrap();
        }
        assert_eq!(limiter.client_count(), 1000);

        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.check(&ClientId::from("active")).await.unwrap();

        assert_eq!(limiter.purge_expired(), 1000);
        assert_eq!(limiter.client_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_leaves_purging_to_the_store() {
        let store = Arc::new(MemoryStore::new());
        let limiter = FixedWindowLimiter::new(store.clone(), Duration::from_secs(1), 5);
        limiter.check(&ClientId::from("client-a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.purge_expired(), 0);
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn test_stats_recording() {
        let stats = RateLimitStats::default();

        stats.record_check(RateLimitOutcome::Allowed);
        stats.record_check(RateLimitOutcome::Allowed);
        stats.record_check(RateLimitOutcome::Limited);
        stats.record_store_error();

        assert_eq!(stats.total_checks.load(Ordering::Relaxed), 3);
        assert_eq!(stats.allowed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.limited.load(Ordering::Relaxed), 1);
        assert_eq!(stats.store_errors.load(Ordering::Relaxed), 1);
    }
}
