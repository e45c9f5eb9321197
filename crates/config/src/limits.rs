//! Admission limits: per-client rate limiting, token ceilings and the
//! dedup cache lifetime.

use serde::{Deserialize, Serialize};
use validator::Validate;

// ============================================================================
// Rate Limiting
// ============================================================================

/// How request counts are tracked per client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    /// Atomic counter in the shared store, one per client per window.
    /// Consistent across every process sharing the store.
    #[default]
    FixedWindow,
    /// In-process timestamp log per client.
    /// Only correct for single-process deployments.
    SlidingWindow,
}

/// Per-client request rate limit
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    /// Counting strategy
    #[serde(default)]
    pub strategy: RateLimitStrategy,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    #[validate(range(min = 1, message = "Rate limit window must be at least 1 second"))]
    pub window_secs: u64,

    /// Requests admitted per client per window
    #[serde(default = "default_max_requests")]
    #[validate(range(min = 1, message = "At least one request per window must be allowed"))]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::default(),
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> u32 {
    5
}

// ============================================================================
// Token Budget
// ============================================================================

/// Token ceilings checked before any inference work
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenBudgetConfig {
    /// Maximum estimated prompt tokens
    #[serde(default = "default_max_input_tokens")]
    #[validate(range(min = 1))]
    pub max_input_tokens: u64,

    /// Maximum estimated completion tokens
    #[serde(default = "default_max_output_tokens")]
    #[validate(range(min = 1))]
    pub max_output_tokens: u64,

    /// Maximum estimated prompt + completion tokens
    #[serde(default = "default_max_total_tokens")]
    #[validate(range(min = 1))]
    pub max_total_tokens: u64,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: default_max_input_tokens(),
            max_output_tokens: default_max_output_tokens(),
            max_total_tokens: default_max_total_tokens(),
        }
    }
}

fn default_max_input_tokens() -> u64 {
    1000
}

fn default_max_output_tokens() -> u64 {
    150
}

fn default_max_total_tokens() -> u64 {
    1000
}

// ============================================================================
// Dedup Cache
// ============================================================================

/// Result deduplication cache
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Disable to always recompute
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry lifetime in seconds, independent of the rate-limit window
    #[serde(default = "default_cache_ttl")]
    #[validate(range(min = 1, message = "Cache TTL must be at least 1 second"))]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    120
}
