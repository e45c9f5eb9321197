//! Shared key-value store configuration
//!
//! Rate-limit counters, dedup cache entries and job records all live in
//! the same store. Use `redis` whenever more than one process serves or
//! executes jobs.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; counters are not shared between processes
    #[default]
    Memory,
    /// Redis server (requires the `redis-store` feature)
    Redis,
}

/// Store connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL, e.g. `redis://127.0.0.1:6379/0`
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix applied to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Per-operation timeout
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// How often expired entries are swept from process-local state
    #[serde(default = "default_purge_interval_secs")]
    #[validate(range(min = 1, message = "Purge interval must be at least 1 second"))]
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            timeout_ms: default_timeout_ms(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_key_prefix() -> String {
    "quill:".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_purge_interval_secs() -> u64 {
    60
}
