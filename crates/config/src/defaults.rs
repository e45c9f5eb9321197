//! Default embedded configuration for Quill
//!
//! Used when no configuration file is provided. Secrets and deployment
//! endpoints are expected to come from the environment.

use crate::{
    BackendConfig, CacheConfig, Config, JobsConfig, RateLimitConfig, StoreConfig,
    TokenBudgetConfig,
};

/// Embedded default configuration in TOML format
pub const DEFAULT_CONFIG_TOML: &str = r#"
# Quill Default Configuration
# Override the backend URL, model and credential with QUILL_BACKEND_URL,
# QUILL_MODEL and QUILL_BACKEND_TOKEN. Set QUILL_REDIS_URL to share
# counters, cache entries and job records between processes.

[backend]
url = "http://127.0.0.1:8000/v1"
model = "meta-llama/Llama-3.1-8B-Instruct"
timeout_ms = 30000
temperature = 0.4
max_tokens = 100

[rate_limit]
strategy = "fixed-window"
window_secs = 60
max_requests = 5

[budget]
max_input_tokens = 1000
max_output_tokens = 150
max_total_tokens = 1000

[cache]
enabled = true
ttl_secs = 120

[jobs]
lane_threshold = 2

[jobs.short_lane]
concurrency = 4
capacity = 1024

[jobs.long_lane]
concurrency = 2
capacity = 256

[jobs.retry]
max_attempts = 5
backoff_base_ms = 500
backoff_max_ms = 30000

[store]
backend = "memory"
key_prefix = "quill:"
timeout_ms = 1000
purge_interval_secs = 60
"#;

/// Programmatic equivalent of [`DEFAULT_CONFIG_TOML`]
pub fn create_default_config() -> Config {
    Config {
        backend: BackendConfig::default(),
        rate_limit: RateLimitConfig::default(),
        budget: TokenBudgetConfig::default(),
        cache: CacheConfig::default(),
        jobs: JobsConfig::default(),
        store: StoreConfig::default(),
    }
}
