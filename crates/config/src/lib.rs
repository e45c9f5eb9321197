//! Configuration module for Quill
//!
//! This module provides configuration parsing, validation and environment
//! overrides for the admission and job-orchestration layer.
//!
//! # Module Organization
//!
//! - [`backend`]: Inference backend connection settings
//! - [`limits`]: Rate limiting, token ceilings and dedup cache lifetime
//! - [`jobs`]: Lane routing, worker concurrency and retry policy
//! - [`store`]: Shared key-value store selection
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default embedded configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use validator::Validate;

use quill_common::errors::{QuillError, QuillResult};

// ============================================================================
// Module Declarations
// ============================================================================

pub mod backend;
mod defaults;
pub mod jobs;
pub mod limits;
pub mod store;
pub mod validation;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::BackendConfig;
pub use defaults::{create_default_config, DEFAULT_CONFIG_TOML};
pub use jobs::{JobsConfig, LaneConfig, RetryConfig};
pub use limits::{CacheConfig, RateLimitConfig, RateLimitStrategy, TokenBudgetConfig};
pub use store::{StoreBackend, StoreConfig};

/// Environment variable overriding `backend.url`
pub const ENV_BACKEND_URL: &str = "QUILL_BACKEND_URL";
/// Environment variable overriding `backend.api_key`
pub const ENV_BACKEND_TOKEN: &str = "QUILL_BACKEND_TOKEN";
/// Environment variable overriding `backend.model`
pub const ENV_MODEL: &str = "QUILL_MODEL";
/// Environment variable selecting the redis store and its URL
pub const ENV_REDIS_URL: &str = "QUILL_REDIS_URL";

// ============================================================================
// Main Configuration Structure
// ============================================================================

/// Main configuration structure for Quill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Text-generation backend
    pub backend: BackendConfig,

    /// Per-client request rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Token ceilings
    #[serde(default)]
    pub budget: TokenBudgetConfig,

    /// Result dedup cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Asynchronous jobs
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Shared key-value store
    #[serde(default)]
    pub store: StoreConfig,
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from a file
    ///
    /// The format is picked from the extension (`toml` or `json`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("toml");

        debug!(path = ?path, format = extension, "Loading configuration file");

        match extension {
            "toml" => Self::from_toml(&content),
            "json" => Self::from_json(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }
    }

    /// Load the default embedded configuration.
    ///
    /// Falls back to the programmatic default if the embedded document
    /// fails to parse for any reason.
    pub fn default_embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG_TOML).or_else(|e| {
            tracing::warn!(
                "Failed to parse embedded TOML config, using programmatic default: {}",
                e
            );
            Ok(create_default_config())
        })
    }

    /// Parse configuration from TOML format
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BACKEND_URL) {
            debug!(var = ENV_BACKEND_URL, "Overriding backend URL from environment");
            self.backend.url = url;
        }
        if let Some(token) = get(ENV_BACKEND_TOKEN) {
            debug!(var = ENV_BACKEND_TOKEN, "Overriding backend credential from environment");
            self.backend.api_key = Some(token);
        }
        if let Some(model) = get(ENV_MODEL) {
            debug!(var = ENV_MODEL, model = %model, "Overriding model from environment");
            self.backend.model = model;
        }
        if let Some(redis_url) = get(ENV_REDIS_URL) {
            debug!(var = ENV_REDIS_URL, "Selecting redis store from environment");
            self.store.backend = StoreBackend::Redis;
            self.store.redis_url = Some(redis_url);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> QuillResult<()> {
        let field_checks = [
            ("backend", Validate::validate(&self.backend)),
            ("rate_limit", Validate::validate(&self.rate_limit)),
            ("budget", Validate::validate(&self.budget)),
            ("cache", Validate::validate(&self.cache)),
            ("jobs", Validate::validate(&self.jobs)),
            ("jobs.short_lane", Validate::validate(&self.jobs.short_lane)),
            ("jobs.long_lane", Validate::validate(&self.jobs.long_lane)),
            ("jobs.retry", Validate::validate(&self.jobs.retry)),
            ("store", Validate::validate(&self.store)),
        ];

        for (section, result) in field_checks {
            result.map_err(|e| {
                QuillError::config(format!(
                    "Configuration validation failed in [{}]: {}",
                    section, e
                ))
            })?;
        }

        let errors = validation::validate_config_semantics(self);
        if !errors.is_empty() {
            return Err(QuillError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(())
    }

    /// Create a default configuration for testing
    ///
    /// Uses the memory store and short backoff delays.
    pub fn default_for_testing() -> Self {
        let mut config = create_default_config();
        config.jobs.retry.backoff_base_ms = 10;
        config.jobs.retry.backoff_max_ms = 100;
        config.backend.timeout_ms = 1000;
        config
    }
}
