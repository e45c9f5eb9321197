//! Inference backend configuration
//!
//! The backend is any OpenAI-compatible chat completions endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Text-generation backend connection settings
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    /// Base URL of the chat completions API (without `/chat/completions`)
    #[validate(custom(function = "crate::validation::validate_http_url"))]
    pub url: String,

    /// Bearer credential, usually supplied through the environment
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier sent with every request; also part of the dedup fingerprint
    #[validate(length(min = 1, message = "Model identifier must not be empty"))]
    pub model: String,

    /// Per-call timeout
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Completion token cap passed to the backend
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,
}

// Keep the credential out of logs and config dumps
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/v1".to_string(),
            api_key: None,
            model: "meta-llama/Llama-3.1-8B-Instruct".to_string(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    100
}
