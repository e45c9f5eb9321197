//! Configuration validation functions
//!
//! Field-level checks run through `validator` derives on each section;
//! this module holds the custom field validators and the cross-section
//! semantic checks.

use tracing::{trace, warn};

use quill_common::types::OUTPUT_TOKENS_PER_SENTENCE;

use crate::{Config, StoreBackend};

// ============================================================================
// Field Validators
// ============================================================================

/// Validate that a URL uses the http or https scheme
pub fn validate_http_url(url: &str) -> Result<(), validator::ValidationError> {
    let trimmed = url.trim();
    let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    let has_host = trimmed
        .split_once("://")
        .map(|(_, rest)| !rest.is_empty())
        .unwrap_or(false);

    if has_scheme && has_host {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("invalid_url");
        err.message = Some(std::borrow::Cow::Owned(format!(
            "Invalid backend URL '{}'. Expected http:// or https:// followed by a host",
            url
        )));
        Err(err)
    }
}

// ============================================================================
// Semantic Validation
// ============================================================================

/// Cross-section checks that single-field validators cannot express.
///
/// Returns every problem found, not just the first.
pub fn validate_config_semantics(config: &Config) -> Vec<String> {
    trace!("Starting semantic validation");

    let mut errors = Vec::new();

    let budget = &config.budget;
    let smallest = budget.max_output_tokens.min(budget.max_total_tokens);
    if smallest < OUTPUT_TOKENS_PER_SENTENCE {
        errors.push(format!(
            "budget ceilings admit no request: a single sentence costs {} output tokens but the output/total ceiling is {}",
            OUTPUT_TOKENS_PER_SENTENCE, smallest
        ));
    }

    let retry = &config.jobs.retry;
    if retry.backoff_base_ms > retry.backoff_max_ms {
        errors.push(format!(
            "jobs.retry.backoff_base_ms ({}) exceeds backoff_max_ms ({})",
            retry.backoff_base_ms, retry.backoff_max_ms
        ));
    }

    match config.store.backend {
        StoreBackend::Redis => {
            let url = config.store.redis_url.as_deref().unwrap_or_default();
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                errors.push(format!(
                    "store.redis_url must be a redis:// or rediss:// URL when backend is redis (got '{}')",
                    url
                ));
            }
        }
        StoreBackend::Memory => {
            if config.store.redis_url.is_some() {
                warn!("store.redis_url is set but store.backend is 'memory'; the URL is ignored");
            }
        }
    }

    if let Some(0) = config.jobs.record_ttl_secs {
        errors.push("jobs.record_ttl_secs must be greater than 0 when set".to_string());
    }

    errors
}
