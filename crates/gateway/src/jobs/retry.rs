//! Retry policy for job attempts
//!
//! Each attempt ends in a tagged [`AttemptOutcome`]. [`RetryPolicy::decide`]
//! turns the outcome and the attempt number into the next step of the job's
//! state machine: complete, wait and retry, or fail.
//!
//! Backoff is exponential from `backoff_base_ms`, capped at `backoff_max_ms`,
//! with full jitter: the delay is drawn uniformly from `[0, ceiling]`.

use rand::Rng;
use std::time::Duration;

use quill_config::RetryConfig;

use crate::backend::BackendError;

/// Result of one inference attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Retryable(String),
    Terminal(String),
}

impl From<Result<String, BackendError>> for AttemptOutcome {
    fn from(result: Result<String, BackendError>) -> Self {
        match result {
            Ok(text) => Self::Success(text),
            Err(e) if e.is_retryable() => Self::Retryable(e.to_string()),
            Err(e) => Self::Terminal(e.to_string()),
        }
    }
}

/// Next step after an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Write `completed` with this result
    Complete(String),
    /// Stay `running`, sleep, then attempt again
    RetryAfter(Duration),
    /// Write `failed` with this error
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound of the delay after attempt number `attempt` (1-based)
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Jittered delay after attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling_ms = self.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
    }

    /// Decide what follows attempt number `attempt`
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        match outcome {
            AttemptOutcome::Success(text) => RetryDecision::Complete(text),
            AttemptOutcome::Retryable(_) if self.allows_retry(attempt) => {
                RetryDecision::RetryAfter(self.delay_for(attempt))
            }
            AttemptOutcome::Retryable(error) => RetryDecision::Fail(format!(
                "{} (gave up after {} attempts)",
                error, attempt
            )),
            AttemptOutcome::Terminal(error) => RetryDecision::Fail(error),
        }
    }
}
