//! Token budget estimation for generation requests
//!
//! The estimate is derived from the request shape alone, before any backend
//! call: roughly four prompt characters per input token and a fixed
//! completion cost per requested sentence.

use tracing::trace;

use quill_common::types::{CHARS_PER_INPUT_TOKEN, OUTPUT_TOKENS_PER_SENTENCE};
use quill_common::{BudgetKind, RejectReason};
use quill_config::TokenBudgetConfig;

/// Estimated token cost of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenEstimate {
    /// Estimate the cost of generating `sentence_count` sentences for `prompt`
    pub fn for_request(prompt: &str, sentence_count: u32) -> Self {
        let input_tokens = prompt.chars().count() as u64 / CHARS_PER_INPUT_TOKEN;
        let output_tokens = sentence_count as u64 * OUTPUT_TOKENS_PER_SENTENCE;
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Configured token ceilings
#[derive(Debug, Clone)]
pub struct TokenBudget {
    config: TokenBudgetConfig,
}

impl TokenBudget {
    pub fn new(config: TokenBudgetConfig) -> Self {
        Self { config }
    }

    /// Check an estimate against the ceilings.
    ///
    /// Input, output and total are checked in that order; the first violated
    /// ceiling is reported.
    pub fn check(&self, estimate: &TokenEstimate) -> Result<(), RejectReason> {
        let checks = [
            (
                BudgetKind::Input,
                estimate.input_tokens,
                self.config.max_input_tokens,
            ),
            (
                BudgetKind::Output,
                estimate.output_tokens,
                self.config.max_output_tokens,
            ),
            (
                BudgetKind::Total,
                estimate.total_tokens,
                self.config.max_total_tokens,
            ),
        ];

        for (kind, estimated, limit) in checks {
            if estimated > limit {
                trace!(
                    kind = %kind,
                    estimated = estimated,
                    limit = limit,
                    "Token budget exceeded"
                );
                return Err(RejectReason::BudgetExceeded {
                    kind,
                    estimated,
                    limit,
                });
            }
        }

        Ok(())
    }

    /// Estimate and check in one step
    pub fn check_request(
        &self,
        prompt: &str,
        sentence_count: u32,
    ) -> Result<TokenEstimate, RejectReason> {
        let estimate = TokenEstimate::for_request(prompt, sentence_count);
        self.check(&estimate)?;
        Ok(estimate)
    }

    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }
}
