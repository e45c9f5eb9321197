//! Admission control
//!
//! Every request passes the same short-circuiting gate before any inference
//! work is scheduled:
//!
//! 1. client identifier present (non-blank)
//! 2. sentence count at least 1
//! 3. per-client rate limit
//! 4. token budget
//!
//! The rate-limit slot is consumed at step 3, so a request rejected by the
//! budget still counts against the client's window.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use quill_common::errors::QuillResult;
use quill_common::{ClientId, RejectReason};

use crate::budget::{TokenBudget, TokenEstimate};
use crate::rate_limit::{ClientRateLimiter, RateLimitOutcome};

pub struct AdmissionController {
    rate_limiter: Arc<dyn ClientRateLimiter>,
    budget: TokenBudget,
}

impl AdmissionController {
    pub fn new(rate_limiter: Arc<dyn ClientRateLimiter>, budget: TokenBudget) -> Self {
        Self {
            rate_limiter,
            budget,
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// Returns the token estimate on admission. Rejections surface as
    /// [`QuillError::AdmissionRejected`](quill_common::QuillError); a rate
    /// limiter store failure surfaces as a store error (fail closed).
    pub async fn admit(
        &self,
        client: &ClientId,
        prompt: &str,
        sentence_count: u32,
    ) -> QuillResult<TokenEstimate> {
        if client.is_blank() {
            debug!("Rejected request without client identifier");
            return Err(RejectReason::MissingClientId.into());
        }

        if sentence_count == 0 {
            debug!(client_id = %client, "Rejected request with zero sentence count");
            return Err(RejectReason::InvalidSentenceCount.into());
        }

        let info = match self.rate_limiter.check(client).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    client_id = %client,
                    limiter = self.rate_limiter.name(),
                    error = %e,
                    "Rate limiter unavailable, rejecting request"
                );
                return Err(e.into());
            }
        };

        if info.outcome == RateLimitOutcome::Limited {
            debug!(
                client_id = %client,
                count = info.current_count,
                limit = info.limit,
                "Client rate limited"
            );
            return Err(RejectReason::RateLimited.into());
        }

        let estimate = match self.budget.check_request(prompt, sentence_count) {
            Ok(estimate) => estimate,
            Err(reason) => {
                debug!(
                    client_id = %client,
                    reason = %reason,
                    "Request exceeds token budget"
                );
                return Err(reason.into());
            }
        };

        trace!(
            client_id = %client,
            remaining = info.remaining(),
            input_tokens = estimate.input_tokens,
            output_tokens = estimate.output_tokens,
            "Request admitted"
        );

        Ok(estimate)
    }

    pub fn rate_limiter(&self) -> &Arc<dyn ClientRateLimiter> {
        &self.rate_limiter
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }
}
