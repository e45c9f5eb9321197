//! Asynchronous jobs
//!
//! A job moves `pending → running → completed | failed`:
//!
//! - [`JobOrchestrator`] writes the pending record and routes the payload to
//!   the short or long lane
//! - [`WorkerPool`] workers pick payloads up and run [`JobHandler`], which
//!   marks the job running and drives the attempt loop
//! - [`RetryPolicy`] decides after every attempt whether to complete, back
//!   off and retry, or fail
//!
//! The record is rewritten whole at every transition and never after it
//! becomes terminal.

mod orchestrator;
mod queue;
mod record;
mod retry;
mod worker;

use std::sync::atomic::AtomicU64;

pub use orchestrator::JobOrchestrator;
pub use queue::{EnqueueError, JobPayload, JobQueue, LaneQueues, LaneReceivers};
pub use record::{JobRecord, JobStore};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use worker::{JobHandler, WorkerPool};

/// Job counters
#[derive(Debug, Default)]
pub struct JobStats {
    /// Jobs accepted onto a lane
    pub submitted: AtomicU64,
    /// Jobs that reached `completed`
    pub completed: AtomicU64,
    /// Jobs that reached `failed`
    pub failed: AtomicU64,
    /// Attempts scheduled after a retryable failure
    pub retries: AtomicU64,
    /// Payloads skipped because their record was missing or terminal
    pub skipped: AtomicU64,
}
