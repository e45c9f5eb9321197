//! Job workers
//!
//! One [`JobHandler`] serves both lanes; the lane only selects the channel a
//! worker reads from and how many workers read it.
//!
//! Store failures never strand a job outside a terminal state: the pickup
//! load is retried on the backoff schedule and falls back to writing a
//! `failed` record, and the terminal write is retried until it lands. Once
//! shutdown begins, terminal writes give up after `max_attempts` tries so
//! the pool can stop.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use quill_common::errors::QuillResult;
use quill_common::{JobId, JobStatus, Lane};
use quill_config::JobsConfig;

use super::queue::{JobPayload, LaneReceivers};
use super::record::{JobRecord, JobStore};
use super::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use super::JobStats;
use crate::invoker::InferenceInvoker;

/// Runs a single job from pickup to a terminal record
pub struct JobHandler {
    jobs: Arc<JobStore>,
    invoker: Arc<InferenceInvoker>,
    policy: RetryPolicy,
    stats: Arc<JobStats>,
    closing: AtomicBool,
}

impl JobHandler {
    pub fn new(
        jobs: Arc<JobStore>,
        invoker: Arc<InferenceInvoker>,
        policy: RetryPolicy,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            jobs,
            invoker,
            policy,
            stats,
            closing: AtomicBool::new(false),
        }
    }

    /// Stop retrying terminal writes indefinitely
    pub fn begin_shutdown(&self) {
        self.closing.store(true, Ordering::Relaxed);
    }

    /// Handle one delivered payload.
    ///
    /// Payloads whose record is missing or already terminal are skipped, so a
    /// redelivered job never rewrites its outcome.
    pub async fn handle(&self, lane: Lane, payload: JobPayload) {
        let job_id = payload.job_id;

        let mut record = match self.load(&job_id).await {
            Ok(Some(record)) if record.status.is_terminal() => {
                debug!(
                    job_id = %job_id,
                    status = %record.status,
                    "Skipping redelivered job that already finished"
                );
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(job_id = %job_id, "Skipping job without a record");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load job record, failing job");
                let mut record = JobRecord::pending(job_id, lane, payload.sentence_count);
                record.fail(format!("job record could not be loaded: {}", e));
                self.finish(&record).await;
                return;
            }
        };

        record.mark_running();
        if let Err(e) = self.jobs.put(&record).await {
            warn!(job_id = %job_id, error = %e, "Failed to mark job running");
        }

        debug!(
            job_id = %job_id,
            lane = %lane,
            sentence_count = payload.sentence_count,
            "Job started"
        );

        let fingerprint = self
            .invoker
            .fingerprint(&payload.prompt, payload.sentence_count);

        loop {
            record.start_attempt();
            let attempt = record.attempts;

            let outcome = AttemptOutcome::from(
                self.invoker
                    .invoke(&payload.prompt, payload.sentence_count, &fingerprint)
                    .await,
            );

            match self.policy.decide(attempt, outcome) {
                RetryDecision::Complete(text) => {
                    record.complete(text);
                    break;
                }
                RetryDecision::RetryAfter(delay) => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        job_id = %job_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying job after backoff"
                    );
                    if let Err(e) = self.jobs.put(&record).await {
                        warn!(job_id = %job_id, error = %e, "Failed to record attempt");
                    }
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Fail(error) => {
                    record.fail(error);
                    break;
                }
            }
        }

        self.finish(&record).await;
    }

    /// Load the record at pickup, retrying store failures on the same
    /// backoff schedule as attempts
    async fn load(&self, job_id: &JobId) -> QuillResult<Option<JobRecord>> {
        let mut read = 1;
        loop {
            match self.jobs.get(job_id).await {
                Ok(record) => return Ok(record),
                Err(e) if self.policy.allows_retry(read) => {
                    warn!(
                        job_id = %job_id,
                        error = %e,
                        read = read,
                        "Failed to load job record, retrying"
                    );
                    tokio::time::sleep(self.policy.delay_for(read)).await;
                    read += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist the terminal record.
    ///
    /// Store failures are retried on the backoff schedule, and past it for
    /// as long as the handler is not shutting down.
    async fn finish(&self, record: &JobRecord) {
        let mut write = 1;
        loop {
            match self.jobs.put(record).await {
                Ok(()) => break,
                Err(e) if self.policy.allows_retry(write) => {
                    warn!(
                        job_id = %record.job_id,
                        error = %e,
                        write = write,
                        "Failed to write terminal job record, retrying"
                    );
                    tokio::time::sleep(self.policy.delay_for(write)).await;
                    write += 1;
                }
                Err(e) if !self.closing.load(Ordering::Relaxed) => {
                    error!(
                        job_id = %record.job_id,
                        error = %e,
                        write = write,
                        "Terminal job record still not written, retrying"
                    );
                    tokio::time::sleep(self.policy.delay_for(write)).await;
                    write += 1;
                }
                Err(e) => {
                    error!(
                        job_id = %record.job_id,
                        error = %e,
                        "Giving up writing terminal job record during shutdown"
                    );
                    break;
                }
            }
        }

        match record.status {
            JobStatus::Completed => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    job_id = %record.job_id,
                    attempts = record.attempts,
                    "Job completed"
                );
            }
            _ => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    job_id = %record.job_id,
                    attempts = record.attempts,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Job failed"
                );
            }
        }
    }
}

/// Fixed set of worker tasks reading the lane queues
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers per lane
    pub fn spawn(handler: Arc<JobHandler>, receivers: LaneReceivers, config: &JobsConfig) -> Self {
        let mut handles = Vec::new();
        handles.extend(spawn_lane(
            Lane::Short,
            receivers.short,
            config.short_lane.concurrency,
            &handler,
        ));
        handles.extend(spawn_lane(
            Lane::Long,
            receivers.long,
            config.long_lane.concurrency,
            &handler,
        ));

        info!(
            short_workers = config.short_lane.concurrency.max(1),
            long_workers = config.long_lane.concurrency.max(1),
            "Worker pool started"
        );

        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Workers exit once their lane is closed
    /// and drained.
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }
        debug!("Worker pool stopped");
    }
}

fn spawn_lane(
    lane: Lane,
    receiver: mpsc::Receiver<JobPayload>,
    concurrency: usize,
    handler: &Arc<JobHandler>,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..concurrency.max(1))
        .map(|worker| {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(handler);
            tokio::spawn(async move {
                loop {
                    // Hold the lock only while waiting for the next payload
                    let next = receiver.lock().await.recv().await;
                    match next {
                        Some(payload) => handler.handle(lane, payload).await,
                        None => break,
                    }
                }
                debug!(lane = %lane, worker = worker, "Worker exiting");
            })
        })
        .collect()
}
