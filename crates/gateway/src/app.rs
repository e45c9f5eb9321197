//! Gateway assembly
//!
//! [`Gateway`] wires the store, backend, admission controller, dedup cache
//! and job machinery together and exposes the caller-facing operations:
//! synchronous generation, job submission, polling and health.
//!
//! Starting workers also starts a janitor task that periodically sweeps
//! expired entries from process-local state (the memory store and the
//! sliding-window limiter). Redis evicts expired keys on its own.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use quill_common::errors::QuillResult;
use quill_common::{CacheStatus, ClientId, JobId, JobStatus};
use quill_config::Config;

use crate::admission::AdmissionController;
use crate::api::{GenerateRequest, GenerateResponse, JobStatusResponse, SubmitResponse};
use crate::backend::{InferenceBackend, OpenAiCompatibleBackend};
use crate::budget::TokenBudget;
use crate::dedup::{DedupCache, DedupCacheStats};
use crate::invoker::InferenceInvoker;
use crate::jobs::{
    JobHandler, JobOrchestrator, JobQueue, JobStats, JobStore, LaneQueues, LaneReceivers,
    RetryPolicy, WorkerPool,
};
use crate::rate_limit::{create_rate_limiter, ClientRateLimiter, RateLimitStats};
use crate::store::{create_store, KeyValueStore};

/// Result of [`Gateway::health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub store: &'static str,
    pub backend: &'static str,
    pub workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Admission control and job orchestration in front of a backend
pub struct Gateway {
    config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
    backend_name: &'static str,
    admission: AdmissionController,
    invoker: Arc<InferenceInvoker>,
    orchestrator: JobOrchestrator,
    handler: Arc<JobHandler>,
    queues: Arc<LaneQueues>,
    job_stats: Arc<JobStats>,
    receivers: Mutex<Option<LaneReceivers>>,
    workers: Mutex<Option<WorkerPool>>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// Assemble a gateway from explicit collaborators.
    ///
    /// Workers are not started; call [`Gateway::spawn_workers`].
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let config = Arc::new(config);

        let rate_limiter = create_rate_limiter(&config.rate_limit, Arc::clone(&store));
        let admission =
            AdmissionController::new(rate_limiter, TokenBudget::new(config.budget.clone()));

        let cache = Arc::new(DedupCache::new(Arc::clone(&store), &config.cache));
        let backend_name = backend.name();
        let invoker = Arc::new(InferenceInvoker::new(
            backend,
            cache,
            config.backend.model.clone(),
        ));

        let jobs = Arc::new(JobStore::new(
            Arc::clone(&store),
            config.jobs.record_ttl_secs.map(Duration::from_secs),
        ));
        let (queues, receivers) = LaneQueues::new(&config.jobs);
        let queues = Arc::new(queues);
        let job_stats = Arc::new(JobStats::default());

        let orchestrator = JobOrchestrator::new(
            Arc::clone(&jobs),
            Arc::clone(&queues) as Arc<dyn JobQueue>,
            config.jobs.lane_threshold,
            Arc::clone(&job_stats),
        );
        let handler = Arc::new(JobHandler::new(
            jobs,
            Arc::clone(&invoker),
            RetryPolicy::from_config(&config.jobs.retry),
            Arc::clone(&job_stats),
        ));

        info!(
            store = store.name(),
            backend = backend_name,
            model = %config.backend.model,
            lane_threshold = config.jobs.lane_threshold,
            "Gateway initialized"
        );

        Self {
            config,
            store,
            backend_name,
            admission,
            invoker,
            orchestrator,
            handler,
            queues,
            job_stats,
            receivers: Mutex::new(Some(receivers)),
            workers: Mutex::new(None),
            janitor: Mutex::new(None),
        }
    }

    /// Validate the configuration, connect the configured store and build
    /// the HTTP backend
    pub async fn connect(config: Config) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let store = create_store(&config.store)
            .await
            .context("Failed to connect to the shared store")?;
        let backend = OpenAiCompatibleBackend::new(&config.backend)
            .context("Failed to create inference backend")?;

        Ok(Self::new(config, store, Arc::new(backend)))
    }

    /// Start the worker pool and the janitor. Later calls do nothing.
    pub fn spawn_workers(&self) {
        let Some(receivers) = self.receivers.lock().take() else {
            debug!("Worker pool already started");
            return;
        };

        let pool = WorkerPool::spawn(Arc::clone(&self.handler), receivers, &self.config.jobs);
        *self.workers.lock() = Some(pool);
        *self.janitor.lock() = Some(self.spawn_janitor());
    }

    fn spawn_janitor(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let rate_limiter = Arc::clone(self.admission.rate_limiter());
        let period = Duration::from_secs(self.config.store.purge_interval_secs.max(1));

        tokio::spawn(async move {
            let mut timer = time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            timer.tick().await;

            loop {
                timer.tick().await;
                let removed = purge_expired(store.as_ref(), rate_limiter.as_ref());
                trace!(removed = removed, "Janitor sweep finished");
            }
        })
    }

    /// Sweep expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge_expired(self.store.as_ref(), self.admission.rate_limiter().as_ref())
    }

    /// Synchronous generation: admission, dedup lookup, then inference on a
    /// miss. Backend failures are returned immediately without retry.
    pub async fn generate(
        &self,
        client: &ClientId,
        request: GenerateRequest,
    ) -> QuillResult<GenerateResponse> {
        self.admission
            .admit(client, &request.prompt, request.sentence_count)
            .await?;

        let fingerprint = self
            .invoker
            .fingerprint(&request.prompt, request.sentence_count);

        if let Some(output) = self.invoker.cache().lookup(&fingerprint).await {
            debug!(client_id = %client, fingerprint = %fingerprint, "Served from dedup cache");
            return Ok(GenerateResponse {
                sentence_count: request.sentence_count,
                output,
                cache_status: CacheStatus::Hit,
            });
        }

        let output = self
            .invoker
            .invoke(&request.prompt, request.sentence_count, &fingerprint)
            .await?;

        Ok(GenerateResponse {
            sentence_count: request.sentence_count,
            output,
            cache_status: CacheStatus::Miss,
        })
    }

    /// Asynchronous generation: admission, then a pending job
    pub async fn submit(
        &self,
        client: &ClientId,
        request: GenerateRequest,
    ) -> QuillResult<SubmitResponse> {
        self.admission
            .admit(client, &request.prompt, request.sentence_count)
            .await?;

        let record = self
            .orchestrator
            .submit(request.prompt, request.sentence_count)
            .await?;

        debug!(client_id = %client, job_id = %record.job_id, "Accepted job");

        Ok(SubmitResponse {
            job_id: record.job_id,
            status: JobStatus::Pending,
        })
    }

    /// Current state of a job
    pub async fn poll(&self, job_id: &JobId) -> QuillResult<JobStatusResponse> {
        self.orchestrator.poll(job_id).await.map(Into::into)
    }

    /// Store reachability and worker state
    pub async fn health(&self) -> HealthReport {
        let workers = self
            .workers
            .lock()
            .as_ref()
            .map(WorkerPool::worker_count)
            .unwrap_or(0);

        let (healthy, detail) = match self.store.ping().await {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Store health check failed");
                (false, Some(e.to_string()))
            }
        };

        HealthReport {
            healthy,
            store: self.store.name(),
            backend: self.backend_name,
            workers,
            detail,
        }
    }

    /// Stop accepting jobs, let workers drain the queues and wait for them
    pub async fn shutdown(&self) {
        self.queues.close();
        self.handler.begin_shutdown();

        if let Some(janitor) = self.janitor.lock().take() {
            janitor.abort();
        }

        // Dropping unclaimed receivers discards anything queued without workers
        if self.receivers.lock().take().is_some() {
            warn!("Shutting down without workers; queued jobs stay pending");
        }

        let pool = self.workers.lock().take();
        if let Some(pool) = pool {
            pool.join().await;
        }
        info!("Gateway shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn job_stats(&self) -> &JobStats {
        &self.job_stats
    }

    pub fn cache_stats(&self) -> &DedupCacheStats {
        self.invoker.cache().stats()
    }

    pub fn rate_limit_stats(&self) -> &RateLimitStats {
        self.admission.rate_limiter().stats()
    }
}

fn purge_expired(store: &dyn KeyValueStore, rate_limiter: &dyn ClientRateLimiter) -> usize {
    let entries = store.purge_expired();
    let clients = rate_limiter.purge_expired();
    if entries + clients > 0 {
        debug!(
            store_entries = entries,
            rate_limit_clients = clients,
            "Purged expired state"
        );
    }
    entries + clients
}
