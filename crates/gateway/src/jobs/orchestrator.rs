//! Job creation and polling

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

use quill_common::errors::{QuillError, QuillResult};
use quill_common::{JobId, Lane};

use super::queue::{JobPayload, JobQueue};
use super::record::{JobRecord, JobStore};
use super::JobStats;

pub struct JobOrchestrator {
    jobs: Arc<JobStore>,
    queue: Arc<dyn JobQueue>,
    lane_threshold: u32,
    stats: Arc<JobStats>,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<JobStore>,
        queue: Arc<dyn JobQueue>,
        lane_threshold: u32,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            jobs,
            queue,
            lane_threshold,
            stats,
        }
    }

    pub fn lane_for(&self, sentence_count: u32) -> Lane {
        Lane::for_sentence_count(sentence_count, self.lane_threshold)
    }

    /// Create a pending job and route it to its lane.
    ///
    /// If the lane refuses the payload the record is marked failed before
    /// the error is returned, so no job stays pending forever.
    pub async fn submit(&self, prompt: String, sentence_count: u32) -> QuillResult<JobRecord> {
        let lane = self.lane_for(sentence_count);
        let record = JobRecord::pending(JobId::new(), lane, sentence_count);
        self.jobs.create(&record).await?;

        let payload = JobPayload {
            job_id: record.job_id,
            prompt,
            sentence_count,
        };

        if let Err(e) = self.queue.enqueue(lane, payload) {
            error!(
                job_id = %record.job_id,
                lane = %lane,
                queue = self.queue.name(),
                error = %e,
                "Failed to enqueue job"
            );
            let mut failed = record.clone();
            failed.fail(e.to_string());
            if let Err(write_err) = self.jobs.put(&failed).await {
                error!(
                    job_id = %record.job_id,
                    error = %write_err,
                    "Failed to mark unqueued job as failed"
                );
            }
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        info!(
            job_id = %record.job_id,
            lane = %lane,
            sentence_count = sentence_count,
            "Job submitted"
        );

        Ok(record)
    }

    /// Current record of a job
    pub async fn poll(&self, job_id: &JobId) -> QuillResult<JobRecord> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(QuillError::JobNotFound { job_id: *job_id })
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::queue::LaneQueues;
    use crate::store::MemoryStore;
    use quill_common::JobStatus;
    use quill_config::{JobsConfig, LaneConfig};

    fn orchestrator(config: &JobsConfig) -> (JobOrchestrator, crate::jobs::LaneReceivers) {
        let jobs = Arc::new(JobStore::new(Arc::new(MemoryStore::new()), None));
        let (queues, receivers) = LaneQueues::new(config);
        (
            JobOrchestrator::new(
                jobs,
                Arc::new(queues),
                config.lane_threshold,
                Arc::new(JobStats::default()),
            ),
            receivers,
        )
    }

    #[tokio::test]
    async fn test_submit_writes_pending_and_routes() {
        let (orchestrator, mut receivers) = orchestrator(&JobsConfig::default());

        let short = orchestrator.submit("short".to_string(), 2).await.unwrap();
        let long = orchestrator.submit("long".to_string(), 3).await.unwrap();
        assert_eq!(short.lane, Lane::Short);
        assert_eq!(long.lane, Lane::Long);

        let polled = orchestrator.poll(&short.job_id).await.unwrap();
        assert_eq!(polled.status, JobStatus::Pending);

        assert_eq!(receivers.short.recv().await.unwrap().job_id, short.job_id);
        assert_eq!(receivers.long.recv().await.unwrap().job_id, long.job_id);
    }

    #[tokio::test]
    async fn test_poll_unknown_job() {
        let (orchestrator, _receivers) = orchestrator(&JobsConfig::default());
        let err = orchestrator.poll(&JobId::new()).await.unwrap_err();
        assert_eq!(err.to_http_status(), 404);
    }

    #[tokio::test]
    async fn test_refused_job_is_marked_failed() {
        let config = JobsConfig {
            short_lane: LaneConfig {
                concurrency: 1,
                capacity: 1,
            },
            ..JobsConfig::default()
        };
        let (orchestrator, _receivers) = orchestrator(&config);

        orchestrator.submit("a".to_string(), 1).await.unwrap();
        let err = orchestrator.submit("b".to_string(), 1).await.unwrap_err();
        assert!(matches!(err, QuillError::QueueUnavailable { .. }));
        assert_eq!(orchestrator.stats.failed.load(Ordering::Relaxed), 1);
    }
}
