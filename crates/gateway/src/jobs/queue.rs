//! Two-lane job queue
//!
//! Short and long jobs travel on separate bounded channels so short jobs are
//! never stuck behind long ones. Enqueueing never blocks: a full lane is
//! reported to the submitter.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use quill_common::errors::QuillError;
use quill_common::{JobId, Lane};
use quill_config::JobsConfig;

/// Work item handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: JobId,
    pub prompt: String,
    pub sentence_count: u32,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("{0} lane is full")]
    Full(Lane),

    #[error("{0} lane is closed")]
    Closed(Lane),
}

impl EnqueueError {
    pub fn lane(&self) -> Lane {
        match self {
            Self::Full(lane) | Self::Closed(lane) => *lane,
        }
    }
}

impl From<EnqueueError> for QuillError {
    fn from(err: EnqueueError) -> Self {
        QuillError::QueueUnavailable {
            lane: err.lane().to_string(),
        }
    }
}

/// Submission side of a job queue
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &'static str;

    fn enqueue(&self, lane: Lane, payload: JobPayload) -> Result<(), EnqueueError>;

    /// Stop accepting jobs. Queued jobs are still delivered.
    fn close(&self);
}

/// Receiving ends, one per lane, consumed by the worker pool
pub struct LaneReceivers {
    pub short: mpsc::Receiver<JobPayload>,
    pub long: mpsc::Receiver<JobPayload>,
}

/// In-process bounded channels, one per lane
pub struct LaneQueues {
    short: RwLock<Option<mpsc::Sender<JobPayload>>>,
    long: RwLock<Option<mpsc::Sender<JobPayload>>>,
}

impl LaneQueues {
    pub fn new(config: &JobsConfig) -> (Self, LaneReceivers) {
        let (short_tx, short_rx) = mpsc::channel(config.short_lane.capacity.max(1));
        let (long_tx, long_rx) = mpsc::channel(config.long_lane.capacity.max(1));

        debug!(
            short_capacity = config.short_lane.capacity,
            long_capacity = config.long_lane.capacity,
            "Created lane queues"
        );

        (
            Self {
                short: RwLock::new(Some(short_tx)),
                long: RwLock::new(Some(long_tx)),
            },
            LaneReceivers {
                short: short_rx,
                long: long_rx,
            },
        )
    }

    fn sender(&self, lane: Lane) -> &RwLock<Option<mpsc::Sender<JobPayload>>> {
        match lane {
            Lane::Short => &self.short,
            Lane::Long => &self.long,
        }
    }
}

impl JobQueue for LaneQueues {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn enqueue(&self, lane: Lane, payload: JobPayload) -> Result<(), EnqueueError> {
        let guard = self.sender(lane).read();
        let sender = guard.as_ref().ok_or(EnqueueError::Closed(lane))?;

        sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full(lane),
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed(lane),
        })
    }

    fn close(&self) {
        let short = self.short.write().take();
        let long = self.long.write().take();
        if short.is_some() || long.is_some() {
            info!("Job queues closed; workers will drain queued jobs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_config::LaneConfig;

    fn payload(n: u32) -> JobPayload {
        JobPayload {
            job_id: JobId::new(),
            prompt: "p".to_string(),
            sentence_count: n,
        }
    }

    #[tokio::test]
    async fn test_lanes_are_separate() {
        let (queues, mut receivers) = LaneQueues::new(&JobsConfig::default());
        let short = payload(1);
        let long = payload(5);

        queues.enqueue(Lane::Short, short.clone()).unwrap();
        queues.enqueue(Lane::Long, long.clone()).unwrap();

        assert_eq!(receivers.short.recv().await, Some(short));
        assert_eq!(receivers.long.recv().await, Some(long));
    }

    #[tokio::test]
    async fn test_full_lane_is_reported() {
        let config = JobsConfig {
            short_lane: LaneConfig {
                concurrency: 1,
                capacity: 1,
            },
            ..JobsConfig::default()
        };
        let (queues, _receivers) = LaneQueues::new(&config);

        queues.enqueue(Lane::Short, payload(1)).unwrap();
        let err = queues.enqueue(Lane::Short, payload(1)).unwrap_err();
        assert!(matches!(err, EnqueueError::Full(Lane::Short)));
        assert_eq!(QuillError::from(err).to_http_status(), 503);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (queues, mut receivers) = LaneQueues::new(&JobsConfig::default());
        let queued = payload(1);
        queues.enqueue(Lane::Short, queued.clone()).unwrap();

        queues.close();
        assert!(matches!(
            queues.enqueue(Lane::Short, payload(1)),
            Err(EnqueueError::Closed(Lane::Short))
        ));

        assert_eq!(receivers.short.recv().await, Some(queued));
        assert_eq!(receivers.short.recv().await, None);
        assert_eq!(receivers.long.recv().await, None);
    }
}
