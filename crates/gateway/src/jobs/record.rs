//! Job records and their persistence
//!
//! A job is one JSON document at `job:{id}`. Status and its companion
//! result or error live in the same document, so a reader never observes a
//! completed job without its output or a failed job without its error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

use quill_common::errors::{QuillError, QuillResult};
use quill_common::{JobId, JobStatus, Lane};

use crate::store::KeyValueStore;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Persisted state of an asynchronous job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub lane: Lane,
    pub sentence_count: u32,
    /// Inference attempts started so far
    #[serde(default)]
    pub attempts: u32,
    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub updated_at: u64,
}

impl JobRecord {
    /// A freshly created job
    pub fn pending(job_id: JobId, lane: Lane, sentence_count: u32) -> Self {
        let now = now_ms();
        Self {
            job_id,
            status: JobStatus::Pending,
            result: None,
            error: None,
            lane,
            sentence_count,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.updated_at = now_ms();
    }

    pub fn start_attempt(&mut self) {
        self.attempts += 1;
        self.updated_at = now_ms();
    }

    pub fn complete(&mut self, result: String) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.updated_at = now_ms();
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error);
        self.updated_at = now_ms();
    }
}

/// Job record persistence over the shared store
pub struct JobStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Option<Duration>,
}

impl JobStore {
    /// `ttl` bounds how long records are retained; `None` keeps them forever
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    fn key(job_id: &JobId) -> String {
        format!("job:{}", job_id)
    }

    fn encode(record: &JobRecord) -> QuillResult<String> {
        serde_json::to_string(record).map_err(|e| QuillError::Internal {
            message: format!("failed to encode job {}", record.job_id),
            source: Some(Box::new(e)),
        })
    }

    /// Write a new record. Fails if the id is already taken.
    pub async fn create(&self, record: &JobRecord) -> QuillResult<()> {
        let value = Self::encode(record)?;
        let written = self
            .store
            .set_if_absent(&Self::key(&record.job_id), &value, self.ttl)
            .await?;

        if !written {
            return Err(QuillError::internal(format!(
                "job id {} already exists",
                record.job_id
            )));
        }

        trace!(job_id = %record.job_id, "Created job record");
        Ok(())
    }

    /// Replace a record
    pub async fn put(&self, record: &JobRecord) -> QuillResult<()> {
        let value = Self::encode(record)?;
        self.store
            .set(&Self::key(&record.job_id), &value, self.ttl)
            .await?;

        trace!(
            job_id = %record.job_id,
            status = %record.status,
            attempts = record.attempts,
            "Updated job record"
        );
        Ok(())
    }

    /// Load a record
    pub async fn get(&self, job_id: &JobId) -> QuillResult<Option<JobRecord>> {
        let Some(value) = self.store.get(&Self::key(job_id)).await? else {
            return Ok(None);
        };

        serde_json::from_str(&value)
            .map(Some)
            .map_err(|e| QuillError::Internal {
                message: format!("corrupt job record {}", job_id),
                source: Some(Box::new(e)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn job_store() -> (Arc<MemoryStore>, JobStore) {
        let memory = Arc::new(MemoryStore::new());
        let jobs = JobStore::new(memory.clone(), None);
        (memory, jobs)
    }

    #[test]
    fn test_transitions_keep_result_and_error_exclusive() {
        let mut record = JobRecord::pending(JobId::new(), Lane::Short, 2);
        assert_eq!(record.status, JobStatus::Pending);

        record.mark_running();
        record.start_attempt();
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.attempts, 1);

        record.complete("Done.".to_string());
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("Done."));
        assert!(record.error.is_none());

        let mut failed = JobRecord::pending(JobId::new(), Lane::Long, 4);
        failed.fail("backend down".to_string());
        assert!(failed.result.is_none());
        assert_eq!(failed.error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_record_json_shape() {
        let record = JobRecord::pending(JobId::new(), Lane::Long, 5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["lane"], "long");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_create_get_put() {
        let (memory, jobs) = job_store();
        let mut record = JobRecord::pending(JobId::new(), Lane::Short, 1);
        jobs.create(&record).await.unwrap();
        assert_eq!(memory.len(), 1);

        let loaded = jobs.get(&record.job_id).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        record.mark_running();
        record.complete("Yes.".to_string());
        jobs.put(&record).await.unwrap();
        let loaded = jobs.get(&record.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("Yes."));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_id() {
        let (_memory, jobs) = job_store();
        let record = JobRecord::pending(JobId::new(), Lane::Short, 1);
        jobs.create(&record).await.unwrap();
        assert!(jobs.create(&record).await.is_err());
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let (_memory, jobs) = job_store();
        assert!(jobs.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_corrupt_record() {
        let (memory, jobs) = job_store();
        let job_id = JobId::new();
        memory
            .set(&format!("job:{}", job_id), "not json", None)
            .await
            .unwrap();
        assert!(jobs.get(&job_id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire_with_ttl() {
        let memory = Arc::new(MemoryStore::new());
        let jobs = JobStore::new(memory, Some(Duration::from_secs(60)));
        let record = JobRecord::pending(JobId::new(), Lane::Short, 1);
        jobs.create(&record).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(jobs.get(&record.job_id).await.unwrap().is_none());
    }
}
