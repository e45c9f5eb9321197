//! Request and response shapes exposed to callers
//!
//! These are the bodies an HTTP layer would exchange; the status code of a
//! failure comes from [`QuillError::to_http_status`].

use serde::{Deserialize, Serialize};

use quill_common::errors::QuillError;
use quill_common::{CacheStatus, JobId, JobStatus, RejectReason};

use crate::jobs::JobRecord;

fn default_sentence_count() -> u32 {
    3
}

/// Body of a generation request (synchronous or submitted as a job)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_sentence_count")]
    pub sentence_count: u32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, sentence_count: u32) -> Self {
        Self {
            prompt: prompt.into(),
            sentence_count,
        }
    }
}

/// Synchronous generation answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub sentence_count: u32,
    pub output: String,
    pub cache_status: CacheStatus,
}

/// Answer to a job submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Answer to a job poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        let (output, error) = match record.status {
            JobStatus::Completed => (record.result, None),
            JobStatus::Failed => (None, record.error),
            JobStatus::Pending | JobStatus::Running => (None, None),
        };
        Self {
            job_id: record.job_id,
            status: record.status,
            output,
            error,
        }
    }
}

/// Error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
}

impl From<&QuillError> for ErrorResponse {
    fn from(err: &QuillError) -> Self {
        let rejection = match err {
            QuillError::AdmissionRejected { reason } => Some(*reason),
            _ => None,
        };
        Self {
            status: err.to_http_status(),
            error: err.client_message(),
            rejection,
        }
    }
}
