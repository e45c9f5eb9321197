//! Error types for Quill
//!
//! This module defines the error taxonomy shared by the gateway and its
//! configuration layer, with a focus on clear failure modes and on mapping
//! each failure to the status a caller should see.

use thiserror::Error;

use crate::ids::JobId;
use crate::types::RejectReason;

/// Main error type for Quill operations
#[derive(Error, Debug)]
pub enum QuillError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request refused before any inference work was done
    #[error("Admission rejected: {reason}")]
    AdmissionRejected { reason: RejectReason },

    /// The inference backend failed or returned an unusable answer
    #[error("Backend error: {message}")]
    Backend { message: String, retryable: bool },

    /// The shared key-value store failed
    #[error("Store error: {operation} - {message}")]
    Store { operation: String, message: String },

    /// Polled job identifier is unknown
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    /// The job queue is closed or full
    #[error("Queue unavailable: {lane}")]
    QueueUnavailable { lane: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Quill operations
pub type QuillResult<T> = Result<T, QuillError>;

impl QuillError {
    /// Determine if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { retryable, .. } => *retryable,
            Self::Store { .. } => true,
            Self::QueueUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Get the HTTP status code for this error
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::AdmissionRejected { reason } => match reason {
                RejectReason::RateLimited => 429,
                _ => 400,
            },
            Self::Backend { .. } => 502,
            Self::Store { .. } => 503,
            Self::JobNotFound { .. } => 404,
            Self::QueueUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Get a client-safe error message (without internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::Config { .. } => "Internal server error".to_string(),
            Self::AdmissionRejected { reason } => format!("Request rejected: {}", reason),
            Self::Backend { .. } => "Inference backend failed".to_string(),
            Self::Store { .. } => "Service temporarily unavailable".to_string(),
            Self::JobNotFound { job_id } => format!("Job '{}' not found", job_id),
            Self::QueueUnavailable { .. } => "Service temporarily unavailable".to_string(),
            Self::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<RejectReason> for QuillError {
    fn from(reason: RejectReason) -> Self {
        Self::AdmissionRejected { reason }
    }
}
