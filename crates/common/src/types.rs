//! Common type definitions for Quill

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed completion cost charged per requested sentence
pub const OUTPUT_TOKENS_PER_SENTENCE: u64 = 25;

/// Prompt characters per estimated input token
pub const CHARS_PER_INPUT_TOKEN: u64 = 4;

/// Lifecycle status of an asynchronous job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true for `completed` and `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job queue a job is routed to, by expected processing cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Short,
    Long,
}

impl Lane {
    /// Route a job by its requested sentence count
    ///
    /// Counts at or below `threshold` go to the short lane.
    pub fn for_sentence_count(sentence_count: u32, threshold: u32) -> Self {
        if sentence_count <= threshold {
            Self::Short
        } else {
            Self::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a synchronous answer came from the dedup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Which token ceiling a request exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Input,
    Output,
    Total,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
            Self::Total => write!(f, "total"),
        }
    }
}

/// Reason an admission check rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingClientId,
    InvalidSentenceCount,
    RateLimited,
    BudgetExceeded {
        kind: BudgetKind,
        estimated: u64,
        limit: u64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClientId => write!(f, "missing client identifier"),
            Self::InvalidSentenceCount => write!(f, "sentence count must be at least 1"),
            Self::RateLimited => write!(f, "rate limit exceeded"),
            Self::BudgetExceeded {
                kind,
                estimated,
                limit,
            } => write!(
                f,
                "{} token budget exceeded: {} > {}",
                kind, estimated, limit
            ),
        }
    }
}
