//! Asynchronous job configuration: lane routing, worker concurrency and
//! the retry policy applied by worker handlers.

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Asynchronous job settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobsConfig {
    /// Sentence counts at or below this go to the short lane
    #[serde(default = "default_lane_threshold")]
    pub lane_threshold: u32,

    /// Short-form lane
    #[serde(
        default = "LaneConfig::short_default",
        deserialize_with = "deserialize_short_lane"
    )]
    pub short_lane: LaneConfig,

    /// Long-form lane
    #[serde(
        default = "LaneConfig::long_default",
        deserialize_with = "deserialize_long_lane"
    )]
    pub long_lane: LaneConfig,

    /// Retry policy for failed backend calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retention of job records in seconds (unset = kept until evicted externally)
    #[serde(default)]
    pub record_ttl_secs: Option<u64>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            lane_threshold: default_lane_threshold(),
            short_lane: LaneConfig::short_default(),
            long_lane: LaneConfig::long_default(),
            retry: RetryConfig::default(),
            record_ttl_secs: None,
        }
    }
}

fn default_lane_threshold() -> u32 {
    2
}

/// Worker settings for one lane
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LaneConfig {
    /// Jobs executed concurrently on this lane
    #[validate(range(min = 1, message = "Lane concurrency must be at least 1"))]
    pub concurrency: usize,

    /// Jobs buffered before submission is refused
    #[validate(range(min = 1, message = "Lane capacity must be at least 1"))]
    pub capacity: usize,
}

impl LaneConfig {
    fn short_default() -> Self {
        Self {
            concurrency: 4,
            capacity: 1024,
        }
    }

    fn long_default() -> Self {
        Self {
            concurrency: 2,
            capacity: 256,
        }
    }
}

/// Lane table as written; missing fields fall back to that lane's defaults
#[derive(Deserialize)]
struct PartialLane {
    concurrency: Option<usize>,
    capacity: Option<usize>,
}

impl PartialLane {
    fn over(self, defaults: LaneConfig) -> LaneConfig {
        LaneConfig {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            capacity: self.capacity.unwrap_or(defaults.capacity),
        }
    }
}

fn deserialize_short_lane<'de, D>(deserializer: D) -> Result<LaneConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialLane::deserialize(deserializer)?.over(LaneConfig::short_default()))
}

fn deserialize_long_lane<'de, D>(deserializer: D) -> Result<LaneConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialLane::deserialize(deserializer)?.over(LaneConfig::long_default()))
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, message = "At least one attempt is required"))]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for any single delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}
