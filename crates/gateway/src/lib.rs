//! Quill gateway
//!
//! Admission control, result deduplication and asynchronous job orchestration
//! in front of a text-generation backend.
//!
//! # Request paths
//!
//! - Synchronous: [`AdmissionController`] → [`DedupCache`] lookup → on a
//!   miss [`InferenceInvoker`] (backend → normalizer → cache store)
//! - Asynchronous: [`AdmissionController`] → [`JobOrchestrator`] writes a
//!   pending job and routes it to a lane → a [`WorkerPool`] worker runs the
//!   invoker under the [`RetryPolicy`] → terminal job record
//!
//! All shared state (rate-limit counters, cache entries, job records) lives
//! behind an explicit [`KeyValueStore`] handle.

pub mod admission;
pub mod api;
pub mod app;
pub mod backend;
pub mod budget;
pub mod dedup;
pub mod invoker;
pub mod jobs;
pub mod normalize;
pub mod rate_limit;
pub mod store;

pub use admission::AdmissionController;
pub use api::{ErrorResponse, GenerateRequest, GenerateResponse, JobStatusResponse, SubmitResponse};
pub use app::{Gateway, HealthReport};
pub use backend::{BackendError, InferenceBackend, OpenAiCompatibleBackend};
pub use budget::{TokenBudget, TokenEstimate};
pub use dedup::{DedupCache, Fingerprint};
pub use invoker::InferenceInvoker;
pub use jobs::{JobOrchestrator, JobRecord, RetryPolicy, WorkerPool};
pub use normalize::normalize_output;
pub use rate_limit::{create_rate_limiter, ClientRateLimiter, RateLimitOutcome};
pub use store::{create_store, KeyValueStore, MemoryStore, StoreError};
