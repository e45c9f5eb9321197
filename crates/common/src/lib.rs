//! Common utilities and shared components for Quill
//!
//! This crate provides functionality shared by the configuration and gateway
//! crates: identifier newtypes, the error taxonomy, small shared enums and the
//! tracing setup.
//!
//! # Module Organization
//!
//! - [`ids`]: Type-safe identifier newtypes (JobId, ClientId)
//! - [`types`]: Common type definitions (JobStatus, Lane, CacheStatus, ...)
//! - [`errors`]: Error types and result aliases
//! - [`observability`]: Logging and tracing initialization

pub mod errors;
pub mod ids;
pub mod observability;
pub mod types;

// Re-export error types
pub use errors::{QuillError, QuillResult};

// Re-export identifier types
pub use ids::{ClientId, JobId};

// Re-export common types
pub use types::{BudgetKind, CacheStatus, JobStatus, Lane, RejectReason};

pub use observability::init_tracing;
