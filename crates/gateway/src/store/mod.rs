//! Shared key-value store
//!
//! Rate-limit counters, dedup cache entries and job records are all kept in
//! a store reached through [`KeyValueStore`]. Every stateful component gets an
//! explicit `Arc<dyn KeyValueStore>` handle; nothing reaches a store by name.
//!
//! Implementations must provide the primitives as single atomic operations
//! (`incr_window`, `set` with expiry, `set_if_absent`) so that several server
//! or worker processes can act on the same key concurrently.
//!
//! - [`MemoryStore`]: process-local, for tests and single-process deployments
//! - [`RedisStore`]: Redis-backed, requires the `redis-store` feature

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use quill_common::errors::QuillError;
use quill_config::{StoreBackend, StoreConfig};

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

/// Errors returned by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or failed the operation
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    /// The operation did not finish in time
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The store could not be reached or configured
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            message: message.into(),
        }
    }
}

impl From<StoreError> for QuillError {
    fn from(err: StoreError) -> Self {
        let operation = match &err {
            StoreError::Operation { operation, .. } | StoreError::Timeout { operation, .. } => {
                operation.to_string()
            }
            StoreError::Unavailable(_) => "connect".to_string(),
        };
        QuillError::store(operation, err.to_string())
    }
}

/// Atomic key-value primitives shared by every stateful component
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Atomically increment a windowed counter.
    ///
    /// A missing or expired key is created at 0 with `window` as its expiry
    /// in the same step as the increment, so a counter never exists without
    /// one. An existing expiry is kept. Returns the post-increment value.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError>;

    /// Read a key
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value and expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write a key only if it does not exist. Returns true if written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Liveness check
    async fn ping(&self) -> Result<(), StoreError>;

    /// Drop expired entries the store does not evict on its own.
    /// Returns how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Create the store selected by configuration
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store; counters and job records are local to this process");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis-store")]
        StoreBackend::Redis => {
            let store = RedisStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-store"))]
        StoreBackend::Redis => Err(StoreError::Unavailable(
            "Redis store requires the 'redis-store' feature".to_string(),
        )),
    }
}
