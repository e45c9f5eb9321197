//! Redis-backed store for multi-process deployments
//!
//! Every primitive maps to a single Redis command or a MULTI/EXEC
//! transaction, so atomicity comes from Redis itself:
//! - `incr_window` → `MULTI; SET key 0 EX window NX; INCR key; EXEC`
//! - `set` → `SET key value [EX ttl]`
//! - `set_if_absent` → `SET key value NX [EX ttl]`
//!
//! All keys are prefixed with the configured `key_prefix`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Cmd, FromRedisValue, Pipeline};
use std::time::Duration;
use tracing::{debug, warn};

use quill_config::StoreConfig;

use super::{KeyValueStore, StoreError};

/// Redis [`KeyValueStore`]
pub struct RedisStore {
    /// Redis connection manager (handles reconnection)
    connection: ConnectionManager,
    /// Prefix applied to every key
    key_prefix: String,
    /// Per-command timeout
    timeout: Duration,
}

impl RedisStore {
    /// Connect using the store configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("store.redis_url is not set".to_string()))?;
        let timeout = Duration::from_millis(config.timeout_ms);

        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid redis url: {}", e)))?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "connect",
                timeout_ms: config.timeout_ms,
            })?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(
            prefix = %config.key_prefix,
            timeout_ms = config.timeout_ms,
            "Redis store initialized"
        );

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn run<T>(&self, operation: &'static str, cmd: Cmd) -> Result<T, StoreError>
    where
        T: FromRedisValue + Send,
    {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<T> =
            match tokio::time::timeout(self.timeout, cmd.query_async(&mut conn)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation = operation, "Redis operation timed out");
                    return Err(StoreError::Timeout {
                        operation,
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
            };

        result.map_err(|e| StoreError::operation(operation, e.to_string()))
    }

    async fn run_atomic<T>(&self, operation: &'static str, pipe: Pipeline) -> Result<T, StoreError>
    where
        T: FromRedisValue + Send,
    {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<T> =
            match tokio::time::timeout(self.timeout, pipe.query_async(&mut conn)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation = operation, "Redis transaction timed out");
                    return Err(StoreError::Timeout {
                        operation,
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
            };

        result.map_err(|e| StoreError::operation(operation, e.to_string()))
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    // Redis rejects EX 0
    ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let key = self.key(key);
        let mut pipe = redis::pipe();
        pipe.atomic()
            // Only the creator of the counter sets its expiry
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(window))
            .ignore()
            .cmd("INCR")
            .arg(&key);

        let (count,): (i64,) = self.run_atomic("incr_window", pipe).await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.key(key));
        self.run("get", cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_secs(ttl));
        }
        self.run("set", cmd).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_secs(ttl));
        }
        // OK when written, nil when the key already exists
        let reply: Option<String> = self.run("set_if_absent", cmd).await?;
        Ok(reply.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let reply: String = self.run("ping", redis::cmd("PING")).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::operation("ping", format!("unexpected reply '{}'", reply)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_never_zero() {
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(120)), 120);
    }
}
