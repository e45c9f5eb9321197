//! Shared helpers for gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quill_common::{JobId, QuillError};
use quill_config::Config;
use quill_gateway::{
    BackendError, Gateway, InferenceBackend, JobStatusResponse, KeyValueStore, MemoryStore,
    StoreError,
};

/// Backend replaying a script of replies, then a fallback answer
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, u32)>>,
}

impl ScriptedBackend {
    pub fn answering(text: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), text)
    }

    pub fn scripted(script: Vec<Result<String, BackendError>>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Always fail with a retryable error
    pub fn failing() -> Arc<Self> {
        let script = (0..64)
            .map(|_| {
                Err(BackendError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                })
            })
            .collect();
        Self::scripted(script, "unreachable")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<(String, u32)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, sentence_count: u32) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .push((prompt.to_string(), sentence_count));

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Memory store whose next operations of a kind can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing_incrs: AtomicUsize,
    failing_gets: AtomicUsize,
    failing_sets: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_incrs(&self, n: usize) {
        self.failing_incrs.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_sets(&self, n: usize) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }

    fn trip(counter: &AtomicUsize, operation: &'static str) -> Result<(), StoreError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Timeout {
                operation,
                timeout_ms: 1000,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        Self::trip(&self.failing_incrs, "incr_window")?;
        self.inner.incr_window(key, window).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Self::trip(&self.failing_gets, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        Self::trip(&self.failing_sets, "set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }
}

/// Gateway over a fresh memory store with short retry delays
pub fn gateway_with(backend: Arc<ScriptedBackend>) -> Gateway {
    gateway_with_config(Config::default_for_testing(), backend)
}

pub fn gateway_with_config(config: Config, backend: Arc<ScriptedBackend>) -> Gateway {
    gateway_with_store(config, Arc::new(MemoryStore::new()), backend)
}

pub fn gateway_with_store(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    backend: Arc<ScriptedBackend>,
) -> Gateway {
    Gateway::new(config, store, backend)
}

/// Poll until the job is terminal or five seconds pass
pub async fn wait_for_terminal(
    gateway: &Gateway,
    job_id: &JobId,
) -> Result<JobStatusResponse, QuillError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = gateway.poll(job_id).await?;
        if status.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
