//! Inference invoker
//!
//! The one place a backend call happens. Both the synchronous path and job
//! workers go through [`InferenceInvoker::invoke`]: backend call, output
//! normalization, and dedup cache population on success.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::backend::{BackendError, InferenceBackend};
use crate::dedup::{DedupCache, Fingerprint};
use crate::normalize::normalize_output;

pub struct InferenceInvoker {
    backend: Arc<dyn InferenceBackend>,
    cache: Arc<DedupCache>,
    model: String,
}

impl InferenceInvoker {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        cache: Arc<DedupCache>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cache,
            model: model.into(),
        }
    }

    /// Fingerprint of a request against the configured model
    pub fn fingerprint(&self, prompt: &str, sentence_count: u32) -> Fingerprint {
        Fingerprint::compute(prompt, sentence_count, &self.model)
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    /// Run one inference attempt and return the normalized answer.
    ///
    /// An answer that normalizes to nothing is reported as
    /// [`BackendError::EmptyOutput`] and is not cached.
    pub async fn invoke(
        &self,
        prompt: &str,
        sentence_count: u32,
        fingerprint: &Fingerprint,
    ) -> Result<String, BackendError> {
        let started = Instant::now();

        let raw = match self.backend.complete(prompt, sentence_count).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    fingerprint = %fingerprint,
                    error = %e,
                    retryable = e.is_retryable(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Backend call failed"
                );
                return Err(e);
            }
        };

        let answer = normalize_output(&raw, sentence_count);
        if answer.is_empty() {
            warn!(
                backend = self.backend.name(),
                fingerprint = %fingerprint,
                raw_chars = raw.chars().count(),
                "Backend answer was empty after normalization"
            );
            return Err(BackendError::EmptyOutput);
        }

        self.cache.store(fingerprint, &answer).await;

        debug!(
            backend = self.backend.name(),
            fingerprint = %fingerprint,
            sentence_count = sentence_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Inference completed"
        );

        Ok(answer)
    }
}
