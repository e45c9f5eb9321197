//! Inference backend seam
//!
//! The backend is an opaque call: prompt and sentence count in, raw text or a
//! classified failure out. [`OpenAiCompatibleBackend`] speaks the
//! `/chat/completions` protocol used by OpenAI, vLLM, TGI and the Hugging Face
//! router.
//!
//! # Failure classification
//!
//! | Failure                         | Retryable |
//! |---------------------------------|-----------|
//! | Timeout                         | yes       |
//! | Connection / transport error    | yes       |
//! | HTTP 429, HTTP 5xx              | yes       |
//! | Other HTTP 4xx                  | no        |
//! | Unparseable response body       | no        |
//! | No usable text after cleanup    | yes       |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use quill_common::errors::QuillError;
use quill_config::BackendConfig;

/// Longest error body kept in a [`BackendError::Status`]
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Failure of a single backend call
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("backend returned no usable output")]
    EmptyOutput,
}

impl BackendError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) | Self::EmptyOutput => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

impl From<BackendError> for QuillError {
    fn from(err: BackendError) -> Self {
        QuillError::Backend {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Text-generation backend
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Ask for an answer of `sentence_count` sentences. Returns the raw text.
    async fn complete(&self, prompt: &str, sentence_count: u32) -> Result<String, BackendError>;
}

/// Instruction sent ahead of every prompt
pub fn system_prompt(sentence_count: u32) -> String {
    format!(
        "Answer in exactly {} sentences. Do not include reasoning or explanations.",
        sentence_count
    )
}

// ============================================================================
// OpenAI-compatible HTTP backend
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend speaking the OpenAI chat-completions protocol
#[derive(Debug)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let endpoint = format!("{}/chat/completions", config.url.trim_end_matches('/'));

        debug!(
            endpoint = %endpoint,
            model = %config.model,
            timeout_ms = config.timeout_ms,
            authenticated = config.api_key.is_some(),
            "Created OpenAI-compatible backend"
        );

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify_send_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn complete(&self, prompt: &str, sentence_count: u32) -> Result<String, BackendError> {
        let system = system_prompt(sentence_count);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        trace!(
            endpoint = %self.endpoint,
            sentence_count = sentence_count,
            prompt_chars = prompt.chars().count(),
            "Calling backend"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(
                status = status.as_u16(),
                retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
                "Backend returned error status"
            );
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify_send_error(e))?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("response has no choices".to_string()))?
            .message
            .content
            .ok_or(BackendError::EmptyOutput)?;

        trace!(chars = content.chars().count(), "Backend answered");
        Ok(content)
    }
}
