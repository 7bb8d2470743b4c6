//! LLM backends: the only place that talks to model provider APIs.
//!
//! Two providers are supported behind one `ModelBackend` capability:
//! an OpenAI-compatible chat-completions API (default) and a
//! DeepSeek-compatible completions API (STEM routing). Both normalize
//! their payload shape to a single content string.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod deepseek;
pub mod openai;
pub mod prompts;

pub use deepseek::DeepSeekBackend;
pub use openai::OpenAiBackend;

/// Client-side deadline for a single HTTP request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} attempts")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Which provider produced a question. Serialized into `generatedBy` and `modelsUsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::OpenAi => "openai",
            ModelKind::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters shared by every backend call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

/// A model provider that turns a prompt into raw text.
///
/// Implementations own their wire format; callers only ever see the
/// extracted content string.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn kind(&self) -> ModelKind;

    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Builds the shared reqwest client used by both backends.
pub fn build_http_client() -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Sends a request, retrying on network failures, 429 and 5xx with
/// exponential backoff (1s, 2s, 4s, ...). Any other non-2xx status fails
/// immediately. Returns the decoded JSON body.
pub(crate) async fn send_with_retry<F>(build: F, max_retries: u32) -> Result<Value, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let attempts = max_retries.max(1);
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "LLM call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(LlmError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, body);
            last_error = Some(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: provider_error_message(body),
            });
        }

        let body: Value = response.json().await?;
        log_usage(&body);
        return Ok(body);
    }

    Err(retries_exhausted(last_error, attempts))
}

/// A provider still answering 429 after the last attempt is reported as
/// `RateLimited`; other retryable failures keep their own error.
fn retries_exhausted(last_error: Option<LlmError>, attempts: u32) -> LlmError {
    match last_error {
        Some(LlmError::Api { status: 429, .. }) | None => {
            LlmError::RateLimited { retries: attempts }
        }
        Some(other) => other,
    }
}

/// Pulls `error.message` out of a provider error body, falling back to the raw body.
fn provider_error_message(body: String) -> String {
    serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

fn log_usage(body: &Value) {
    if let Some(usage) = body.get("usage") {
        debug!(
            "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
            usage["prompt_tokens"].as_u64().unwrap_or(0),
            usage["completion_tokens"].as_u64().unwrap_or(0)
        );
    }
}

/// Rejects whitespace-only content so the sanitizer never sees it.
pub(crate) fn non_empty(content: Option<&str>) -> Result<String, LlmError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyContent),
    }
}
