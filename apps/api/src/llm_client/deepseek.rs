//! DeepSeek-compatible completions backend. The payload is a bare prompt
//! and the content lives at `choices[0].text`, not in a message object.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::prompts::JSON_ARRAY_SYSTEM;
use super::{non_empty, send_with_retry, CompletionParams, LlmError, ModelBackend, ModelKind};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Clone)]
pub struct DeepSeekBackend {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_retries: u32,
}

impl DeepSeekBackend {
    pub fn new(
        client: Client,
        api_key: String,
        api_url: String,
        model: String,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            api_url,
            model,
            max_retries,
        }
    }

    fn request_body(&self, prompt: &str, params: &CompletionParams) -> CompletionRequest<'_> {
        // No system role on this endpoint, so the JSON-only rule is prepended.
        CompletionRequest {
            model: &self.model,
            prompt: format!("{JSON_ARRAY_SYSTEM}\n\n{prompt}"),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }
}

#[async_trait]
impl ModelBackend for DeepSeekBackend {
    fn kind(&self) -> ModelKind {
        ModelKind::DeepSeek
    }

    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError> {
        let body = self.request_body(prompt, params);
        let response = send_with_retry(
            || {
                self.client
                    .post(&self.api_url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            },
            self.max_retries,
        )
        .await?;

        extract_completion_text(&response)
    }
}

fn extract_completion_text(response: &Value) -> Result<String, LlmError> {
    non_empty(response["choices"][0]["text"].as_str())
}
