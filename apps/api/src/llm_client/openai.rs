//! OpenAI-compatible chat-completions backend. Content lives at
//! `choices[0].message.content`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::prompts::JSON_ARRAY_SYSTEM;
use super::{non_empty, send_with_retry, CompletionParams, LlmError, ModelBackend, ModelKind};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiBackend {
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

    fn request_body<'a>(&'a self, prompt: &'a str, params: &CompletionParams) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: JSON_ARRAY_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn kind(&self) -> ModelKind {
        ModelKind::OpenAi
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

        extract_chat_content(&response)
    }
}

fn extract_chat_content(response: &Value) -> Result<String, LlmError> {
    non_empty(response["choices"][0]["message"]["content"].as_str())
}
