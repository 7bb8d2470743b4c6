use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::generation::difficulty::DifficultyTable;
use crate::generation::dispatcher::FailurePolicy;
use crate::llm_client::CompletionParams;

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_DEEPSEEK_API_URL: &str = "https://api.deepseek.com/beta/completions";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    /// STEM routing is enabled only when this is set.
    pub deepseek_api_key: Option<String>,
    pub openai_api_url: String,
    pub deepseek_api_url: String,
    pub openai_model: String,
    pub deepseek_model: String,
    pub port: u16,
    pub rust_log: String,
    /// Admission limit enforced by the HTTP handlers, in characters.
    pub max_content_length: usize,
    pub max_chunk_size: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub chunk_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let failure_policy = parse_failure_policy(
            &std::env::var("CHUNK_FAILURE_POLICY").unwrap_or_else(|_| "fail_fast".to_string()),
            env_or("MIN_SUCCESSFUL_CHUNKS", 1)?,
        )?;

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_URL.to_string()),
            deepseek_api_url: std::env::var("DEEPSEEK_API_URL")
                .unwrap_or_else(|_| DEFAULT_DEEPSEEK_API_URL.to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            deepseek_model: std::env::var("DEEPSEEK_MODEL")
                .unwrap_or_else(|_| "deepseek-chat".to_string()),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_content_length: env_or("MAX_CONTENT_LENGTH", 75_000)?,
            max_chunk_size: env_or("MAX_CHUNK_SIZE", 12_000)?,
            temperature: env_or("LLM_TEMPERATURE", 0.3)?,
            max_tokens: env_or("LLM_MAX_TOKENS", 4000)?,
            max_retries: env_or("LLM_MAX_RETRIES", 3)?,
            chunk_timeout_secs: env_or("CHUNK_TIMEOUT_SECS", 120)?,
            failure_policy,
        })
    }

    /// The immutable pipeline configuration derived from this config.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_chunk_size: self.max_chunk_size,
            completion: CompletionParams {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            failure_policy: self.failure_policy,
            chunk_timeout: Duration::from_secs(self.chunk_timeout_secs),
            guidelines: DifficultyTable::default(),
        }
    }
}

/// Everything the generation pipeline needs to know, fixed at construction.
/// Nothing in the pipeline reads configuration from anywhere else.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_chunk_size: usize,
    pub completion: CompletionParams,
    pub failure_policy: FailurePolicy,
    pub chunk_timeout: Duration,
    pub guidelines: DifficultyTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: crate::generation::chunker::MAX_CHUNK_SIZE,
            completion: CompletionParams::default(),
            failure_policy: FailurePolicy::FailFast,
            chunk_timeout: Duration::from_secs(120),
            guidelines: DifficultyTable::default(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_failure_policy(raw: &str, min_successful_chunks: usize) -> Result<FailurePolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fail_fast" | "fail-fast" => Ok(FailurePolicy::FailFast),
        "best_effort" | "best-effort" => Ok(FailurePolicy::BestEffort {
            min_successful_chunks: min_successful_chunks.max(1),
        }),
        other => Err(anyhow!(
            "CHUNK_FAILURE_POLICY must be 'fail_fast' or 'best_effort', got '{other}'"
        )),
    }
}
