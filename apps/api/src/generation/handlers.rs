//! Axum route handlers for the Quiz API.

use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::generation::generator::PromptPreview;
use crate::generation::models::{Difficulty, GenerateQuizRequest, GenerateQuizResponse, Topic};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PromptPreviewResponse {
    pub chunks: Vec<PromptPreview>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/quizzes/generate
///
/// Full pipeline: chunk → route → generate → sanitize → validate → shuffle.
pub async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateQuizRequest>, JsonRejection>,
) -> Result<Json<GenerateQuizResponse>, AppError> {
    let Json(request) = payload?;
    check_content_length(&state, &request.content)?;

    let response = state.pipeline.generate(request).await?;

    Ok(Json(response))
}

/// POST /api/v1/quizzes/generate/upload
///
/// Multipart form: `file` (PDF or plain text), `topics` (JSON array string),
/// `difficulty`. The extracted text runs through the same pipeline.
pub async fn handle_generate_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateQuizResponse>, AppError> {
    let mut content: Option<String> = None;
    let mut topics: Option<Vec<Topic>> = None;
    let mut difficulty: Option<Difficulty> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field.bytes().await?;
                info!("Received upload {file_name} ({} bytes)", data.len());
                content = Some(extract_text(&file_name, &content_type, data).await?);
            }
            "topics" => {
                let raw = field.text().await?;
                topics = Some(serde_json::from_str(&raw).map_err(|e| {
                    AppError::Validation(format!("topics must be a JSON array of topics: {e}"))
                })?);
            }
            "difficulty" => {
                let raw = field.text().await?;
                difficulty = Some(Difficulty::parse(&raw).ok_or_else(|| {
                    AppError::Validation(format!("unknown difficulty {:?}", raw.trim()))
                })?);
            }
            _ => {}
        }
    }

    let request = GenerateQuizRequest {
        content: content.ok_or_else(|| missing_field("file"))?,
        topics: topics.ok_or_else(|| missing_field("topics"))?,
        difficulty: difficulty.ok_or_else(|| missing_field("difficulty"))?,
    };
    check_content_length(&state, &request.content)?;

    let response = state.pipeline.generate(request).await?;

    Ok(Json(response))
}

/// POST /api/v1/quizzes/prompt-preview
///
/// Returns each chunk and the prompt it would be sent with. No model is called.
pub async fn handle_prompt_preview(
    State(state): State<AppState>,
    payload: Result<Json<GenerateQuizRequest>, JsonRejection>,
) -> Result<Json<PromptPreviewResponse>, AppError> {
    let Json(request) = payload?;
    check_content_length(&state, &request.content)?;

    let chunks = state.pipeline.preview(&request)?;

    Ok(Json(PromptPreviewResponse { chunks }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Admission control: the pipeline itself does not limit content size.
fn check_content_length(state: &AppState, content: &str) -> Result<(), AppError> {
    let length = content.chars().count();
    let limit = state.config.max_content_length;
    if length > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "content is {length} characters; the limit is {limit}"
        )));
    }
    Ok(())
}

fn missing_field(name: &str) -> AppError {
    AppError::Validation(format!("multipart field '{name}' is required"))
}

fn is_pdf(file_name: &str, content_type: &str, data: &[u8]) -> bool {
    content_type == "application/pdf"
        || file_name.to_lowercase().ends_with(".pdf")
        || data.starts_with(b"%PDF")
}

/// PDF text via `pdf-extract` on the blocking pool; anything else must be UTF-8.
async fn extract_text(
    file_name: &str,
    content_type: &str,
    data: Bytes,
) -> Result<String, AppError> {
    if !is_pdf(file_name, content_type, &data) {
        return String::from_utf8(data.to_vec()).map_err(|_| {
            AppError::Validation(format!("{file_name} is neither a PDF nor UTF-8 text"))
        });
    }

    let unreadable =
        |reason: String| AppError::Validation(format!("could not read PDF {file_name}: {reason}"));

    // pdf-extract can panic on malformed files; a panic surfaces as a JoinError.
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| unreadable(e.to_string()))?
        .map_err(|e| unreadable(e.to_string()))
}
