pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

/// Uploaded PDFs are much larger than the text they contain.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Quiz API
        .route("/api/v1/quizzes/generate", post(handlers::handle_generate))
        .route(
            "/api/v1/quizzes/generate/upload",
            post(handlers::handle_generate_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/v1/quizzes/prompt-preview",
            post(handlers::handle_prompt_preview),
        )
        .with_state(state)
}
