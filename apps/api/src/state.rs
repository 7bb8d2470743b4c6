use std::sync::Arc;

use crate::config::Config;
use crate::generation::generator::QuizPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Built once at startup; holds the backends, classifier and pipeline config.
    pub pipeline: Arc<QuizPipeline>,
}
