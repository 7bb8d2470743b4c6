mod config;
mod errors;
mod generation;
mod llm_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::generation::classifier::KeywordStemClassifier;
use crate::generation::dispatcher::QuizDispatcher;
use crate::generation::generator::QuizPipeline;
use crate::llm_client::{build_http_client, DeepSeekBackend, ModelBackend, OpenAiBackend};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Quizgen API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize model backends
    let http = build_http_client()?;
    let openai: Arc<dyn ModelBackend> = Arc::new(OpenAiBackend::new(
        http.clone(),
        config.openai_api_key.clone(),
        config.openai_api_url.clone(),
        config.openai_model.clone(),
        config.max_retries,
    ));
    info!("Default backend: openai (model: {})", config.openai_model);

    let deepseek: Option<Arc<dyn ModelBackend>> = match &config.deepseek_api_key {
        Some(key) => {
            info!("STEM backend: deepseek (model: {})", config.deepseek_model);
            Some(Arc::new(DeepSeekBackend::new(
                http,
                key.clone(),
                config.deepseek_api_url.clone(),
                config.deepseek_model.clone(),
                config.max_retries,
            )))
        }
        None => {
            info!("DEEPSEEK_API_KEY not set; STEM topics use the default backend");
            None
        }
    };

    // Build the pipeline (keyword STEM classifier by default)
    let pipeline_config = config.pipeline_config();
    info!(
        "Pipeline: chunk size {} chars, failure policy {:?}, chunk timeout {:?}",
        pipeline_config.max_chunk_size,
        pipeline_config.failure_policy,
        pipeline_config.chunk_timeout
    );
    let dispatcher = QuizDispatcher::new(openai, deepseek, Arc::new(KeywordStemClassifier));
    let pipeline = Arc::new(QuizPipeline::new(pipeline_config, dispatcher));

    // Build app state
    let state = AppState {
        config: config.clone(),
        pipeline,
    };

    // Build router
    // TODO: restrict CORS origins once the web client's domain is fixed
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
