//! Quiz Generation — orchestrates the full pipeline.
//!
//! Flow: validate input → split into chunks → dispatch each chunk to a
//!       backend (which validates and shuffles) → compute metadata.
//!
//! All tunables come from the `PipelineConfig` the pipeline was built with.

use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::generation::chunker::split_content_into_chunks;
use crate::generation::dispatcher::{GenerationError, QuizDispatcher};
use crate::generation::models::{GenerateQuizRequest, GenerateQuizResponse, QuizMetadata, Topic};
use crate::llm_client::ModelKind;

/// A chunk and the prompt it would be sent with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPreview {
    pub index: usize,
    pub start_index: usize,
    pub char_count: usize,
    pub topics: Vec<Topic>,
    pub stem: bool,
    pub model: ModelKind,
    pub prompt: String,
}

pub struct QuizPipeline {
    config: PipelineConfig,
    dispatcher: QuizDispatcher,
}

impl QuizPipeline {
    pub fn new(config: PipelineConfig, dispatcher: QuizDispatcher) -> Self {
        let dispatcher = dispatcher
            .with_params(config.completion)
            .with_chunk_timeout(config.chunk_timeout)
            .with_guidelines(config.guidelines.clone());
        Self { config, dispatcher }
    }

    /// Runs the pipeline for one request.
    ///
    /// Steps:
    /// 1. validate_request() → reject malformed input before chunking
    /// 2. split_content_into_chunks() → Vec<ContentChunk>
    /// 3. generate_quiz_from_chunks() → validated, shuffled questions + repair warnings
    /// 4. metadata (points, duration, models used)
    pub async fn generate(
        &self,
        request: GenerateQuizRequest,
    ) -> Result<GenerateQuizResponse, GenerationError> {
        let generation_id = Uuid::new_v4();
        let span = info_span!("generate_quiz", %generation_id);
        self.run(generation_id, request).instrument(span).await
    }

    async fn run(
        &self,
        generation_id: Uuid,
        request: GenerateQuizRequest,
    ) -> Result<GenerateQuizResponse, GenerationError> {
        validate_request(&request)?;

        let chunks = split_content_into_chunks(
            &request.content,
            &request.topics,
            self.config.max_chunk_size,
        );
        info!(
            "Generating {} questions at {} from {} chunk(s)",
            request.topics.iter().map(|t| t.num_questions).sum::<u32>(),
            request.difficulty,
            chunks.len()
        );

        let generation = self
            .dispatcher
            .generate_quiz_from_chunks(&chunks, request.difficulty, self.config.failure_policy)
            .await?;

        let guidelines = &self.config.guidelines;
        let question_count = generation.questions.len();
        let metadata = QuizMetadata {
            generation_id,
            topics: request.topics.iter().map(|t| t.description.clone()).collect(),
            difficulty: request.difficulty,
            question_count,
            total_points: generation.questions.iter().map(|q| q.points).sum(),
            estimated_duration: guidelines.estimated_minutes(request.difficulty, question_count),
            models_used: generation.models_used.into_iter().collect(),
            stem_topics_detected: generation.stem_detected,
        };

        info!(
            "Generated {} questions ({} points, {} repairs, {} failed chunks)",
            question_count,
            metadata.total_points,
            generation.warnings.len(),
            generation.failed_chunks.len()
        );

        Ok(GenerateQuizResponse {
            quiz_questions: generation.questions,
            metadata,
            warnings: generation.warnings,
            failed_chunks: generation.failed_chunks,
        })
    }

    /// Chunks the request and renders each chunk's prompt without calling a model.
    pub fn preview(
        &self,
        request: &GenerateQuizRequest,
    ) -> Result<Vec<PromptPreview>, GenerationError> {
        validate_request(request)?;

        let chunks = split_content_into_chunks(
            &request.content,
            &request.topics,
            self.config.max_chunk_size,
        );

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let plan = self.dispatcher.plan_chunk(&chunk, request.difficulty);
                PromptPreview {
                    index,
                    start_index: chunk.start_index,
                    char_count: chunk.content.chars().count(),
                    topics: chunk.topics,
                    stem: plan.stem,
                    model: plan.model,
                    prompt: plan.prompt,
                }
            })
            .collect())
    }
}

/// Rejects requests that cannot produce a meaningful quiz.
pub fn validate_request(request: &GenerateQuizRequest) -> Result<(), GenerationError> {
    if request.topics.is_empty() {
        return Err(GenerationError::InvalidInput(
            "at least one topic is required".to_string(),
        ));
    }
    if let Some(topic) = request.topics.iter().find(|t| t.description.trim().is_empty()) {
        return Err(GenerationError::InvalidInput(format!(
            "topic description cannot be empty (numQuestions: {})",
            topic.num_questions
        )));
    }
    if let Some(topic) = request.topics.iter().find(|t| t.num_questions == 0) {
        return Err(GenerationError::InvalidInput(format!(
            "numQuestions for {:?} must be at least 1",
            topic.description
        )));
    }
    if request.content.trim().is_empty() {
        return Err(GenerationError::InvalidInput(
            "content cannot be empty".to_string(),
        ));
    }
    Ok(())
}
