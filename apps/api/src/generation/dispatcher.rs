//! Model Dispatcher — runs every chunk through classify → prompt → backend →
//! sanitize → parse, in source order, one chunk at a time.
//!
//! Routing: a STEM chunk goes to the STEM backend when one is configured,
//! everything else to the default backend. Each chunk yields a
//! `ChunkOutcome`; the `FailurePolicy` decides whether a failed chunk aborts
//! the run or is reported alongside the successful ones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::generation::classifier::TopicClassifier;
use crate::generation::difficulty::DifficultyTable;
use crate::generation::models::{ChunkFailure, ContentChunk, Difficulty, Question, RepairWarning};
use crate::generation::prompts::{generate_prompt_for_chunk, PromptStyle};
use crate::generation::sanitizer::cleanup_json_content;
use crate::generation::shuffler::shuffle_all;
use crate::generation::validator::validate_and_normalize_questions;
use crate::llm_client::{CompletionParams, LlmError, ModelBackend, ModelKind};

const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(120);

// ────────────────────────────────────────────────────────────────────────────
// Errors and outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Chunk {chunk_index} failed on {model} backend: {source}")]
    Backend {
        chunk_index: usize,
        model: ModelKind,
        source: LlmError,
    },

    #[error("Chunk {chunk_index} returned unparseable output from {model}: {message}")]
    Parse {
        chunk_index: usize,
        model: ModelKind,
        message: String,
        /// Untouched model output, for diagnostics.
        raw: String,
    },

    #[error("Only {succeeded} chunk(s) succeeded; at least {required} required")]
    InsufficientChunks {
        succeeded: usize,
        required: usize,
        failures: Vec<ChunkFailure>,
    },
}

impl GenerationError {
    /// Name of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            GenerationError::InvalidInput(_) => "input",
            GenerationError::Backend { .. } => "backend",
            GenerationError::Parse { .. } => "parse",
            GenerationError::InsufficientChunks { .. } => "aggregation",
        }
    }
}

/// What to do when a chunk fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// First failure aborts the run; later chunks are not attempted.
    #[default]
    FailFast,
    /// Attempt every chunk; fail only if fewer than `min_successful_chunks`
    /// succeed (capped at the number of chunks).
    BestEffort { min_successful_chunks: usize },
}

/// Result of generating one chunk.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    pub model: ModelKind,
    pub stem: bool,
    pub result: Result<Vec<Question>, GenerationError>,
}

/// Aggregate of a dispatch run. Questions are already validated and shuffled.
#[derive(Debug, Default)]
pub struct QuizGeneration {
    pub questions: Vec<Question>,
    pub warnings: Vec<RepairWarning>,
    pub models_used: BTreeSet<ModelKind>,
    pub stem_detected: bool,
    pub failed_chunks: Vec<ChunkFailure>,
}

/// Routing and prompt decided for a chunk, before any model call.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub stem: bool,
    pub model: ModelKind,
    pub prompt: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────────────────

pub struct QuizDispatcher {
    default_backend: Arc<dyn ModelBackend>,
    stem_backend: Option<Arc<dyn ModelBackend>>,
    classifier: Arc<dyn TopicClassifier>,
    params: CompletionParams,
    chunk_timeout: Duration,
    guidelines: DifficultyTable,
}

impl QuizDispatcher {
    pub fn new(
        default_backend: Arc<dyn ModelBackend>,
        stem_backend: Option<Arc<dyn ModelBackend>>,
        classifier: Arc<dyn TopicClassifier>,
    ) -> Self {
        Self {
            default_backend,
            stem_backend,
            classifier,
            params: CompletionParams::default(),
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            guidelines: DifficultyTable::default(),
        }
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_chunk_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    pub fn with_guidelines(mut self, guidelines: DifficultyTable) -> Self {
        self.guidelines = guidelines;
        self
    }

    fn backend_for(&self, stem: bool) -> &Arc<dyn ModelBackend> {
        match (&self.stem_backend, stem) {
            (Some(stem_backend), true) => stem_backend,
            _ => &self.default_backend,
        }
    }

    /// Classifies the chunk, picks its backend and renders its prompt.
    pub fn plan_chunk(&self, chunk: &ContentChunk, difficulty: Difficulty) -> ChunkPlan {
        let stem = self.classifier.contains_stem_topics(chunk);
        let style = if stem {
            PromptStyle::Stem
        } else {
            PromptStyle::Generic
        };
        let prompt =
            generate_prompt_for_chunk(chunk, difficulty, self.guidelines.get(difficulty), style);

        ChunkPlan {
            stem,
            model: self.backend_for(stem).kind(),
            prompt,
        }
    }

    /// Generates questions for every chunk, strictly in order, then validates
    /// the aggregate and shuffles the options of every question.
    pub async fn generate_quiz_from_chunks(
        &self,
        chunks: &[ContentChunk],
        difficulty: Difficulty,
        policy: FailurePolicy,
    ) -> Result<QuizGeneration, GenerationError> {
        let mut generation = QuizGeneration::default();
        let mut produced: BTreeMap<String, usize> = BTreeMap::new();
        let mut requested: BTreeMap<String, u32> = BTreeMap::new();
        let mut succeeded = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            for topic in &chunk.topics {
                *requested.entry(topic.description.clone()).or_default() += topic.num_questions;
            }

            let outcome = self.generate_chunk(index, chunk, difficulty).await;
            generation.stem_detected |= outcome.stem;

            match outcome.result {
                Ok(questions) => {
                    info!(
                        "Chunk {}/{}: {} questions from {}",
                        index + 1,
                        chunks.len(),
                        questions.len(),
                        outcome.model
                    );
                    warn_on_shortfall(index, chunk, &questions);
                    for q in &questions {
                        *produced.entry(q.topic.clone()).or_default() += 1;
                    }
                    succeeded += 1;
                    generation.models_used.insert(outcome.model);
                    generation.questions.extend(questions);
                }
                Err(err) => match policy {
                    FailurePolicy::FailFast => return Err(err),
                    FailurePolicy::BestEffort { .. } => {
                        warn!("Chunk {} failed, continuing: {}", outcome.index, err);
                        generation.failed_chunks.push(ChunkFailure {
                            index: outcome.index,
                            model: outcome.model,
                            stage: err.stage().to_string(),
                            message: err.to_string(),
                        });
                    }
                },
            }
        }

        if let FailurePolicy::BestEffort {
            min_successful_chunks,
        } = policy
        {
            let required = min_successful_chunks.min(chunks.len());
            if succeeded < required {
                return Err(GenerationError::InsufficientChunks {
                    succeeded,
                    required,
                    failures: generation.failed_chunks,
                });
            }
        }

        for (topic, wanted) in &requested {
            info!(
                "Topic {:?}: {} of {} requested questions generated",
                topic,
                produced.get(topic).copied().unwrap_or(0),
                wanted
            );
        }

        // Answer keys are normalized before shuffling so "b" or "B)" still get shuffled.
        generation.warnings = validate_and_normalize_questions(
            &mut generation.questions,
            difficulty,
            self.guidelines.get(difficulty),
        );
        shuffle_all(&mut generation.questions, &mut rand::thread_rng());

        Ok(generation)
    }

    async fn generate_chunk(
        &self,
        index: usize,
        chunk: &ContentChunk,
        difficulty: Difficulty,
    ) -> ChunkOutcome {
        let plan = self.plan_chunk(chunk, difficulty);
        let model = plan.model;

        let result = self
            .complete_with_timeout(self.backend_for(plan.stem), &plan.prompt)
            .await
            .map_err(|source| GenerationError::Backend {
                chunk_index: index,
                model,
                source,
            })
            .and_then(|raw| parse_questions(index, model, &raw));

        ChunkOutcome {
            index,
            model,
            stem: plan.stem,
            result,
        }
    }

    async fn complete_with_timeout(
        &self,
        backend: &Arc<dyn ModelBackend>,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let call = backend.complete(prompt, &self.params);
        match tokio::time::timeout(self.chunk_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                secs: self.chunk_timeout.as_secs(),
            }),
        }
    }
}

/// Sanitizes raw output and decodes it into questions tagged with `model`.
fn parse_questions(
    chunk_index: usize,
    model: ModelKind,
    raw: &str,
) -> Result<Vec<Question>, GenerationError> {
    let parse_error = |message: String| GenerationError::Parse {
        chunk_index,
        model,
        message,
        raw: raw.to_string(),
    };

    let cleaned = cleanup_json_content(raw).map_err(|e| parse_error(e.reason))?;
    let mut questions: Vec<Question> =
        serde_json::from_str(&cleaned).map_err(|e| parse_error(format!("invalid question: {e}")))?;

    for question in &mut questions {
        question.generated_by = Some(model);
    }

    Ok(questions)
}

fn warn_on_shortfall(index: usize, chunk: &ContentChunk, questions: &[Question]) {
    for topic in &chunk.topics {
        let got = questions
            .iter()
            .filter(|q| q.topic == topic.description)
            .count();
        if got < topic.num_questions as usize {
            warn!(
                "Chunk {}: topic {:?} got {} of {} requested questions",
                index, topic.description, got, topic.num_questions
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::chunker::split_content_into_chunks;
    use crate::generation::classifier::KeywordStemClassifier;
    use crate::generation::models::Topic;
    use crate::generation::testing::{dispatcher, question_json, questions_reply, ScriptedBackend};
    use serde_json::json;

    async fn run(
        d: &QuizDispatcher,
        chunks: &[ContentChunk],
        difficulty: Difficulty,
    ) -> Result<QuizGeneration, GenerationError> {
        d.generate_quiz_from_chunks(chunks, difficulty, FailurePolicy::FailFast)
            .await
    }

    fn chunk(topic: &str, count: u32) -> ContentChunk {
        ContentChunk {
            content: "Some source text.".to_string(),
            topics: vec![Topic::new(topic, count)],
            start_index: 0,
        }
    }

    #[tokio::test]
    async fn test_generic_chunk_uses_default_backend() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(2));
        let deepseek = ScriptedBackend::obedient(ModelKind::DeepSeek, json!(2));
        let d = dispatcher(openai.clone(), Some(deepseek.clone()));

        let result = run(&d, &[chunk("Cell Biology", 3)], Difficulty::HighSchool).await.unwrap();

        assert_eq!(result.questions.len(), 3);
        assert!(!result.stem_detected);
        assert_eq!(result.models_used, BTreeSet::from([ModelKind::OpenAi]));
        assert_eq!(deepseek.calls(), 0);
        assert!(!openai.prompts()[0].contains("LaTeX"));
        assert!(result
            .questions
            .iter()
            .all(|q| q.generated_by == Some(ModelKind::OpenAi)));
    }

    #[tokio::test]
    async fn test_stem_chunk_routes_to_deepseek_when_configured() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(3));
        let deepseek = ScriptedBackend::obedient(ModelKind::DeepSeek, json!(3));
        let d = dispatcher(openai.clone(), Some(deepseek.clone()));

        let result = run(&d, &[chunk("Calculus", 4)], Difficulty::University).await.unwrap();

        assert!(result.stem_detected);
        assert!(result.models_used.contains(&ModelKind::DeepSeek));
        assert_eq!(openai.calls(), 0);
        assert!(deepseek.prompts()[0].contains("$...$"));
        assert_eq!(result.questions.len(), 4);
    }

    #[tokio::test]
    async fn test_stem_chunk_falls_back_without_stem_backend() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(3));
        let d = dispatcher(openai.clone(), None);

        let result = run(&d, &[chunk("Calculus", 2)], Difficulty::University).await.unwrap();

        assert!(result.stem_detected);
        assert_eq!(result.models_used, BTreeSet::from([ModelKind::OpenAi]));
        // The prompt style follows the topic, not the backend.
        assert!(openai.prompts()[0].contains("LaTeX"));
    }

    #[tokio::test]
    async fn test_mixed_chunks_are_processed_in_order() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(2));
        let deepseek = ScriptedBackend::obedient(ModelKind::DeepSeek, json!(2));
        let d = dispatcher(openai.clone(), Some(deepseek.clone()));
        let chunks = vec![chunk("History", 1), chunk("Physics", 2), chunk("Poetry", 1)];

        let result = run(&d, &chunks, Difficulty::HighSchool).await.unwrap();

        let topics: Vec<&str> = result.questions.iter().map(|q| q.topic.as_str()).collect();
        assert_eq!(topics, vec!["History", "Physics", "Physics", "Poetry"]);
        assert_eq!(
            result.models_used,
            BTreeSet::from([ModelKind::OpenAi, ModelKind::DeepSeek])
        );
        assert_eq!(openai.calls(), 2);
        assert_eq!(deepseek.calls(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_on_first_backend_error() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |call, prompt| match call {
            1 => Err(LlmError::Api {
                status: 400,
                message: "bad request".to_string(),
            }),
            _ => Ok(questions_reply(prompt, &json!(2))),
        });
        let d = dispatcher(openai.clone(), None);
        let chunks = vec![chunk("History", 1), chunk("Art", 1), chunk("Music", 1)];

        let err = run(&d, &chunks, Difficulty::HighSchool).await.unwrap_err();

        assert_eq!(err.stage(), "backend");
        assert!(matches!(
            err,
            GenerationError::Backend { chunk_index: 1, model: ModelKind::OpenAi, .. }
        ));
        assert_eq!(openai.calls(), 2, "chunk after the failure must not run");
    }

    #[tokio::test]
    async fn test_parse_error_carries_raw_output() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |_, _| {
            Ok("I cannot produce questions for this.".to_string())
        });
        let d = dispatcher(openai, None);

        let err = run(&d, &[chunk("History", 1)], Difficulty::HighSchool).await.unwrap_err();

        match err {
            GenerationError::Parse { chunk_index, raw, .. } => {
                assert_eq!(chunk_index, 0);
                assert_eq!(raw, "I cannot produce questions for this.");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_required_field_is_parse_error() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |_, _| {
            Ok(r#"[{"question": "Q?", "options": {"A": "1"}}]"#.to_string())
        });
        let d = dispatcher(openai, None);

        let err = run(&d, &[chunk("History", 1)], Difficulty::HighSchool).await.unwrap_err();

        assert_eq!(err.stage(), "parse");
        assert!(err.to_string().contains("correctAnswer"));
    }

    #[tokio::test]
    async fn test_best_effort_reports_failed_chunks() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |call, prompt| match call {
            0 => Ok("not json".to_string()),
            _ => Ok(questions_reply(prompt, &json!(2))),
        });
        let d = dispatcher(openai.clone(), None);
        let chunks = vec![chunk("History", 1), chunk("Art", 2)];

        let result = d
            .generate_quiz_from_chunks(
                &chunks,
                Difficulty::HighSchool,
                FailurePolicy::BestEffort {
                    min_successful_chunks: 1,
                },
            )
            .await
            .unwrap();

        assert_eq!(openai.calls(), 2);
        assert_eq!(result.questions.len(), 2);
        assert_eq!(result.failed_chunks.len(), 1);
        assert_eq!(result.failed_chunks[0].index, 0);
        assert_eq!(result.failed_chunks[0].stage, "parse");
    }

    #[tokio::test]
    async fn test_best_effort_below_threshold_fails() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |call, prompt| match call {
            0 => Ok(questions_reply(prompt, &json!(2))),
            _ => Err(LlmError::EmptyContent),
        });
        let d = dispatcher(openai, None);
        let chunks = vec![chunk("A topic", 1), chunk("B topic", 1), chunk("C topic", 1)];

        let err = d
            .generate_quiz_from_chunks(
                &chunks,
                Difficulty::HighSchool,
                FailurePolicy::BestEffort {
                    min_successful_chunks: 2,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "aggregation");
        match err {
            GenerationError::InsufficientChunks {
                succeeded,
                required,
                failures,
            } => {
                assert_eq!(succeeded, 1);
                assert_eq!(required, 2);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected insufficient chunks, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_threshold_is_capped_at_chunk_count() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(2));
        let d = dispatcher(openai, None);

        let result = d
            .generate_quiz_from_chunks(
                &[chunk("History", 2)],
                Difficulty::HighSchool,
                FailurePolicy::BestEffort {
                    min_successful_chunks: 5,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.questions.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        struct Stalled;

        #[async_trait::async_trait]
        impl ModelBackend for Stalled {
            fn kind(&self) -> ModelKind {
                ModelKind::OpenAi
            }

            async fn complete(
                &self,
                _prompt: &str,
                _params: &CompletionParams,
            ) -> Result<String, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("[]".to_string())
            }
        }

        let d = QuizDispatcher::new(
            Arc::new(Stalled),
            None,
            Arc::new(KeywordStemClassifier),
        )
        .with_chunk_timeout(Duration::from_secs(5));

        let err = run(&d, &[chunk("History", 1)], Difficulty::HighSchool).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Backend {
                source: LlmError::Timeout { secs: 5 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_numeric_options_do_not_fail_the_chunk() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |_, _| {
            Ok(r#"[{
                "question": "What is 2 + 2?",
                "options": {"A": 3, "B": 4, "C": 5, "D": 22},
                "correctAnswer": "B",
                "topic": "Arithmetic",
                "points": 1
            }]"#
            .to_string())
        });
        let d = dispatcher(openai, None);

        let result = run(&d, &[chunk("Arithmetic", 1)], Difficulty::MiddleSchool).await.unwrap();

        assert_eq!(result.questions.len(), 1);
        assert_eq!(result.questions[0].correct_option_text(), Some("4"));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "options");
    }

    #[tokio::test]
    async fn test_null_text_fields_default_to_empty() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |_, _| {
            Ok(r#"[{
                "question": "Who wrote the Odyssey?",
                "options": {"A": "Homer", "B": "Virgil", "C": "Ovid", "D": "Sappho"},
                "correctAnswer": "A",
                "topic": "Literature",
                "points": 2,
                "explanation": null,
                "conceptTested": null,
                "learningObjective": null
            }]"#
            .to_string())
        });
        let d = dispatcher(openai, None);

        let result = run(&d, &[chunk("Literature", 1)], Difficulty::HighSchool).await.unwrap();

        let question = &result.questions[0];
        assert_eq!(question.learning_objective, "");
        assert_eq!(question.explanation, "");
        assert_eq!(question.correct_option_text(), Some("Homer"));
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_lowercase_answer_key_is_repaired_then_shuffled() {
        let openai = ScriptedBackend::new(ModelKind::OpenAi, |_, _| {
            let questions: Vec<serde_json::Value> = (0..30)
                .map(|i| {
                    let mut q = question_json("Art", i, &json!(2));
                    q["correctAnswer"] = json!("a");
                    q
                })
                .collect();
            Ok(serde_json::to_string(&questions).unwrap())
        });
        let d = dispatcher(openai, None);

        let result = run(&d, &[chunk("Art", 30)], Difficulty::HighSchool).await.unwrap();

        assert_eq!(result.warnings.len(), 30);
        assert!(result.warnings.iter().all(|w| w.field == "correctAnswer"));
        assert!(result
            .questions
            .iter()
            .all(|q| q.correct_option_text() == Some("Right")));
        assert!(result.questions.iter().any(|q| q.correct_answer != "A"));
    }

    #[tokio::test]
    async fn test_points_are_clamped_before_return() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!("99"));
        let d = dispatcher(openai, None);

        let result = run(&d, &[chunk("History", 2)], Difficulty::MiddleSchool).await.unwrap();

        assert!(result.questions.iter().all(|q| q.points == 2.0));
        assert!(result
            .questions
            .iter()
            .all(|q| q.difficulty == "middle_school" && q.validated_at.is_some()));
        assert_eq!(result.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_options_are_shuffled_but_answers_stay_correct() {
        let openai = ScriptedBackend::obedient(ModelKind::OpenAi, json!(2));
        let d = dispatcher(openai, None);
        let content = "Rivers shape valleys over time. ".repeat(10);
        let chunks = split_content_into_chunks(&content, &[Topic::new("Geography", 40)], 10_000);

        let result = run(&d, &chunks, Difficulty::MiddleSchool).await.unwrap();

        assert_eq!(result.questions.len(), 40);
        assert!(result
            .questions
            .iter()
            .all(|q| q.correct_option_text() == Some("Right")));
        // 40 uniform shuffles all leaving the answer on "A" is vanishingly unlikely.
        assert!(result.questions.iter().any(|q| q.correct_answer != "A"));
    }
}
