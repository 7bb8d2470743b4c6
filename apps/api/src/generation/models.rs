//! Data types flowing through the quiz-generation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm_client::ModelKind;

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

/// A unit of requested work: a topic and how many questions to ask about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub description: String,
    pub num_questions: u32,
}

impl Topic {
    pub fn new(description: impl Into<String>, num_questions: u32) -> Self {
        Self {
            description: description.into(),
            num_questions,
        }
    }
}

/// Ordinal difficulty tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    MiddleSchool,
    HighSchool,
    University,
    PostGraduate,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::MiddleSchool,
        Difficulty::HighSchool,
        Difficulty::University,
        Difficulty::PostGraduate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::MiddleSchool => "middle_school",
            Difficulty::HighSchool => "high_school",
            Difficulty::University => "university",
            Difficulty::PostGraduate => "post_graduate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == raw.trim())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous slice of source text with its own question allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChunk {
    pub content: String,
    pub topics: Vec<Topic>,
    /// Offset of the first character of `content` in the source, in chars.
    pub start_index: usize,
}

impl ContentChunk {
    pub fn total_questions(&self) -> u32 {
        self.topics.iter().map(|t| t.num_questions).sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generated questions
// ────────────────────────────────────────────────────────────────────────────

/// A generated multiple-choice question.
///
/// Created by the dispatcher from model output, then mutated in exactly two
/// places: the validator (points, difficulty, timestamp, answer key) and the
/// shuffler (option order and `correct_answer`).
///
/// Deserialization goes through [`RawQuestion`] so a wrongly-typed field is
/// converted instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawQuestion")]
pub struct Question {
    pub question: String,
    /// Answer choices keyed `A`, `B`, `C`, `D`.
    pub options: BTreeMap<String, String>,
    pub correct_answer: String,
    pub topic: String,
    /// Raw model value until validated; `NaN` when absent or non-numeric.
    pub points: f64,
    pub explanation: String,
    pub difficulty: String,
    pub concept_tested: String,
    pub learning_objective: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_optimized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<ModelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    /// Fields whose model value had the wrong JSON type and was converted to text.
    #[serde(skip)]
    pub coerced_fields: Vec<&'static str>,
}

impl Question {
    /// Text of the option `correct_answer` points at, if any.
    pub fn correct_option_text(&self) -> Option<&str> {
        self.options.get(&self.correct_answer).map(String::as_str)
    }
}

/// Model output as it arrives. Only `question`, `options` and
/// `correctAnswer` are required; their values may be any JSON type.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question: Value,
    options: BTreeMap<String, Value>,
    correct_answer: Value,
    #[serde(default)]
    topic: Value,
    #[serde(default)]
    points: Value,
    #[serde(default)]
    explanation: Value,
    #[serde(default)]
    difficulty: Value,
    #[serde(default)]
    concept_tested: Value,
    #[serde(default)]
    learning_objective: Value,
    #[serde(default)]
    formula: Value,
    #[serde(default)]
    visualization_prompt: Value,
    #[serde(default)]
    mobile_optimized: Value,
    #[serde(default)]
    generated_by: Value,
    #[serde(default)]
    validated_at: Value,
}

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        let mut coerced = Vec::new();
        let mut text = |value: Value, field: &'static str| {
            let (text, converted) = lenient_text(value);
            if converted && !coerced.contains(&field) {
                coerced.push(field);
            }
            text
        };

        let question = text(raw.question, "question");
        let options = raw
            .options
            .into_iter()
            .map(|(key, value)| (key, text(value, "options")))
            .collect();
        let correct_answer = text(raw.correct_answer, "correctAnswer");
        let topic = text(raw.topic, "topic");
        let explanation = text(raw.explanation, "explanation");
        let difficulty = text(raw.difficulty, "difficulty");
        let concept_tested = text(raw.concept_tested, "conceptTested");
        let learning_objective = text(raw.learning_objective, "learningObjective");
        let formula = optional_text(text(raw.formula, "formula"));
        let visualization_prompt =
            optional_text(text(raw.visualization_prompt, "visualizationPrompt"));

        Question {
            question,
            options,
            correct_answer,
            topic,
            points: coerce_points(&raw.points),
            explanation,
            difficulty,
            concept_tested,
            learning_objective,
            formula,
            visualization_prompt,
            mobile_optimized: lenient_bool(&raw.mobile_optimized),
            generated_by: serde_json::from_value(raw.generated_by).ok(),
            validated_at: serde_json::from_value(raw.validated_at).ok(),
            coerced_fields: coerced,
        }
    }
}

/// Strings pass through and `null` becomes empty; numbers, bools and
/// containers are rendered as JSON text and reported as converted.
fn lenient_text(value: Value) -> (String, bool) {
    match value {
        Value::String(s) => (s, false),
        Value::Null => (String::new(), false),
        other => (other.to_string(), true),
    }
}

fn optional_text(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts numbers and numeric strings; anything else becomes `NaN`.
fn coerce_points(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response
// ────────────────────────────────────────────────────────────────────────────

/// Inbound request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizRequest {
    pub content: String,
    pub topics: Vec<Topic>,
    pub difficulty: Difficulty,
}

/// A repair the validator made instead of rejecting a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairWarning {
    pub question_index: usize,
    pub field: String,
    pub message: String,
}

/// A chunk that failed under the best-effort policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    pub index: usize,
    pub model: ModelKind,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizMetadata {
    pub generation_id: uuid::Uuid,
    pub topics: Vec<String>,
    pub difficulty: Difficulty,
    pub question_count: usize,
    pub total_points: f64,
    /// Minutes.
    pub estimated_duration: u32,
    pub models_used: Vec<ModelKind>,
    pub stem_topics_detected: bool,
}

/// Outbound response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizResponse {
    pub quiz_questions: Vec<Question>,
    pub metadata: QuizMetadata,
    pub warnings: Vec<RepairWarning>,
    pub failed_chunks: Vec<ChunkFailure>,
}
