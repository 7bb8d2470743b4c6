//! Scripted in-memory model backends for pipeline and route tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::generation::classifier::KeywordStemClassifier;
use crate::generation::dispatcher::QuizDispatcher;
use crate::llm_client::{CompletionParams, LlmError, ModelBackend, ModelKind};

static REQUIREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^- "(.+)": EXACTLY (\d+) question"#).expect("valid regex"));

type Responder = dyn Fn(usize, &str) -> Result<String, LlmError> + Send + Sync;

/// Answers each call with whatever the responder returns for
/// `(call_index, prompt)` and records every prompt it was given.
pub struct ScriptedBackend {
    kind: ModelKind,
    prompts: Mutex<Vec<String>>,
    respond: Box<Responder>,
}

impl ScriptedBackend {
    pub fn new<F>(kind: ModelKind, respond: F) -> Arc<Self>
    where
        F: Fn(usize, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            kind,
            prompts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Honors the per-topic counts in every prompt, with the given points value.
    pub fn obedient(kind: ModelKind, points: Value) -> Arc<Self> {
        Self::new(kind, move |_, prompt| Ok(questions_reply(prompt, &points)))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<String, LlmError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };
        (self.respond)(call, prompt)
    }
}

/// A fenced JSON array with exactly the questions the prompt asks for.
pub fn questions_reply(prompt: &str, points: &Value) -> String {
    let questions: Vec<Value> = REQUIREMENT
        .captures_iter(prompt)
        .flat_map(|caps| {
            let topic = caps[1].to_string();
            let count: usize = caps[2].parse().unwrap();
            (0..count).map(move |i| (topic.clone(), i))
        })
        .map(|(topic, i)| question_json(&topic, i, points))
        .collect();

    format!(
        "```json\n{}\n```",
        serde_json::to_string_pretty(&questions).unwrap()
    )
}

pub fn question_json(topic: &str, i: usize, points: &Value) -> Value {
    json!({
        "question": format!("{topic} question {i}?"),
        "options": {"A": "Right", "B": "Wrong 1", "C": "Wrong 2", "D": "Wrong 3"},
        "correctAnswer": "A",
        "topic": topic,
        "points": points,
        "explanation": "Because.",
        "difficulty": "whatever",
        "conceptTested": topic,
        "learningObjective": "Recall",
        "mobileOptimized": true
    })
}

/// Dispatcher with the keyword classifier and the given backends.
pub fn dispatcher(
    default_backend: Arc<ScriptedBackend>,
    stem_backend: Option<Arc<ScriptedBackend>>,
) -> QuizDispatcher {
    QuizDispatcher::new(
        default_backend,
        stem_backend.map(|b| b as Arc<dyn ModelBackend>),
        Arc::new(KeywordStemClassifier),
    )
}
