//! Question Validator — repairs generated questions instead of rejecting them.
//!
//! Discarding a question costs another model round-trip, so a malformed
//! field is fixed in place and reported as a `RepairWarning`.

use chrono::Utc;
use tracing::warn;

use crate::generation::difficulty::DifficultyGuideline;
use crate::generation::models::{Difficulty, Question, RepairWarning};

/// Clamps points into the tier's range, stamps difficulty and `validated_at`,
/// and canonicalizes the answer key. Never fails.
pub fn validate_and_normalize_questions(
    questions: &mut [Question],
    difficulty: Difficulty,
    guideline: &DifficultyGuideline,
) -> Vec<RepairWarning> {
    let mut warnings = Vec::new();
    let validated_at = Utc::now();

    for (index, question) in questions.iter_mut().enumerate() {
        let range = guideline.points;
        let raw_points = question.points;
        question.points = range.clamp(raw_points);

        if raw_points.is_nan() {
            warnings.push(repair(
                index,
                "points",
                format!("missing or non-numeric points defaulted to {}", range.min),
            ));
        } else if !range.contains(raw_points) {
            warnings.push(repair(
                index,
                "points",
                format!(
                    "points {raw_points} clamped to {} (allowed {}-{})",
                    question.points, range.min, range.max
                ),
            ));
        }

        for field in std::mem::take(&mut question.coerced_fields) {
            warnings.push(repair(
                index,
                field,
                format!("{field} had non-text values and was converted to text"),
            ));
        }

        if let Some(warning) = normalize_correct_answer(index, question) {
            warnings.push(warning);
        }

        question.difficulty = difficulty.as_str().to_string();
        question.validated_at = Some(validated_at);
    }

    for w in &warnings {
        warn!("Repaired question {} ({}): {}", w.question_index, w.field, w.message);
    }

    warnings
}

/// `" b) "` → `"B"`. Returns `None` when `raw` has no letter key.
pub fn canonical_answer_key(raw: &str) -> Option<String> {
    let key = raw
        .trim()
        .trim_start_matches(&['(', '['][..])
        .trim_end_matches(&[')', ']', '.', ':'][..])
        .trim()
        .to_uppercase();

    (!key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic())).then_some(key)
}

fn normalize_correct_answer(index: usize, question: &mut Question) -> Option<RepairWarning> {
    if question.correct_option_text().is_some() {
        return None;
    }

    let raw = question.correct_answer.clone();

    if let Some(key) = canonical_answer_key(&raw).filter(|k| question.options.contains_key(k)) {
        question.correct_answer = key;
    } else if let Some(key) = question
        .options
        .iter()
        .find(|(_, text)| text.trim() == raw.trim())
        .map(|(key, _)| key.clone())
    {
        // Some models answer with the option text instead of its key.
        question.correct_answer = key;
    } else {
        return Some(repair(
            index,
            "correctAnswer",
            format!("correctAnswer {raw:?} does not match any option"),
        ));
    }

    Some(repair(
        index,
        "correctAnswer",
        format!("correctAnswer {raw:?} normalized to {:?}", question.correct_answer),
    ))
}

fn repair(question_index: usize, field: &str, message: String) -> RepairWarning {
    RepairWarning {
        question_index,
        field: field.to_string(),
        message,
    }
}
