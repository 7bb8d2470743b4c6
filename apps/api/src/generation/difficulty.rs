//! Difficulty guidelines: the rules each tier imposes on generated questions.

use serde::Serialize;

use crate::generation::models::Difficulty;

/// Inclusive point range for a difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointRange {
    pub min: f64,
    pub max: f64,
}

impl PointRange {
    /// Clamps into range; `NaN` maps to `min`.
    pub fn clamp(&self, points: f64) -> f64 {
        if points.is_nan() {
            self.min
        } else {
            points.clamp(self.min, self.max)
        }
    }

    pub fn contains(&self, points: f64) -> bool {
        points >= self.min && points <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyGuideline {
    pub complexity: String,
    pub language: String,
    pub points: PointRange,
    /// Expected answering time, used for `estimatedDuration`.
    pub minutes_per_question: f64,
}

/// Guideline per difficulty tier. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyTable {
    middle_school: DifficultyGuideline,
    high_school: DifficultyGuideline,
    university: DifficultyGuideline,
    post_graduate: DifficultyGuideline,
}

impl DifficultyTable {
    pub fn get(&self, difficulty: Difficulty) -> &DifficultyGuideline {
        match difficulty {
            Difficulty::MiddleSchool => &self.middle_school,
            Difficulty::HighSchool => &self.high_school,
            Difficulty::University => &self.university,
            Difficulty::PostGraduate => &self.post_graduate,
        }
    }

    /// Estimated minutes to answer `question_count` questions, rounded up, at least 1.
    pub fn estimated_minutes(&self, difficulty: Difficulty, question_count: usize) -> u32 {
        let minutes = self.get(difficulty).minutes_per_question * question_count as f64;
        (minutes.ceil() as u32).max(1)
    }
}

impl Default for DifficultyTable {
    fn default() -> Self {
        Self {
            middle_school: guideline(
                "Basic recall and simple understanding of core concepts. \
                 Single-step reasoning with concrete, familiar examples.",
                "Simple, clear vocabulary suitable for ages 11-14. Short sentences, no jargon.",
                1.0,
                2.0,
                1.0,
            ),
            high_school: guideline(
                "Application of concepts and moderate analysis. \
                 Two-step reasoning, interpreting information and comparing ideas.",
                "Standard academic vocabulary suitable for ages 14-18. \
                 Introduce subject terminology with context.",
                2.0,
                3.0,
                1.5,
            ),
            university: guideline(
                "Analysis, synthesis and application to unfamiliar scenarios. \
                 Multi-step reasoning and evaluation of competing explanations.",
                "Discipline-specific terminology used precisely, as in undergraduate coursework.",
                3.0,
                4.0,
                2.0,
            ),
            post_graduate: guideline(
                "Critical evaluation, research-level reasoning and integration across subfields. \
                 Questions may hinge on subtle distinctions and edge cases.",
                "Advanced technical and research vocabulary without simplification.",
                4.0,
                5.0,
                3.0,
            ),
        }
    }
}

fn guideline(
    complexity: &str,
    language: &str,
    min: f64,
    max: f64,
    minutes_per_question: f64,
) -> DifficultyGuideline {
    DifficultyGuideline {
        complexity: complexity.to_string(),
        language: language.to_string(),
        points: PointRange { min, max },
        minutes_per_question,
    }
}
