//! Prompt Builder — renders a chunk, its topic allocation and the difficulty
//! guideline into the instruction sent to the model.
//!
//! The prompt is the only contract with the model. Per-topic counts are
//! enumerated as hard constraints because models do not reliably honor an
//! implied total, and aggregation downstream assumes they do.

use crate::generation::difficulty::DifficultyGuideline;
use crate::generation::models::{ContentChunk, Difficulty};

/// Which prompt variant to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Generic,
    /// LaTeX notation, step-by-step explanations, formula/visualization fields.
    Stem,
}

/// Ceiling on question text length, in characters.
pub const MAX_QUESTION_CHARS: usize = 200;
/// Ceiling on each option's text length, in characters.
pub const MAX_OPTION_CHARS: usize = 80;

/// Generic prompt. Replace: {total}, {topic_requirements}, {difficulty},
/// {complexity}, {language}, {min_points}, {max_points}, {max_question_chars},
/// {max_option_chars}, {content}
pub const GENERIC_PROMPT_TEMPLATE: &str = r#"Generate EXACTLY {total} multiple-choice questions from the source content below.

QUESTION COUNT REQUIREMENTS (HARD CONSTRAINTS):
{topic_requirements}
The total MUST be exactly {total} questions. No more, no less.
Every question MUST set "topic" to one of the topic names above, spelled exactly as written.

DIFFICULTY: {difficulty}
- Complexity: {complexity}
- Language: {language}
- Points: every question is worth between {min_points} and {max_points} points (inclusive).

MOBILE-FRIENDLY FORMAT:
- Keep each question under {max_question_chars} characters.
- Keep each option under {max_option_chars} characters.
- Prefer short, direct phrasing. Avoid nested clauses and "all of the above".
- Exactly one option is correct. Distractors must be plausible.

Return a JSON array with this EXACT shape (no extra fields, no wrapping object):
[
  {
    "question": "Concise question text",
    "options": {
      "A": "First option",
      "B": "Second option",
      "C": "Third option",
      "D": "Fourth option"
    },
    "correctAnswer": "A",
    "topic": "Exact topic name",
    "points": {min_points},
    "explanation": "Why the correct answer is right and the others are not",
    "difficulty": "{difficulty}",
    "conceptTested": "The specific concept this question checks",
    "learningObjective": "What the learner should be able to do",
    "mobileOptimized": true
  }
]

SOURCE CONTENT:
{content}"#;

/// STEM prompt. Same placeholders as the generic template.
pub const STEM_PROMPT_TEMPLATE: &str = r#"Generate EXACTLY {total} multiple-choice STEM questions from the source content below.

QUESTION COUNT REQUIREMENTS (HARD CONSTRAINTS):
{topic_requirements}
The total MUST be exactly {total} questions. No more, no less.
Every question MUST set "topic" to one of the topic names above, spelled exactly as written.

DIFFICULTY: {difficulty}
- Complexity: {complexity}
- Language: {language}
- Points: every question is worth between {min_points} and {max_points} points (inclusive).

MATHEMATICAL NOTATION:
- Write ALL mathematical notation in LaTeX.
- Use $...$ for inline math, e.g. $x^2 + 3x - 4 = 0$.
- Use $$...$$ for display equations, e.g. $$\int_0^1 x^2\,dx = \frac{1}{3}$$.
- Escape every backslash inside JSON strings ("\\frac", not "\frac").
- Options that are expressions must also use $...$.

EXPLANATIONS:
- Solve the problem step by step: state the relevant principle, show each step, give the result.
- Name the formula or law used at each step.

PROGRAMMING QUESTIONS:
- Put code in backticks and name the language, e.g. `python: len(xs)`.
- Keep code snippets under 5 lines so they fit on a phone screen.
- Ask about behavior, output or complexity rather than syntax trivia.

MOBILE-FRIENDLY FORMAT:
- Keep each question under {max_question_chars} characters, excluding LaTeX markup.
- Keep each option under {max_option_chars} characters.
- Exactly one option is correct. Distractors should reflect common mistakes.

Return a JSON array with this EXACT shape (no extra fields, no wrapping object):
[
  {
    "question": "Concise question text with $inline$ math",
    "options": {
      "A": "$option_1$",
      "B": "$option_2$",
      "C": "$option_3$",
      "D": "$option_4$"
    },
    "correctAnswer": "A",
    "topic": "Exact topic name",
    "points": {min_points},
    "explanation": "Step 1: ... Step 2: ... Therefore ...",
    "difficulty": "{difficulty}",
    "conceptTested": "The specific concept this question checks",
    "learningObjective": "What the learner should be able to do",
    "formula": "Optional key formula in LaTeX, e.g. $F = ma$",
    "visualizationPrompt": "Optional description of a diagram that would help",
    "mobileOptimized": true
  }
]

SOURCE CONTENT:
{content}"#;

/// Renders the prompt for one chunk.
pub fn generate_prompt_for_chunk(
    chunk: &ContentChunk,
    difficulty: Difficulty,
    guideline: &DifficultyGuideline,
    style: PromptStyle,
) -> String {
    let template = match style {
        PromptStyle::Generic => GENERIC_PROMPT_TEMPLATE,
        PromptStyle::Stem => STEM_PROMPT_TEMPLATE,
    };

    // Content goes in last so text inside it is never treated as a placeholder.
    template
        .replace("{total}", &chunk.total_questions().to_string())
        .replace("{difficulty}", difficulty.as_str())
        .replace("{complexity}", &guideline.complexity)
        .replace("{language}", &guideline.language)
        .replace("{min_points}", &guideline.points.min.to_string())
        .replace("{max_points}", &guideline.points.max.to_string())
        .replace("{max_question_chars}", &MAX_QUESTION_CHARS.to_string())
        .replace("{max_option_chars}", &MAX_OPTION_CHARS.to_string())
        .replace("{topic_requirements}", &topic_requirements(chunk))
        .replace("{content}", &chunk.content)
}

/// One line per topic, e.g. `- "Calculus": EXACTLY 4 questions`.
fn topic_requirements(chunk: &ContentChunk) -> String {
    chunk
        .topics
        .iter()
        .map(|t| {
            let noun = if t.num_questions == 1 {
                "question"
            } else {
                "questions"
            };
            format!("- \"{}\": EXACTLY {} {noun}", t.description, t.num_questions)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::difficulty::DifficultyTable;
    use crate::generation::models::Topic;

    fn chunk(topics: Vec<Topic>, content: &str) -> ContentChunk {
        ContentChunk {
            content: content.to_string(),
            topics,
            start_index: 0,
        }
    }

    fn render(chunk: &ContentChunk, difficulty: Difficulty, style: PromptStyle) -> String {
        let table = DifficultyTable::default();
        generate_prompt_for_chunk(chunk, difficulty, table.get(difficulty), style)
    }

    #[test]
    fn test_prompt_enumerates_each_topic_count() {
        let c = chunk(
            vec![Topic::new("Photosynthesis", 3), Topic::new("Respiration", 1)],
            "Plants convert light into chemical energy.",
        );
        let prompt = render(&c, Difficulty::HighSchool, PromptStyle::Generic);

        assert!(prompt.contains("EXACTLY 4 multiple-choice questions"));
        assert!(prompt.contains("- \"Photosynthesis\": EXACTLY 3 questions"));
        assert!(prompt.contains("- \"Respiration\": EXACTLY 1 question"));
        assert!(prompt.contains("No more, no less"));
    }

    #[test]
    fn test_prompt_embeds_guideline_and_point_range() {
        let c = chunk(vec![Topic::new("Cell Biology", 6)], "Cells.");
        let prompt = render(&c, Difficulty::HighSchool, PromptStyle::Generic);
        let table = DifficultyTable::default();

        assert!(prompt.contains(&table.get(Difficulty::HighSchool).complexity));
        assert!(prompt.contains("between 2 and 3 points"));
        assert!(prompt.contains("\"difficulty\": \"high_school\""));
    }

    #[test]
    fn test_prompt_mandates_output_shape() {
        let c = chunk(vec![Topic::new("History", 2)], "Rome fell in 476.");
        let prompt = render(&c, Difficulty::University, PromptStyle::Generic);

        for field in [
            "\"question\"",
            "\"options\"",
            "\"correctAnswer\"",
            "\"topic\"",
            "\"points\"",
            "\"explanation\"",
            "\"difficulty\"",
            "\"conceptTested\"",
            "\"mobileOptimized\": true",
        ] {
            assert!(prompt.contains(field), "missing {field}");
        }
        assert!(prompt.contains(&format!("under {MAX_QUESTION_CHARS} characters")));
    }

    #[test]
    fn test_generic_prompt_has_no_latex_instructions() {
        let c = chunk(vec![Topic::new("Cell Biology", 6)], "Cells.");
        let prompt = render(&c, Difficulty::HighSchool, PromptStyle::Generic);

        assert!(!prompt.contains("LaTeX"));
        assert!(!prompt.contains("visualizationPrompt"));
    }

    #[test]
    fn test_stem_prompt_adds_latex_and_optional_fields() {
        let c = chunk(vec![Topic::new("Calculus", 4)], "The derivative of x^2 is 2x.");
        let prompt = render(&c, Difficulty::University, PromptStyle::Stem);

        assert!(prompt.contains("LaTeX"));
        assert!(prompt.contains("$...$"));
        assert!(prompt.contains("$$...$$"));
        assert!(prompt.contains("step by step"));
        assert!(prompt.contains("\"formula\""));
        assert!(prompt.contains("\"visualizationPrompt\""));
        assert!(prompt.contains("PROGRAMMING QUESTIONS"));
        assert!(prompt.contains("- \"Calculus\": EXACTLY 4 questions"));
    }

    #[test]
    fn test_content_is_inserted_verbatim_and_last() {
        let content = "Braces {total} in the source stay as written.";
        let c = chunk(vec![Topic::new("Notation", 2)], content);
        let prompt = render(&c, Difficulty::MiddleSchool, PromptStyle::Generic);

        assert!(prompt.ends_with(content));
    }
}
