//! Response Sanitizer — turns raw model output into a parseable JSON array string.
//!
//! Models wrap JSON in prose and code fences, leave comments and trailing
//! commas, and emit LaTeX backslashes that are not valid JSON escapes. All of
//! that is observed behavior, so it is repaired rather than rejected.
//!
//! Steps, in order:
//! 1. Strip a leading and a trailing code fence (optionally language-tagged).
//! 2. Outside string literals: drop `//` line comments, `/* */` block
//!    comments and commas directly before `]` or `}`. Inside string
//!    literals: double any backslash that does not start a valid escape.
//! 3. Slice from the first `[` to the last `]`.
//! 4. Check that the result parses as JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").expect("valid regex"));

/// Sanitization failed. Carries the untouched model output for diagnostics.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct SanitizeError {
    pub reason: String,
    pub original: String,
}

/// Cleans raw model output and returns the JSON array it contains.
pub fn cleanup_json_content(raw: &str) -> Result<String, SanitizeError> {
    let fail = |reason: String| SanitizeError {
        reason,
        original: raw.to_string(),
    };

    let unfenced = strip_fences(raw);
    let cleaned = strip_non_json(&unfenced);

    let start = cleaned
        .find('[')
        .ok_or_else(|| fail("no JSON array found in model output".to_string()))?;
    let end = cleaned
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| fail("unterminated JSON array in model output".to_string()))?;
    let array = &cleaned[start..=end];

    serde_json::from_str::<serde_json::Value>(array)
        .map_err(|e| fail(format!("model output is not valid JSON after cleanup: {e}")))?;

    Ok(array.to_string())
}

fn strip_fences(raw: &str) -> String {
    let without_leading = LEADING_FENCE.replace(raw, "");
    TRAILING_FENCE.replace(&without_leading, "").into_owned()
}

/// Single pass over the text that tracks whether it is inside a string literal.
fn strip_non_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            match c {
                '\\' => match chars.get(i + 1) {
                    Some(&next) if is_json_escape(&chars, i + 1) => {
                        out.push('\\');
                        out.push(next);
                        i += 2;
                        continue;
                    }
                    // `\alpha`, `\(`, a lone trailing backslash...
                    _ => out.push_str("\\\\"),
                },
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            ',' if next_significant(&chars, i + 1).is_some_and(|n| n == ']' || n == '}') => {
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// LaTeX commands that begin with a letter JSON also uses as an escape (`\\n`, `\\r`, `\\t`).
const LATEX_ESCAPE_LOOKALIKES: &[&str] = &[
    "ne", "neq", "neg", "not", "nabla", "nu", "ni", "nleq", "ngeq", "nmid", "newline",
    "rho", "right", "rightarrow", "rangle", "rfloor", "rceil", "rbrace", "rvert",
    "theta", "times", "tau", "tan", "tanh", "text", "textbf", "textit", "to", "top",
    "triangle", "tilde", "therefore", "tfrac",
];

/// Whether the backslash before `chars[at]` starts a real JSON escape rather
/// than a LaTeX command such as `\\beta`, `\\frac` or `\\theta`.
fn is_json_escape(chars: &[char], at: usize) -> bool {
    let word: String = chars[at..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    match chars[at] {
        '"' | '\\' | '/' => true,
        // Backspace and form feed never appear in quiz text; `\\b`/`\\f` + letters is LaTeX.
        'b' | 'f' => word.len() == 1,
        'n' | 'r' | 't' => !LATEX_ESCAPE_LOOKALIKES.contains(&word.as_str()),
        'u' => chars[at + 1..]
            .iter()
            .take(4)
            .filter(|c| c.is_ascii_hexdigit())
            .count()
            == 4,
        _ => false,
    }
}

/// Next non-whitespace char at or after `from`, skipping comments.
fn next_significant(chars: &[char], from: usize) -> Option<char> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            c => return Some(c),
        }
    }
    None
}
