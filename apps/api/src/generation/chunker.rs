//! Content Chunker — splits source text into bounded windows and gives each
//! window its proportional share of the requested questions.
//!
//! Sizes and offsets are counted in `char`s, not bytes, so multi-byte text
//! is never split inside a code point.
//!
//! Algorithm per chunk:
//! 1. Take a window of at most `max_chunk_size` chars from the cursor.
//! 2. Unless the window reaches the end of the content, trim it back to the
//!    last `.`, `!` or `?` inside it (keep the full window if there is none).
//! 3. `questions_for_chunk = max(1, at(end) - at(start))` where
//!    `at(pos) = round(total_requested * pos / total_len)`. Boundaries are
//!    cumulative, so the per-chunk counts add up to exactly `total_requested`
//!    whenever every chunk gets at least one question.
//! 4. Per topic: the same cumulative split of that topic's own count, floored
//!    at 1; any excess over `questions_for_chunk` is taken from the largest topic.
//! 5. Advance the cursor by the chunk length.

use tracing::debug;

use crate::generation::models::{ContentChunk, Topic};

/// Default window size, in characters.
pub const MAX_CHUNK_SIZE: usize = 12_000;

const SENTENCE_ENDINGS: [char; 3] = ['.', '!', '?'];

/// Splits `content` into chunks of at most `max_chunk_size` chars, each
/// carrying its own per-topic question allocation. Empty content yields no chunks.
pub fn split_content_into_chunks(
    content: &str,
    topics: &[Topic],
    max_chunk_size: usize,
) -> Vec<ContentChunk> {
    let chars: Vec<char> = content.chars().collect();
    let total_len = chars.len();
    if total_len == 0 {
        return Vec::new();
    }

    let window = max_chunk_size.max(1);
    let total_requested: u32 = topics.iter().map(|t| t.num_questions).sum();
    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < total_len {
        let window_end = (cursor + window).min(total_len);
        let end = if window_end < total_len {
            sentence_boundary(&chars[cursor..window_end])
                .map(|offset| cursor + offset + 1)
                .unwrap_or(window_end)
        } else {
            window_end
        };

        let span = Span {
            start: cursor,
            end,
            total_len,
        };
        let questions_for_chunk = span.share_of(total_requested).max(1);

        let mut allocated = allocate_topics(topics, &span);
        clamp_to_budget(&mut allocated, questions_for_chunk);

        chunks.push(ContentChunk {
            content: chars[cursor..end].iter().collect(),
            topics: allocated,
            start_index: cursor,
        });

        cursor = end;
    }

    debug!(
        "Split {} chars into {} chunks for {} requested questions",
        total_len,
        chunks.len(),
        total_requested
    );

    chunks
}

/// Index of the last sentence-ending character in `window`, if any.
fn sentence_boundary(window: &[char]) -> Option<usize> {
    window.iter().rposition(|c| SENTENCE_ENDINGS.contains(c))
}

/// A chunk's `[start, end)` position within content of `total_len` chars.
struct Span {
    start: usize,
    end: usize,
    total_len: usize,
}

impl Span {
    /// This span's slice of `count`, rounded at cumulative boundaries so that
    /// consecutive spans never double-count a question.
    fn share_of(&self, count: u32) -> u32 {
        let at = |pos: usize| (count as f64 * pos as f64 / self.total_len as f64).round() as u32;
        at(self.end).saturating_sub(at(self.start))
    }
}

/// Each topic's share of its own requested count for this span, at least 1.
fn allocate_topics(topics: &[Topic], span: &Span) -> Vec<Topic> {
    topics
        .iter()
        .map(|topic| {
            let count = span.share_of(topic.num_questions).max(1);
            Topic::new(topic.description.clone(), count)
        })
        .collect()
}

fn clamp_to_budget(allocated: &mut [Topic], budget: u32) {
    let mut excess = allocated
        .iter()
        .map(|t| t.num_questions)
        .sum::<u32>()
        .saturating_sub(budget);

    // The largest topic absorbs the excess; no topic drops below one question.
    while excess > 0 {
        let Some(largest) = allocated
            .iter_mut()
            .filter(|t| t.num_questions > 1)
            .max_by_key(|t| t.num_questions)
        else {
            break;
        };
        let reducible = (largest.num_questions - 1).min(excess);
        largest.num_questions -= reducible;
        excess -= reducible;
    }
}
