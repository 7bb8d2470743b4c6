//! Topic Classifier — pluggable, trait-based STEM detection.
//!
//! Default: `KeywordStemClassifier`, a case-insensitive substring match against a
//! fixed keyword list. It is a heuristic: descriptive life-science topics such
//! as "Cell Biology" stay on the generic path, while "Computational Biology" or
//! "Biochemistry" match a quantitative keyword. The dispatcher holds an
//! `Arc<dyn TopicClassifier>`, so a better classifier can be swapped in
//! without touching routing code.

use crate::generation::models::ContentChunk;

/// Lowercase keywords; a topic is STEM when its description contains any of them.
pub const STEM_KEYWORDS: &[&str] = &[
    "math",
    "algebra",
    "calculus",
    "geometry",
    "trigonometry",
    "physics",
    "chemistry",
    "computational biology",
    "bioinformatics",
    "computer science",
    "programming",
    "coding",
    "engineering",
    "statistics",
    "probability",
    "economics",
    "data science",
    "machine learning",
    "artificial intelligence",
    "ai",
    "quantum",
    "algorithm",
    "thermodynamics",
    "mechanics",
    "electronics",
];

pub trait TopicClassifier: Send + Sync {
    fn is_stem_topic(&self, topic_description: &str) -> bool;

    fn contains_stem_topics(&self, chunk: &ContentChunk) -> bool {
        chunk
            .topics
            .iter()
            .any(|t| self.is_stem_topic(&t.description))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordStemClassifier;

impl TopicClassifier for KeywordStemClassifier {
    fn is_stem_topic(&self, topic_description: &str) -> bool {
        is_stem_topic(topic_description)
    }

    fn contains_stem_topics(&self, chunk: &ContentChunk) -> bool {
        contains_stem_topics(chunk)
    }
}

/// Substring match, except that two-letter acronyms ("ai") must stand alone so
/// that "Spanish" or "Brain" do not qualify.
fn matches_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.len() > 2 {
        return haystack.contains(keyword);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

/// Case-insensitive keyword test against [`STEM_KEYWORDS`].
pub fn is_stem_topic(topic_description: &str) -> bool {
    let lower = topic_description.to_lowercase();
    STEM_KEYWORDS.iter().any(|kw| matches_keyword(&lower, kw))
}

pub fn contains_stem_topics(chunk: &ContentChunk) -> bool {
    chunk.topics.iter().any(|t| is_stem_topic(&t.description))
}
