//! Option Shuffler — removes positional bias from model-generated answer keys.
//!
//! Models tend to put the correct answer in the same slot. Options are
//! permuted uniformly and re-keyed `A, B, C, D, …`; `correct_answer` follows
//! the option it pointed at before the shuffle.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::generation::models::Question;

/// Highest key is `Z`.
const MAX_OPTIONS: usize = 26;

/// Shuffles one question's options in place. No-op when there are no
/// options, too many to key, or `correct_answer` is not one of the keys.
pub fn shuffle_question_options<R: Rng + ?Sized>(question: &mut Question, rng: &mut R) {
    if question.options.is_empty()
        || question.options.len() > MAX_OPTIONS
        || !question.options.contains_key(&question.correct_answer)
    {
        return;
    }

    let mut pairs: Vec<(String, String)> =
        std::mem::take(&mut question.options).into_iter().collect();
    pairs.shuffle(rng);

    for (position, (old_key, text)) in pairs.into_iter().enumerate() {
        let new_key = option_key(position);
        // Tracked by key, so duplicate option texts cannot move the answer.
        if old_key == question.correct_answer {
            question.correct_answer = new_key.clone();
        }
        question.options.insert(new_key, text);
    }
}

pub fn shuffle_all<R: Rng + ?Sized>(questions: &mut [Question], rng: &mut R) {
    for question in questions {
        shuffle_question_options(question, rng);
    }
}

fn option_key(position: usize) -> String {
    char::from(b'A' + position as u8).to_string()
}
