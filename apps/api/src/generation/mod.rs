// Quiz generation pipeline.
// Implements: chunking, STEM classification, prompt building, model dispatch,
// response sanitizing, question validation and option shuffling.
// All model calls go through llm_client; nothing here talks HTTP to a provider.

pub mod chunker;
pub mod classifier;
pub mod difficulty;
pub mod dispatcher;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod sanitizer;
pub mod shuffler;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;
