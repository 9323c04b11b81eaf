//! Errors shared by the LLM-backed pipeline stages.

use thiserror::Error;

/// Failure of a single generation stage (planning, writing, revising).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM error: {0}")]
    Llm(#[from] llm::Error),

    #[error("Could not parse model output: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for GenerationError {
    fn from(e: serde_json::Error) -> Self {
        GenerationError::Parse(e.to_string())
    }
}
