//! Error taxonomy for the notation engine.
//!
//! Per-rubric evaluator failures are deliberately absent: they are recorded
//! on the rubric result and never abort the fan-out. Only transcript
//! resolution, total evaluation failure and persistence surface as
//! operation-level errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotaError {
    #[error("Input resolution error: {0}")]
    InputResolution(String),

    #[error("All rubric evaluations failed: {}", .errors.join("; "))]
    AllEvaluatorsFailed { errors: Vec<String> },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotaError {
    /// Stable exit code for the CLI.
    pub fn code(&self) -> i32 {
        match self {
            NotaError::InputResolution(_) => 2,
            NotaError::AllEvaluatorsFailed { .. } => 3,
            NotaError::Persistence(_) => 4,
            NotaError::Io(_) => 5,
            NotaError::Json(_) => 6,
        }
    }
}
