//! Constraint checking errors.
//!
//! A `Violation` is a report, not an error; errors here mean the checker
//! itself could not evaluate (bad pattern, evaluation failure).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("Constraint '{name}' failed to evaluate: {source}")]
    Evaluation {
        name: String,
        source: mew_pattern::PatternError,
    },
}

impl ConstraintError {
    pub fn evaluation(name: impl Into<String>, source: mew_pattern::PatternError) -> Self {
        ConstraintError::Evaluation {
            name: name.into(),
            source,
        }
    }
}

pub type ConstraintResult<T> = Result<T, ConstraintError>;
