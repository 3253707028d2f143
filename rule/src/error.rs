//! Rule engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule depth limit exceeded: activation chain reached {depth}")]
    MaxDepthExceeded { depth: usize },

    #[error("Rule action limit exceeded: {count} actions in one transaction")]
    MaxActionsExceeded { count: usize },

    #[error("Rule cycle detected at '{rule}': {path}")]
    RuleCycle { rule: String, path: String },

    #[error("Unknown rule '{name}'")]
    UnknownRule { name: String },

    #[error("Rule '{rule}' has an invalid production: {message}")]
    InvalidProduction { rule: String, message: String },

    #[error("Rule '{rule}' violated constraint '{constraint}': {message}")]
    ConstraintViolation {
        rule: String,
        constraint: String,
        message: String,
    },

    #[error(transparent)]
    Mutation(#[from] mew_mutation::MutationError),

    #[error(transparent)]
    Pattern(#[from] mew_pattern::PatternError),
}

pub type RuleResult<T> = Result<T, RuleError>;
