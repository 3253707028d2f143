//! Transaction errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("A transaction is already active")]
    AlreadyActive,

    #[error("Savepoint '{0}' not found")]
    SavepointNotFound(String),

    #[error("Constraint '{constraint}' violated: {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("Deferred constraint '{constraint}' failed at commit: {message}")]
    DeferredViolation { constraint: String, message: String },

    #[error("Serializable commit conflict: {reason}")]
    CommitConflict { reason: String },

    #[error(transparent)]
    Mutation(#[from] mew_mutation::MutationError),

    #[error(transparent)]
    Rule(#[from] mew_rule::RuleError),

    #[error(transparent)]
    ConstraintCheck(#[from] mew_constraint::ConstraintError),

    #[error(transparent)]
    Journal(#[from] mew_journal::JournalError),

    #[error(transparent)]
    Graph(#[from] mew_graph::GraphError),
}

pub type TxnResult<T> = Result<T, TxnError>;
