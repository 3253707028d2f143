//! Query errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown type '{name}'")]
    UnknownType { name: String },

    #[error("Unknown edge type '{name}'")]
    UnknownEdgeType { name: String },

    #[error("Query exceeded its time budget of {budget_ms}ms")]
    Timeout { budget_ms: i64 },

    #[error("Aggregate '{name}' is not allowed here")]
    AggregateMisuse { name: String },

    #[error("WALK start did not resolve to a node")]
    InvalidWalkStart,

    #[error("collect() gathered more than {limit} values")]
    CollectLimit { limit: usize },

    #[error(transparent)]
    Pattern(#[from] mew_pattern::PatternError),
}

impl QueryError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        QueryError::UnknownType { name: name.into() }
    }

    pub fn unknown_edge_type(name: impl Into<String>) -> Self {
        QueryError::UnknownEdgeType { name: name.into() }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
