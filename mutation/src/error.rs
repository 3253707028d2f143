//! Mutation errors.

use mew_core::{EdgeId, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Unknown type '{name}'")]
    UnknownType { name: String },

    #[error("Cannot instantiate abstract type '{name}'")]
    AbstractType { name: String },

    #[error("Unknown edge type '{name}'")]
    UnknownEdgeType { name: String },

    #[error("Unknown attribute '{attr}' on '{owner}'")]
    UnknownAttribute { owner: String, attr: String },

    #[error("Required attribute '{attr}' is missing on '{type_name}'")]
    MissingRequired { type_name: String, attr: String },

    #[error("Attribute '{attr}' expects {expected}, got {actual}")]
    InvalidAttrType {
        attr: String,
        expected: String,
        actual: String,
    },

    #[error("Attribute '{attr}' violates modifier constraint: {message}")]
    ModifierViolation { attr: String, message: String },

    #[error("Unique attribute '{attr}' collides with an existing '{type_name}'")]
    UniqueCollision { type_name: String, attr: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Edge '{edge_type}' expects {expected} targets, got {actual}")]
    InvalidArity {
        edge_type: String,
        expected: usize,
        actual: usize,
    },

    #[error("Edge '{edge_type}' position {position} expects {expected}")]
    InvalidTargetType {
        edge_type: String,
        position: usize,
        expected: String,
    },

    #[error("Edge '{edge_type}' does not allow identical targets")]
    SelfLoop { edge_type: String },

    #[error("Edge '{edge_type}' already links these targets")]
    DuplicateEdge { edge_type: String },

    #[error("Edge '{edge_type}' violates cardinality: at most {max} at position '{param}'")]
    CardinalityExceeded {
        edge_type: String,
        param: String,
        max: i64,
    },

    #[error("Edge '{edge_type}' is acyclic: linking these targets would close a cycle")]
    AcyclicViolation { edge_type: String },

    #[error("KILL prevented by edge '{edge_type}'")]
    KillPrevented { edge_type: String },

    #[error("Cascade exceeded the limit of {limit} entities")]
    CascadeLimit { limit: usize },

    #[error(transparent)]
    Pattern(#[from] mew_pattern::PatternError),

    #[error(transparent)]
    Graph(#[from] mew_graph::GraphError),
}

impl MutationError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        MutationError::UnknownType { name: name.into() }
    }

    pub fn unknown_edge_type(name: impl Into<String>) -> Self {
        MutationError::UnknownEdgeType { name: name.into() }
    }

    /// True when the failure is a schema-declared invariant, which aborts
    /// the surrounding transaction as a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            MutationError::MissingRequired { .. }
                | MutationError::ModifierViolation { .. }
                | MutationError::UniqueCollision { .. }
                | MutationError::SelfLoop { .. }
                | MutationError::DuplicateEdge { .. }
                | MutationError::CardinalityExceeded { .. }
                | MutationError::AcyclicViolation { .. }
                | MutationError::KillPrevented { .. }
        )
    }
}

pub type MutationResult<T> = Result<T, MutationError>;
