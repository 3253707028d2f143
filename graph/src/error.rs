//! Graph store errors.

use mew_core::{EdgeId, EntityId, NodeId};
use thiserror::Error;

/// Errors that can occur during graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Duplicate id on insert. Ids are allocated centrally, so this is an
    /// internal invariant violation, not a caller error.
    #[error("Internal invariant violated: duplicate id {0} on insert")]
    DuplicateId(EntityId),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
