//! Identity types for MEW entities.
//!
//! Entity identifiers are opaque 64-bit values, unique within their namespace,
//! immutable once assigned, and comparable for equality and ordering only.
//! Type handles are small integers assigned at ontology compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Unique identifier for an edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Unified identifier that can refer to either a node or an edge.
///
/// Edge targets in a higher-order hypergraph are `EntityId`s: an edge may
/// point at nodes or at other edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Node(NodeId),
    Edge(EdgeId),
}

impl EntityId {
    pub fn is_node(&self) -> bool {
        matches!(self, EntityId::Node(_))
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, EntityId::Edge(_))
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            EntityId::Node(id) => Some(*id),
            EntityId::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<EdgeId> {
        match self {
            EntityId::Node(_) => None,
            EntityId::Edge(id) => Some(*id),
        }
    }
}

impl From<NodeId> for EntityId {
    fn from(id: NodeId) -> Self {
        EntityId::Node(id)
    }
}

impl From<EdgeId> for EntityId {
    fn from(id: EdgeId) -> Self {
        EntityId::Edge(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Node(id) => write!(f, "{}", id),
            EntityId::Edge(id) => write!(f, "{}", id),
        }
    }
}

/// Handle for a node type in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Handle for an edge type in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeTypeId(pub u32);

impl EdgeTypeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EdgeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "et{}", self.0)
    }
}

/// Transaction identifier, monotonic per database.
pub type TxnId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_equality() {
        let id1 = NodeId::new(1);
        let id2 = NodeId::new(1);
        let id3 = NodeId::new(2);

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_entity_id_conversion() {
        let node_id = NodeId::new(42);
        let edge_id = EdgeId::new(99);

        let entity_from_node: EntityId = node_id.into();
        let entity_from_edge: EntityId = edge_id.into();

        assert!(entity_from_node.is_node());
        assert!(!entity_from_node.is_edge());
        assert!(entity_from_edge.is_edge());

        assert_eq!(entity_from_node.as_node(), Some(node_id));
        assert_eq!(entity_from_edge.as_edge(), Some(edge_id));
    }

    #[test]
    fn test_id_ordering_is_by_raw_value() {
        let mut ids = vec![NodeId::new(3), NodeId::new(1), NodeId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
    }
}
