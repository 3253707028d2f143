//! Mutation outcome types.

use mew_core::{EdgeId, EdgeTypeId, EntityId, NodeId, TypeId};

/// Entities touched by a mutation, with their types. Drives the
/// affected-set filtering of constraints and rules.
#[derive(Debug, Clone, Default)]
pub struct TouchSet {
    pub nodes: Vec<(NodeId, TypeId)>,
    pub edges: Vec<(EdgeId, EdgeTypeId)>,
}

impl TouchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_node(&mut self, id: NodeId, type_id: TypeId) {
        if !self.nodes.iter().any(|(n, _)| *n == id) {
            self.nodes.push((id, type_id));
        }
    }

    pub fn touch_edge(&mut self, id: EdgeId, type_id: EdgeTypeId) {
        if !self.edges.iter().any(|(e, _)| *e == id) {
            self.edges.push((id, type_id));
        }
    }

    pub fn merge(&mut self, other: &TouchSet) {
        for (id, tid) in &other.nodes {
            self.touch_node(*id, *tid);
        }
        for (id, tid) in &other.edges {
            self.touch_edge(*id, *tid);
        }
    }

    pub fn node_types(&self) -> Vec<TypeId> {
        let mut types: Vec<TypeId> = self.nodes.iter().map(|(_, t)| *t).collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn edge_types(&self) -> Vec<EdgeTypeId> {
        let mut types: Vec<EdgeTypeId> = self.edges.iter().map(|(_, t)| *t).collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// What a primitive did, in enough detail to satisfy RETURNING, drive the
/// rule engine, and report counts.
#[derive(Debug, Clone, Default)]
pub struct MutationEffects {
    pub created_nodes: Vec<NodeId>,
    pub created_edges: Vec<EdgeId>,
    pub deleted_nodes: Vec<NodeId>,
    pub deleted_edges: Vec<EdgeId>,
    pub modified: Vec<EntityId>,
    /// Nodes deleted through cascade, beyond the primary victims.
    pub cascaded: usize,
    /// Set by `LINK ... IF NOT EXISTS` when the edge already existed.
    pub existing_edge: Option<EdgeId>,
    pub touched: TouchSet,
}

impl MutationEffects {
    pub fn merge(&mut self, other: MutationEffects) {
        self.created_nodes.extend(other.created_nodes);
        self.created_edges.extend(other.created_edges);
        self.deleted_nodes.extend(other.deleted_nodes);
        self.deleted_edges.extend(other.deleted_edges);
        self.modified.extend(other.modified);
        self.cascaded += other.cascaded;
        if self.existing_edge.is_none() {
            self.existing_edge = other.existing_edge;
        }
        self.touched.merge(&other.touched);
    }

    /// Whether a LINK created its edge (false on an IF NOT EXISTS hit).
    pub fn created(&self) -> bool {
        self.existing_edge.is_none()
    }
}
