//! The transaction buffer.
//!
//! Holds tentative changes until commit. All collections are append-only
//! within a transaction (deletion marks instead of removals), so a
//! savepoint is a tuple of lengths and ROLLBACK TO is positional
//! truncation.

use indexmap::{IndexMap, IndexSet};
use mew_core::{Attributes, Edge, EdgeId, EntityId, Node, NodeId, Value};
use std::collections::HashMap;

/// An effective, committable operation derived from the buffer log.
/// Creations cancelled by later in-transaction deletions never surface.
#[derive(Debug, Clone)]
pub enum BufferOp {
    /// Node in its final in-transaction state (overlays folded in).
    InsertNode(Node),
    /// Snapshot of the committed node being deleted (undo information).
    DeleteNode(Node),
    InsertEdge(Edge),
    DeleteEdge(Edge),
    SetAttr {
        entity: EntityId,
        attr: String,
        old: Option<Value>,
        new: Value,
    },
}

/// Internal log entry, one per primitive mutation, in execution order.
#[derive(Debug, Clone)]
enum LogOp {
    InsertNode(NodeId),
    DeleteNode(Option<Node>),
    InsertEdge(EdgeId),
    DeleteEdge(Option<Edge>),
    SetAttr {
        entity: EntityId,
        attr: String,
        old: Option<Value>,
        new: Value,
    },
}

/// Savepoint marker: lengths of every buffer collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnBufferMark {
    created_nodes: usize,
    created_edges: usize,
    deleted_nodes: usize,
    deleted_edges: usize,
    log: usize,
}

/// Tentative changes of one open transaction.
#[derive(Debug, Default)]
pub struct TxnBuffer {
    /// Nodes created in this transaction, in creation state (attribute
    /// changes stay in the overlay until commit).
    created_nodes: IndexMap<NodeId, Node>,
    created_edges: IndexMap<EdgeId, Edge>,
    /// Deletion marks; may include buffer-created ids, which cancels them.
    deleted_nodes: IndexSet<NodeId>,
    deleted_edges: IndexSet<EdgeId>,
    log: Vec<LogOp>,
    /// Derived: latest attribute values per entity, rebuilt on rollback.
    overlays: HashMap<EntityId, Attributes>,
    /// Derived: per-entity count of attribute changes, feeds version bumps.
    overlay_counts: HashMap<EntityId, u64>,
}

impl TxnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Writes ====================

    pub fn create_node(&mut self, node: Node) {
        self.log.push(LogOp::InsertNode(node.id));
        self.created_nodes.insert(node.id, node);
    }

    pub fn create_edge(&mut self, edge: Edge) {
        self.log.push(LogOp::InsertEdge(edge.id));
        self.created_edges.insert(edge.id, edge);
    }

    /// Mark a node deleted. `committed` carries the committed snapshot for
    /// undo when the victim pre-existed the transaction.
    pub fn delete_node(&mut self, id: NodeId, committed: Option<Node>) {
        self.log.push(LogOp::DeleteNode(committed));
        self.deleted_nodes.insert(id);
    }

    pub fn delete_edge(&mut self, id: EdgeId, committed: Option<Edge>) {
        self.log.push(LogOp::DeleteEdge(committed));
        self.deleted_edges.insert(id);
    }

    pub fn set_attr(&mut self, entity: EntityId, attr: String, old: Option<Value>, new: Value) {
        self.log.push(LogOp::SetAttr {
            entity,
            attr: attr.clone(),
            old,
            new: new.clone(),
        });
        self.overlays.entry(entity).or_default().insert(attr, new);
        *self.overlay_counts.entry(entity).or_default() += 1;
    }

    // ==================== Reads ====================

    pub fn is_deleted_node(&self, id: NodeId) -> bool {
        self.deleted_nodes.contains(&id)
    }

    pub fn is_deleted_edge(&self, id: EdgeId) -> bool {
        self.deleted_edges.contains(&id)
    }

    pub fn is_created_node(&self, id: NodeId) -> bool {
        self.created_nodes.contains_key(&id)
    }

    pub fn is_created_edge(&self, id: EdgeId) -> bool {
        self.created_edges.contains_key(&id)
    }

    /// Buffer-created nodes that are still alive, in creation order.
    pub fn live_created_nodes(&self) -> impl Iterator<Item = &Node> {
        self.created_nodes
            .values()
            .filter(|n| !self.deleted_nodes.contains(&n.id))
    }

    pub fn live_created_edges(&self) -> impl Iterator<Item = &Edge> {
        self.created_edges
            .values()
            .filter(|e| !self.deleted_edges.contains(&e.id))
    }

    /// Creation-state node (without overlays).
    pub fn created_node(&self, id: NodeId) -> Option<&Node> {
        self.created_nodes.get(&id)
    }

    pub fn created_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.created_edges.get(&id)
    }

    /// Latest overlay value for an attribute, if set in this transaction.
    pub fn overlay_attr(&self, entity: EntityId, attr: &str) -> Option<&Value> {
        self.overlays.get(&entity).and_then(|attrs| attrs.get(attr))
    }

    pub fn has_overlay(&self, entity: EntityId) -> bool {
        self.overlays.contains_key(&entity)
    }

    /// Committed node ids that carry overlays (for index-lookup merging).
    pub fn overlaid_committed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.overlays
            .keys()
            .filter_map(|e| e.as_node())
            .filter(|id| !self.created_nodes.contains_key(id))
    }

    /// Fold this transaction's overlays into an entity snapshot, bumping
    /// the version once per change so activation fingerprints move.
    pub fn overlay_node(&self, mut node: Node) -> Node {
        if let Some(attrs) = self.overlays.get(&EntityId::Node(node.id)) {
            for (attr, value) in attrs {
                node.attributes.insert(attr.clone(), value.clone());
            }
            node.version += self
                .overlay_counts
                .get(&EntityId::Node(node.id))
                .copied()
                .unwrap_or(0);
        }
        node
    }

    pub fn overlay_edge(&self, mut edge: Edge) -> Edge {
        if let Some(attrs) = self.overlays.get(&EntityId::Edge(edge.id)) {
            for (attr, value) in attrs {
                edge.attributes.insert(attr.clone(), value.clone());
            }
            edge.version += self
                .overlay_counts
                .get(&EntityId::Edge(edge.id))
                .copied()
                .unwrap_or(0);
        }
        edge
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    // ==================== Savepoints ====================

    pub fn mark(&self) -> TxnBufferMark {
        TxnBufferMark {
            created_nodes: self.created_nodes.len(),
            created_edges: self.created_edges.len(),
            deleted_nodes: self.deleted_nodes.len(),
            deleted_edges: self.deleted_edges.len(),
            log: self.log.len(),
        }
    }

    /// Truncate every collection back to the mark and rebuild the derived
    /// overlay maps from the surviving log prefix.
    pub fn rollback_to(&mut self, mark: TxnBufferMark) {
        self.created_nodes.truncate(mark.created_nodes);
        self.created_edges.truncate(mark.created_edges);
        self.deleted_nodes.truncate(mark.deleted_nodes);
        self.deleted_edges.truncate(mark.deleted_edges);
        self.log.truncate(mark.log);

        self.overlays.clear();
        self.overlay_counts.clear();
        let rebuilt: Vec<(EntityId, String, Value)> = self
            .log
            .iter()
            .filter_map(|op| match op {
                LogOp::SetAttr {
                    entity, attr, new, ..
                } => Some((*entity, attr.clone(), new.clone())),
                _ => None,
            })
            .collect();
        for (entity, attr, new) in rebuilt {
            self.overlays.entry(entity).or_default().insert(attr, new);
            *self.overlay_counts.entry(entity).or_default() += 1;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // ==================== Commit Materialization ====================

    /// The effective operation sequence: the log with cancelled pairs
    /// removed and attribute overlays folded into node/edge inserts.
    /// This single walk feeds both WAL record generation and store apply,
    /// so the two can never disagree.
    pub fn effective_ops(&self) -> Vec<BufferOp> {
        let mut ops = Vec::new();
        for entry in &self.log {
            match entry {
                LogOp::InsertNode(id) => {
                    if self.deleted_nodes.contains(id) {
                        continue;
                    }
                    if let Some(node) = self.created_nodes.get(id) {
                        ops.push(BufferOp::InsertNode(self.overlay_node(node.clone())));
                    }
                }
                LogOp::InsertEdge(id) => {
                    if self.deleted_edges.contains(id) {
                        continue;
                    }
                    if let Some(edge) = self.created_edges.get(id) {
                        ops.push(BufferOp::InsertEdge(self.overlay_edge(edge.clone())));
                    }
                }
                LogOp::DeleteNode(snapshot) => {
                    if let Some(node) = snapshot {
                        ops.push(BufferOp::DeleteNode(node.clone()));
                    }
                    // No snapshot: victim was created in this transaction,
                    // so its insert was suppressed above.
                }
                LogOp::DeleteEdge(snapshot) => {
                    if let Some(edge) = snapshot {
                        ops.push(BufferOp::DeleteEdge(edge.clone()));
                    }
                }
                LogOp::SetAttr {
                    entity,
                    attr,
                    old,
                    new,
                } => {
                    let folded_into_insert = match entity {
                        EntityId::Node(id) => self.created_nodes.contains_key(id),
                        EntityId::Edge(id) => self.created_edges.contains_key(id),
                    };
                    let target_deleted = match entity {
                        EntityId::Node(id) => self.deleted_nodes.contains(id),
                        EntityId::Edge(id) => self.deleted_edges.contains(id),
                    };
                    if folded_into_insert || target_deleted {
                        continue;
                    }
                    ops.push(BufferOp::SetAttr {
                        entity: *entity,
                        attr: attr.clone(),
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
            }
        }
        ops
    }

    /// Counts for the mutation summary: (created, deleted, modified).
    pub fn counts(&self) -> (usize, usize, usize) {
        let created = self.live_created_nodes().count() + self.live_created_edges().count();
        let deleted = self
            .deleted_nodes
            .iter()
            .filter(|id| !self.created_nodes.contains_key(*id))
            .count()
            + self
                .deleted_edges
                .iter()
                .filter(|id| !self.created_edges.contains_key(*id))
                .count();
        let modified = self
            .overlays
            .keys()
            .filter(|e| match e {
                EntityId::Node(id) => {
                    !self.created_nodes.contains_key(id) && !self.deleted_nodes.contains(id)
                }
                EntityId::Edge(id) => {
                    !self.created_edges.contains_key(id) && !self.deleted_edges.contains(id)
                }
            })
            .count();
        (created, deleted, modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, TypeId};

    fn node(id: u64, attrs: Attributes) -> Node {
        Node::new(NodeId::new(id), TypeId::new(1), attrs)
    }

    #[test]
    fn test_create_then_delete_cancels() {
        let mut buffer = TxnBuffer::new();
        buffer.create_node(node(1, attrs! { "x" => 1 }));
        buffer.delete_node(NodeId::new(1), None);

        let ops = buffer.effective_ops();
        assert!(ops.is_empty(), "cancelled pair should produce no ops: {:?}", ops);
    }

    #[test]
    fn test_set_attr_on_created_folds_into_insert() {
        let mut buffer = TxnBuffer::new();
        buffer.create_node(node(1, attrs! { "v" => 0 }));
        buffer.set_attr(
            EntityId::Node(NodeId::new(1)),
            "v".to_string(),
            Some(Value::Int(0)),
            Value::Int(5),
        );

        let ops = buffer.effective_ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            BufferOp::InsertNode(n) => {
                assert_eq!(n.get_attr("v"), Some(&Value::Int(5)));
                // One creation + one overlay change.
                assert_eq!(n.version, 2);
            }
            other => panic!("expected InsertNode, got {:?}", other),
        }
    }

    #[test]
    fn test_set_attr_on_committed_survives() {
        let mut buffer = TxnBuffer::new();
        buffer.set_attr(
            EntityId::Node(NodeId::new(9)),
            "title".to_string(),
            Some(Value::String("old".into())),
            Value::String("new".into()),
        );

        let ops = buffer.effective_ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], BufferOp::SetAttr { .. }));
        assert_eq!(
            buffer.overlay_attr(EntityId::Node(NodeId::new(9)), "title"),
            Some(&Value::String("new".into()))
        );
    }

    #[test]
    fn test_savepoint_rollback_restores_overlays() {
        let mut buffer = TxnBuffer::new();
        let entity = EntityId::Node(NodeId::new(1));
        buffer.create_node(node(1, attrs! { "v" => 0 }));
        buffer.set_attr(entity, "v".to_string(), Some(Value::Int(0)), Value::Int(1));

        let mark = buffer.mark();
        buffer.set_attr(entity, "v".to_string(), Some(Value::Int(1)), Value::Int(2));
        assert_eq!(buffer.overlay_attr(entity, "v"), Some(&Value::Int(2)));

        buffer.rollback_to(mark);
        assert_eq!(buffer.overlay_attr(entity, "v"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_savepoint_rollback_discards_creations_and_deletions() {
        let mut buffer = TxnBuffer::new();
        buffer.create_node(node(1, attrs!()));
        let mark = buffer.mark();

        buffer.create_node(node(2, attrs!()));
        buffer.delete_node(NodeId::new(50), Some(node(50, attrs!())));
        assert!(buffer.is_deleted_node(NodeId::new(50)));

        buffer.rollback_to(mark);
        assert!(buffer.is_created_node(NodeId::new(1)));
        assert!(!buffer.is_created_node(NodeId::new(2)));
        assert!(!buffer.is_deleted_node(NodeId::new(50)));
    }

    #[test]
    fn test_counts() {
        let mut buffer = TxnBuffer::new();
        buffer.create_node(node(1, attrs!()));
        buffer.delete_node(NodeId::new(40), Some(node(40, attrs!())));
        buffer.set_attr(
            EntityId::Node(NodeId::new(41)),
            "x".to_string(),
            None,
            Value::Int(1),
        );

        let (created, deleted, modified) = buffer.counts();
        assert_eq!((created, deleted, modified), (1, 1, 1));
    }
}
