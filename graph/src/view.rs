//! Read views over the store.
//!
//! [`GraphRead`] is the lookup contract shared by the pattern engine,
//! query executor, constraint checker and rule engine. Lookups are total
//! functions over the committed snapshot plus the caller's transaction
//! buffer (read-your-writes). All id lists come back ascending.

use crate::buffer::TxnBuffer;
use crate::store::{values_equal, Graph};
use mew_core::{Edge, EdgeId, EdgeTypeId, EntityId, Node, NodeId, TypeId, Value};
use std::borrow::Cow;

/// Read access to a graph state.
pub trait GraphRead {
    fn node(&self, id: NodeId) -> Option<Cow<'_, Node>>;
    fn edge(&self, id: EdgeId) -> Option<Cow<'_, Edge>>;

    fn nodes_of_type(&self, type_id: TypeId) -> Vec<NodeId>;
    fn count_nodes_of_type(&self, type_id: TypeId) -> usize {
        self.nodes_of_type(type_id).len()
    }

    fn nodes_by_attr(&self, type_id: TypeId, attr: &str, value: &Value) -> Vec<NodeId>;
    fn nodes_by_attr_range(
        &self,
        type_id: TypeId,
        attr: &str,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Vec<NodeId>;

    fn edges_of_type(&self, edge_type: EdgeTypeId) -> Vec<EdgeId>;
    fn edges_from(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId>;
    fn edges_to(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId>;
    fn edges_involving(&self, node: NodeId) -> Vec<EdgeId>;
    fn edges_at(&self, edge_type: EdgeTypeId, position: usize, target: EntityId) -> Vec<EdgeId>;
    fn edges_about(&self, edge: EdgeId) -> Vec<EdgeId>;

    fn node_count(&self) -> usize;
    fn edge_count(&self) -> usize;
    fn all_node_ids(&self) -> Vec<NodeId>;
    fn all_edge_ids(&self) -> Vec<EdgeId>;

    fn has_attr_index(&self, type_id: TypeId, attr: &str) -> bool;

    fn entity_exists(&self, id: EntityId) -> bool {
        match id {
            EntityId::Node(n) => self.node(n).is_some(),
            EntityId::Edge(e) => self.edge(e).is_some(),
        }
    }

    /// Current attribute value of a node, overlay-aware.
    fn node_attr(&self, id: NodeId, attr: &str) -> Option<Value> {
        self.node(id).and_then(|n| n.get_attr(attr).cloned())
    }

    fn edge_attr(&self, id: EdgeId, attr: &str) -> Option<Value> {
        self.edge(id).and_then(|e| e.get_attr(attr).cloned())
    }
}

impl GraphRead for Graph {
    fn node(&self, id: NodeId) -> Option<Cow<'_, Node>> {
        self.get_node(id).map(Cow::Borrowed)
    }

    fn edge(&self, id: EdgeId) -> Option<Cow<'_, Edge>> {
        self.get_edge(id).map(Cow::Borrowed)
    }

    fn nodes_of_type(&self, type_id: TypeId) -> Vec<NodeId> {
        Graph::nodes_of_type(self, type_id)
    }

    fn count_nodes_of_type(&self, type_id: TypeId) -> usize {
        Graph::count_nodes_of_type(self, type_id)
    }

    fn nodes_by_attr(&self, type_id: TypeId, attr: &str, value: &Value) -> Vec<NodeId> {
        Graph::nodes_by_attr(self, type_id, attr, value)
    }

    fn nodes_by_attr_range(
        &self,
        type_id: TypeId,
        attr: &str,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Vec<NodeId> {
        Graph::nodes_by_attr_range(self, type_id, attr, min, max)
    }

    fn edges_of_type(&self, edge_type: EdgeTypeId) -> Vec<EdgeId> {
        Graph::edges_of_type(self, edge_type)
    }

    fn edges_from(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        Graph::edges_from(self, node, edge_type)
    }

    fn edges_to(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        Graph::edges_to(self, node, edge_type)
    }

    fn edges_involving(&self, node: NodeId) -> Vec<EdgeId> {
        Graph::edges_involving(self, node)
    }

    fn edges_at(&self, edge_type: EdgeTypeId, position: usize, target: EntityId) -> Vec<EdgeId> {
        Graph::edges_at(self, edge_type, position, target)
    }

    fn edges_about(&self, edge: EdgeId) -> Vec<EdgeId> {
        Graph::edges_about(self, edge)
    }

    fn node_count(&self) -> usize {
        Graph::node_count(self)
    }

    fn edge_count(&self) -> usize {
        Graph::edge_count(self)
    }

    fn all_node_ids(&self) -> Vec<NodeId> {
        Graph::all_node_ids(self)
    }

    fn all_edge_ids(&self) -> Vec<EdgeId> {
        Graph::all_edge_ids(self)
    }

    fn has_attr_index(&self, type_id: TypeId, attr: &str) -> bool {
        Graph::has_attr_index(self, type_id, attr)
    }
}

/// The committed store overlaid with one open transaction's buffer.
pub struct TxnView<'a> {
    graph: &'a Graph,
    buffer: &'a TxnBuffer,
}

impl<'a> TxnView<'a> {
    pub fn new(graph: &'a Graph, buffer: &'a TxnBuffer) -> Self {
        Self { graph, buffer }
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn buffer(&self) -> &TxnBuffer {
        self.buffer
    }

    fn merge_node_ids(&self, mut committed: Vec<NodeId>, created: Vec<NodeId>) -> Vec<NodeId> {
        committed.retain(|id| !self.buffer.is_deleted_node(*id));
        committed.extend(created);
        committed.sort();
        committed.dedup();
        committed
    }

    fn merge_edge_ids(&self, mut committed: Vec<EdgeId>, created: Vec<EdgeId>) -> Vec<EdgeId> {
        committed.retain(|id| !self.buffer.is_deleted_edge(*id));
        committed.extend(created);
        committed.sort();
        committed.dedup();
        committed
    }

    fn view_attr_matches(&self, id: NodeId, attr: &str, value: &Value) -> bool {
        self.node_attr(id, attr)
            .map(|v| values_equal(&v, value))
            .unwrap_or(false)
    }

    fn view_attr_in_range(
        &self,
        id: NodeId,
        attr: &str,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> bool {
        let Some(value) = self.node_attr(id, attr) else {
            return false;
        };
        if value.is_null() {
            return false;
        }
        let lo_ok = min
            .map(|m| value.cmp_sortable(m) != std::cmp::Ordering::Less)
            .unwrap_or(true);
        let hi_ok = max
            .map(|m| value.cmp_sortable(m) != std::cmp::Ordering::Greater)
            .unwrap_or(true);
        lo_ok && hi_ok
    }
}

impl GraphRead for TxnView<'_> {
    fn node(&self, id: NodeId) -> Option<Cow<'_, Node>> {
        if self.buffer.is_deleted_node(id) {
            return None;
        }
        if let Some(created) = self.buffer.created_node(id) {
            return Some(Cow::Owned(self.buffer.overlay_node(created.clone())));
        }
        let committed = self.graph.get_node(id)?;
        if self.buffer.has_overlay(EntityId::Node(id)) {
            Some(Cow::Owned(self.buffer.overlay_node(committed.clone())))
        } else {
            Some(Cow::Borrowed(committed))
        }
    }

    fn edge(&self, id: EdgeId) -> Option<Cow<'_, Edge>> {
        if self.buffer.is_deleted_edge(id) {
            return None;
        }
        if let Some(created) = self.buffer.created_edge(id) {
            return Some(Cow::Owned(self.buffer.overlay_edge(created.clone())));
        }
        let committed = self.graph.get_edge(id)?;
        if self.buffer.has_overlay(EntityId::Edge(id)) {
            Some(Cow::Owned(self.buffer.overlay_edge(committed.clone())))
        } else {
            Some(Cow::Borrowed(committed))
        }
    }

    fn nodes_of_type(&self, type_id: TypeId) -> Vec<NodeId> {
        let created = self
            .buffer
            .live_created_nodes()
            .filter(|n| n.type_id == type_id)
            .map(|n| n.id)
            .collect();
        self.merge_node_ids(self.graph.nodes_of_type(type_id), created)
    }

    fn nodes_by_attr(&self, type_id: TypeId, attr: &str, value: &Value) -> Vec<NodeId> {
        // Committed candidates, re-checked against the overlay view:
        // an overlay may have moved a node out of (or into) the match set.
        let mut out: Vec<NodeId> = self
            .graph
            .nodes_by_attr(type_id, attr, value)
            .into_iter()
            .filter(|id| !self.buffer.is_deleted_node(*id))
            .filter(|id| self.view_attr_matches(*id, attr, value))
            .collect();

        for node in self.buffer.live_created_nodes() {
            if node.type_id == type_id && self.view_attr_matches(node.id, attr, value) {
                out.push(node.id);
            }
        }
        for id in self.buffer.overlaid_committed_nodes() {
            if self.buffer.is_deleted_node(id) {
                continue;
            }
            if let Some(node) = self.graph.get_node(id) {
                if node.type_id == type_id && self.view_attr_matches(id, attr, value) {
                    out.push(id);
                }
            }
        }

        out.sort();
        out.dedup();
        out
    }

    fn nodes_by_attr_range(
        &self,
        type_id: TypeId,
        attr: &str,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .graph
            .nodes_by_attr_range(type_id, attr, min, max)
            .into_iter()
            .filter(|id| !self.buffer.is_deleted_node(*id))
            .filter(|id| self.view_attr_in_range(*id, attr, min, max))
            .collect();

        for node in self.buffer.live_created_nodes() {
            if node.type_id == type_id && self.view_attr_in_range(node.id, attr, min, max) {
                out.push(node.id);
            }
        }
        for id in self.buffer.overlaid_committed_nodes() {
            if self.buffer.is_deleted_node(id) {
                continue;
            }
            if let Some(node) = self.graph.get_node(id) {
                if node.type_id == type_id && self.view_attr_in_range(id, attr, min, max) {
                    out.push(id);
                }
            }
        }

        out.sort();
        out.dedup();
        out
    }

    fn edges_of_type(&self, edge_type: EdgeTypeId) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| e.type_id == edge_type)
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_of_type(edge_type), created)
    }

    fn edges_from(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| edge_type.map(|et| e.type_id == et).unwrap_or(true))
            .filter(|e| e.targets.first() == Some(&EntityId::Node(node)))
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_from(node, edge_type), created)
    }

    fn edges_to(&self, node: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| edge_type.map(|et| e.type_id == et).unwrap_or(true))
            .filter(|e| e.targets.iter().skip(1).any(|t| t == &EntityId::Node(node)))
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_to(node, edge_type), created)
    }

    fn edges_involving(&self, node: NodeId) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| e.targets.contains(&EntityId::Node(node)))
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_involving(node), created)
    }

    fn edges_at(&self, edge_type: EdgeTypeId, position: usize, target: EntityId) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| e.type_id == edge_type && e.targets.get(position) == Some(&target))
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_at(edge_type, position, target), created)
    }

    fn edges_about(&self, edge: EdgeId) -> Vec<EdgeId> {
        let created = self
            .buffer
            .live_created_edges()
            .filter(|e| e.targets.contains(&EntityId::Edge(edge)))
            .map(|e| e.id)
            .collect();
        self.merge_edge_ids(self.graph.edges_about(edge), created)
    }

    fn node_count(&self) -> usize {
        self.all_node_ids().len()
    }

    fn edge_count(&self) -> usize {
        self.all_edge_ids().len()
    }

    fn all_node_ids(&self) -> Vec<NodeId> {
        let created = self.buffer.live_created_nodes().map(|n| n.id).collect();
        self.merge_node_ids(self.graph.all_node_ids(), created)
    }

    fn all_edge_ids(&self) -> Vec<EdgeId> {
        let created = self.buffer.live_created_edges().map(|e| e.id).collect();
        self.merge_edge_ids(self.graph.all_edge_ids(), created)
    }

    fn has_attr_index(&self, type_id: TypeId, attr: &str) -> bool {
        self.graph.has_attr_index(type_id, attr)
    }
}
