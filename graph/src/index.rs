//! Indexes for efficient graph lookups.
//!
//! Every index stores ids in `BTreeSet`s so enumeration is always in
//! ascending id order; binding enumeration downstream inherits that
//! determinism.

use mew_core::{EdgeId, EdgeTypeId, EntityId, NodeId, TypeId, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Orderable encoding of an indexable value. Equality and range scans over
/// the attribute index go through this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    /// Total order over floats via sign-corrected bit patterns.
    Float(u64),
    Str(String),
    Timestamp(i64),
    Duration(i64),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Int(i) => Some(IndexKey::Int(*i)),
            Value::Float(f) => Some(IndexKey::Float(order_f64(*f))),
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            Value::Timestamp(t) => Some(IndexKey::Timestamp(*t)),
            Value::Duration(d) => Some(IndexKey::Duration(*d)),
            Value::NodeRef(_) | Value::EdgeRef(_) | Value::List(_) => None,
        }
    }
}

/// Map a float to a u64 whose unsigned order matches the float order.
fn order_f64(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & 0x8000_0000_0000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000_0000_0000
    }
}

/// Type index: `type_id -> set<node_id>`. Holds concrete types only;
/// parent-type scans expand through the registry's subtype closure.
#[derive(Debug, Default)]
pub struct TypeIndex {
    index: HashMap<TypeId, BTreeSet<NodeId>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_id: TypeId, node_id: NodeId) {
        self.index.entry(type_id).or_default().insert(node_id);
    }

    pub fn remove(&mut self, type_id: TypeId, node_id: NodeId) {
        if let Some(set) = self.index.get_mut(&type_id) {
            set.remove(&node_id);
            if set.is_empty() {
                self.index.remove(&type_id);
            }
        }
    }

    pub fn get(&self, type_id: TypeId) -> impl Iterator<Item = NodeId> + '_ {
        self.index
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn count(&self, type_id: TypeId) -> usize {
        self.index.get(&type_id).map(|s| s.len()).unwrap_or(0)
    }
}

/// Edge type index: `edge_type_id -> set<edge_id>`.
#[derive(Debug, Default)]
pub struct EdgeTypeIndex {
    index: HashMap<EdgeTypeId, BTreeSet<EdgeId>>,
}

impl EdgeTypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_id: EdgeTypeId, edge_id: EdgeId) {
        self.index.entry(type_id).or_default().insert(edge_id);
    }

    pub fn remove(&mut self, type_id: EdgeTypeId, edge_id: EdgeId) {
        if let Some(set) = self.index.get_mut(&type_id) {
            set.remove(&edge_id);
            if set.is_empty() {
                self.index.remove(&type_id);
            }
        }
    }

    pub fn get(&self, type_id: EdgeTypeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.index
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn count(&self, type_id: EdgeTypeId) -> usize {
        self.index.get(&type_id).map(|s| s.len()).unwrap_or(0)
    }
}

/// Attribute index: `(type_id, attr) -> value -> set<node_id>`, ordered by
/// value for range scans. Only registered `(type, attr)` pairs (declared
/// `[indexed]`/`[unique]`, or CREATE INDEX) are maintained.
#[derive(Debug, Default)]
pub struct AttributeIndex {
    registered: BTreeSet<(TypeId, String)>,
    index: HashMap<(TypeId, String), BTreeMap<IndexKey, BTreeSet<NodeId>>>,
}

impl AttributeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_id: TypeId, attr: &str) -> bool {
        self.registered.insert((type_id, attr.to_string()))
    }

    pub fn unregister(&mut self, type_id: TypeId, attr: &str) -> bool {
        let key = (type_id, attr.to_string());
        self.index.remove(&key);
        self.registered.remove(&key)
    }

    pub fn is_registered(&self, type_id: TypeId, attr: &str) -> bool {
        self.registered.contains(&(type_id, attr.to_string()))
    }

    /// Registered pairs in sorted order.
    pub fn registered_pairs(&self) -> impl Iterator<Item = &(TypeId, String)> {
        self.registered.iter()
    }

    pub fn insert(&mut self, type_id: TypeId, attr: &str, value: &Value, node_id: NodeId) {
        if !self.is_registered(type_id, attr) {
            return;
        }
        if let Some(key) = IndexKey::from_value(value) {
            self.index
                .entry((type_id, attr.to_string()))
                .or_default()
                .entry(key)
                .or_default()
                .insert(node_id);
        }
    }

    pub fn remove(&mut self, type_id: TypeId, attr: &str, value: &Value, node_id: NodeId) {
        let Some(key) = IndexKey::from_value(value) else {
            return;
        };
        if let Some(by_value) = self.index.get_mut(&(type_id, attr.to_string())) {
            if let Some(set) = by_value.get_mut(&key) {
                set.remove(&node_id);
                if set.is_empty() {
                    by_value.remove(&key);
                }
            }
        }
    }

    pub fn find_exact(&self, type_id: TypeId, attr: &str, value: &Value) -> Vec<NodeId> {
        let Some(key) = IndexKey::from_value(value) else {
            return Vec::new();
        };
        self.index
            .get(&(type_id, attr.to_string()))
            .and_then(|by_value| by_value.get(&key))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Inclusive range scan. `None` bounds are open.
    pub fn find_range(
        &self,
        type_id: TypeId,
        attr: &str,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Vec<NodeId> {
        let Some(by_value) = self.index.get(&(type_id, attr.to_string())) else {
            return Vec::new();
        };
        let min_key = min.and_then(IndexKey::from_value);
        let max_key = max.and_then(IndexKey::from_value);

        let mut out: Vec<NodeId> = Vec::new();
        for (key, set) in by_value.iter() {
            if key == &IndexKey::Null {
                continue;
            }
            if let Some(ref lo) = min_key {
                if key < lo {
                    continue;
                }
            }
            if let Some(ref hi) = max_key {
                if key > hi {
                    break;
                }
            }
            out.extend(set.iter().copied());
        }
        out.sort();
        out
    }
}

/// Adjacency per node: outbound edges (node at position 0), inbound edges
/// (node at any later position), and the union of both.
#[derive(Debug, Default)]
struct NodeAdjacency {
    outbound: HashMap<EdgeTypeId, BTreeSet<EdgeId>>,
    inbound: HashMap<EdgeTypeId, BTreeSet<EdgeId>>,
    all: BTreeSet<EdgeId>,
}

/// Adjacency index: `node_id -> (outbound, inbound)` by edge type.
#[derive(Debug, Default)]
pub struct AdjacencyIndex {
    index: HashMap<NodeId, NodeAdjacency>,
}

impl AdjacencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge_id: EdgeId, edge_type_id: EdgeTypeId, targets: &[EntityId]) {
        for (pos, target) in targets.iter().enumerate() {
            if let EntityId::Node(node_id) = target {
                let adj = self.index.entry(*node_id).or_default();
                adj.all.insert(edge_id);
                let side = if pos == 0 {
                    &mut adj.outbound
                } else {
                    &mut adj.inbound
                };
                side.entry(edge_type_id).or_default().insert(edge_id);
            }
        }
    }

    pub fn remove(&mut self, edge_id: EdgeId, edge_type_id: EdgeTypeId, targets: &[EntityId]) {
        for (pos, target) in targets.iter().enumerate() {
            if let EntityId::Node(node_id) = target {
                if let Some(adj) = self.index.get_mut(node_id) {
                    adj.all.remove(&edge_id);
                    let side = if pos == 0 {
                        &mut adj.outbound
                    } else {
                        &mut adj.inbound
                    };
                    if let Some(set) = side.get_mut(&edge_type_id) {
                        set.remove(&edge_id);
                        if set.is_empty() {
                            side.remove(&edge_type_id);
                        }
                    }
                    if adj.all.is_empty() {
                        self.index.remove(node_id);
                    }
                }
            }
        }
    }

    pub fn edges_from(&self, node_id: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        self.collect_side(node_id, edge_type, true)
    }

    pub fn edges_to(&self, node_id: NodeId, edge_type: Option<EdgeTypeId>) -> Vec<EdgeId> {
        self.collect_side(node_id, edge_type, false)
    }

    fn collect_side(
        &self,
        node_id: NodeId,
        edge_type: Option<EdgeTypeId>,
        outbound: bool,
    ) -> Vec<EdgeId> {
        let Some(adj) = self.index.get(&node_id) else {
            return Vec::new();
        };
        let side = if outbound { &adj.outbound } else { &adj.inbound };
        let mut out: Vec<EdgeId> = match edge_type {
            Some(et) => side
                .get(&et)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            None => side.values().flat_map(|set| set.iter().copied()).collect(),
        };
        out.sort();
        out
    }

    pub fn edges_involving(&self, node_id: NodeId) -> Vec<EdgeId> {
        self.index
            .get(&node_id)
            .map(|adj| adj.all.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Edge position index: `(edge_type, position, target) -> set<edge_id>`,
/// answering "edges of type T whose position p is X".
#[derive(Debug, Default)]
pub struct EdgePositionIndex {
    index: HashMap<(EdgeTypeId, usize, EntityId), BTreeSet<EdgeId>>,
}

impl EdgePositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge_id: EdgeId, edge_type_id: EdgeTypeId, targets: &[EntityId]) {
        for (pos, target) in targets.iter().enumerate() {
            self.index
                .entry((edge_type_id, pos, *target))
                .or_default()
                .insert(edge_id);
        }
    }

    pub fn remove(&mut self, edge_id: EdgeId, edge_type_id: EdgeTypeId, targets: &[EntityId]) {
        for (pos, target) in targets.iter().enumerate() {
            let key = (edge_type_id, pos, *target);
            if let Some(set) = self.index.get_mut(&key) {
                set.remove(&edge_id);
                if set.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, edge_type_id: EdgeTypeId, position: usize, target: EntityId) -> Vec<EdgeId> {
        self.index
            .get(&(edge_type_id, position, target))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Higher-order index: `edge_id -> set<edge_id>` of edges whose targets
/// include this edge. Drives cascade on UNLINK.
#[derive(Debug, Default)]
pub struct HigherOrderIndex {
    index: HashMap<EdgeId, BTreeSet<EdgeId>>,
}

impl HigherOrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target_edge_id: EdgeId, meta_edge_id: EdgeId) {
        self.index
            .entry(target_edge_id)
            .or_default()
            .insert(meta_edge_id);
    }

    pub fn remove(&mut self, target_edge_id: EdgeId, meta_edge_id: EdgeId) {
        if let Some(set) = self.index.get_mut(&target_edge_id) {
            set.remove(&meta_edge_id);
            if set.is_empty() {
                self.index.remove(&target_edge_id);
            }
        }
    }

    pub fn edges_about(&self, edge_id: EdgeId) -> Vec<EdgeId> {
        self.index
            .get(&edge_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
