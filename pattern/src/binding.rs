//! Variable bindings for pattern matching.

use indexmap::IndexMap;
use mew_core::{EdgeId, EntityId, NodeId, Value};

/// A binding value: an entity reference or a computed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Node(NodeId),
    Edge(EdgeId),
    Value(Value),
    /// Unmatched optional variable.
    Null,
}

impl Binding {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Binding::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<EdgeId> {
        match self {
            Binding::Edge(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Binding::Node(id) => Some(EntityId::Node(*id)),
            Binding::Edge(id) => Some(EntityId::Edge(*id)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Binding::Node(id) => Value::NodeRef(*id),
            Binding::Edge(id) => Value::EdgeRef(*id),
            Binding::Value(v) => v.clone(),
            Binding::Null => Value::Null,
        }
    }
}

impl From<NodeId> for Binding {
    fn from(id: NodeId) -> Self {
        Binding::Node(id)
    }
}

impl From<EdgeId> for Binding {
    fn from(id: EdgeId) -> Self {
        Binding::Edge(id)
    }
}

impl From<EntityId> for Binding {
    fn from(id: EntityId) -> Self {
        match id {
            EntityId::Node(n) => Binding::Node(n),
            EntityId::Edge(e) => Binding::Edge(e),
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

/// A set of variable bindings. Insertion-ordered so row enumeration and
/// fingerprints stay deterministic.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: IndexMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let mut bindings = Self::new();
        bindings.insert(name, binding);
        bindings
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: impl Into<Binding>) {
        self.map.insert(name.into(), binding.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        self.map.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|s| s.as_str())
    }

    pub fn extend_with(&self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let mut new_bindings = self.clone();
        new_bindings.insert(name, binding);
        new_bindings
    }

    pub fn merge(&mut self, other: &Bindings) {
        for (name, binding) in &other.map {
            self.map.insert(name.clone(), binding.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All entity bindings, in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = (&str, EntityId)> {
        self.map
            .iter()
            .filter_map(|(k, v)| v.as_entity().map(|e| (k.as_str(), e)))
    }
}
