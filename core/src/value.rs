//! Value types for MEW attributes.
//!
//! Values are the atomic data stored in node and edge attributes.
//! MEW supports scalar types (String, Int, Float, Bool, Timestamp, Duration)
//! and reference types (NodeRef, EdgeRef).

use crate::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that can be stored in an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp as milliseconds since Unix epoch.
    Timestamp(i64),
    /// Duration in milliseconds.
    Duration(i64),
    /// Reference to a node.
    NodeRef(NodeId),
    /// Reference to an edge.
    EdgeRef(EdgeId),
    /// List of values.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<NodeId> {
        match self {
            Value::NodeRef(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_edge_ref(&self) -> Option<EdgeId> {
        match self {
            Value::EdgeRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the type name of this value, matching ontology type spellings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Timestamp(_) => "Timestamp",
            Value::Duration(_) => "Duration",
            Value::NodeRef(_) => "NodeRef",
            Value::EdgeRef(_) => "EdgeRef",
            Value::List(_) => "List",
        }
    }

    /// Check whether this value's runtime type satisfies a declared scalar
    /// type name. Null satisfies every declared type (nullability is checked
    /// separately); Int is accepted where Float is declared.
    pub fn matches_type_name(&self, declared: &str) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(_) => declared == "Bool",
            Value::Int(_) => declared == "Int" || declared == "Float" || declared == "Timestamp",
            Value::Float(_) => declared == "Float",
            Value::String(_) => declared == "String",
            Value::Timestamp(_) => declared == "Timestamp",
            Value::Duration(_) => declared == "Duration",
            Value::NodeRef(_) => declared == "NodeRef" || declared == "any",
            Value::EdgeRef(_) => declared == "EdgeRef" || declared == "any",
            Value::List(_) => declared == "List",
        }
    }

    /// Compare values for sorting. Null sorts before any other value;
    /// values of unrelated types compare equal so sorts stay stable.
    pub fn cmp_sortable(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Int(a), Value::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Float(a), Value::Int(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::NodeRef(a), Value::NodeRef(b)) => a.cmp(b),
            (Value::EdgeRef(a), Value::EdgeRef(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// A stable textual fingerprint used for grouping and distinct keys.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "∅".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("i:{}", i),
            Value::Float(f) => format!("f:{}", f.to_bits()),
            Value::String(s) => format!("s:{}", s),
            Value::Timestamp(t) => format!("ts:{}", t),
            Value::Duration(d) => format!("dur:{}", d),
            Value::NodeRef(id) => format!("n:{}", id.raw()),
            Value::EdgeRef(id) => format!("e:{}", id.raw()),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.group_key()).collect();
                format!("[{}]", inner.join(","))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Timestamp(t) => write!(f, "@{}", t),
            Value::Duration(d) => write!(f, "{}ms", d),
            Value::NodeRef(id) => write!(f, "#{}", id.raw()),
            Value::EdgeRef(id) => write!(f, "#{}", id.raw()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::NodeRef(id)
    }
}

impl From<EdgeId> for Value {
    fn from(id: EdgeId) -> Self {
        Value::EdgeRef(id)
    }
}

/// Attribute storage. Insertion-ordered so iteration is deterministic.
pub type Attributes = indexmap::IndexMap<String, Value>;

/// Helper macro to create attribute maps.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let mut map = $crate::Attributes::new();
            $(
                map.insert($key.to_string(), $crate::Value::from($value));
            )+
            map
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Float(3.15).as_float(), Some(3.15));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_matches_type_name() {
        assert!(Value::Int(1).matches_type_name("Int"));
        assert!(Value::Int(1).matches_type_name("Float"));
        assert!(!Value::Float(1.0).matches_type_name("Int"));
        assert!(Value::Null.matches_type_name("String"));
        assert!(Value::Timestamp(0).matches_type_name("Timestamp"));
    }

    #[test]
    fn test_sort_order_null_first() {
        let mut vals = vec![Value::Int(2), Value::Null, Value::Int(1)];
        vals.sort_by(|a, b| a.cmp_sortable(b));
        assert_eq!(vals, vec![Value::Null, Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_attrs_macro() {
        let empty: Attributes = attrs!();
        assert!(empty.is_empty());

        let attrs = attrs! {
            "name" => "Alice",
            "age" => 30i64,
            "active" => true,
        };
        assert_eq!(attrs.get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(attrs.get("age"), Some(&Value::Int(30)));
        assert_eq!(attrs.get("active"), Some(&Value::Bool(true)));
        // Insertion order is preserved.
        let keys: Vec<&str> = attrs.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "age", "active"]);
    }
}
