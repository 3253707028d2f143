//! Variable scopes.

use indexmap::IndexMap;
use mew_core::{EdgeTypeId, TypeId};

/// What a variable denotes during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Node(TypeId),
    AnyNode,
    Edge(EdgeTypeId),
    AnyEdge,
}

/// A stack of binding frames. Session-level bindings sit in the outermost
/// frame; each pattern opens a new one.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<IndexMap<String, VarType>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![IndexMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(IndexMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Declare in the innermost frame. Returns false when the name is
    /// already taken there.
    pub fn declare(&mut self, name: impl Into<String>, var_type: VarType) -> bool {
        let frame = self.frames.last_mut().expect("scope has a frame");
        let name = name.into();
        if frame.contains_key(&name) {
            return false;
        }
        frame.insert(name, var_type);
        true
    }

    /// Innermost binding wins.
    pub fn lookup(&self, name: &str) -> Option<VarType> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing_and_frames() {
        let mut scope = Scope::new();
        assert!(scope.declare("t", VarType::AnyNode));
        assert!(!scope.declare("t", VarType::AnyNode));

        scope.push();
        assert!(scope.declare("t", VarType::Node(TypeId::new(1))));
        assert_eq!(scope.lookup("t"), Some(VarType::Node(TypeId::new(1))));

        scope.pop();
        assert_eq!(scope.lookup("t"), Some(VarType::AnyNode));
        assert_eq!(scope.lookup("missing"), None);
    }
}
