//! The Registry: immutable schema lookup.

use crate::{AttrDef, ConstraintDef, ConstraintPhase, EdgeTypeDef, RuleDef, SubtypeIndex, TypeDef};
use mew_core::{EdgeTypeId, TypeId};
use std::collections::HashMap;

/// Runtime lookup of schema definitions. Immutable after construction;
/// EXTEND builds a fresh registry and publishes it by swap.
#[derive(Debug)]
pub struct Registry {
    /// Bumped by one on every EXTEND republication.
    version: u64,

    types: HashMap<TypeId, TypeDef>,
    type_names: HashMap<String, TypeId>,
    /// Declaration order of types.
    type_order: Vec<TypeId>,

    edge_types: HashMap<EdgeTypeId, EdgeTypeDef>,
    edge_type_names: HashMap<String, EdgeTypeId>,
    edge_type_order: Vec<EdgeTypeId>,

    constraints: Vec<ConstraintDef>,
    /// Rules in declaration order.
    rules: Vec<RuleDef>,
    /// Indices into `rules` for auto rules, sorted by (priority desc,
    /// declaration order).
    auto_rule_order: Vec<usize>,

    subtype_index: SubtypeIndex,
}

impl Registry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        version: u64,
        types: HashMap<TypeId, TypeDef>,
        type_names: HashMap<String, TypeId>,
        type_order: Vec<TypeId>,
        edge_types: HashMap<EdgeTypeId, EdgeTypeDef>,
        edge_type_names: HashMap<String, EdgeTypeId>,
        edge_type_order: Vec<EdgeTypeId>,
        constraints: Vec<ConstraintDef>,
        rules: Vec<RuleDef>,
        subtype_index: SubtypeIndex,
    ) -> Self {
        let mut auto_rule_order: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.auto)
            .map(|(i, _)| i)
            .collect();
        // Stable: priority descending, then declaration order.
        auto_rule_order.sort_by(|&a, &b| {
            rules[b]
                .priority
                .cmp(&rules[a].priority)
                .then(rules[a].decl_order.cmp(&rules[b].decl_order))
        });

        Self {
            version,
            types,
            type_names,
            type_order,
            edge_types,
            edge_type_names,
            edge_type_order,
            constraints,
            rules,
            auto_rule_order,
            subtype_index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    // ==================== Type Lookups ====================

    pub fn get_type(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(&id)
    }

    pub fn get_type_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.type_names.get(name).and_then(|id| self.types.get(id))
    }

    pub fn get_type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Type definitions in declaration order.
    pub fn all_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.type_order.iter().filter_map(|id| self.types.get(id))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // ==================== Edge Type Lookups ====================

    pub fn get_edge_type(&self, id: EdgeTypeId) -> Option<&EdgeTypeDef> {
        self.edge_types.get(&id)
    }

    pub fn get_edge_type_by_name(&self, name: &str) -> Option<&EdgeTypeDef> {
        self.edge_type_names
            .get(name)
            .and_then(|id| self.edge_types.get(id))
    }

    pub fn get_edge_type_id(&self, name: &str) -> Option<EdgeTypeId> {
        self.edge_type_names.get(name).copied()
    }

    pub fn all_edge_types(&self) -> impl Iterator<Item = &EdgeTypeDef> {
        self.edge_type_order
            .iter()
            .filter_map(|id| self.edge_types.get(id))
    }

    pub fn edge_type_count(&self) -> usize {
        self.edge_types.len()
    }

    // ==================== Attribute Lookups ====================

    /// Resolve an attribute on a type, walking the inheritance chain.
    /// Own attributes shadow inherited ones.
    pub fn get_type_attr(&self, type_id: TypeId, attr_name: &str) -> Option<&AttrDef> {
        let type_def = self.types.get(&type_id)?;
        if let Some(attr) = type_def.get_attr(attr_name) {
            return Some(attr);
        }
        for &parent_id in &type_def.parent_ids {
            if let Some(attr) = self.get_type_attr(parent_id, attr_name) {
                return Some(attr);
            }
        }
        None
    }

    pub fn type_has_attr(&self, type_id: TypeId, attr_name: &str) -> bool {
        self.get_type_attr(type_id, attr_name).is_some()
    }

    /// All attributes of a type, inherited first, own last; own shadows.
    pub fn all_type_attrs(&self, type_id: TypeId) -> Vec<&AttrDef> {
        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.collect_type_attrs(type_id, &mut result, &mut seen);
        result
    }

    fn collect_type_attrs<'a>(
        &'a self,
        type_id: TypeId,
        result: &mut Vec<&'a AttrDef>,
        seen: &mut std::collections::HashSet<String>,
    ) {
        if let Some(type_def) = self.types.get(&type_id) {
            for &parent_id in &type_def.parent_ids {
                self.collect_type_attrs(parent_id, result, seen);
            }
            for (name, attr) in &type_def.attributes {
                if seen.insert(name.clone()) {
                    result.push(attr);
                }
            }
        }
    }

    /// All `(type_id, attr_name)` pairs whose declarations request an index,
    /// including each subtype of the declaring type.
    pub fn indexed_attrs(&self) -> Vec<(TypeId, String)> {
        let mut pairs = Vec::new();
        for type_def in self.all_types() {
            let mut concrete: Vec<TypeId> = vec![type_def.id];
            concrete.extend(self.subtypes_of(type_def.id));
            for (name, attr) in &type_def.attributes {
                if attr.indexed {
                    for &tid in &concrete {
                        pairs.push((tid, name.clone()));
                    }
                }
            }
        }
        pairs.sort();
        pairs.dedup();
        pairs
    }

    // ==================== Subtype Queries ====================

    /// Check if `sub` is a subtype of `super_type` (reflexive).
    pub fn is_subtype(&self, sub: TypeId, super_type: TypeId) -> bool {
        self.subtype_index.is_subtype(sub, super_type)
    }

    pub fn subtypes_of(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtype_index.subtypes_of(type_id)
    }

    pub fn supertypes_of(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtype_index.supertypes_of(type_id)
    }

    /// A type plus all of its subtypes, sorted for deterministic scans.
    pub fn concrete_types_of(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut ids = vec![type_id];
        ids.extend(self.subtypes_of(type_id));
        ids.sort();
        ids
    }

    // ==================== Constraint Lookups ====================

    pub fn all_constraints(&self) -> impl Iterator<Item = &ConstraintDef> {
        self.constraints.iter()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Constraints whose affected sets intersect the given mutation
    /// footprint, in declaration order.
    pub fn constraints_affecting(
        &self,
        node_types: &[TypeId],
        edge_types: &[EdgeTypeId],
        phase: ConstraintPhase,
    ) -> Vec<&ConstraintDef> {
        self.constraints
            .iter()
            .filter(|c| c.phase == phase)
            .filter(|c| {
                node_types.iter().any(|t| c.affected_types.contains(t))
                    || edge_types.iter().any(|e| c.affected_edge_types.contains(e))
            })
            .collect()
    }

    // ==================== Rule Lookups ====================

    pub fn all_rules(&self) -> impl Iterator<Item = &RuleDef> {
        self.rules.iter()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn get_rule_by_name(&self, name: &str) -> Option<&RuleDef> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Auto rules in firing order (priority descending, then declaration).
    pub fn auto_rules(&self) -> impl Iterator<Item = &RuleDef> {
        self.auto_rule_order.iter().map(|&i| &self.rules[i])
    }

    /// Auto rules whose affected sets intersect the mutation footprint,
    /// preserving firing order.
    pub fn auto_rules_affecting(
        &self,
        node_types: &[TypeId],
        edge_types: &[EdgeTypeId],
    ) -> Vec<&RuleDef> {
        self.auto_rules()
            .filter(|r| {
                node_types.iter().any(|t| r.affected_types.contains(t))
                    || edge_types.iter().any(|e| r.affected_edge_types.contains(e))
            })
            .collect()
    }
}
