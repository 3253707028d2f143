//! RegistryBuilder: staged construction of an immutable Registry.

use crate::{
    AttrDef, Cardinality, ConstraintDef, ConstraintPhase, EdgeParam, EdgeTypeDef, OnKill,
    ParamKind, Registry, RuleDef, SubtypeIndex, TypeDef,
};
use indexmap::IndexMap;
use mew_core::{EdgeTypeId, TypeId};
use mew_parser::{Expr, MutationAction, Pattern, PatternElem};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur during registry construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate type name: {0}")]
    DuplicateTypeName(String),

    #[error("Duplicate edge type name: {0}")]
    DuplicateEdgeTypeName(String),

    #[error("Duplicate attribute '{attr}' on '{owner}'")]
    DuplicateAttribute { owner: String, attr: String },

    #[error("Unknown parent type '{parent}' of '{child}'")]
    UnknownParentType { child: String, parent: String },

    #[error("Inheritance cycle detected involving type: {0}")]
    InheritanceCycle(String),

    #[error("Unknown type '{type_name}' in signature of edge '{edge}'")]
    UnknownParamType { edge: String, type_name: String },

    #[error("Unknown edge type '{referenced}' in signature of edge '{edge}'")]
    UnknownParamEdgeType { edge: String, referenced: String },

    #[error("Unknown type '{type_name}' referenced by '{owner}'")]
    UnknownTypeReference { owner: String, type_name: String },

    #[error("Unknown parameter '{param}' in cardinality on edge '{edge}'")]
    UnknownCardinalityParam { edge: String, param: String },

    #[error("Invalid match pattern on '{owner}.{attr}': {source}")]
    InvalidMatchPattern {
        owner: String,
        attr: String,
        source: regex_lite::Error,
    },

    #[error("Duplicate constraint name: {0}")]
    DuplicateConstraintName(String),

    #[error("Duplicate rule name: {0}")]
    DuplicateRuleName(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Staged edge parameter before param-type resolution.
#[derive(Debug, Clone)]
struct StagedParam {
    name: String,
    /// `Type`, `any`, `edge<any>`, `edge<name>`.
    spec: String,
}

#[derive(Debug, Clone)]
struct StagedEdge {
    def: EdgeTypeDef,
    params: Vec<StagedParam>,
    cardinality_by_param: Vec<(String, Cardinality)>,
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    version: u64,
    next_type_id: u32,
    next_edge_type_id: u32,
    next_constraint_id: u32,
    next_rule_id: u32,
    next_decl_order: usize,

    types: HashMap<TypeId, TypeDef>,
    type_names: HashMap<String, TypeId>,
    type_order: Vec<TypeId>,
    /// Parent names awaiting resolution, per type.
    pending_parents: HashMap<TypeId, Vec<String>>,

    staged_edges: Vec<StagedEdge>,
    edge_type_names: HashMap<String, EdgeTypeId>,

    constraints: Vec<ConstraintDef>,
    rules: Vec<RuleDef>,

    /// Already-resolved edges carried over from an existing registry.
    carried_edges: Vec<EdgeTypeDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from an existing registry: the EXTEND path. Existing
    /// declarations are carried over unchanged and keep their handles.
    pub fn from_registry(registry: &Registry) -> Self {
        let mut builder = Self::new();
        builder.version = registry.version() + 1;

        let mut max_type = 0;
        for def in registry.all_types() {
            max_type = max_type.max(def.id.raw() + 1);
            builder.type_names.insert(def.name.clone(), def.id);
            builder.type_order.push(def.id);
            builder.types.insert(def.id, def.clone());
        }
        builder.next_type_id = max_type;

        let mut max_edge = 0;
        for def in registry.all_edge_types() {
            max_edge = max_edge.max(def.id.raw() + 1);
            builder.edge_type_names.insert(def.name.clone(), def.id);
            builder.carried_edges.push(def.clone());
        }
        builder.next_edge_type_id = max_edge;

        for c in registry.all_constraints() {
            builder.next_constraint_id = builder.next_constraint_id.max(c.id + 1);
            builder.next_decl_order = builder.next_decl_order.max(c.decl_order + 1);
            builder.constraints.push(c.clone());
        }
        for r in registry.all_rules() {
            builder.next_rule_id = builder.next_rule_id.max(r.id + 1);
            builder.next_decl_order = builder.next_decl_order.max(r.decl_order + 1);
            builder.rules.push(r.clone());
        }

        builder
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.type_names.contains_key(name)
    }

    pub fn has_edge_type(&self, name: &str) -> bool {
        self.edge_type_names.contains_key(name)
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraints.iter().any(|c| c.name == name)
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    /// Start a node type definition.
    pub fn add_type(&mut self, name: impl Into<String>) -> TypeBuilder<'_> {
        let name = name.into();
        let id = TypeId::new(self.next_type_id);
        self.next_type_id += 1;
        TypeBuilder {
            builder: self,
            id,
            name,
            parents: Vec::new(),
            attributes: IndexMap::new(),
            is_abstract: false,
        }
    }

    /// Start an edge type definition.
    pub fn add_edge_type(&mut self, name: impl Into<String>) -> EdgeTypeBuilder<'_> {
        let name = name.into();
        let id = EdgeTypeId::new(self.next_edge_type_id);
        self.next_edge_type_id += 1;
        EdgeTypeBuilder {
            builder: self,
            id,
            name,
            params: Vec::new(),
            attributes: IndexMap::new(),
            symmetric: false,
            unique: false,
            no_self: false,
            acyclic: false,
            on_kill: Vec::new(),
            cardinality_by_param: Vec::new(),
        }
    }

    /// Start a constraint definition.
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        pattern: Pattern,
        condition: Expr,
    ) -> ConstraintBuilder<'_> {
        let id = self.next_constraint_id;
        self.next_constraint_id += 1;
        let decl_order = self.next_decl_order;
        self.next_decl_order += 1;
        ConstraintBuilder {
            builder: self,
            def: ConstraintDef {
                id,
                name: name.into(),
                pattern,
                condition,
                hard: true,
                phase: ConstraintPhase::Immediate,
                message: None,
                affected_types: HashSet::new(),
                affected_edge_types: HashSet::new(),
                decl_order,
            },
        }
    }

    /// Start a rule definition. Rules default to auto.
    pub fn add_rule(
        &mut self,
        name: impl Into<String>,
        pattern: Pattern,
        production: Vec<MutationAction>,
    ) -> RuleBuilder<'_> {
        let id = self.next_rule_id;
        self.next_rule_id += 1;
        let decl_order = self.next_decl_order;
        self.next_decl_order += 1;
        RuleBuilder {
            builder: self,
            def: RuleDef {
                id,
                name: name.into(),
                pattern,
                production,
                priority: 0,
                auto: true,
                affected_types: HashSet::new(),
                affected_edge_types: HashSet::new(),
                referenced_attrs: Vec::new(),
                decl_order,
            },
        }
    }

    /// Finalize: resolve names, validate, and freeze.
    pub fn build(mut self) -> RegistryResult<Registry> {
        // Resolve parent names.
        for (type_id, parent_names) in std::mem::take(&mut self.pending_parents) {
            let child_name = self.types[&type_id].name.clone();
            let mut parent_ids = Vec::new();
            for parent in parent_names {
                let parent_id = self.type_names.get(&parent).copied().ok_or_else(|| {
                    RegistryError::UnknownParentType {
                        child: child_name.clone(),
                        parent: parent.clone(),
                    }
                })?;
                parent_ids.push(parent_id);
            }
            self.types.get_mut(&type_id).unwrap().parent_ids = parent_ids;
        }

        self.check_inheritance_cycles()?;

        // Resolve staged edge parameter specs.
        let mut edge_types: HashMap<EdgeTypeId, EdgeTypeDef> = HashMap::new();
        let mut edge_type_order: Vec<EdgeTypeId> = Vec::new();
        for def in std::mem::take(&mut self.carried_edges) {
            edge_type_order.push(def.id);
            edge_types.insert(def.id, def);
        }
        for staged in std::mem::take(&mut self.staged_edges) {
            let mut def = staged.def;
            for param in &staged.params {
                let kind = self.resolve_param_kind(&def.name, &param.spec)?;
                def.params.push(EdgeParam {
                    name: param.name.clone(),
                    kind,
                });
            }
            def.cardinality = vec![Cardinality::default(); def.params.len()];
            for (param_name, bound) in &staged.cardinality_by_param {
                let position = def
                    .params
                    .iter()
                    .position(|p| &p.name == param_name)
                    .ok_or_else(|| RegistryError::UnknownCardinalityParam {
                        edge: def.name.clone(),
                        param: param_name.clone(),
                    })?;
                def.cardinality[position] = *bound;
            }
            while def.on_kill.len() < def.params.len() {
                def.on_kill.push(OnKill::Unlink);
            }
            edge_type_order.push(def.id);
            edge_types.insert(def.id, def);
        }

        let subtype_index = SubtypeIndex::build(&self.types);

        // Precompute affected sets now that the subtype closure exists.
        let all_type_ids: Vec<TypeId> = self.type_order.clone();
        let all_edge_ids: Vec<EdgeTypeId> = edge_type_order.clone();
        for constraint in &mut self.constraints {
            if constraint.affected_types.is_empty() && constraint.affected_edge_types.is_empty() {
                let (types, edges) = pattern_footprint(
                    &constraint.pattern,
                    &self.type_names,
                    &self.edge_type_names,
                    &edge_types,
                    &subtype_index,
                    &all_type_ids,
                    &all_edge_ids,
                )
                .map_err(|type_name| RegistryError::UnknownTypeReference {
                    owner: constraint.name.clone(),
                    type_name,
                })?;
                constraint.affected_types = types;
                constraint.affected_edge_types = edges;
            }
        }
        for rule in &mut self.rules {
            if rule.affected_types.is_empty() && rule.affected_edge_types.is_empty() {
                let (types, edges) = pattern_footprint(
                    &rule.pattern,
                    &self.type_names,
                    &self.edge_type_names,
                    &edge_types,
                    &subtype_index,
                    &all_type_ids,
                    &all_edge_ids,
                )
                .map_err(|type_name| RegistryError::UnknownTypeReference {
                    owner: rule.name.clone(),
                    type_name,
                })?;
                rule.affected_types = types;
                rule.affected_edge_types = edges;
                rule.referenced_attrs = referenced_attrs(&rule.pattern);
            }
        }

        Ok(Registry::new(
            self.version,
            self.types,
            self.type_names,
            self.type_order,
            edge_types,
            self.edge_type_names,
            edge_type_order,
            self.constraints,
            self.rules,
            subtype_index,
        ))
    }

    fn resolve_param_kind(&self, edge_name: &str, spec: &str) -> RegistryResult<ParamKind> {
        if spec == "any" {
            return Ok(ParamKind::AnyEntity);
        }
        if let Some(inner) = spec.strip_prefix("edge<").and_then(|s| s.strip_suffix('>')) {
            if inner == "any" {
                return Ok(ParamKind::Edge(None));
            }
            let referenced = self.edge_type_names.get(inner).copied().ok_or_else(|| {
                RegistryError::UnknownParamEdgeType {
                    edge: edge_name.to_string(),
                    referenced: inner.to_string(),
                }
            })?;
            return Ok(ParamKind::Edge(Some(referenced)));
        }
        let type_id = self
            .type_names
            .get(spec)
            .copied()
            .ok_or_else(|| RegistryError::UnknownParamType {
                edge: edge_name.to_string(),
                type_name: spec.to_string(),
            })?;
        Ok(ParamKind::Node(type_id))
    }

    fn check_inheritance_cycles(&self) -> RegistryResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        let mut marks: HashMap<TypeId, Mark> =
            self.types.keys().map(|&id| (id, Mark::Unvisited)).collect();

        fn visit(
            id: TypeId,
            types: &HashMap<TypeId, TypeDef>,
            marks: &mut HashMap<TypeId, Mark>,
        ) -> Result<(), TypeId> {
            match marks[&id] {
                Mark::Done => return Ok(()),
                Mark::Visiting => return Err(id),
                Mark::Unvisited => {}
            }
            marks.insert(id, Mark::Visiting);
            for &parent in &types[&id].parent_ids {
                visit(parent, types, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for &id in self.types.keys() {
            if let Err(cycle_id) = visit(id, &self.types, &mut marks) {
                let name = self.types[&cycle_id].name.clone();
                return Err(RegistryError::InheritanceCycle(name));
            }
        }
        Ok(())
    }
}

/// Compute the node/edge types whose mutation could affect a pattern.
/// Node types are closed over subtypes; `any` widens to every type.
/// Returns `Err(type_name)` on an unknown reference.
#[allow(clippy::too_many_arguments)]
fn pattern_footprint(
    pattern: &Pattern,
    type_names: &HashMap<String, TypeId>,
    edge_type_names: &HashMap<String, EdgeTypeId>,
    edge_types: &HashMap<EdgeTypeId, EdgeTypeDef>,
    subtype_index: &SubtypeIndex,
    all_types: &[TypeId],
    all_edges: &[EdgeTypeId],
) -> Result<(HashSet<TypeId>, HashSet<EdgeTypeId>), String> {
    let mut types = HashSet::new();
    let mut edges = HashSet::new();

    let mut add_type_closed = |id: TypeId, types: &mut HashSet<TypeId>| {
        types.insert(id);
        for sub in subtype_index.subtypes_of(id) {
            types.insert(sub);
        }
    };

    for elem in &pattern.elements {
        match elem {
            PatternElem::Node(node) => {
                if node.type_name == "any" {
                    types.extend(all_types.iter().copied());
                } else {
                    let id = type_names
                        .get(&node.type_name)
                        .copied()
                        .ok_or_else(|| node.type_name.clone())?;
                    add_type_closed(id, &mut types);
                }
            }
            PatternElem::Edge(edge) => {
                if edge.edge_type == "any" {
                    edges.extend(all_edges.iter().copied());
                } else {
                    let id = edge_type_names
                        .get(&edge.edge_type)
                        .copied()
                        .ok_or_else(|| edge.edge_type.clone())?;
                    edges.insert(id);
                    if let Some(def) = edge_types.get(&id) {
                        for param in &def.params {
                            if let ParamKind::Node(tid) = param.kind {
                                add_type_closed(tid, &mut types);
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((types, edges))
}

/// Collect `var.attr` pairs read by a pattern's WHERE clause. These feed
/// the rule-activation fingerprint.
fn referenced_attrs(pattern: &Pattern) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    if let Some(expr) = &pattern.where_clause {
        collect_attr_refs(expr, &mut refs);
    }
    refs.sort();
    refs.dedup();
    refs
}

fn collect_attr_refs(expr: &Expr, refs: &mut Vec<(String, String)>) {
    match expr {
        Expr::AttrAccess(base, attr, _) => {
            if let Expr::Var(var, _) = base.as_ref() {
                refs.push((var.clone(), attr.clone()));
            }
            collect_attr_refs(base, refs);
        }
        Expr::BinaryOp(_, left, right, _) => {
            collect_attr_refs(left, refs);
            collect_attr_refs(right, refs);
        }
        Expr::UnaryOp(_, operand, _) => collect_attr_refs(operand, refs),
        Expr::FnCall(fc) => {
            for arg in &fc.args {
                collect_attr_refs(arg, refs);
            }
        }
        Expr::Exists(_, where_clause, _) | Expr::NotExists(_, where_clause, _) => {
            if let Some(inner) = where_clause {
                collect_attr_refs(inner, refs);
            }
        }
        Expr::List(items, _) => {
            for item in items {
                collect_attr_refs(item, refs);
            }
        }
        Expr::Literal(_) | Expr::Var(_, _) | Expr::IdRef(_, _) | Expr::Param(_, _) => {}
    }
}

// ==================== Fluent sub-builders ====================

pub struct TypeBuilder<'b> {
    builder: &'b mut RegistryBuilder,
    id: TypeId,
    name: String,
    parents: Vec<String>,
    attributes: IndexMap<String, AttrDef>,
    is_abstract: bool,
}

impl<'b> TypeBuilder<'b> {
    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parents.push(name.into());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn attr(mut self, attr: AttrDef) -> Self {
        self.attributes.insert(attr.name.clone(), attr);
        self
    }

    pub fn try_attr(mut self, attr: AttrDef) -> RegistryResult<Self> {
        if self.attributes.contains_key(&attr.name) {
            return Err(RegistryError::DuplicateAttribute {
                owner: self.name.clone(),
                attr: attr.name,
            });
        }
        self.attributes.insert(attr.name.clone(), attr);
        Ok(self)
    }

    pub fn done(self) -> RegistryResult<TypeId> {
        if self.builder.type_names.contains_key(&self.name) {
            return Err(RegistryError::DuplicateTypeName(self.name));
        }
        let mut def = TypeDef::new(self.id, self.name.clone());
        def.attributes = self.attributes;
        def.is_abstract = self.is_abstract;

        self.builder.type_names.insert(self.name, self.id);
        self.builder.type_order.push(self.id);
        self.builder.types.insert(self.id, def);
        self.builder.pending_parents.insert(self.id, self.parents);
        Ok(self.id)
    }
}

pub struct EdgeTypeBuilder<'b> {
    builder: &'b mut RegistryBuilder,
    id: EdgeTypeId,
    name: String,
    params: Vec<StagedParam>,
    attributes: IndexMap<String, AttrDef>,
    symmetric: bool,
    unique: bool,
    no_self: bool,
    acyclic: bool,
    on_kill: Vec<OnKill>,
    cardinality_by_param: Vec<(String, Cardinality)>,
}

impl<'b> EdgeTypeBuilder<'b> {
    /// Add a positional parameter. The spec is a node type name, `any`,
    /// `edge<any>`, or `edge<name>`.
    pub fn param(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.params.push(StagedParam {
            name: name.into(),
            spec: spec.into(),
        });
        self.on_kill.push(OnKill::Unlink);
        self
    }

    pub fn attr(mut self, attr: AttrDef) -> Self {
        self.attributes.insert(attr.name.clone(), attr);
        self
    }

    pub fn symmetric(mut self) -> Self {
        self.symmetric = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn no_self(mut self) -> Self {
        self.no_self = true;
        self
    }

    pub fn acyclic(mut self) -> Self {
        self.acyclic = true;
        self
    }

    /// Set the on-kill policy for a position (0-based).
    pub fn on_kill(mut self, position: usize, action: OnKill) -> Self {
        while self.on_kill.len() <= position {
            self.on_kill.push(OnKill::Unlink);
        }
        self.on_kill[position] = action;
        self
    }

    pub fn cardinality(mut self, param: impl Into<String>, min: i64, max: Option<i64>) -> Self {
        self.cardinality_by_param
            .push((param.into(), Cardinality { min, max }));
        self
    }

    pub fn done(self) -> RegistryResult<EdgeTypeId> {
        if self.builder.edge_type_names.contains_key(&self.name) {
            return Err(RegistryError::DuplicateEdgeTypeName(self.name));
        }
        let mut def = EdgeTypeDef::new(self.id, self.name.clone());
        def.attributes = self.attributes;
        def.symmetric = self.symmetric;
        def.unique = self.unique;
        def.no_self = self.no_self;
        def.acyclic = self.acyclic;
        def.on_kill = self.on_kill;

        self.builder.edge_type_names.insert(self.name, self.id);
        self.builder.staged_edges.push(StagedEdge {
            def,
            params: self.params,
            cardinality_by_param: self.cardinality_by_param,
        });
        Ok(self.id)
    }
}

pub struct ConstraintBuilder<'b> {
    builder: &'b mut RegistryBuilder,
    def: ConstraintDef,
}

impl<'b> ConstraintBuilder<'b> {
    pub fn soft(mut self) -> Self {
        self.def.hard = false;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.def.phase = ConstraintPhase::Deferred;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.def.message = Some(message.into());
        self
    }

    pub fn done(self) -> RegistryResult<u32> {
        if self.builder.has_constraint(&self.def.name) {
            return Err(RegistryError::DuplicateConstraintName(self.def.name));
        }
        let id = self.def.id;
        self.builder.constraints.push(self.def);
        Ok(id)
    }
}

pub struct RuleBuilder<'b> {
    builder: &'b mut RegistryBuilder,
    def: RuleDef,
}

impl<'b> RuleBuilder<'b> {
    pub fn priority(mut self, priority: i64) -> Self {
        self.def.priority = priority;
        self
    }

    pub fn manual(mut self) -> Self {
        self.def.auto = false;
        self
    }

    pub fn done(self) -> RegistryResult<u32> {
        if self.builder.has_rule(&self.def.name) {
            return Err(RegistryError::DuplicateRuleName(self.def.name));
        }
        let id = self.def.id;
        self.builder.rules.push(self.def);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_parser::{NodePattern, Span};

    fn node_pattern(var: &str, type_name: &str) -> Pattern {
        Pattern {
            elements: vec![PatternElem::Node(NodePattern {
                var: var.to_string(),
                type_name: type_name.to_string(),
                span: Span::default(),
            })],
            where_clause: None,
            span: Span::default(),
        }
    }

    #[test]
    fn test_build_simple_registry() {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String").required())
            .done()
            .unwrap();
        builder
            .add_type("Person")
            .attr(AttrDef::new("name", "String"))
            .done()
            .unwrap();
        builder
            .add_edge_type("owns")
            .param("owner", "Person")
            .param("task", "Task")
            .done()
            .unwrap();

        let registry = builder.build().unwrap();
        assert_eq!(registry.type_count(), 2);
        assert_eq!(registry.edge_type_count(), 1);

        let owns = registry.get_edge_type_by_name("owns").unwrap();
        assert_eq!(owns.arity(), 2);
        let person_id = registry.get_type_id("Person").unwrap();
        assert_eq!(owns.params[0].kind, ParamKind::Node(person_id));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Task").done().unwrap();
        let result = builder.add_type("Task").done();
        assert!(matches!(result, Err(RegistryError::DuplicateTypeName(_))));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Task").parent("Missing").done().unwrap();
        assert!(matches!(
            builder.build(),
            Err(RegistryError::UnknownParentType { .. })
        ));
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("A").parent("B").done().unwrap();
        builder.add_type("B").parent("A").done().unwrap();
        assert!(matches!(
            builder.build(),
            Err(RegistryError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn test_higher_order_param_resolution() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Note").done().unwrap();
        builder
            .add_edge_type("annotates")
            .param("note", "Note")
            .param("about", "edge<any>")
            .done()
            .unwrap();

        let registry = builder.build().unwrap();
        let annotates = registry.get_edge_type_by_name("annotates").unwrap();
        assert_eq!(annotates.params[1].kind, ParamKind::Edge(None));
    }

    #[test]
    fn test_constraint_footprint_includes_subtypes() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Item").done().unwrap();
        builder.add_type("Task").parent("Item").done().unwrap();
        let pattern = node_pattern("i", "Item");
        let condition = Expr::Literal(mew_parser::Literal {
            kind: mew_parser::LiteralKind::Bool(true),
            span: Span::default(),
        });
        builder.add_constraint("c", pattern, condition).done().unwrap();

        let registry = builder.build().unwrap();
        let constraint = registry.all_constraints().next().unwrap();
        let item = registry.get_type_id("Item").unwrap();
        let task = registry.get_type_id("Task").unwrap();
        assert!(constraint.affected_types.contains(&item));
        assert!(constraint.affected_types.contains(&task));
    }

    #[test]
    fn test_auto_rules_ordered_by_priority_then_declaration() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Task").done().unwrap();
        let cond_pattern = || node_pattern("t", "Task");

        builder
            .add_rule("low", cond_pattern(), vec![])
            .priority(10)
            .done()
            .unwrap();
        builder
            .add_rule("high", cond_pattern(), vec![])
            .priority(50)
            .done()
            .unwrap();
        builder
            .add_rule("also_high", cond_pattern(), vec![])
            .priority(50)
            .done()
            .unwrap();

        let registry = builder.build().unwrap();
        let names: Vec<&str> = registry.auto_rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "also_high", "low"]);
    }

    #[test]
    fn test_extend_keeps_existing_handles() {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Task").done().unwrap();
        let registry = builder.build().unwrap();
        let task_id = registry.get_type_id("Task").unwrap();

        let mut extended = RegistryBuilder::from_registry(&registry);
        assert!(extended.has_type("Task"));
        extended.add_type("Project").done().unwrap();
        let registry2 = extended.build().unwrap();

        assert_eq!(registry2.get_type_id("Task"), Some(task_id));
        assert_eq!(registry2.type_count(), 2);
        assert_eq!(registry2.version(), registry.version() + 1);
    }
}
