//! Schema definition types.

use indexmap::IndexMap;
use mew_core::{EdgeTypeId, TypeId, Value};
use mew_parser::{MutationAction, Pattern};
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};

/// Attribute definition within a type or edge type.
#[derive(Debug, Clone)]
pub struct AttrDef {
    pub name: String,
    /// Declared scalar type name (String, Int, Float, Bool, Timestamp, Duration).
    pub type_name: String,
    pub required: bool,
    pub nullable: bool,
    pub unique: bool,
    /// Whether an attribute index is materialized for this attribute.
    pub indexed: bool,
    pub default: Option<Value>,
    /// Inclusive range bounds for numeric types.
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// Allowed values (`in: [...]`).
    pub allowed_values: Option<Vec<Value>>,
    /// Compiled `match:` pattern.
    pub match_pattern: Option<CompiledPattern>,
    /// Built-in format name (`email`, `url`, `uuid`, `slug`).
    pub format: Option<String>,
    pub length_min: Option<i64>,
    pub length_max: Option<i64>,
}

/// A regex compiled once at registry build time.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub regex: Regex,
}

impl CompiledPattern {
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl AttrDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            required: false,
            nullable: false,
            unique: false,
            indexed: false,
            default: None,
            min: None,
            max: None,
            allowed_values: None,
            match_pattern: None,
            format: None,
            length_min: None,
            length_max: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        // Unique attributes are always backed by an index.
        self.indexed = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: Option<Value>, max: Option<Value>) -> Self {
        if min.is_some() {
            self.min = min;
        }
        if max.is_some() {
            self.max = max;
        }
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn with_match_pattern(mut self, source: impl Into<String>) -> Result<Self, regex_lite::Error> {
        let source = source.into();
        let regex = Regex::new(&source)?;
        self.match_pattern = Some(CompiledPattern { source, regex });
        Ok(self)
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_length(mut self, min: i64, max: i64) -> Self {
        self.length_min = Some(min);
        self.length_max = Some(max);
        self
    }
}

/// Node type definition.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: TypeId,
    pub name: String,
    pub parent_ids: Vec<TypeId>,
    /// Own attributes, insertion-ordered by declaration.
    pub attributes: IndexMap<String, AttrDef>,
    pub is_abstract: bool,
}

impl TypeDef {
    pub fn new(id: TypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_ids: Vec::new(),
            attributes: IndexMap::new(),
            is_abstract: false,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&AttrDef> {
        self.attributes.get(name)
    }
}

/// The kind of entity an edge position accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A node whose type subtypes the given type.
    Node(TypeId),
    /// Any entity at all (`any`).
    AnyEntity,
    /// An edge; `None` accepts any edge type (`edge<any>`).
    Edge(Option<EdgeTypeId>),
}

/// Edge type positional parameter.
#[derive(Debug, Clone)]
pub struct EdgeParam {
    pub name: String,
    pub kind: ParamKind,
}

/// Action taken on an edge when the node at one of its positions is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnKill {
    /// Remove the edge, keep the other targets (default).
    #[default]
    Unlink,
    /// Remove the edge and kill the other targets.
    Cascade,
    /// Refuse the kill.
    Prevent,
}

/// Per-position cardinality bounds: how many live edges of this type may
/// hold a given entity at this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: i64,
    /// `None` is unbounded.
    pub max: Option<i64>,
}

impl Default for Cardinality {
    fn default() -> Self {
        Self { min: 0, max: None }
    }
}

/// Edge type definition.
#[derive(Debug, Clone)]
pub struct EdgeTypeDef {
    pub id: EdgeTypeId,
    pub name: String,
    pub params: Vec<EdgeParam>,
    pub attributes: IndexMap<String, AttrDef>,
    pub symmetric: bool,
    pub unique: bool,
    pub no_self: bool,
    pub acyclic: bool,
    /// One entry per position.
    pub on_kill: Vec<OnKill>,
    /// One entry per position.
    pub cardinality: Vec<Cardinality>,
}

impl EdgeTypeDef {
    pub fn new(id: EdgeTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            params: Vec::new(),
            attributes: IndexMap::new(),
            symmetric: false,
            unique: false,
            no_self: false,
            acyclic: false,
            on_kill: Vec::new(),
            cardinality: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn get_attr(&self, name: &str) -> Option<&AttrDef> {
        self.attributes.get(name)
    }

    /// Effective on-kill policy at a position.
    pub fn on_kill_at(&self, position: usize) -> OnKill {
        self.on_kill.get(position).copied().unwrap_or_default()
    }

    pub fn cardinality_at(&self, position: usize) -> Cardinality {
        self.cardinality.get(position).copied().unwrap_or_default()
    }

    /// Whether any position carries a minimum-cardinality bound.
    pub fn has_min_cardinality(&self) -> bool {
        self.cardinality.iter().any(|c| c.min > 0)
    }
}

/// When a constraint is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintPhase {
    /// After every mutation.
    Immediate,
    /// At the commit boundary.
    Deferred,
}

/// A compiled constraint: pattern plus condition, with the precomputed set
/// of types whose mutation could possibly invalidate it.
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub id: u32,
    pub name: String,
    pub pattern: Pattern,
    pub condition: mew_parser::Expr,
    /// Hard constraints abort the transaction; soft ones only warn.
    pub hard: bool,
    pub phase: ConstraintPhase,
    pub message: Option<String>,
    /// Node types (closed over subtypes) that can affect this constraint.
    pub affected_types: HashSet<TypeId>,
    /// Edge types that can affect this constraint.
    pub affected_edge_types: HashSet<EdgeTypeId>,
    /// Declaration order, used for deterministic reporting.
    pub decl_order: usize,
}

/// A compiled reactive rule.
#[derive(Debug, Clone)]
pub struct RuleDef {
    pub id: u32,
    pub name: String,
    pub pattern: Pattern,
    /// Ordered action list executed under the surrounding transaction.
    pub production: Vec<MutationAction>,
    pub priority: i64,
    pub auto: bool,
    pub affected_types: HashSet<TypeId>,
    pub affected_edge_types: HashSet<EdgeTypeId>,
    /// `var.attr` pairs the pattern or condition reads. Part of the
    /// activation fingerprint so value-dependent rules re-fire when the
    /// values they tested change.
    pub referenced_attrs: Vec<(String, String)>,
    pub decl_order: usize,
}

/// Precomputed subtype relationships.
#[derive(Debug, Default, Clone)]
pub struct SubtypeIndex {
    /// For each type, all of its subtypes (transitive, excluding itself).
    subtypes: HashMap<TypeId, HashSet<TypeId>>,
    /// For each type, all of its supertypes (transitive, excluding itself).
    supertypes: HashMap<TypeId, HashSet<TypeId>>,
}

impl SubtypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the closure from type definitions.
    pub fn build(types: &HashMap<TypeId, TypeDef>) -> Self {
        let mut index = Self::new();
        for &type_id in types.keys() {
            index.subtypes.insert(type_id, HashSet::new());
            index.supertypes.insert(type_id, HashSet::new());
        }

        for (type_id, type_def) in types {
            for &parent_id in &type_def.parent_ids {
                if let Some(parent_subtypes) = index.subtypes.get_mut(&parent_id) {
                    parent_subtypes.insert(*type_id);
                }
                if let Some(type_supertypes) = index.supertypes.get_mut(type_id) {
                    type_supertypes.insert(parent_id);
                }
            }
        }

        // Transitive closure by iteration to fixpoint. Type hierarchies are
        // shallow; this converges in a handful of passes.
        let type_ids: Vec<TypeId> = types.keys().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &type_id in &type_ids {
                let supers: Vec<TypeId> = index
                    .supertypes
                    .get(&type_id)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();

                for super_id in supers {
                    let transitive: Vec<TypeId> = index
                        .supertypes
                        .get(&super_id)
                        .map(|s| s.iter().copied().collect())
                        .unwrap_or_default();

                    for trans_id in transitive {
                        if let Some(set) = index.supertypes.get_mut(&type_id) {
                            if set.insert(trans_id) {
                                changed = true;
                            }
                        }
                        if let Some(set) = index.subtypes.get_mut(&trans_id) {
                            set.insert(type_id);
                        }
                    }
                }
            }
        }

        index
    }

    /// Check if `sub` is a subtype of `super_type` (reflexive).
    pub fn is_subtype(&self, sub: TypeId, super_type: TypeId) -> bool {
        if sub == super_type {
            return true;
        }
        self.supertypes
            .get(&sub)
            .map(|set| set.contains(&super_type))
            .unwrap_or(false)
    }

    pub fn subtypes_of(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtypes
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn supertypes_of(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.supertypes
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}
