//! Ontology compilation.

use crate::{CompileError, CompileResult};
use mew_core::Value;
use mew_parser::{
    parse_ontology, AttrDecl, AttrModifier, EdgeModifier, EdgeTypeDecl, Expr, LiteralKind,
    NodeTypeDecl, OnKillPosition, OntologyItem, ReferentialAction,
};
use mew_registry::{AttrDef, OnKill, Registry, RegistryBuilder};

/// Reserved Layer-0 meta type names injected into every registry. Each
/// user declaration is mirrored as a node of one of these types, with
/// `_extends` edges for the inheritance graph.
pub const META_TYPES: [&str; 4] = ["_Type", "_EdgeType", "_Constraint", "_Rule"];

/// Compile an ontology source into a fresh registry.
pub fn compile(source: &str) -> CompileResult<Registry> {
    let items = parse_ontology(source)?;
    compile_items(&items)
}

/// Compile parsed declarations into a fresh registry.
pub fn compile_items(items: &[OntologyItem]) -> CompileResult<Registry> {
    let mut builder = RegistryBuilder::new();
    inject_meta_types(&mut builder)?;
    add_items(&mut builder, items, false)?;
    Ok(builder.build()?)
}

/// Extend a published registry with new declarations. Existing
/// declarations cannot be altered or removed; a colliding name is an
/// error under EXTEND.
pub fn extend(registry: &Registry, source: &str) -> CompileResult<Registry> {
    let items = parse_ontology(source)?;
    extend_items(registry, &items)
}

/// Extend with parsed declarations. With `items` equal to an already
/// loaded ontology, re-loading is idempotent: declarations whose names
/// exist are skipped by [`load_more`], not errored.
pub fn extend_items(registry: &Registry, items: &[OntologyItem]) -> CompileResult<Registry> {
    let mut builder = RegistryBuilder::from_registry(registry);
    add_items(&mut builder, items, true)?;
    Ok(builder.build()?)
}

/// The LOAD-again path: identical names are skipped so loading the same
/// ontology twice is a no-op, and an existing declaration is never
/// altered in place.
pub fn load_more(registry: &Registry, items: &[OntologyItem]) -> CompileResult<Registry> {
    let mut builder = RegistryBuilder::from_registry(registry);
    let fresh: Vec<OntologyItem> = items
        .iter()
        .filter(|item| !name_exists(&builder, item))
        .cloned()
        .collect();
    add_items(&mut builder, &fresh, false)?;
    Ok(builder.build()?)
}

fn name_exists(builder: &RegistryBuilder, item: &OntologyItem) -> bool {
    match item {
        OntologyItem::Node(n) => builder.has_type(&n.name),
        OntologyItem::Edge(e) => builder.has_edge_type(&e.name),
        OntologyItem::Constraint(c) => builder.has_constraint(&c.name),
        OntologyItem::Rule(r) => builder.has_rule(&r.name),
    }
}

fn add_items(
    builder: &mut RegistryBuilder,
    items: &[OntologyItem],
    extending: bool,
) -> CompileResult<()> {
    // Declarations may reference each other regardless of order; types
    // and edges first, then constraints and rules over them.
    for item in items {
        check_name(item)?;
        if extending && name_exists(builder, item) {
            let name = item_name(item);
            return Err(CompileError::CannotAlter {
                name: name.to_string(),
            });
        }
    }

    for item in items {
        if let OntologyItem::Node(node) = item {
            add_node_type(builder, node)?;
        }
    }
    for item in items {
        if let OntologyItem::Edge(edge) = item {
            add_edge_type(builder, edge)?;
        }
    }
    for item in items {
        match item {
            OntologyItem::Constraint(decl) => {
                forbid_nondeterminism(&decl.name, &decl.condition)?;
                if let Some(where_clause) = &decl.pattern.where_clause {
                    forbid_nondeterminism(&decl.name, where_clause)?;
                }
                let mut constraint = builder.add_constraint(
                    &decl.name,
                    decl.pattern.clone(),
                    decl.condition.clone(),
                );
                if decl.soft {
                    constraint = constraint.soft();
                }
                if decl.deferred {
                    constraint = constraint.deferred();
                }
                if let Some(message) = &decl.message {
                    constraint = constraint.message(message.clone());
                }
                constraint.done()?;
            }
            OntologyItem::Rule(decl) => {
                let mut rule =
                    builder.add_rule(&decl.name, decl.pattern.clone(), decl.production.clone());
                if let Some(priority) = decl.priority {
                    rule = rule.priority(priority);
                }
                if !decl.auto {
                    rule = rule.manual();
                }
                rule.done()?;
            }
            OntologyItem::Node(_) | OntologyItem::Edge(_) => {}
        }
    }

    Ok(())
}

fn item_name(item: &OntologyItem) -> &str {
    match item {
        OntologyItem::Node(n) => &n.name,
        OntologyItem::Edge(e) => &e.name,
        OntologyItem::Constraint(c) => &c.name,
        OntologyItem::Rule(r) => &r.name,
    }
}

fn check_name(item: &OntologyItem) -> CompileResult<()> {
    let name = item_name(item);
    if name.starts_with('_') {
        return Err(CompileError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn add_node_type(builder: &mut RegistryBuilder, decl: &NodeTypeDecl) -> CompileResult<()> {
    let mut type_builder = builder.add_type(&decl.name);
    for parent in &decl.parents {
        type_builder = type_builder.parent(parent);
    }
    if decl.is_abstract {
        type_builder = type_builder.abstract_type();
    }
    for attr_decl in &decl.attrs {
        let attr = build_attr(&decl.name, attr_decl)?;
        type_builder = type_builder.try_attr(attr)?;
    }
    type_builder.done()?;

    // A `[required]` modifier also surfaces as a named existence
    // constraint, mirroring what SHOW CONSTRAINTS reports. Enforcement
    // itself happens in the mutation layer.
    for attr_decl in &decl.attrs {
        if attr_decl.modifiers.contains(&AttrModifier::Required) {
            let pattern = mew_parser::Pattern {
                elements: vec![mew_parser::PatternElem::Node(mew_parser::NodePattern {
                    var: "t".to_string(),
                    type_name: decl.name.clone(),
                    span: decl.span,
                })],
                where_clause: None,
                span: decl.span,
            };
            let condition = Expr::FnCall(mew_parser::FnCall {
                name: "is_not_null".to_string(),
                args: vec![Expr::AttrAccess(
                    Box::new(Expr::Var("t".to_string(), decl.span)),
                    attr_decl.name.clone(),
                    decl.span,
                )],
                distinct: false,
                span: decl.span,
            });
            builder
                .add_constraint(
                    format!("_{}_{}_required", decl.name, attr_decl.name),
                    pattern,
                    condition,
                )
                .message(format!(
                    "required attribute '{}' is missing on '{}'",
                    attr_decl.name, decl.name
                ))
                .done()?;
        }
    }
    Ok(())
}

fn add_edge_type(builder: &mut RegistryBuilder, decl: &EdgeTypeDecl) -> CompileResult<()> {
    let mut edge_builder = builder.add_edge_type(&decl.name);
    for (param_name, type_spec) in &decl.params {
        edge_builder = edge_builder.param(param_name, type_spec);
    }
    for attr_decl in &decl.attrs {
        let attr = build_attr(&decl.name, attr_decl)?;
        edge_builder = edge_builder.attr(attr);
    }

    for modifier in &decl.modifiers {
        edge_builder = match modifier {
            EdgeModifier::Acyclic => edge_builder.acyclic(),
            EdgeModifier::Unique => edge_builder.unique(),
            EdgeModifier::NoSelf => edge_builder.no_self(),
            EdgeModifier::Symmetric => edge_builder.symmetric(),
            EdgeModifier::OnKill { position, action } => {
                let index = match position {
                    OnKillPosition::Source => 0,
                    OnKillPosition::Target => 1,
                };
                let action = match action {
                    ReferentialAction::Cascade => OnKill::Cascade,
                    ReferentialAction::Unlink => OnKill::Unlink,
                    ReferentialAction::Prevent => OnKill::Prevent,
                };
                edge_builder.on_kill(index, action)
            }
            EdgeModifier::Cardinality { param, min, max } => {
                edge_builder.cardinality(param, *min, *max)
            }
        };
    }

    edge_builder.done()?;
    Ok(())
}

fn build_attr(owner: &str, decl: &AttrDecl) -> CompileResult<AttrDef> {
    let mut attr = AttrDef::new(&decl.name, &decl.type_name);
    if decl.nullable {
        attr = attr.nullable();
    }

    for modifier in &decl.modifiers {
        attr = match modifier {
            AttrModifier::Required => attr.required(),
            AttrModifier::Unique => attr.unique(),
            AttrModifier::Indexed => attr.indexed(),
            AttrModifier::Default(expr) => {
                let value = const_value(expr).ok_or_else(|| CompileError::InvalidDefault {
                    owner: owner.to_string(),
                    attr: decl.name.clone(),
                    message: "defaults must be literal values".to_string(),
                })?;
                attr.with_default(value)
            }
            AttrModifier::Range { min, max } => {
                let min = min.as_ref().and_then(const_value);
                let max = max.as_ref().and_then(const_value);
                attr.with_range(min, max)
            }
            AttrModifier::InValues(exprs) => {
                let values: Option<Vec<Value>> = exprs.iter().map(const_value).collect();
                match values {
                    Some(values) => attr.with_allowed_values(values),
                    None => {
                        return Err(CompileError::InvalidDefault {
                            owner: owner.to_string(),
                            attr: decl.name.clone(),
                            message: "allowed values must be literals".to_string(),
                        })
                    }
                }
            }
            AttrModifier::Match(pattern) => {
                attr.with_match_pattern(pattern.clone()).map_err(|e| {
                    CompileError::InvalidDefault {
                        owner: owner.to_string(),
                        attr: decl.name.clone(),
                        message: e.to_string(),
                    }
                })?
            }
            AttrModifier::Length { min, max } => attr.with_length(*min, *max),
            AttrModifier::Format(format) => attr.with_format(format.clone()),
        };
    }

    Ok(attr)
}

/// Evaluate a literal expression to a constant value.
fn const_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(lit) => Some(match &lit.kind {
            LiteralKind::Null => Value::Null,
            LiteralKind::Bool(b) => Value::Bool(*b),
            LiteralKind::Int(i) => Value::Int(*i),
            LiteralKind::Float(f) => Value::Float(*f),
            LiteralKind::String(s) => Value::String(s.clone()),
            LiteralKind::Duration(ms) => Value::Duration(*ms),
            LiteralKind::Timestamp(ms) => Value::Timestamp(*ms),
        }),
        Expr::UnaryOp(mew_parser::UnaryOp::Neg, inner, _) => match const_value(inner)? {
            Value::Int(i) => Some(Value::Int(-i)),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        _ => None,
    }
}

/// Constraints must be pure over the store: wall-clock and randomness
/// have no place in an invariant.
fn forbid_nondeterminism(constraint: &str, expr: &Expr) -> CompileResult<()> {
    const FORBIDDEN: [&str; 3] = ["now", "wall_time", "random"];
    match expr {
        Expr::FnCall(fc) => {
            if FORBIDDEN.contains(&fc.name.to_lowercase().as_str()) {
                return Err(CompileError::NondeterministicConstraint {
                    name: constraint.to_string(),
                    function: fc.name.clone(),
                });
            }
            for arg in &fc.args {
                forbid_nondeterminism(constraint, arg)?;
            }
            Ok(())
        }
        Expr::BinaryOp(_, left, right, _) => {
            forbid_nondeterminism(constraint, left)?;
            forbid_nondeterminism(constraint, right)
        }
        Expr::UnaryOp(_, operand, _) => forbid_nondeterminism(constraint, operand),
        Expr::Exists(_, where_clause, _) | Expr::NotExists(_, where_clause, _) => {
            if let Some(inner) = where_clause {
                forbid_nondeterminism(constraint, inner)?;
            }
            Ok(())
        }
        Expr::List(items, _) => {
            for item in items {
                forbid_nondeterminism(constraint, item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// The reserved meta schema: one node type per declaration kind plus the
/// inheritance edge. These exist in every registry so Layer-0 mirror
/// nodes always have somewhere to live.
fn inject_meta_types(builder: &mut RegistryBuilder) -> CompileResult<()> {
    builder
        .add_type("_Type")
        .attr(AttrDef::new("name", "String").required().unique())
        .attr(AttrDef::new("is_abstract", "Bool").nullable())
        .done()?;
    builder
        .add_type("_EdgeType")
        .attr(AttrDef::new("name", "String").required().unique())
        .attr(AttrDef::new("arity", "Int").nullable())
        .done()?;
    builder
        .add_type("_Constraint")
        .attr(AttrDef::new("name", "String").required().unique())
        .attr(AttrDef::new("hard", "Bool").nullable())
        .attr(AttrDef::new("deferred", "Bool").nullable())
        .done()?;
    builder
        .add_type("_Rule")
        .attr(AttrDef::new("name", "String").required().unique())
        .attr(AttrDef::new("priority", "Int").nullable())
        .attr(AttrDef::new("auto", "Bool").nullable())
        .done()?;
    builder
        .add_edge_type("_extends")
        .param("child", "_Type")
        .param("parent", "_Type")
        .done()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONTOLOGY: &str = r#"
        abstract node Item { label: String? }
        node Task : Item {
            title: String [required],
            priority: Int? [>= 0, <= 10, default: 5],
            status: String? [in: ["todo", "doing", "done"], default: "todo"]
        }
        node Project { name: String [required, unique] }
        edge belongs_to(t: Task, p: Project) [on_kill_target: cascade, cardinality t: 0..1]
        edge depends_on(a: Task, b: Task) [acyclic, unique, no_self]
        constraint titled [message: "tasks need a real title"]: t: Task => length(t.title) > 0
        rule auto_status on Task [priority: 10]: SET t.status = "todo"
    "#;

    #[test]
    fn test_compile_full_ontology() {
        let registry = compile(ONTOLOGY).unwrap();

        // User types plus the four meta types.
        assert_eq!(registry.type_count(), 3 + META_TYPES.len());
        let task = registry.get_type_by_name("Task").unwrap();
        assert!(!task.is_abstract);
        let item = registry.get_type_by_name("Item").unwrap();
        assert!(item.is_abstract);
        assert!(registry.is_subtype(task.id, item.id));

        // Modifier expansion landed on the attribute definitions.
        let priority = registry.get_type_attr(task.id, "priority").unwrap();
        assert_eq!(priority.min, Some(Value::Int(0)));
        assert_eq!(priority.max, Some(Value::Int(10)));
        assert_eq!(priority.default, Some(Value::Int(5)));
        let status = registry.get_type_attr(task.id, "status").unwrap();
        assert!(status.allowed_values.is_some());

        // Edge modifiers.
        let belongs = registry.get_edge_type_by_name("belongs_to").unwrap();
        assert_eq!(belongs.on_kill_at(1), OnKill::Cascade);
        assert_eq!(belongs.cardinality_at(0).max, Some(1));
        let depends = registry.get_edge_type_by_name("depends_on").unwrap();
        assert!(depends.acyclic && depends.unique && depends.no_self);

        // Declared plus the generated required-existence constraints.
        let names: Vec<&str> = registry.all_constraints().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"titled"));
        assert!(names.contains(&"_Task_title_required"));
        assert!(names.contains(&"_Project_name_required"));

        assert!(registry.get_rule_by_name("auto_status").is_some());
    }

    #[test]
    fn test_meta_types_are_reserved() {
        let err = compile("node _Sneaky { }").unwrap_err();
        assert!(matches!(err, CompileError::ReservedName { .. }));
    }

    #[test]
    fn test_load_twice_is_idempotent() {
        let registry = compile(ONTOLOGY).unwrap();
        let items = parse_ontology(ONTOLOGY).unwrap();
        let reloaded = load_more(&registry, &items).unwrap();

        assert_eq!(reloaded.type_count(), registry.type_count());
        assert_eq!(reloaded.edge_type_count(), registry.edge_type_count());
        assert_eq!(reloaded.constraint_count(), registry.constraint_count());
        assert_eq!(reloaded.rule_count(), registry.rule_count());
        // Handles survive republication.
        assert_eq!(
            reloaded.get_type_id("Task"),
            registry.get_type_id("Task")
        );
    }

    #[test]
    fn test_extend_adds_but_cannot_alter() {
        let registry = compile(ONTOLOGY).unwrap();

        let extended = extend(&registry, "node Tag { label: String [required] }").unwrap();
        assert!(extended.get_type_by_name("Tag").is_some());
        assert_eq!(extended.version(), registry.version() + 1);
        // In-flight readers keep the registry they began with.
        assert!(registry.get_type_by_name("Tag").is_none());

        let err = extend(&extended, "node Task { other: Int? }").unwrap_err();
        assert!(matches!(err, CompileError::CannotAlter { .. }));
    }

    #[test]
    fn test_constraints_reject_wall_time() {
        let err = compile(
            "node Event { at: Timestamp? }\nconstraint fresh: e: Event => e.at > now()",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::NondeterministicConstraint { .. }
        ));
    }

    #[test]
    fn test_unknown_reference_fails() {
        let err = compile("edge owns(a: Person, b: Task)").unwrap_err();
        assert!(matches!(err, CompileError::Registry(_)));
    }
}
