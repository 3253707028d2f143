//! LINK: edge creation.

use crate::{validation, MutationCtx, MutationEffects, MutationError, MutationResult};
use mew_core::{Attributes, Edge, EdgeId, EntityId, NodeId};
use mew_graph::{GraphRead, TxnBuffer, TxnView};
use mew_parser::LinkStmt;
use mew_pattern::Bindings;
use mew_registry::{EdgeTypeDef, ParamKind};
use std::collections::{HashSet, VecDeque};

/// Create an edge over already-resolved targets (the caller evaluates
/// inline SPAWNs left-to-right before calling in). Validates arity, the
/// positional signature, no-self, uniqueness (or IF NOT EXISTS), the
/// immediately checkable cardinality bounds and acyclicity, then buffers
/// the insert.
pub fn execute_link(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    stmt: &LinkStmt,
    targets: Vec<EntityId>,
    bindings: &Bindings,
) -> MutationResult<MutationEffects> {
    let edge_type = ctx
        .registry
        .get_edge_type_by_name(&stmt.edge_type)
        .ok_or_else(|| MutationError::unknown_edge_type(&stmt.edge_type))?;

    if targets.len() != edge_type.arity() {
        return Err(MutationError::InvalidArity {
            edge_type: edge_type.name.clone(),
            expected: edge_type.arity(),
            actual: targets.len(),
        });
    }

    let mut attrs = Attributes::new();
    let mut effects = MutationEffects::default();
    {
        let view = TxnView::new(ctx.graph, buffer);

        check_signature(ctx, &view, edge_type, &targets)?;

        if edge_type.no_self {
            let mut seen = HashSet::new();
            for target in &targets {
                if !seen.insert(*target) {
                    return Err(MutationError::SelfLoop {
                        edge_type: edge_type.name.clone(),
                    });
                }
            }
        }

        if let Some(existing) = find_duplicate(&view, edge_type, &targets) {
            if stmt.if_not_exists {
                effects.existing_edge = Some(existing);
                return Ok(effects);
            }
            if edge_type.unique {
                return Err(MutationError::DuplicateEdge {
                    edge_type: edge_type.name.clone(),
                });
            }
        }

        check_max_cardinality(&view, edge_type, &targets)?;

        if edge_type.acyclic {
            check_acyclic(&view, edge_type, &targets)?;
        }

        for assign in &stmt.attrs {
            let attr_def = edge_type.get_attr(&assign.name).ok_or_else(|| {
                MutationError::UnknownAttribute {
                    owner: edge_type.name.clone(),
                    attr: assign.name.clone(),
                }
            })?;
            let value = ctx.evaluator.eval(&assign.value, bindings, &view)?;
            validation::check_attr_type(&edge_type.name, attr_def, &value)?;
            validation::check_modifiers(attr_def, &value)?;
            attrs.insert(assign.name.clone(), value);
        }
        for attr_def in edge_type.attributes.values() {
            if let Some(default) = &attr_def.default {
                attrs.entry(attr_def.name.clone()).or_insert_with(|| default.clone());
            }
            if attr_def.required {
                let present = attrs
                    .get(&attr_def.name)
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !present {
                    return Err(MutationError::MissingRequired {
                        type_name: edge_type.name.clone(),
                        attr: attr_def.name.clone(),
                    });
                }
            }
        }
    }

    let id = ctx.ids.alloc_edge_id();
    buffer.create_edge(Edge::new(id, edge_type.id, targets, attrs));
    effects.created_edges.push(id);
    effects.touched.touch_edge(id, edge_type.id);
    Ok(effects)
}

/// Each target's current type must satisfy the positional signature.
fn check_signature(
    ctx: &MutationCtx<'_>,
    view: &TxnView<'_>,
    edge_type: &EdgeTypeDef,
    targets: &[EntityId],
) -> MutationResult<()> {
    for (position, (target, param)) in targets.iter().zip(&edge_type.params).enumerate() {
        match (param.kind, target) {
            (ParamKind::AnyEntity, entity) => {
                if !view.entity_exists(*entity) {
                    return Err(missing_entity(*entity));
                }
            }
            (ParamKind::Node(expected), EntityId::Node(node_id)) => {
                let Some(node) = view.node(*node_id) else {
                    return Err(MutationError::NodeNotFound(*node_id));
                };
                if !ctx.registry.is_subtype(node.type_id, expected) {
                    return Err(MutationError::InvalidTargetType {
                        edge_type: edge_type.name.clone(),
                        position,
                        expected: ctx
                            .registry
                            .get_type(expected)
                            .map(|t| t.name.clone())
                            .unwrap_or_default(),
                    });
                }
            }
            (ParamKind::Node(expected), EntityId::Edge(_)) => {
                return Err(MutationError::InvalidTargetType {
                    edge_type: edge_type.name.clone(),
                    position,
                    expected: ctx
                        .registry
                        .get_type(expected)
                        .map(|t| t.name.clone())
                        .unwrap_or_default(),
                });
            }
            (ParamKind::Edge(constraint), EntityId::Edge(edge_id)) => {
                let Some(edge) = view.edge(*edge_id) else {
                    return Err(MutationError::EdgeNotFound(*edge_id));
                };
                if let Some(required) = constraint {
                    if edge.type_id != required {
                        return Err(MutationError::InvalidTargetType {
                            edge_type: edge_type.name.clone(),
                            position,
                            expected: ctx
                                .registry
                                .get_edge_type(required)
                                .map(|t| format!("edge<{}>", t.name))
                                .unwrap_or_default(),
                        });
                    }
                }
            }
            (ParamKind::Edge(_), EntityId::Node(_)) => {
                return Err(MutationError::InvalidTargetType {
                    edge_type: edge_type.name.clone(),
                    position,
                    expected: "an edge reference".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn missing_entity(entity: EntityId) -> MutationError {
    match entity {
        EntityId::Node(id) => MutationError::NodeNotFound(id),
        EntityId::Edge(id) => MutationError::EdgeNotFound(id),
    }
}

/// Find a live edge of the same type over the same target tuple.
/// Symmetric edge types compare tuples as unordered multisets.
fn find_duplicate(
    view: &TxnView<'_>,
    edge_type: &EdgeTypeDef,
    targets: &[EntityId],
) -> Option<EdgeId> {
    let candidates = view.edges_at(edge_type.id, 0, targets[0]);
    let mut candidates: Vec<EdgeId> = candidates;
    if edge_type.symmetric {
        // The stored tuple may begin with any of our targets.
        for target in targets.iter().skip(1) {
            candidates.extend(view.edges_at(edge_type.id, 0, *target));
        }
        candidates.sort();
        candidates.dedup();
    }

    let mut wanted: Vec<EntityId> = targets.to_vec();
    if edge_type.symmetric {
        wanted.sort();
    }

    for edge_id in candidates {
        let Some(edge) = view.edge(edge_id) else {
            continue;
        };
        let mut stored: Vec<EntityId> = edge.targets.clone();
        if edge_type.symmetric {
            stored.sort();
        }
        if stored == wanted {
            return Some(edge_id);
        }
    }
    None
}

/// Maximum-cardinality bounds are checkable at link time; minimums wait
/// for the commit boundary.
fn check_max_cardinality(
    view: &TxnView<'_>,
    edge_type: &EdgeTypeDef,
    targets: &[EntityId],
) -> MutationResult<()> {
    for (position, target) in targets.iter().enumerate() {
        let bound = edge_type.cardinality_at(position);
        if let Some(max) = bound.max {
            let current = view.edges_at(edge_type.id, position, *target).len() as i64;
            if current + 1 > max {
                return Err(MutationError::CardinalityExceeded {
                    edge_type: edge_type.name.clone(),
                    param: edge_type
                        .params
                        .get(position)
                        .map(|p| p.name.clone())
                        .unwrap_or_default(),
                    max,
                });
            }
        }
    }
    Ok(())
}

/// Pre-insert reachability check: linking (a, b) on an acyclic edge type
/// fails when b already reaches a over that type.
fn check_acyclic(
    view: &TxnView<'_>,
    edge_type: &EdgeTypeDef,
    targets: &[EntityId],
) -> MutationResult<()> {
    let (Some(EntityId::Node(from)), Some(EntityId::Node(to))) =
        (targets.first().copied(), targets.get(1).copied())
    else {
        return Ok(());
    };
    if from == to {
        return Err(MutationError::AcyclicViolation {
            edge_type: edge_type.name.clone(),
        });
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut frontier: VecDeque<NodeId> = VecDeque::new();
    frontier.push_back(to);
    while let Some(current) = frontier.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        if current == from {
            return Err(MutationError::AcyclicViolation {
                edge_type: edge_type.name.clone(),
            });
        }
        for edge_id in view.edges_from(current, Some(edge_type.id)) {
            if let Some(edge) = view.edge(edge_id) {
                if let Some(next) = edge.targets.get(1).and_then(|t| t.as_node()) {
                    if !visited.contains(&next) {
                        frontier.push_back(next);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, EngineLimits, Node, Value};
    use mew_graph::{Graph, IdGen};
    use mew_parser::Span;
    use mew_pattern::Evaluator;
    use mew_registry::{AttrDef, OnKill, Registry, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String"))
            .done()
            .unwrap();
        builder
            .add_type("Person")
            .attr(AttrDef::new("name", "String"))
            .done()
            .unwrap();
        builder
            .add_edge_type("depends_on")
            .param("a", "Task")
            .param("b", "Task")
            .acyclic()
            .no_self()
            .done()
            .unwrap();
        builder
            .add_edge_type("owns")
            .param("owner", "Person")
            .param("task", "Task")
            .unique()
            .cardinality("task", 0, Some(1))
            .done()
            .unwrap();
        // on_kill present just to keep the modifier surface realistic.
        builder
            .add_edge_type("tagged")
            .param("a", "Task")
            .param("b", "Task")
            .on_kill(0, OnKill::Unlink)
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    struct Fx {
        registry: Registry,
        graph: Graph,
        ids: IdGen,
        limits: EngineLimits,
    }

    impl Fx {
        fn new() -> Self {
            Self {
                registry: test_registry(),
                graph: Graph::new(),
                ids: IdGen::new(),
                limits: EngineLimits::default(),
            }
        }

        fn node(&mut self, type_name: &str) -> NodeId {
            let id = self.ids.alloc_node_id();
            let tid = self.registry.get_type_id(type_name).unwrap();
            self.graph.insert_node(Node::new(id, tid, attrs!())).unwrap();
            id
        }
    }

    fn link_stmt(edge_type: &str, if_not_exists: bool) -> LinkStmt {
        LinkStmt {
            var: None,
            edge_type: edge_type.to_string(),
            targets: vec![],
            attrs: vec![],
            if_not_exists,
            returning: None,
            span: Span::default(),
        }
    }

    #[test]
    fn test_link_creates_edge() {
        let mut fx = Fx::new();
        let a = fx.node("Task");
        let b = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let effects = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("depends_on", false),
            vec![a.into(), b.into()],
            &Bindings::new(),
        )
        .unwrap();

        assert_eq!(effects.created_edges.len(), 1);
        assert!(buffer.is_created_edge(effects.created_edges[0]));
    }

    #[test]
    fn test_link_wrong_arity() {
        let mut fx = Fx::new();
        let a = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("depends_on", false),
            vec![a.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::InvalidArity { .. }));
    }

    #[test]
    fn test_link_wrong_target_type() {
        let mut fx = Fx::new();
        let person = fx.node("Person");
        let task = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("depends_on", false),
            vec![person.into(), task.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::InvalidTargetType { .. }));
    }

    #[test]
    fn test_link_no_self() {
        let mut fx = Fx::new();
        let a = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("depends_on", false),
            vec![a.into(), a.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::SelfLoop { .. }));
    }

    #[test]
    fn test_link_acyclic_rejects_cycle() {
        let mut fx = Fx::new();
        let t1 = fx.node("Task");
        let t2 = fx.node("Task");
        let t3 = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        for (a, b) in [(t1, t2), (t2, t3)] {
            execute_link(
                &ctx,
                &mut buffer,
                &link_stmt("depends_on", false),
                vec![a.into(), b.into()],
                &Bindings::new(),
            )
            .unwrap();
        }

        // t3 -> t1 closes the cycle through buffered edges.
        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("depends_on", false),
            vec![t3.into(), t1.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::AcyclicViolation { .. }));
    }

    #[test]
    fn test_link_unique_duplicate_rejected() {
        let mut fx = Fx::new();
        let p = fx.node("Person");
        let t = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", false),
            vec![p.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap();

        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", false),
            vec![p.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::DuplicateEdge { .. }));
    }

    #[test]
    fn test_link_if_not_exists_returns_existing() {
        let mut fx = Fx::new();
        let p = fx.node("Person");
        let t = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let first = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", true),
            vec![p.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap();
        let created = first.created_edges[0];

        let second = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", true),
            vec![p.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap();

        assert!(!second.created());
        assert_eq!(second.existing_edge, Some(created));
        assert!(second.created_edges.is_empty());
    }

    #[test]
    fn test_link_cardinality_max_enforced() {
        let mut fx = Fx::new();
        let p1 = fx.node("Person");
        let p2 = fx.node("Person");
        let t = fx.node("Task");

        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", false),
            vec![p1.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap();

        // A second owner for the same task exceeds max 1 at position 'task'.
        let err = execute_link(
            &ctx,
            &mut buffer,
            &link_stmt("owns", false),
            vec![p2.into(), t.into()],
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::CardinalityExceeded { .. }));
    }
}
