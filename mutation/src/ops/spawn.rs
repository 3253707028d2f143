//! SPAWN: node creation.

use crate::{validation, MutationCtx, MutationEffects, MutationError, MutationResult};
use mew_core::{Attributes, Node, NodeId};
use mew_graph::{TxnBuffer, TxnView};
use mew_parser::{SpawnItem, SpawnStmt};
use mew_pattern::Bindings;

/// Create one node from a spawn item. Validates the type, every provided
/// attribute, required/default coverage and unique collisions, then
/// buffers the insert.
pub fn execute_spawn_item(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    item: &SpawnItem,
    bindings: &Bindings,
) -> MutationResult<NodeId> {
    let type_def = ctx
        .registry
        .get_type_by_name(&item.type_name)
        .ok_or_else(|| MutationError::unknown_type(&item.type_name))?;
    if type_def.is_abstract {
        return Err(MutationError::AbstractType {
            name: item.type_name.clone(),
        });
    }
    let type_id = type_def.id;

    let mut attrs = Attributes::new();
    {
        let view = TxnView::new(ctx.graph, buffer);
        for assign in &item.attrs {
            let attr_def = ctx
                .registry
                .get_type_attr(type_id, &assign.name)
                .ok_or_else(|| MutationError::UnknownAttribute {
                    owner: item.type_name.clone(),
                    attr: assign.name.clone(),
                })?;

            let value = ctx.evaluator.eval(&assign.value, bindings, &view)?;
            validation::check_attr_type(&item.type_name, attr_def, &value)?;
            validation::check_modifiers(attr_def, &value)?;
            attrs.insert(assign.name.clone(), value);
        }

        validation::apply_defaults(ctx.registry, type_id, &mut attrs);
        validation::check_required(ctx.registry, &item.type_name, type_id, &attrs)?;
        validation::check_unique_attrs(&view, ctx.registry, &item.type_name, type_id, &attrs, None)?;
    }

    let id = ctx.ids.alloc_node_id();
    buffer.create_node(Node::new(id, type_id, attrs));
    Ok(id)
}

/// Execute a SPAWN statement: one or more chained items, left to right.
pub fn execute_spawn(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    stmt: &SpawnStmt,
    bindings: &Bindings,
) -> MutationResult<MutationEffects> {
    let mut effects = MutationEffects::default();
    let mut local = bindings.clone();

    for item in &stmt.items {
        let id = execute_spawn_item(ctx, buffer, item, &local)?;
        let type_id = ctx.registry.get_type_id(&item.type_name).unwrap();
        effects.created_nodes.push(id);
        effects.touched.touch_node(id, type_id);
        // Later items in the chain can reference earlier variables.
        local.insert(&item.var, mew_pattern::Binding::Node(id));
    }

    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{EngineLimits, Value};
    use mew_graph::{Graph, IdGen};
    use mew_parser::{AttrAssignment, Expr, Literal, LiteralKind, Span};
    use mew_pattern::Evaluator;
    use mew_registry::{AttrDef, Registry, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String").required())
            .attr(AttrDef::new("priority", "Int").with_range(Some(Value::Int(0)), None))
            .attr(AttrDef::new("code", "String").unique())
            .done()
            .unwrap();
        builder.add_type("Ghost").abstract_type().done().unwrap();
        builder.build().unwrap()
    }

    fn item(type_name: &str, attrs: Vec<(&str, LiteralKind)>) -> SpawnItem {
        SpawnItem {
            var: "t".to_string(),
            type_name: type_name.to_string(),
            attrs: attrs
                .into_iter()
                .map(|(name, kind)| AttrAssignment {
                    name: name.to_string(),
                    value: Expr::Literal(Literal {
                        kind,
                        span: Span::default(),
                    }),
                    span: Span::default(),
                })
                .collect(),
            span: Span::default(),
        }
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
    }

    #[test]
    fn test_spawn_valid_node() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let id = execute_spawn_item(
            &ctx,
            &mut buffer,
            &item("Task", vec![("title", LiteralKind::String("X".into()))]),
            &Bindings::new(),
        )
        .unwrap();

        assert!(buffer.is_created_node(id));
        assert_eq!(
            buffer.created_node(id).unwrap().get_attr("title"),
            Some(&Value::String("X".into()))
        );
    }

    #[test]
    fn test_spawn_missing_required_fails() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_spawn_item(
            &ctx,
            &mut buffer,
            &item("Task", vec![("priority", LiteralKind::Int(5))]),
            &Bindings::new(),
        )
        .unwrap_err();

        assert!(matches!(err, MutationError::MissingRequired { .. }));
        assert!(format!("{}", err).contains("title"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_spawn_abstract_type_fails() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_spawn_item(&ctx, &mut buffer, &item("Ghost", vec![]), &Bindings::new())
            .unwrap_err();
        assert!(matches!(err, MutationError::AbstractType { .. }));
    }

    #[test]
    fn test_spawn_modifier_violation_fails() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_spawn_item(
            &ctx,
            &mut buffer,
            &item(
                "Task",
                vec![
                    ("title", LiteralKind::String("X".into())),
                    ("priority", LiteralKind::Int(-2)),
                ],
            ),
            &Bindings::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::ModifierViolation { .. }));
    }

    #[test]
    fn test_spawn_unique_collision_within_buffer() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let spawn = |code: &str| {
            item(
                "Task",
                vec![
                    ("title", LiteralKind::String("X".into())),
                    ("code", LiteralKind::String(code.into())),
                ],
            )
        };

        execute_spawn_item(&ctx, &mut buffer, &spawn("ABC"), &Bindings::new()).unwrap();
        let err =
            execute_spawn_item(&ctx, &mut buffer, &spawn("ABC"), &Bindings::new()).unwrap_err();
        assert!(matches!(err, MutationError::UniqueCollision { .. }));
    }

    #[test]
    fn test_chained_spawn_binds_earlier_vars() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);
        let mut buffer = TxnBuffer::new();

        let stmt = SpawnStmt {
            items: vec![
                item("Task", vec![("title", LiteralKind::String("A".into()))]),
                SpawnItem {
                    var: "u".to_string(),
                    ..item("Task", vec![("title", LiteralKind::String("B".into()))])
                },
            ],
            returning: None,
            span: Span::default(),
        };

        let effects = execute_spawn(&ctx, &mut buffer, &stmt, &Bindings::new()).unwrap();
        assert_eq!(effects.created_nodes.len(), 2);
        assert_eq!(effects.touched.nodes.len(), 2);
    }
}
