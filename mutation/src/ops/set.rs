//! SET: attribute updates with read-your-writes evaluation.

use crate::{validation, MutationCtx, MutationEffects, MutationError, MutationResult};
use mew_core::EntityId;
use mew_graph::{GraphRead, TxnBuffer, TxnView};
use mew_parser::AttrAssignment;
use mew_pattern::Bindings;

/// Apply attribute assignments to a node or edge. Each value expression
/// sees all prior buffered changes; validation covers attribute existence,
/// declared type, modifier constraints and the no-null rule for required
/// attributes.
pub fn execute_set(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    target: EntityId,
    assignments: &[AttrAssignment],
    bindings: &Bindings,
) -> MutationResult<MutationEffects> {
    let mut effects = MutationEffects::default();

    for assign in assignments {
        // Read phase: evaluate and validate against the current view.
        let (value, old) = {
            let view = TxnView::new(ctx.graph, buffer);
            match target {
                EntityId::Node(node_id) => {
                    let Some(node) = view.node(node_id) else {
                        return Err(MutationError::NodeNotFound(node_id));
                    };
                    let type_id = node.type_id;
                    let type_name = ctx
                        .registry
                        .get_type(type_id)
                        .map(|t| t.name.clone())
                        .unwrap_or_default();
                    let attr_def = ctx
                        .registry
                        .get_type_attr(type_id, &assign.name)
                        .ok_or_else(|| MutationError::UnknownAttribute {
                            owner: type_name.clone(),
                            attr: assign.name.clone(),
                        })?;

                    let value = ctx.evaluator.eval(&assign.value, bindings, &view)?;
                    if attr_def.required && value.is_null() {
                        return Err(MutationError::MissingRequired {
                            type_name,
                            attr: assign.name.clone(),
                        });
                    }
                    validation::check_attr_type(&type_name, attr_def, &value)?;
                    validation::check_modifiers(attr_def, &value)?;

                    if attr_def.unique && !value.is_null() {
                        let mut probe = mew_core::Attributes::new();
                        probe.insert(assign.name.clone(), value.clone());
                        validation::check_unique_attrs(
                            &view,
                            ctx.registry,
                            &type_name,
                            type_id,
                            &probe,
                            Some(node_id),
                        )?;
                    }

                    effects.touched.touch_node(node_id, type_id);
                    (value, node.get_attr(&assign.name).cloned())
                }
                EntityId::Edge(edge_id) => {
                    let Some(edge) = view.edge(edge_id) else {
                        return Err(MutationError::EdgeNotFound(edge_id));
                    };
                    let edge_def = ctx
                        .registry
                        .get_edge_type(edge.type_id)
                        .ok_or_else(|| MutationError::unknown_edge_type(edge.type_id.to_string()))?;
                    let attr_def = edge_def.get_attr(&assign.name).ok_or_else(|| {
                        MutationError::UnknownAttribute {
                            owner: edge_def.name.clone(),
                            attr: assign.name.clone(),
                        }
                    })?;

                    let value = ctx.evaluator.eval(&assign.value, bindings, &view)?;
                    if attr_def.required && value.is_null() {
                        return Err(MutationError::MissingRequired {
                            type_name: edge_def.name.clone(),
                            attr: assign.name.clone(),
                        });
                    }
                    validation::check_attr_type(&edge_def.name, attr_def, &value)?;
                    validation::check_modifiers(attr_def, &value)?;

                    effects.touched.touch_edge(edge_id, edge.type_id);
                    (value, edge.get_attr(&assign.name).cloned())
                }
            }
        };

        buffer.set_attr(target, assign.name.clone(), old, value);
    }

    effects.modified.push(target);
    Ok(effects)
}
