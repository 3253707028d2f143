//! KILL: node deletion with per-position on-kill policies and cascade.

use crate::{MutationCtx, MutationEffects, MutationError, MutationResult};
use mew_core::{EdgeId, EntityId, NodeId};
use mew_graph::{GraphRead, TxnBuffer, TxnView};
use mew_parser::KillOverride;
use mew_registry::OnKill;
use std::collections::HashSet;
use std::collections::VecDeque;

/// Delete the victims and run cascade mechanics:
/// for every incident edge position, consult its on-kill policy (or the
/// override), failing on `prevent`, scheduling opposite-position kills on
/// `cascade`, and unlinking otherwise. Scheduled work carries loop guards
/// and the cascade budget.
pub fn execute_kill(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    victims: Vec<NodeId>,
    override_: Option<KillOverride>,
) -> MutationResult<MutationEffects> {
    let mut effects = MutationEffects::default();
    let primary: HashSet<NodeId> = victims.iter().copied().collect();

    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut scheduled_nodes: HashSet<NodeId> = HashSet::new();
    let mut scheduled_edges: HashSet<EdgeId> = HashSet::new();

    for victim in victims {
        // Primary victims must exist; cascaded ones may already be gone.
        {
            let view = TxnView::new(ctx.graph, buffer);
            if view.node(victim).is_none() {
                return Err(MutationError::NodeNotFound(victim));
            }
        }
        if scheduled_nodes.insert(victim) {
            queue.push_back(victim);
        }
    }

    while let Some(victim) = queue.pop_front() {
        if scheduled_nodes.len() + scheduled_edges.len() > ctx.limits.max_cascade_count {
            return Err(MutationError::CascadeLimit {
                limit: ctx.limits.max_cascade_count,
            });
        }

        // Plan this victim's cascade from a read view, then apply.
        let mut edges_to_unlink: Vec<EdgeId> = Vec::new();
        let mut nodes_to_cascade: Vec<NodeId> = Vec::new();
        let victim_type;
        {
            let view = TxnView::new(ctx.graph, buffer);
            let Some(node) = view.node(victim) else {
                continue;
            };
            victim_type = node.type_id;

            for edge_id in view.edges_involving(victim) {
                if scheduled_edges.contains(&edge_id) {
                    continue;
                }
                let Some(edge) = view.edge(edge_id) else {
                    continue;
                };
                let edge_type = ctx
                    .registry
                    .get_edge_type(edge.type_id)
                    .ok_or_else(|| MutationError::unknown_edge_type(edge.type_id.to_string()))?;

                for (position, target) in edge.targets.iter().enumerate() {
                    if *target != EntityId::Node(victim) {
                        continue;
                    }
                    let policy = effective_policy(edge_type.on_kill_at(position), override_);
                    match policy {
                        OnKill::Prevent => {
                            return Err(MutationError::KillPrevented {
                                edge_type: edge_type.name.clone(),
                            });
                        }
                        OnKill::Cascade => {
                            for other in edge.targets.iter() {
                                if let EntityId::Node(other_id) = other {
                                    if *other_id != victim && !scheduled_nodes.contains(other_id) {
                                        nodes_to_cascade.push(*other_id);
                                    }
                                }
                            }
                        }
                        OnKill::Unlink => {}
                    }
                }
                edges_to_unlink.push(edge_id);
            }
        }

        for other in nodes_to_cascade {
            if scheduled_nodes.insert(other) {
                queue.push_back(other);
            }
        }

        for edge_id in edges_to_unlink {
            unlink_with_higher_order(ctx, buffer, edge_id, &mut scheduled_edges, &mut effects)?;
        }

        let snapshot = ctx.graph.get_node(victim).cloned();
        buffer.delete_node(victim, snapshot);
        effects.deleted_nodes.push(victim);
        effects.touched.touch_node(victim, victim_type);
        if !primary.contains(&victim) {
            effects.cascaded += 1;
        }
    }

    Ok(effects)
}

fn effective_policy(declared: OnKill, override_: Option<KillOverride>) -> OnKill {
    match override_ {
        Some(KillOverride::Cascade) if declared == OnKill::Prevent => OnKill::Cascade,
        Some(KillOverride::Restrict) => OnKill::Prevent,
        _ => declared,
    }
}

/// Delete an edge, first cascading through every higher-order edge that
/// lists it among its targets (transitively, no override).
pub(crate) fn unlink_with_higher_order(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    edge_id: EdgeId,
    scheduled: &mut HashSet<EdgeId>,
    effects: &mut MutationEffects,
) -> MutationResult<()> {
    if !scheduled.insert(edge_id) {
        return Ok(());
    }
    if scheduled.len() > ctx.limits.max_cascade_count {
        return Err(MutationError::CascadeLimit {
            limit: ctx.limits.max_cascade_count,
        });
    }

    let (edge_type, meta_edges, endpoint_types) = {
        let view = TxnView::new(ctx.graph, buffer);
        let Some(edge) = view.edge(edge_id) else {
            return Ok(());
        };
        // Deleting an edge affects its endpoints' constraint-relevant
        // state (cardinality minimums), so they count as touched.
        let endpoints: Vec<(NodeId, mew_core::TypeId)> = edge
            .node_targets()
            .filter_map(|n| view.node(n).map(|node| (n, node.type_id)))
            .collect();
        (edge.type_id, view.edges_about(edge_id), endpoints)
    };

    for meta in meta_edges {
        unlink_with_higher_order(ctx, buffer, meta, scheduled, effects)?;
    }

    let snapshot = ctx.graph.get_edge(edge_id).cloned();
    buffer.delete_edge(edge_id, snapshot);
    effects.deleted_edges.push(edge_id);
    effects.touched.touch_edge(edge_id, edge_type);
    for (node_id, node_type) in endpoint_types {
        effects.touched.touch_node(node_id, node_type);
    }
    Ok(())
}
