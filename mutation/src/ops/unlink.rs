//! UNLINK: edge deletion with higher-order cascade.

use crate::ops::kill::unlink_with_higher_order;
use crate::{MutationCtx, MutationEffects, MutationError, MutationResult};
use mew_core::EdgeId;
use mew_graph::{GraphRead, TxnBuffer, TxnView};
use std::collections::HashSet;

/// Delete an edge. Every higher-order edge listing it among its targets
/// is unlinked first, transitively, with no override.
pub fn execute_unlink(
    ctx: &MutationCtx<'_>,
    buffer: &mut TxnBuffer,
    edge_id: EdgeId,
) -> MutationResult<MutationEffects> {
    {
        let view = TxnView::new(ctx.graph, buffer);
        if view.edge(edge_id).is_none() {
            return Err(MutationError::EdgeNotFound(edge_id));
        }
    }

    let mut effects = MutationEffects::default();
    let mut scheduled: HashSet<EdgeId> = HashSet::new();
    unlink_with_higher_order(ctx, buffer, edge_id, &mut scheduled, &mut effects)?;
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, Edge, EngineLimits, EntityId, Node, NodeId};
    use mew_graph::{Graph, IdGen};
    use mew_pattern::Evaluator;
    use mew_registry::{Registry, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder.add_type("Task").done().unwrap();
        builder.add_type("Note").done().unwrap();
        builder
            .add_edge_type("blocks")
            .param("a", "Task")
            .param("b", "Task")
            .done()
            .unwrap();
        builder
            .add_edge_type("annotates")
            .param("note", "Note")
            .param("about", "edge<any>")
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_unlink_cascades_higher_order() {
        let registry = test_registry();
        let mut graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();

        let task_t = registry.get_type_id("Task").unwrap();
        let note_t = registry.get_type_id("Note").unwrap();
        let blocks = registry.get_edge_type_id("blocks").unwrap();
        let annotates = registry.get_edge_type_id("annotates").unwrap();

        let a = ids.alloc_node_id();
        let b = ids.alloc_node_id();
        let n = ids.alloc_node_id();
        graph.insert_node(Node::new(a, task_t, attrs!())).unwrap();
        graph.insert_node(Node::new(b, task_t, attrs!())).unwrap();
        graph.insert_node(Node::new(n, note_t, attrs!())).unwrap();

        let base = ids.alloc_edge_id();
        graph
            .insert_edge(Edge::new(base, blocks, vec![a.into(), b.into()], attrs!()))
            .unwrap();
        let meta = ids.alloc_edge_id();
        graph
            .insert_edge(Edge::new(
                meta,
                annotates,
                vec![n.into(), EntityId::Edge(base)],
                attrs!(),
            ))
            .unwrap();

        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);
        let mut buffer = TxnBuffer::new();

        let effects = execute_unlink(&ctx, &mut buffer, base).unwrap();

        // The annotation goes first, then the base edge.
        assert_eq!(effects.deleted_edges, vec![meta, base]);
        let view = TxnView::new(&graph, &buffer);
        assert!(view.edge(base).is_none());
        assert!(view.edge(meta).is_none());
        // The note node survives.
        assert!(view.node(n).is_some());
    }

    #[test]
    fn test_unlink_missing_edge_fails() {
        let registry = test_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);
        let mut buffer = TxnBuffer::new();

        let err = execute_unlink(&ctx, &mut buffer, EdgeId::new(7)).unwrap_err();
        assert!(matches!(err, MutationError::EdgeNotFound(_)));
    }
}
