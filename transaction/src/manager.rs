//! Transaction state and phase orchestration.

use crate::{TxnError, TxnResult};
use indexmap::IndexSet;
use mew_constraint::{ConstraintChecker, Violation, Violations};
use mew_core::{EdgeId, EntityId, NodeId, TxnId, TypeId};
use mew_graph::{BufferOp, Graph, TxnBuffer, TxnBufferMark, TxnView};
use mew_journal::{entries_for_ops, WalEntry};
use mew_mutation::{ops, MutationCtx, MutationEffects, TouchSet};
use mew_parser::{AttrAssignment, IsolationLevel, KillOverride, LinkStmt, SpawnStmt};
use mew_pattern::Bindings;
use mew_rule::{RuleEngine, RuleState, RuleStateMark};

/// Predicate reads recorded under `Serializable`: which type extents and
/// which individual entities this transaction observed.
#[derive(Debug, Default)]
pub struct ReadSet {
    pub type_ids: IndexSet<TypeId>,
    pub edge_type_ids: IndexSet<mew_core::EdgeTypeId>,
    pub entity_ids: IndexSet<EntityId>,
}

impl ReadSet {
    pub fn note_type(&mut self, type_id: TypeId) {
        self.type_ids.insert(type_id);
    }

    pub fn note_edge_type(&mut self, edge_type: mew_core::EdgeTypeId) {
        self.edge_type_ids.insert(edge_type);
    }

    pub fn note_entity(&mut self, entity: EntityId) {
        self.entity_ids.insert(entity);
    }

    pub fn is_empty(&self) -> bool {
        self.type_ids.is_empty() && self.edge_type_ids.is_empty() && self.entity_ids.is_empty()
    }
}

#[derive(Debug)]
struct Savepoint {
    name: String,
    buffer: TxnBufferMark,
    rules: RuleStateMark,
    touched_nodes: usize,
    touched_edges: usize,
}

/// An in-flight transaction.
pub struct Transaction {
    pub id: TxnId,
    pub isolation: IsolationLevel,
    /// Commit-log sequence at begin; serializable validation compares
    /// against transactions that committed after this point.
    pub start_seq: u64,
    /// Whether this transaction came from an explicit BEGIN.
    pub explicit: bool,
    pub buffer: TxnBuffer,
    pub rule_state: RuleState,
    pub read_set: ReadSet,
    /// Everything touched in this transaction, rules included; drives the
    /// deferred pass and the serializable commit footprint.
    pub touched: TouchSet,
    /// Soft-constraint reports gathered along the way.
    pub warnings: Vec<Violation>,
    savepoints: Vec<Savepoint>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation: IsolationLevel, start_seq: u64, explicit: bool) -> Self {
        Self {
            id,
            isolation,
            start_seq,
            explicit,
            buffer: TxnBuffer::new(),
            rule_state: RuleState::new(),
            read_set: ReadSet::default(),
            touched: TouchSet::new(),
            warnings: Vec::new(),
            savepoints: Vec::new(),
        }
    }

    /// A read view over committed state plus this transaction's buffer.
    pub fn view<'a>(&'a self, graph: &'a Graph) -> TxnView<'a> {
        TxnView::new(graph, &self.buffer)
    }

    // ==================== Transformations ====================

    pub fn run_spawn(
        &mut self,
        ctx: &MutationCtx<'_>,
        stmt: &SpawnStmt,
        bindings: &Bindings,
    ) -> TxnResult<MutationEffects> {
        let effects = ops::execute_spawn(ctx, &mut self.buffer, stmt, bindings)?;
        self.after_mutation(ctx, effects)
    }

    pub fn run_kill(
        &mut self,
        ctx: &MutationCtx<'_>,
        victims: Vec<NodeId>,
        override_: Option<KillOverride>,
    ) -> TxnResult<MutationEffects> {
        let effects = ops::execute_kill(ctx, &mut self.buffer, victims, override_)?;
        self.after_mutation(ctx, effects)
    }

    pub fn run_link(
        &mut self,
        ctx: &MutationCtx<'_>,
        stmt: &LinkStmt,
        targets: Vec<EntityId>,
        bindings: &Bindings,
    ) -> TxnResult<MutationEffects> {
        let effects = ops::execute_link(ctx, &mut self.buffer, stmt, targets, bindings)?;
        self.after_mutation(ctx, effects)
    }

    pub fn run_unlink(&mut self, ctx: &MutationCtx<'_>, edge: EdgeId) -> TxnResult<MutationEffects> {
        let effects = ops::execute_unlink(ctx, &mut self.buffer, edge)?;
        self.after_mutation(ctx, effects)
    }

    pub fn run_set(
        &mut self,
        ctx: &MutationCtx<'_>,
        target: EntityId,
        assignments: &[AttrAssignment],
        bindings: &Bindings,
    ) -> TxnResult<MutationEffects> {
        let effects = ops::execute_set(ctx, &mut self.buffer, target, assignments, bindings)?;
        self.after_mutation(ctx, effects)
    }

    /// Spawn a single inline item (LINK target position), without a rule
    /// pass of its own: the enclosing statement fires rules once.
    pub fn run_inline_spawn(
        &mut self,
        ctx: &MutationCtx<'_>,
        item: &mew_parser::SpawnItem,
        bindings: &Bindings,
    ) -> TxnResult<NodeId> {
        let id = ops::execute_spawn_item(ctx, &mut self.buffer, item, bindings)?;
        let type_id = ctx.registry.get_type_id(&item.type_name).unwrap();
        let mut effects = MutationEffects::default();
        effects.created_nodes.push(id);
        effects.touched.touch_node(id, type_id);
        self.after_mutation(ctx, effects)?;
        Ok(id)
    }

    /// The shared post-mutation pipeline: immediate constraints on the
    /// primitive's footprint, then rule firing to quiescence (the engine
    /// re-checks constraints after each rule action).
    fn after_mutation(
        &mut self,
        ctx: &MutationCtx<'_>,
        effects: MutationEffects,
    ) -> TxnResult<MutationEffects> {
        let checker = ConstraintChecker::new(ctx.registry, ctx.evaluator);
        {
            let view = TxnView::new(ctx.graph, &self.buffer);
            let violations = checker.check_immediate(&view, &effects.touched)?;
            self.absorb(violations)?;
        }

        let mut rule_touched = TouchSet::new();
        RuleEngine::fire_to_quiescence(
            ctx,
            &mut self.buffer,
            &mut self.rule_state,
            &effects.touched,
            &mut rule_touched,
        )?;

        self.touched.merge(&effects.touched);
        self.touched.merge(&rule_touched);
        Ok(effects)
    }

    /// Soft violations are collected; the first hard one aborts.
    fn absorb(&mut self, violations: Violations) -> TxnResult<()> {
        if let Some(error) = violations.first_error() {
            return Err(TxnError::ConstraintViolation {
                constraint: error.constraint_name.clone(),
                message: error.message.clone(),
            });
        }
        self.warnings.extend(violations.all().iter().cloned());
        Ok(())
    }

    // ==================== Savepoints ====================

    pub fn savepoint(&mut self, name: &str) {
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            buffer: self.buffer.mark(),
            rules: self.rule_state.mark(),
            touched_nodes: self.touched.nodes.len(),
            touched_edges: self.touched.edges.len(),
        });
    }

    /// Truncate all transaction-local sets back to the named savepoint.
    /// Later savepoints are discarded; the target stays usable.
    pub fn rollback_to(&mut self, name: &str) -> TxnResult<()> {
        let position = self
            .savepoints
            .iter()
            .rposition(|sp| sp.name == name)
            .ok_or_else(|| TxnError::SavepointNotFound(name.to_string()))?;

        let savepoint = &self.savepoints[position];
        self.buffer.rollback_to(savepoint.buffer);
        self.rule_state.rollback_to(savepoint.rules);
        self.touched.nodes.truncate(savepoint.touched_nodes);
        self.touched.edges.truncate(savepoint.touched_edges);
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    // ==================== Commit ====================

    /// Phase one of commit: deferred constraints over the combined
    /// committed-plus-buffer view.
    pub fn prepare_commit(&mut self, ctx: &MutationCtx<'_>) -> TxnResult<()> {
        tracing::debug!(
            txn = self.id,
            buffered = self.buffer.len(),
            activations = self.rule_state.activations,
            "preparing commit"
        );
        let checker = ConstraintChecker::new(ctx.registry, ctx.evaluator);
        let violations = {
            let view = TxnView::new(ctx.graph, &self.buffer);
            checker.check_deferred(&view, &self.touched)?
        };
        if let Some(error) = violations.first_error() {
            return Err(TxnError::DeferredViolation {
                constraint: error.constraint_name.clone(),
                message: error.message.clone(),
            });
        }
        self.warnings.extend(violations.all().iter().cloned());
        Ok(())
    }

    /// The WAL entries for this transaction's effective operations,
    /// bracketed by begin/commit elsewhere.
    pub fn wal_entries(&self) -> Vec<WalEntry> {
        entries_for_ops(self.id, &self.buffer.effective_ops())
    }

    /// The effective operations to apply to the store.
    pub fn effective_ops(&self) -> Vec<BufferOp> {
        self.buffer.effective_ops()
    }

    /// (created, deleted, modified) counts over the whole transaction.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.buffer.counts()
    }

    pub fn is_read_only(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Apply effective operations to the committed store. Runs inside the
/// commit critical section, after the WAL fsync; indexes update in the
/// same call as each entity mutation.
pub fn apply_ops(graph: &mut Graph, ops: &[BufferOp]) -> TxnResult<()> {
    for op in ops {
        match op {
            BufferOp::InsertNode(node) => graph.insert_node(node.clone())?,
            BufferOp::DeleteNode(node) => {
                graph.remove_node(node.id)?;
            }
            BufferOp::InsertEdge(edge) => graph.insert_edge(edge.clone())?,
            BufferOp::DeleteEdge(edge) => {
                graph.remove_edge(edge.id)?;
            }
            BufferOp::SetAttr {
                entity, attr, new, ..
            } => match entity {
                EntityId::Node(id) => {
                    graph.apply_node_attr(*id, attr, new.clone())?;
                }
                EntityId::Edge(id) => {
                    graph.apply_edge_attr(*id, attr, new.clone())?;
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, EngineLimits, Node, Value};
    use mew_graph::{GraphRead, IdGen};
    use mew_parser::{Expr, Literal, LiteralKind, Span, SpawnItem};
    use mew_pattern::Evaluator;
    use mew_registry::{AttrDef, Registry, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String").required())
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    fn spawn_stmt(title: &str) -> SpawnStmt {
        SpawnStmt {
            items: vec![SpawnItem {
                var: "t".to_string(),
                type_name: "Task".to_string(),
                attrs: vec![AttrAssignment {
                    name: "title".to_string(),
                    value: Expr::Literal(Literal {
                        kind: LiteralKind::String(title.to_string()),
                        span: Span::default(),
                    }),
                    span: Span::default(),
                }],
                span: Span::default(),
            }],
            returning: None,
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
    fn test_buffered_until_applied() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(1, IsolationLevel::ReadCommitted, 0, true);
        let effects = txn.run_spawn(&ctx, &spawn_stmt("X"), &Bindings::new()).unwrap();
        let id = effects.created_nodes[0];

        // Read-your-writes through the view; invisible in the store.
        assert!(txn.view(&fx.graph).node(id).is_some());
        assert!(fx.graph.get_node(id).is_none());

        // Apply makes it visible.
        let ops = txn.effective_ops();
        let mut graph = fx.graph;
        apply_ops(&mut graph, &ops).unwrap();
        assert!(graph.get_node(id).is_some());
    }

    #[test]
    fn test_rollback_is_a_buffer_drop() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(1, IsolationLevel::ReadCommitted, 0, true);
        txn.run_spawn(&ctx, &spawn_stmt("X"), &Bindings::new()).unwrap();
        drop(txn);

        assert_eq!(fx.graph.node_count(), 0);
    }

    #[test]
    fn test_savepoint_rollback_to() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(1, IsolationLevel::ReadCommitted, 0, true);
        let first = txn
            .run_spawn(&ctx, &spawn_stmt("keep"), &Bindings::new())
            .unwrap()
            .created_nodes[0];
        txn.savepoint("sp1");
        let second = txn
            .run_spawn(&ctx, &spawn_stmt("drop"), &Bindings::new())
            .unwrap()
            .created_nodes[0];

        txn.rollback_to("sp1").unwrap();

        let view = txn.view(&fx.graph);
        assert!(view.node(first).is_some());
        assert!(view.node(second).is_none());

        // The savepoint remains usable after rollback.
        assert!(txn.rollback_to("sp1").is_ok());
        assert!(matches!(
            txn.rollback_to("missing"),
            Err(TxnError::SavepointNotFound(_))
        ));
    }

    #[test]
    fn test_constraint_violation_surfaces() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(1, IsolationLevel::ReadCommitted, 0, false);
        let stmt = SpawnStmt {
            items: vec![SpawnItem {
                var: "t".to_string(),
                type_name: "Task".to_string(),
                attrs: vec![],
                span: Span::default(),
            }],
            returning: None,
            span: Span::default(),
        };
        let err = txn.run_spawn(&ctx, &stmt, &Bindings::new()).unwrap_err();
        assert!(matches!(
            err,
            TxnError::Mutation(mew_mutation::MutationError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_wal_entries_match_effective_ops() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(7, IsolationLevel::ReadCommitted, 0, true);
        txn.run_spawn(&ctx, &spawn_stmt("X"), &Bindings::new()).unwrap();

        let entries = txn.wal_entries();
        assert_eq!(entries.len(), txn.effective_ops().len());
        assert!(matches!(
            entries[0],
            mew_journal::WalEntry::NodeInsert { txn: 7, .. }
        ));
    }

    #[test]
    fn test_counts_roll_up() {
        let fx = Fx::new();
        let evaluator = Evaluator::new(&fx.registry);
        let ctx = MutationCtx::new(&fx.registry, &fx.graph, &fx.ids, &evaluator, &fx.limits);

        let mut txn = Transaction::new(1, IsolationLevel::ReadCommitted, 0, true);
        let id = txn
            .run_spawn(&ctx, &spawn_stmt("X"), &Bindings::new())
            .unwrap()
            .created_nodes[0];
        txn.run_set(
            &ctx,
            id.into(),
            &[AttrAssignment {
                name: "title".to_string(),
                value: Expr::Literal(Literal {
                    kind: LiteralKind::String("Y".to_string()),
                    span: Span::default(),
                }),
                span: Span::default(),
            }],
            &Bindings::new(),
        )
        .unwrap();

        // A set on a created node folds into the insert: one creation,
        // nothing else.
        assert_eq!(txn.counts(), (1, 0, 0));
        let view = txn.view(&fx.graph);
        assert_eq!(view.node_attr(id, "title"), Some(Value::String("Y".into())));
    }
}
