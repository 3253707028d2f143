//! The forward-chaining engine.

use crate::{RuleError, RuleResult};
use indexmap::IndexSet;
use mew_constraint::ConstraintChecker;
use mew_core::{EntityId, NodeId};
use mew_graph::{GraphRead, TxnBuffer, TxnView};
use mew_mutation::{ops, MutationCtx, MutationEffects, TouchSet};
use mew_parser::{MutationAction, PatternElem, Target, TargetRef};
use mew_pattern::{Binding, Bindings, CompiledPattern, Matcher};
use mew_registry::RuleDef;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Activation key: rule id plus the binding fingerprint.
type ActivationKey = (u32, u64);

/// Per-transaction rule execution state. Owned by the transaction so
/// savepoints can truncate it positionally.
#[derive(Debug, Default)]
pub struct RuleState {
    /// Completed activations (idempotence set).
    executed: IndexSet<ActivationKey>,
    /// Activations currently on the chain (cycle detection).
    stack: Vec<ActivationKey>,
    /// Total production actions executed in this transaction.
    actions: usize,
    /// Total activations executed in this transaction.
    pub activations: usize,
    /// Deepest chain observed.
    pub max_depth_seen: usize,
}

/// Savepoint marker over the rule state.
#[derive(Debug, Clone, Copy)]
pub struct RuleStateMark {
    executed: usize,
    actions: usize,
    activations: usize,
}

impl RuleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> RuleStateMark {
        RuleStateMark {
            executed: self.executed.len(),
            actions: self.actions,
            activations: self.activations,
        }
    }

    pub fn rollback_to(&mut self, mark: RuleStateMark) {
        self.executed.truncate(mark.executed);
        self.actions = mark.actions;
        self.activations = mark.activations;
    }

    pub fn actions(&self) -> usize {
        self.actions
    }
}

/// One pending activation, ready to execute.
struct Activation<'r> {
    rule: &'r RuleDef,
    bindings: Bindings,
    fingerprint: u64,
}

/// The rule engine. Stateless across transactions; per-transaction state
/// lives in [`RuleState`].
pub struct RuleEngine;

impl RuleEngine {
    /// Fire rules to quiescence starting from the given mutation
    /// footprint. New mutations produced by rule actions re-enter the
    /// engine as a nested chain; the chain depth and total action count
    /// are bounded by the engine limits.
    pub fn fire_to_quiescence(
        ctx: &MutationCtx<'_>,
        buffer: &mut TxnBuffer,
        state: &mut RuleState,
        recent: &TouchSet,
        accumulated: &mut TouchSet,
    ) -> RuleResult<()> {
        if recent.is_empty() {
            return Ok(());
        }

        let pending = Self::collect_activations(ctx, buffer, recent)?;

        for activation in pending {
            let key = (activation.rule.id, activation.fingerprint);
            if state.executed.contains(&key) {
                continue;
            }
            if state.stack.contains(&key) {
                let path = state
                    .stack
                    .iter()
                    .map(|(rule_id, _)| {
                        ctx.registry
                            .all_rules()
                            .find(|r| r.id == *rule_id)
                            .map(|r| r.name.clone())
                            .unwrap_or_else(|| rule_id.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(RuleError::RuleCycle {
                    rule: activation.rule.name.clone(),
                    path,
                });
            }

            // Earlier activations may have invalidated this match.
            if !Self::still_matches(ctx, buffer, activation.rule, &activation.bindings)? {
                continue;
            }

            if state.stack.len() + 1 > ctx.limits.max_rule_depth {
                return Err(RuleError::MaxDepthExceeded {
                    depth: state.stack.len() + 1,
                });
            }

            state.stack.push(key);
            state.max_depth_seen = state.max_depth_seen.max(state.stack.len());
            state.executed.insert(key);
            state.activations += 1;
            tracing::debug!(rule = %activation.rule.name, "rule activation");

            let produced =
                Self::execute_production(ctx, buffer, state, activation.rule, &activation.bindings);
            let produced = match produced {
                Ok(produced) => produced,
                Err(err) => {
                    state.stack.pop();
                    return Err(err);
                }
            };

            accumulated.merge(&produced);
            if !produced.is_empty() {
                let nested = Self::fire_to_quiescence(ctx, buffer, state, &produced, accumulated);
                if let Err(err) = nested {
                    state.stack.pop();
                    return Err(err);
                }
            }
            state.stack.pop();
        }

        Ok(())
    }

    /// Manually fire a named rule (manual rules never auto-collect).
    pub fn fire_by_name(
        ctx: &MutationCtx<'_>,
        buffer: &mut TxnBuffer,
        state: &mut RuleState,
        name: &str,
        accumulated: &mut TouchSet,
    ) -> RuleResult<()> {
        let rule = ctx
            .registry
            .get_rule_by_name(name)
            .ok_or_else(|| RuleError::UnknownRule {
                name: name.to_string(),
            })?;

        let matches = {
            let view = TxnView::new(ctx.graph, buffer);
            let matcher = Matcher::with_evaluator(
                ctx.registry,
                &view,
                ctx.evaluator.clone(),
            );
            let mut pattern =
                CompiledPattern::compile(&rule.pattern.elements, ctx.registry)?;
            if let Some(where_clause) = &rule.pattern.where_clause {
                pattern = pattern.with_filter(where_clause.clone());
            }
            matcher.find_all(&pattern)?
        };

        for bindings in matches {
            let fingerprint = Self::fingerprint(ctx, buffer, rule, &bindings);
            let key = (rule.id, fingerprint);
            if state.executed.contains(&key) {
                continue;
            }
            state.executed.insert(key);
            state.activations += 1;
            let produced = Self::execute_production(ctx, buffer, state, rule, &bindings)?;
            accumulated.merge(&produced);
            Self::fire_to_quiescence(ctx, buffer, state, &produced, accumulated)?;
        }
        Ok(())
    }

    /// Find (rule, binding) pairs triggered by the recent mutations:
    /// auto rules whose affected sets intersect the footprint, matched
    /// with each compatible touched entity as a seed.
    fn collect_activations<'r>(
        ctx: &MutationCtx<'r>,
        buffer: &TxnBuffer,
        recent: &TouchSet,
    ) -> RuleResult<Vec<Activation<'r>>> {
        let node_types = recent.node_types();
        let edge_types = recent.edge_types();
        let rules = ctx.registry.auto_rules_affecting(&node_types, &edge_types);

        let view = TxnView::new(ctx.graph, buffer);
        let matcher =
            Matcher::with_evaluator(ctx.registry, &view, ctx.evaluator.clone());

        let mut pending = Vec::new();
        for rule in rules {
            let mut seen_fingerprints: IndexSet<u64> = IndexSet::new();

            for elem in &rule.pattern.elements {
                match elem {
                    PatternElem::Node(node_pattern) => {
                        let expected = if node_pattern.type_name == "any" {
                            None
                        } else {
                            ctx.registry.get_type_id(&node_pattern.type_name)
                        };
                        for (node_id, node_type) in &recent.nodes {
                            let admissible = match expected {
                                Some(tid) => ctx.registry.is_subtype(*node_type, tid),
                                None => true,
                            };
                            if !admissible || view.node(*node_id).is_none() {
                                continue;
                            }
                            Self::seed_matches(
                                ctx,
                                &matcher,
                                rule,
                                &node_pattern.var,
                                Binding::Node(*node_id),
                                buffer,
                                &mut seen_fingerprints,
                                &mut pending,
                            )?;
                        }
                    }
                    PatternElem::Edge(edge_pattern) => {
                        let Some(alias) = &edge_pattern.alias else {
                            // Edge mutations still trigger the rule through
                            // the edge's endpoint variables; those arrive as
                            // touched nodes via the mutation layer.
                            continue;
                        };
                        let expected = ctx.registry.get_edge_type_id(&edge_pattern.edge_type);
                        for (edge_id, edge_type) in &recent.edges {
                            let admissible = expected.map(|et| et == *edge_type).unwrap_or(true);
                            if !admissible || view.edge(*edge_id).is_none() {
                                continue;
                            }
                            Self::seed_matches(
                                ctx,
                                &matcher,
                                rule,
                                alias,
                                Binding::Edge(*edge_id),
                                buffer,
                                &mut seen_fingerprints,
                                &mut pending,
                            )?;
                        }
                    }
                }
            }
        }

        Ok(pending)
    }

    #[allow(clippy::too_many_arguments)]
    fn seed_matches<'r>(
        ctx: &MutationCtx<'r>,
        matcher: &Matcher<'_, '_>,
        rule: &'r RuleDef,
        var: &str,
        seed: Binding,
        buffer: &TxnBuffer,
        seen: &mut IndexSet<u64>,
        pending: &mut Vec<Activation<'r>>,
    ) -> RuleResult<()> {
        let prebound = vec![var.to_string()];
        let mut pattern = CompiledPattern::compile_with_prebound(
            &rule.pattern.elements,
            ctx.registry,
            &prebound,
        )?;
        if let Some(where_clause) = &rule.pattern.where_clause {
            pattern = pattern.with_filter(where_clause.clone());
        }

        let matches = matcher.find_all_with_initial(&pattern, Bindings::with(var, seed))?;
        for bindings in matches {
            let fingerprint = Self::fingerprint(ctx, buffer, rule, &bindings);
            if seen.insert(fingerprint) {
                pending.push(Activation {
                    rule,
                    bindings,
                    fingerprint,
                });
            }
        }
        Ok(())
    }

    /// The activation fingerprint covers the bound entity ids plus the
    /// current values of every attribute the rule's WHERE clause reads.
    /// Value-blind rules therefore execute once per entity; value-dependent
    /// rules re-fire when the values they tested change.
    fn fingerprint(
        ctx: &MutationCtx<'_>,
        buffer: &TxnBuffer,
        rule: &RuleDef,
        bindings: &Bindings,
    ) -> u64 {
        let view = TxnView::new(ctx.graph, buffer);
        let mut hasher = DefaultHasher::new();
        rule.id.hash(&mut hasher);

        let mut names: Vec<&str> = bindings.names().collect();
        names.sort_unstable();
        for name in names {
            name.hash(&mut hasher);
            match bindings.get(name) {
                Some(Binding::Node(id)) => ("n", id.raw()).hash(&mut hasher),
                Some(Binding::Edge(id)) => ("e", id.raw()).hash(&mut hasher),
                Some(Binding::Value(v)) => ("v", v.group_key()).hash(&mut hasher),
                Some(Binding::Null) | None => "-".hash(&mut hasher),
            }
        }

        for (var, attr) in &rule.referenced_attrs {
            let value = match bindings.get(var) {
                Some(Binding::Node(id)) => view.node_attr(*id, attr),
                Some(Binding::Edge(id)) => view.edge_attr(*id, attr),
                _ => None,
            };
            (var, attr, value.map(|v| v.group_key())).hash(&mut hasher);
        }

        hasher.finish()
    }

    fn still_matches(
        ctx: &MutationCtx<'_>,
        buffer: &TxnBuffer,
        rule: &RuleDef,
        bindings: &Bindings,
    ) -> RuleResult<bool> {
        let view = TxnView::new(ctx.graph, buffer);
        let matcher =
            Matcher::with_evaluator(ctx.registry, &view, ctx.evaluator.clone());
        let prebound: Vec<String> = bindings.names().map(|s| s.to_string()).collect();
        let mut pattern =
            CompiledPattern::compile_with_prebound(&rule.pattern.elements, ctx.registry, &prebound)?;
        if let Some(where_clause) = &rule.pattern.where_clause {
            pattern = pattern.with_filter(where_clause.clone());
        }
        Ok(matcher.exists(&pattern, bindings.clone())?)
    }

    /// Run the production's ordered action list under the transaction
    /// buffer. The first error aborts the activation (and with it the
    /// surrounding transaction); rules never partially apply.
    fn execute_production(
        ctx: &MutationCtx<'_>,
        buffer: &mut TxnBuffer,
        state: &mut RuleState,
        rule: &RuleDef,
        bindings: &Bindings,
    ) -> RuleResult<TouchSet> {
        let mut produced = TouchSet::new();
        let mut local = bindings.clone();

        for action in &rule.production {
            state.actions += 1;
            if state.actions > ctx.limits.max_rule_actions {
                return Err(RuleError::MaxActionsExceeded {
                    count: state.actions,
                });
            }

            let effects = Self::run_action(ctx, buffer, rule, action, &mut local)?;

            // Immediate constraints run after every rule-induced mutation.
            let checker = ConstraintChecker::new(ctx.registry, ctx.evaluator);
            let view = TxnView::new(ctx.graph, buffer);
            let violations = checker
                .check_immediate(&view, &effects.touched)
                .map_err(|e| RuleError::InvalidProduction {
                    rule: rule.name.clone(),
                    message: e.to_string(),
                })?;
            if let Some(violation) = violations.first_error() {
                return Err(RuleError::ConstraintViolation {
                    rule: rule.name.clone(),
                    constraint: violation.constraint_name.clone(),
                    message: violation.message.clone(),
                });
            }

            produced.merge(&effects.touched);
        }

        Ok(produced)
    }

    fn run_action(
        ctx: &MutationCtx<'_>,
        buffer: &mut TxnBuffer,
        rule: &RuleDef,
        action: &MutationAction,
        local: &mut Bindings,
    ) -> RuleResult<MutationEffects> {
        match action {
            MutationAction::Spawn(stmt) => {
                let effects = ops::execute_spawn(ctx, buffer, stmt, local)?;
                for (item, id) in stmt.items.iter().zip(&effects.created_nodes) {
                    local.insert(&item.var, Binding::Node(*id));
                }
                Ok(effects)
            }
            MutationAction::Link(stmt) => {
                let mut targets = Vec::new();
                for target_ref in &stmt.targets {
                    let entity = match target_ref {
                        TargetRef::Var(name) => Self::entity_binding(rule, local, name)?,
                        TargetRef::Id(id) => Self::parse_entity_id(ctx, buffer, rule, id)?,
                        TargetRef::InlineSpawn(item) => {
                            let node = ops::execute_spawn_item(ctx, buffer, item, local)?;
                            local.insert(&item.var, Binding::Node(node));
                            EntityId::Node(node)
                        }
                    };
                    targets.push(entity);
                }
                let effects = ops::execute_link(ctx, buffer, stmt, targets, local)?;
                if let (Some(var), Some(edge_id)) = (&stmt.var, effects.created_edges.first()) {
                    local.insert(var, Binding::Edge(*edge_id));
                }
                Ok(effects)
            }
            MutationAction::Set(stmt) => {
                let entity = Self::resolve_target(ctx, buffer, rule, local, &stmt.target)?;
                Ok(ops::execute_set(ctx, buffer, entity, &stmt.assignments, local)?)
            }
            MutationAction::Kill(stmt) => {
                let entity = Self::resolve_target(ctx, buffer, rule, local, &stmt.target)?;
                let EntityId::Node(node_id) = entity else {
                    return Err(RuleError::InvalidProduction {
                        rule: rule.name.clone(),
                        message: "KILL requires a node target".to_string(),
                    });
                };
                Ok(ops::execute_kill(ctx, buffer, vec![node_id], stmt.override_)?)
            }
            MutationAction::Unlink(stmt) => {
                let entity = Self::resolve_target(ctx, buffer, rule, local, &stmt.target)?;
                let EntityId::Edge(edge_id) = entity else {
                    return Err(RuleError::InvalidProduction {
                        rule: rule.name.clone(),
                        message: "UNLINK requires an edge target".to_string(),
                    });
                };
                Ok(ops::execute_unlink(ctx, buffer, edge_id)?)
            }
        }
    }

    fn resolve_target(
        ctx: &MutationCtx<'_>,
        buffer: &TxnBuffer,
        rule: &RuleDef,
        local: &Bindings,
        target: &Target,
    ) -> RuleResult<EntityId> {
        match target {
            Target::Var(name) => Self::entity_binding(rule, local, name),
            Target::Id(id) => Self::parse_entity_id(ctx, buffer, rule, id),
            Target::Pattern(_) | Target::EdgePattern { .. } => Err(RuleError::InvalidProduction {
                rule: rule.name.clone(),
                message: "rule productions take variable or id targets".to_string(),
            }),
        }
    }

    fn entity_binding(rule: &RuleDef, local: &Bindings, name: &str) -> RuleResult<EntityId> {
        local
            .get(name)
            .and_then(|b| b.as_entity())
            .ok_or_else(|| RuleError::InvalidProduction {
                rule: rule.name.clone(),
                message: format!("unbound production variable '{}'", name),
            })
    }

    fn parse_entity_id(
        ctx: &MutationCtx<'_>,
        buffer: &TxnBuffer,
        rule: &RuleDef,
        id: &str,
    ) -> RuleResult<EntityId> {
        let raw: u64 = id.parse().map_err(|_| RuleError::InvalidProduction {
            rule: rule.name.clone(),
            message: format!("invalid id reference '#{}'", id),
        })?;
        let view = TxnView::new(ctx.graph, buffer);
        if view.node(NodeId::new(raw)).is_some() {
            Ok(EntityId::Node(NodeId::new(raw)))
        } else {
            Ok(EntityId::Edge(mew_core::EdgeId::new(raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, fixed_clock, EngineLimits, Node, Value};
    use mew_graph::{Graph, IdGen};
    use mew_parser::{
        AttrAssignment, BinaryOp, Expr, Literal, LiteralKind, NodePattern, Pattern, SetStmt, Span,
    };
    use mew_pattern::Evaluator;
    use mew_registry::{AttrDef, Registry, RegistryBuilder};

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

    fn set_action(target: &str, attr: &str, value: Expr) -> MutationAction {
        MutationAction::Set(SetStmt {
            target: Target::Var(target.to_string()),
            assignments: vec![AttrAssignment {
                name: attr.to_string(),
                value,
                span: Span::default(),
            }],
            returning: None,
            span: Span::default(),
        })
    }

    fn now_call() -> Expr {
        Expr::FnCall(mew_parser::FnCall {
            name: "now".to_string(),
            args: vec![],
            distinct: false,
            span: Span::default(),
        })
    }

    /// Registry with the auto-timestamp rule: on Task, SET t.created_at = now().
    fn timestamp_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String"))
            .attr(AttrDef::new("created_at", "Timestamp").nullable())
            .done()
            .unwrap();
        builder
            .add_rule(
                "auto_ts",
                node_pattern("t", "Task"),
                vec![set_action("t", "created_at", now_call())],
            )
            .priority(100)
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    /// Registry with the bounded increment rule:
    /// t: Counter WHERE t.v < 10 => SET t.v = t.v + 1.
    fn counter_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Counter")
            .attr(AttrDef::new("v", "Int"))
            .done()
            .unwrap();
        let pattern = Pattern {
            elements: vec![PatternElem::Node(NodePattern {
                var: "t".to_string(),
                type_name: "Counter".to_string(),
                span: Span::default(),
            })],
            where_clause: Some(Expr::BinaryOp(
                BinaryOp::Lt,
                Box::new(Expr::AttrAccess(
                    Box::new(Expr::Var("t".to_string(), Span::default())),
                    "v".to_string(),
                    Span::default(),
                )),
                Box::new(Expr::Literal(Literal {
                    kind: LiteralKind::Int(10),
                    span: Span::default(),
                })),
                Span::default(),
            )),
            span: Span::default(),
        };
        let increment = Expr::BinaryOp(
            BinaryOp::Add,
            Box::new(Expr::AttrAccess(
                Box::new(Expr::Var("t".to_string(), Span::default())),
                "v".to_string(),
                Span::default(),
            )),
            Box::new(Expr::Literal(Literal {
                kind: LiteralKind::Int(1),
                span: Span::default(),
            })),
            Span::default(),
        );
        builder
            .add_rule(
                "inc_until_ten",
                pattern,
                vec![set_action("t", "v", increment)],
            )
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_value_blind_rule_fires_exactly_once() {
        let registry = timestamp_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry).with_clock(fixed_clock(1_705_320_000_000));
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let task_t = registry.get_type_id("Task").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, task_t, attrs! { "title" => "X" }));

        let mut touched = TouchSet::new();
        touched.touch_node(id, task_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();

        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched, &mut accumulated)
            .unwrap();

        assert_eq!(state.activations, 1);
        let view = TxnView::new(&graph, &buffer);
        assert_eq!(
            view.node_attr(id, "created_at"),
            Some(Value::Timestamp(1_705_320_000_000))
        );
        assert_eq!(view.node_attr(id, "title"), Some(Value::String("X".into())));
    }

    #[test]
    fn test_value_dependent_rule_runs_to_quiescence() {
        let registry = counter_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let counter_t = registry.get_type_id("Counter").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, counter_t, attrs! { "v" => 0 }));

        let mut touched = TouchSet::new();
        touched.touch_node(id, counter_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();

        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched, &mut accumulated)
            .unwrap();

        assert_eq!(state.activations, 10);
        let view = TxnView::new(&graph, &buffer);
        assert_eq!(view.node_attr(id, "v"), Some(Value::Int(10)));
    }

    #[test]
    fn test_action_limit_aborts() {
        let registry = counter_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits {
            max_rule_actions: 5,
            ..EngineLimits::default()
        };
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let counter_t = registry.get_type_id("Counter").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, counter_t, attrs! { "v" => 0 }));

        let mut touched = TouchSet::new();
        touched.touch_node(id, counter_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();

        let err = RuleEngine::fire_to_quiescence(
            &ctx,
            &mut buffer,
            &mut state,
            &touched,
            &mut accumulated,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::MaxActionsExceeded { .. }));
    }

    #[test]
    fn test_depth_limit_aborts() {
        let registry = counter_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits {
            max_rule_depth: 3,
            ..EngineLimits::default()
        };
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let counter_t = registry.get_type_id("Counter").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, counter_t, attrs! { "v" => 0 }));

        let mut touched = TouchSet::new();
        touched.touch_node(id, counter_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();

        let err = RuleEngine::fire_to_quiescence(
            &ctx,
            &mut buffer,
            &mut state,
            &touched,
            &mut accumulated,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::MaxDepthExceeded { .. }));
    }

    #[test]
    fn test_priority_order_within_wave() {
        // Two value-blind rules on the same type write to different
        // attributes; the higher-priority one must run first, observable
        // through a shared "last_writer" attribute.
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Doc")
            .attr(AttrDef::new("last_writer", "String").nullable())
            .done()
            .unwrap();
        let writer = |name: &str| {
            vec![set_action(
                "t",
                "last_writer",
                Expr::Literal(Literal {
                    kind: LiteralKind::String(name.to_string()),
                    span: Span::default(),
                }),
            )]
        };
        builder
            .add_rule("low", node_pattern("t", "Doc"), writer("low"))
            .priority(1)
            .done()
            .unwrap();
        builder
            .add_rule("high", node_pattern("t", "Doc"), writer("high"))
            .priority(9)
            .done()
            .unwrap();
        let registry = builder.build().unwrap();

        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let doc_t = registry.get_type_id("Doc").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, doc_t, attrs!()));

        let mut touched = TouchSet::new();
        touched.touch_node(id, doc_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();
        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched, &mut accumulated)
            .unwrap();

        // Both fired once; "low" ran last, so its write wins.
        assert_eq!(state.activations, 2);
        let view = TxnView::new(&graph, &buffer);
        assert_eq!(
            view.node_attr(id, "last_writer"),
            Some(Value::String("low".into()))
        );
    }

    #[test]
    fn test_manual_rule_not_collected() {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("touched", "Bool").nullable())
            .done()
            .unwrap();
        builder
            .add_rule(
                "manual_mark",
                node_pattern("t", "Task"),
                vec![set_action(
                    "t",
                    "touched",
                    Expr::Literal(Literal {
                        kind: LiteralKind::Bool(true),
                        span: Span::default(),
                    }),
                )],
            )
            .manual()
            .done()
            .unwrap();
        let registry = builder.build().unwrap();

        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let task_t = registry.get_type_id("Task").unwrap();
        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, task_t, attrs!()));

        let mut touched = TouchSet::new();
        touched.touch_node(id, task_t);
        let mut state = RuleState::new();
        let mut accumulated = TouchSet::new();

        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched, &mut accumulated)
            .unwrap();
        assert_eq!(state.activations, 0);

        // Explicit firing works.
        RuleEngine::fire_by_name(&ctx, &mut buffer, &mut state, "manual_mark", &mut accumulated)
            .unwrap();
        assert_eq!(state.activations, 1);
        let view = TxnView::new(&graph, &buffer);
        assert_eq!(view.node_attr(id, "touched"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_savepoint_rollback_restores_dedup() {
        let registry = timestamp_registry();
        let graph = Graph::new();
        let ids = IdGen::new();
        let limits = EngineLimits::default();
        let evaluator = Evaluator::new(&registry);
        let ctx = MutationCtx::new(&registry, &graph, &ids, &evaluator, &limits);

        let mut buffer = TxnBuffer::new();
        let task_t = registry.get_type_id("Task").unwrap();

        let mut state = RuleState::new();
        let buffer_mark = buffer.mark();
        let state_mark = state.mark();

        let id = ids.alloc_node_id();
        buffer.create_node(Node::new(id, task_t, attrs! { "title" => "X" }));
        let mut touched = TouchSet::new();
        touched.touch_node(id, task_t);
        let mut accumulated = TouchSet::new();
        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched, &mut accumulated)
            .unwrap();
        assert_eq!(state.activations, 1);

        // ROLLBACK TO the savepoint wipes the activation record with the
        // buffered work, so a replay fires again.
        buffer.rollback_to(buffer_mark);
        state.rollback_to(state_mark);

        let id2 = ids.alloc_node_id();
        buffer.create_node(Node::new(id2, task_t, attrs! { "title" => "Y" }));
        let mut touched2 = TouchSet::new();
        touched2.touch_node(id2, task_t);
        RuleEngine::fire_to_quiescence(&ctx, &mut buffer, &mut state, &touched2, &mut accumulated)
            .unwrap();
        assert_eq!(state.activations, 1);
    }
}
