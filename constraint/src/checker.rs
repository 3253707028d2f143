//! The incremental constraint checker.

use crate::{ConstraintError, ConstraintResult, Violation, ViolationSeverity, Violations};
use mew_core::{EntityId, NodeId};
use mew_graph::GraphRead;
use mew_mutation::TouchSet;
use mew_parser::PatternElem;
use mew_pattern::{Binding, Bindings, CompiledPattern, Evaluator, Matcher};
use mew_registry::{ConstraintDef, ConstraintPhase, Registry};
use std::collections::HashSet;

/// Evaluates declared constraints against a graph view.
pub struct ConstraintChecker<'r> {
    registry: &'r Registry,
    evaluator: &'r Evaluator<'r>,
}

impl<'r> ConstraintChecker<'r> {
    pub fn new(registry: &'r Registry, evaluator: &'r Evaluator<'r>) -> Self {
        Self {
            registry,
            evaluator,
        }
    }

    /// Immediate pass after a mutation: declared immediate constraints
    /// whose affected types intersect the touch set, restricted to
    /// bindings involving at least one touched entity.
    pub fn check_immediate(
        &self,
        view: &dyn GraphRead,
        touched: &TouchSet,
    ) -> ConstraintResult<Violations> {
        self.check_phase(view, touched, ConstraintPhase::Immediate)
    }

    /// Deferred pass at the commit boundary: declared deferred constraints
    /// plus cardinality minimums.
    pub fn check_deferred(
        &self,
        view: &dyn GraphRead,
        touched: &TouchSet,
    ) -> ConstraintResult<Violations> {
        let mut violations = self.check_phase(view, touched, ConstraintPhase::Deferred)?;
        violations.extend(self.check_min_cardinality(view, touched));
        Ok(violations)
    }

    /// Full-store validation (tests, recovery audits).
    pub fn check_all(&self, view: &dyn GraphRead) -> ConstraintResult<Violations> {
        let mut violations = Violations::new();
        for constraint in self.registry.all_constraints() {
            let pattern = self.compile(constraint)?;
            let matcher = self.matcher(view);
            let matches = matcher
                .find_all(&pattern)
                .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
            for bindings in matches {
                self.check_condition(view, constraint, &bindings, &mut violations)?;
            }
        }
        Ok(violations)
    }

    fn check_phase(
        &self,
        view: &dyn GraphRead,
        touched: &TouchSet,
        phase: ConstraintPhase,
    ) -> ConstraintResult<Violations> {
        let mut violations = Violations::new();
        if touched.is_empty() {
            return Ok(violations);
        }

        let node_types = touched.node_types();
        let edge_types = touched.edge_types();
        let applicable = self
            .registry
            .constraints_affecting(&node_types, &edge_types, phase);

        for constraint in applicable {
            self.check_constraint_incremental(view, constraint, touched, &mut violations)?;
        }
        Ok(violations)
    }

    /// Re-evaluate one constraint over bindings that include at least one
    /// touched entity: seed each compatible pattern variable with each
    /// touched entity and enumerate from there.
    fn check_constraint_incremental(
        &self,
        view: &dyn GraphRead,
        constraint: &ConstraintDef,
        touched: &TouchSet,
        violations: &mut Violations,
    ) -> ConstraintResult<()> {
        let matcher = self.matcher(view);
        let mut seeded = false;

        for elem in &constraint.pattern.elements {
            match elem {
                PatternElem::Node(node_pattern) => {
                    let expected = if node_pattern.type_name == "any" {
                        None
                    } else {
                        self.registry.get_type_id(&node_pattern.type_name)
                    };
                    for (node_id, node_type) in &touched.nodes {
                        let admissible = match expected {
                            Some(tid) => self.registry.is_subtype(*node_type, tid),
                            None => true,
                        };
                        if !admissible || view.node(*node_id).is_none() {
                            continue;
                        }
                        seeded = true;
                        self.run_seeded(
                            view,
                            &matcher,
                            constraint,
                            &node_pattern.var,
                            Binding::Node(*node_id),
                            violations,
                        )?;
                    }
                }
                PatternElem::Edge(edge_pattern) => {
                    let Some(alias) = &edge_pattern.alias else {
                        continue;
                    };
                    let expected = self.registry.get_edge_type_id(&edge_pattern.edge_type);
                    for (edge_id, edge_type) in &touched.edges {
                        let admissible = expected.map(|et| et == *edge_type).unwrap_or(true);
                        if !admissible || view.edge(*edge_id).is_none() {
                            continue;
                        }
                        seeded = true;
                        self.run_seeded(
                            view,
                            &matcher,
                            constraint,
                            alias,
                            Binding::Edge(*edge_id),
                            violations,
                        )?;
                    }
                }
            }
        }

        // No seedable variable (e.g. an edge-only pattern with no alias
        // hit by an edge mutation): fall back to the full extent.
        if !seeded {
            let pattern = self.compile(constraint)?;
            let matches = matcher
                .find_all(&pattern)
                .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
            for bindings in matches {
                self.check_condition(view, constraint, &bindings, violations)?;
            }
        }
        Ok(())
    }

    fn run_seeded(
        &self,
        view: &dyn GraphRead,
        matcher: &Matcher<'_, '_>,
        constraint: &ConstraintDef,
        var: &str,
        seed: Binding,
        violations: &mut Violations,
    ) -> ConstraintResult<()> {
        let prebound = vec![var.to_string()];
        let mut pattern = CompiledPattern::compile_with_prebound(
            &constraint.pattern.elements,
            self.registry,
            &prebound,
        )
        .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
        if let Some(where_clause) = &constraint.pattern.where_clause {
            pattern = pattern.with_filter(where_clause.clone());
        }

        let initial = Bindings::with(var, seed);
        let matches = matcher
            .find_all_with_initial(&pattern, initial)
            .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
        for bindings in matches {
            self.check_condition(view, constraint, &bindings, violations)?;
        }
        Ok(())
    }

    fn compile(&self, constraint: &ConstraintDef) -> ConstraintResult<CompiledPattern> {
        let mut pattern = CompiledPattern::compile(&constraint.pattern.elements, self.registry)
            .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
        if let Some(where_clause) = &constraint.pattern.where_clause {
            pattern = pattern.with_filter(where_clause.clone());
        }
        Ok(pattern)
    }

    fn matcher<'g>(&self, view: &'g dyn GraphRead) -> Matcher<'r, 'g> {
        // Fresh evaluator with the same registry: the checker's evaluator
        // settings (clock, params) do not apply inside constraint patterns.
        Matcher::new(self.registry, view)
    }

    /// `pattern => condition`: a match whose condition does not hold is a
    /// violation. A null condition counts as not holding.
    fn check_condition(
        &self,
        view: &dyn GraphRead,
        constraint: &ConstraintDef,
        bindings: &Bindings,
        violations: &mut Violations,
    ) -> ConstraintResult<()> {
        let holds = self
            .evaluator
            .eval_bool(&constraint.condition, bindings, view)
            .map_err(|e| ConstraintError::evaluation(&constraint.name, e))?;
        if holds {
            return Ok(());
        }

        let severity = if constraint.hard {
            ViolationSeverity::Error
        } else {
            ViolationSeverity::Warning
        };
        let message = constraint
            .message
            .clone()
            .unwrap_or_else(|| format!("constraint '{}' does not hold", constraint.name));
        let entity_bindings: Vec<(String, EntityId)> = bindings
            .entities()
            .map(|(name, entity)| (name.to_string(), entity))
            .collect();

        violations.push(
            Violation::new(&constraint.name, severity, message).with_bindings(entity_bindings),
        );
        Ok(())
    }

    /// Minimum-cardinality bounds: for every edge type with a `min > 0`
    /// position, each live candidate entity touched by this transaction
    /// must appear at that position at least `min` times.
    fn check_min_cardinality(&self, view: &dyn GraphRead, touched: &TouchSet) -> Violations {
        let mut violations = Violations::new();

        for edge_def in self.registry.all_edge_types() {
            if !edge_def.has_min_cardinality() {
                continue;
            }

            for (position, param) in edge_def.params.iter().enumerate() {
                let bound = edge_def.cardinality_at(position);
                if bound.min <= 0 {
                    continue;
                }
                let mew_registry::ParamKind::Node(param_type) = param.kind else {
                    continue;
                };

                // Candidates: touched nodes of the param type. Edge
                // deletions touch their endpoints too (the mutation layer
                // records them), so survivors of an unlink are covered.
                let mut candidates: HashSet<NodeId> = HashSet::new();
                for (node_id, node_type) in &touched.nodes {
                    if self.registry.is_subtype(*node_type, param_type) {
                        candidates.insert(*node_id);
                    }
                }

                let mut ordered: Vec<NodeId> = candidates.into_iter().collect();
                ordered.sort();
                for node_id in ordered {
                    if view.node(node_id).is_none() {
                        continue;
                    }
                    let count =
                        view.edges_at(edge_def.id, position, EntityId::Node(node_id)).len() as i64;
                    if count < bound.min {
                        violations.push(
                            Violation::new(
                                format!("_{}_{}_min_cardinality", edge_def.name, param.name),
                                ViolationSeverity::Error,
                                format!(
                                    "'{}' requires at least {} '{}' edge(s), found {}",
                                    param.name, bound.min, edge_def.name, count
                                ),
                            )
                            .with_bindings(vec![(param.name.clone(), EntityId::Node(node_id))]),
                        );
                    }
                }
            }
        }

        violations
    }
}
