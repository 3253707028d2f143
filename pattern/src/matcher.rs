//! Pattern matching against a graph view.

use crate::{Binding, Bindings, CompiledPattern, Evaluator, PatternError, PatternOp, PatternResult};
use mew_core::{EntityId, NodeId};
use mew_graph::GraphRead;
use mew_registry::{ParamKind, Registry};
use std::collections::{HashSet, VecDeque};

/// Enumerates bindings of a compiled pattern over a graph view. Candidate
/// sets iterate in ascending id order, so enumeration order is stable.
pub struct Matcher<'r, 'g> {
    registry: &'r Registry,
    graph: &'g dyn GraphRead,
    evaluator: Evaluator<'r>,
}

impl<'r, 'g> Matcher<'r, 'g> {
    pub fn new(registry: &'r Registry, graph: &'g dyn GraphRead) -> Self {
        Self {
            registry,
            graph,
            evaluator: Evaluator::new(registry),
        }
    }

    /// Use a caller-configured evaluator (clock, parameters).
    pub fn with_evaluator(
        registry: &'r Registry,
        graph: &'g dyn GraphRead,
        evaluator: Evaluator<'r>,
    ) -> Self {
        Self {
            registry,
            graph,
            evaluator,
        }
    }

    pub fn find_all(&self, pattern: &CompiledPattern) -> PatternResult<Vec<Bindings>> {
        self.find_all_with_initial(pattern, Bindings::new())
    }

    /// Check whether any match exists under the initial bindings.
    pub fn exists(&self, pattern: &CompiledPattern, initial: Bindings) -> PatternResult<bool> {
        Ok(!self.find_all_with_initial(pattern, initial)?.is_empty())
    }

    pub fn find_all_with_initial(
        &self,
        pattern: &CompiledPattern,
        initial: Bindings,
    ) -> PatternResult<Vec<Bindings>> {
        let mut candidates = vec![initial];
        for op in &pattern.ops {
            let mut next = Vec::new();
            for bindings in &candidates {
                next.extend(self.execute_op(op, bindings)?);
            }
            candidates = next;
            if candidates.is_empty() {
                break;
            }
        }
        Ok(candidates)
    }

    fn execute_op(&self, op: &PatternOp, bindings: &Bindings) -> PatternResult<Vec<Bindings>> {
        match op {
            PatternOp::ScanNodes { var, type_id } => self.scan_nodes(var, *type_id, bindings),
            PatternOp::FollowEdge {
                edge_type,
                targets,
                edge_var,
                symmetric,
            } => self.follow_edge(*edge_type, targets, edge_var.as_deref(), *symmetric, bindings),
            PatternOp::Transitive {
                edge_type,
                from_var,
                to_var,
                min_depth,
                max_depth,
                symmetric,
            } => self.transitive(
                *edge_type, from_var, to_var, *min_depth, *max_depth, *symmetric, bindings,
            ),
            PatternOp::Filter { condition } => {
                if self
                    .evaluator
                    .eval_bool(condition, bindings, self.graph)?
                {
                    Ok(vec![bindings.clone()])
                } else {
                    Ok(vec![])
                }
            }
            PatternOp::NotExists { subpattern } => {
                if self.find_all_with_initial(subpattern, bindings.clone())?.is_empty() {
                    Ok(vec![bindings.clone()])
                } else {
                    Ok(vec![])
                }
            }
        }
    }

    fn scan_nodes(
        &self,
        var: &str,
        type_id: Option<mew_core::TypeId>,
        bindings: &Bindings,
    ) -> PatternResult<Vec<Bindings>> {
        // Runtime-prebound variable: narrow instead of scanning.
        if let Some(existing) = bindings.get(var) {
            let Some(node_id) = existing.as_node() else {
                return Ok(vec![]);
            };
            let Some(node) = self.graph.node(node_id) else {
                return Ok(vec![]);
            };
            let ok = match type_id {
                Some(tid) => self.registry.is_subtype(node.type_id, tid),
                None => true,
            };
            return Ok(if ok { vec![bindings.clone()] } else { vec![] });
        }

        let node_ids: Vec<NodeId> = match type_id {
            Some(tid) => {
                let mut ids = Vec::new();
                for concrete in self.registry.concrete_types_of(tid) {
                    ids.extend(self.graph.nodes_of_type(concrete));
                }
                ids.sort();
                ids.dedup();
                ids
            }
            None => self.graph.all_node_ids(),
        };

        Ok(node_ids
            .into_iter()
            .map(|id| bindings.extend_with(var, Binding::Node(id)))
            .collect())
    }

    fn follow_edge(
        &self,
        edge_type: Option<mew_core::EdgeTypeId>,
        targets: &[String],
        edge_var: Option<&str>,
        symmetric: bool,
        bindings: &Bindings,
    ) -> PatternResult<Vec<Bindings>> {
        let mut orientations: Vec<Vec<String>> = vec![targets.to_vec()];
        if symmetric && targets.len() == 2 {
            orientations.push(vec![targets[1].clone(), targets[0].clone()]);
        }

        let mut matches = Vec::new();
        // One physical edge may satisfy both orientations of a symmetric
        // pattern; report it once, preferring the stored order.
        let mut seen: HashSet<(mew_core::EdgeId, Vec<EntityId>)> = HashSet::new();

        for orientation in &orientations {
            let candidates = self.candidate_edges(edge_type, orientation, bindings);
            for edge_id in candidates {
                let Some(edge) = self.graph.edge(edge_id) else {
                    continue;
                };
                if let Some(et) = edge_type {
                    if edge.type_id != et {
                        continue;
                    }
                }
                if edge.targets.len() != orientation.len() {
                    continue;
                }

                let Some(new_bindings) =
                    unify_edge(&edge.targets, orientation, edge_var, edge_id, bindings)
                else {
                    continue;
                };

                if symmetric {
                    let mut key_entities: Vec<EntityId> = edge.targets.clone();
                    key_entities.sort();
                    if !seen.insert((edge_id, key_entities)) {
                        continue;
                    }
                }
                matches.push(new_bindings);
            }
        }

        Ok(matches)
    }

    /// Pick the cheapest candidate edge set for an orientation given what
    /// is already bound.
    fn candidate_edges(
        &self,
        edge_type: Option<mew_core::EdgeTypeId>,
        orientation: &[String],
        bindings: &Bindings,
    ) -> Vec<mew_core::EdgeId> {
        for (pos, var) in orientation.iter().enumerate() {
            if var == "_" {
                continue;
            }
            let Some(entity) = bindings.get(var).and_then(|b| b.as_entity()) else {
                continue;
            };
            if let Some(et) = edge_type {
                return self.graph.edges_at(et, pos, entity);
            }
            return match entity {
                EntityId::Node(node) => {
                    if pos == 0 {
                        self.graph.edges_from(node, None)
                    } else {
                        self.graph.edges_to(node, None)
                    }
                }
                EntityId::Edge(edge) => self.graph.edges_about(edge),
            };
        }

        match edge_type {
            Some(et) => self.graph.edges_of_type(et),
            None => self.graph.all_edge_ids(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transitive(
        &self,
        edge_type: mew_core::EdgeTypeId,
        from_var: &str,
        to_var: &str,
        min_depth: i64,
        max_depth: i64,
        symmetric: bool,
        bindings: &Bindings,
    ) -> PatternResult<Vec<Bindings>> {
        let sources: Vec<NodeId> = match bindings.get(from_var).and_then(|b| b.as_node()) {
            Some(id) => vec![id],
            None => {
                // Unbound source: enumerate nodes admissible at position 0.
                let def = self
                    .registry
                    .get_edge_type(edge_type)
                    .ok_or_else(|| PatternError::unknown_edge_type(edge_type.to_string()))?;
                match def.params.first().map(|p| p.kind) {
                    Some(ParamKind::Node(tid)) => {
                        let mut ids = Vec::new();
                        for concrete in self.registry.concrete_types_of(tid) {
                            ids.extend(self.graph.nodes_of_type(concrete));
                        }
                        ids.sort();
                        ids.dedup();
                        ids
                    }
                    _ => self.graph.all_node_ids(),
                }
            }
        };
        let from_was_bound = bindings.contains(from_var);
        let target_bound = bindings.get(to_var).and_then(|b| b.as_node());

        let mut matches = Vec::new();
        for source in sources {
            let reached = self.reachable(source, edge_type, min_depth, max_depth, symmetric);
            let base = if from_was_bound {
                bindings.clone()
            } else {
                bindings.extend_with(from_var, Binding::Node(source))
            };

            match target_bound {
                Some(target) => {
                    if reached.contains(&target) {
                        matches.push(base);
                    }
                }
                None if to_var == "_" => {
                    if !reached.is_empty() {
                        matches.push(base);
                    }
                }
                None => {
                    let mut ordered: Vec<NodeId> = reached.into_iter().collect();
                    ordered.sort();
                    for node in ordered {
                        matches.push(base.extend_with(to_var, Binding::Node(node)));
                    }
                }
            }
        }
        Ok(matches)
    }

    /// Cycle-safe breadth-first expansion between depth bounds. Depth 0 is
    /// the start itself (reported only when `min_depth` is 0).
    fn reachable(
        &self,
        start: NodeId,
        edge_type: mew_core::EdgeTypeId,
        min_depth: i64,
        max_depth: i64,
        symmetric: bool,
    ) -> HashSet<NodeId> {
        let mut reached = HashSet::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut frontier: VecDeque<(NodeId, i64)> = VecDeque::new();
        frontier.push_back((start, 0));

        while let Some((current, depth)) = frontier.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if depth >= min_depth && depth <= max_depth {
                reached.insert(current);
            }
            if depth >= max_depth {
                continue;
            }

            let mut neighbors: Vec<NodeId> = Vec::new();
            for edge_id in self.graph.edges_from(current, Some(edge_type)) {
                if let Some(edge) = self.graph.edge(edge_id) {
                    if let Some(next) = edge.targets.get(1).and_then(|t| t.as_node()) {
                        neighbors.push(next);
                    }
                }
            }
            // Symmetric closure treats both directions.
            if symmetric {
                for edge_id in self.graph.edges_to(current, Some(edge_type)) {
                    if let Some(edge) = self.graph.edge(edge_id) {
                        if let Some(prev) = edge.targets.first().and_then(|t| t.as_node()) {
                            neighbors.push(prev);
                        }
                    }
                }
            }
            neighbors.sort();
            for next in neighbors {
                if !visited.contains(&next) {
                    frontier.push_back((next, depth + 1));
                }
            }
        }

        reached
    }
}

/// Unify an edge's targets against an orientation of target variables.
/// Returns the extended bindings, or `None` on mismatch.
fn unify_edge(
    edge_targets: &[EntityId],
    orientation: &[String],
    edge_var: Option<&str>,
    edge_id: mew_core::EdgeId,
    bindings: &Bindings,
) -> Option<Bindings> {
    let mut result = bindings.clone();
    for (pos, var) in orientation.iter().enumerate() {
        let actual = edge_targets[pos];
        if var == "_" {
            continue;
        }
        match result.get(var).and_then(|b| b.as_entity()) {
            Some(expected) => {
                if expected != actual {
                    return None;
                }
            }
            None => {
                result.insert(var, Binding::from(actual));
            }
        }
    }
    if let Some(alias) = edge_var {
        match result.get(alias).and_then(|b| b.as_edge()) {
            Some(expected) if expected != edge_id => return None,
            Some(_) => {}
            None => result.insert(alias, Binding::Edge(edge_id)),
        }
    }
    Some(result)
}
