//! Query planning.

use mew_core::{EdgeTypeId, TypeId};
use mew_graph::GraphRead;
use mew_parser::{BinaryOp, Expr, LiteralKind, MatchStmt, PatternElem, Projection, TransitiveKind};
use mew_registry::Registry;

use crate::{QueryError, QueryResult};

/// A query execution plan: a linear pipeline of row operators plus the
/// projection/aggregation/ordering tail.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Row pipeline, first operator produces, later ones transform.
    pub ops: Vec<PlanOp>,
    pub projections: Vec<PlannedProjection>,
    pub group_by: Vec<Expr>,
    pub aggregates: Vec<AggregateSpec>,
    pub distinct: bool,
    pub order_by: Vec<(Expr, bool)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub columns: Vec<String>,
}

/// One pipeline operator.
#[derive(Debug, Clone)]
pub enum PlanOp {
    /// Bind `var` over all nodes of the type (and subtypes); nested-loop
    /// product with upstream rows.
    NodeScan {
        var: String,
        type_id: Option<TypeId>,
        estimate: usize,
    },
    /// Bind `var` through the attribute index.
    IndexScan {
        var: String,
        type_id: TypeId,
        attr: String,
        /// Equality value, or range bounds when `range` is set.
        value: Option<Expr>,
        range: Option<(Option<Expr>, Option<Expr>)>,
        unique: bool,
        estimate: usize,
    },
    /// Unify an edge pattern against bound targets, binding free ones.
    EdgeJoin {
        edge_type: Option<EdgeTypeId>,
        targets: Vec<String>,
        edge_var: Option<String>,
        symmetric: bool,
    },
    /// Transitive closure between two variables.
    Transitive {
        edge_type: EdgeTypeId,
        from_var: String,
        to_var: String,
        min_depth: i64,
        max_depth: i64,
        symmetric: bool,
    },
    /// Keep rows satisfying the condition.
    Filter { condition: Expr },
    /// Keep rows admitting no match of the negated edge pattern.
    NotExists {
        edge_type: Option<EdgeTypeId>,
        targets: Vec<String>,
        symmetric: bool,
    },
}

/// A projection with its output column name.
#[derive(Debug, Clone)]
pub struct PlannedProjection {
    pub name: String,
    pub expr: Expr,
    /// Index into `aggregates` when this column is an aggregate.
    pub aggregate: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Gather the argument values into a list, bounded by
    /// `max_collect_size`.
    Collect,
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    /// `None` for bare `count(*)`.
    pub arg: Option<Expr>,
    pub distinct: bool,
}

/// The planner. Consults the graph for cardinality estimates (type
/// counts; the crude histogram of this engine).
pub struct QueryPlanner<'r> {
    registry: &'r Registry,
}

impl<'r> QueryPlanner<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Plan a MATCH statement against current statistics.
    pub fn plan_match(&self, stmt: &MatchStmt, graph: &dyn GraphRead) -> QueryResult<QueryPlan> {
        let conjuncts = stmt
            .where_clause
            .as_ref()
            .map(split_conjuncts)
            .unwrap_or_default();

        // Stage the node scans with cost estimates. An equality or range
        // conjunct over an indexed attribute upgrades a scan to an index
        // scan; unique beats non-unique beats range beats full type scan.
        let mut scans: Vec<(PlanOp, usize, usize)> = Vec::new(); // (op, estimate, decl order)
        let mut edges: Vec<&mew_parser::EdgePattern> = Vec::new();

        for (decl_order, elem) in stmt.pattern.iter().enumerate() {
            match elem {
                PatternElem::Node(node) => {
                    let type_id = if node.type_name == "any" {
                        None
                    } else {
                        Some(
                            self.registry
                                .get_type_id(&node.type_name)
                                .ok_or_else(|| QueryError::unknown_type(&node.type_name))?,
                        )
                    };
                    let op = self.choose_scan(&node.var, type_id, &conjuncts, graph);
                    let estimate = match &op {
                        PlanOp::NodeScan { estimate, .. } => *estimate,
                        PlanOp::IndexScan { estimate, .. } => *estimate,
                        _ => usize::MAX,
                    };
                    scans.push((op, estimate, decl_order));
                }
                PatternElem::Edge(edge) => edges.push(edge),
            }
        }

        // Ordering rule: start from the smallest index-resolvable
        // variable; declaration order breaks ties for determinism.
        scans.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
        if let Some((op, estimate, _)) = scans.first() {
            tracing::debug!(?op, estimate, "anchor scan selected");
        }

        let mut ops: Vec<PlanOp> = Vec::new();
        let mut bound: Vec<String> = Vec::new();
        let mut pending_edges: Vec<&mew_parser::EdgePattern> = edges;
        let mut pending_filters: Vec<Expr> = conjuncts;

        let place_edges_and_filters =
            |ops: &mut Vec<PlanOp>,
             bound: &mut Vec<String>,
             pending_edges: &mut Vec<&mew_parser::EdgePattern>,
             pending_filters: &mut Vec<Expr>|
             -> QueryResult<()> {
                // Prefer edge traversals over cross products: attach every
                // edge with at least one bound target before the next scan.
                loop {
                    let position = pending_edges.iter().position(|e| {
                        e.targets.iter().any(|t| t != "_" && bound.contains(t))
                    });
                    let Some(position) = position else {
                        break;
                    };
                    let edge = pending_edges.remove(position);
                    ops.push(self.plan_edge(edge, bound)?);
                    for target in &edge.targets {
                        if target != "_" && !bound.contains(target) {
                            bound.push(target.clone());
                        }
                    }
                    if let Some(alias) = &edge.alias {
                        if !bound.contains(alias) {
                            bound.push(alias.clone());
                        }
                    }
                    // Push filters down as soon as their inputs are bound.
                    let mut i = 0;
                    while i < pending_filters.len() {
                        if expr_vars_bound(&pending_filters[i], bound) {
                            let condition = pending_filters.remove(i);
                            ops.push(PlanOp::Filter { condition });
                        } else {
                            i += 1;
                        }
                    }
                }
                Ok(())
            };

        for (scan, _, _) in scans {
            let var = match &scan {
                PlanOp::NodeScan { var, .. } | PlanOp::IndexScan { var, .. } => var.clone(),
                _ => unreachable!(),
            };
            if bound.contains(&var) {
                continue;
            }
            ops.push(scan);
            bound.push(var);

            let mut i = 0;
            while i < pending_filters.len() {
                if expr_vars_bound(&pending_filters[i], &bound) {
                    let condition = pending_filters.remove(i);
                    ops.push(PlanOp::Filter { condition });
                } else {
                    i += 1;
                }
            }
            place_edges_and_filters(&mut ops, &mut bound, &mut pending_edges, &mut pending_filters)?;
        }

        // Edges none of whose targets were scanned bind their own targets.
        while let Some(edge) = pending_edges.first().copied() {
            pending_edges.remove(0);
            ops.push(self.plan_edge(edge, &bound)?);
            for target in &edge.targets {
                if target != "_" && !bound.contains(target) {
                    bound.push(target.clone());
                }
            }
            if let Some(alias) = &edge.alias {
                if !bound.contains(alias) {
                    bound.push(alias.clone());
                }
            }
            place_edges_and_filters(&mut ops, &mut bound, &mut pending_edges, &mut pending_filters)?;
        }

        // Whatever filters remain (parameters, EXISTS over unbound vars)
        // run last.
        for condition in pending_filters {
            ops.push(PlanOp::Filter { condition });
        }

        // Projection tail.
        let mut aggregates = Vec::new();
        let mut projections = Vec::new();
        let mut columns = Vec::new();
        for projection in &stmt.return_clause.projections {
            let name = projection
                .alias
                .clone()
                .unwrap_or_else(|| column_name(&projection.expr));
            columns.push(name.clone());
            let aggregate = extract_aggregate(&projection.expr).map(|spec| {
                aggregates.push(spec);
                aggregates.len() - 1
            });
            projections.push(PlannedProjection {
                name,
                expr: projection.expr.clone(),
                aggregate,
            });
        }

        // Non-aggregated projections become the implicit grouping key.
        let group_by: Vec<Expr> = if aggregates.is_empty() {
            Vec::new()
        } else {
            projections
                .iter()
                .filter(|p| p.aggregate.is_none())
                .map(|p| p.expr.clone())
                .collect()
        };

        let order_by = stmt
            .order_by
            .as_ref()
            .map(|terms| {
                terms
                    .iter()
                    .map(|t| {
                        (
                            t.expr.clone(),
                            matches!(t.direction, mew_parser::OrderDirection::Asc),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryPlan {
            ops,
            projections,
            group_by,
            aggregates,
            distinct: stmt.return_clause.distinct,
            order_by,
            limit: stmt.limit,
            offset: stmt.offset,
            timeout_ms: stmt.timeout_ms,
            columns,
        })
    }

    /// Index selection: `unique` index over non-unique over range over
    /// type scan.
    fn choose_scan(
        &self,
        var: &str,
        type_id: Option<TypeId>,
        conjuncts: &[Expr],
        graph: &dyn GraphRead,
    ) -> PlanOp {
        let Some(type_id) = type_id else {
            return PlanOp::NodeScan {
                var: var.to_string(),
                type_id: None,
                estimate: graph.node_count(),
            };
        };

        let type_estimate: usize = self
            .registry
            .concrete_types_of(type_id)
            .iter()
            .map(|tid| graph.count_nodes_of_type(*tid))
            .sum();

        let mut best: Option<PlanOp> = None;
        let mut best_rank = u8::MAX; // 0 unique, 1 indexed equality, 2 range

        for conjunct in conjuncts {
            let Some((attr, value, range)) = index_probe(var, conjunct) else {
                continue;
            };
            let Some(attr_def) = self.registry.get_type_attr(type_id, &attr) else {
                continue;
            };
            // Declared `[indexed]`/`[unique]` or added later by CREATE INDEX.
            if !graph.has_attr_index(type_id, &attr) {
                continue;
            }
            let rank = if attr_def.unique && value.is_some() {
                0
            } else if value.is_some() {
                1
            } else {
                2
            };
            if rank < best_rank {
                best_rank = rank;
                let estimate = match rank {
                    0 => 1,
                    1 => (type_estimate / 10).max(1),
                    _ => (type_estimate / 3).max(1),
                };
                best = Some(PlanOp::IndexScan {
                    var: var.to_string(),
                    type_id,
                    attr,
                    value,
                    range,
                    unique: attr_def.unique,
                    estimate,
                });
            }
        }

        best.unwrap_or(PlanOp::NodeScan {
            var: var.to_string(),
            type_id: Some(type_id),
            estimate: type_estimate,
        })
    }

    fn plan_edge(&self, edge: &mew_parser::EdgePattern, bound: &[String]) -> QueryResult<PlanOp> {
        let (edge_type, symmetric) = if edge.edge_type == "any" {
            (None, false)
        } else {
            let def = self
                .registry
                .get_edge_type_by_name(&edge.edge_type)
                .ok_or_else(|| QueryError::unknown_edge_type(&edge.edge_type))?;
            (Some(def.id), def.symmetric)
        };

        if edge.negated {
            return Ok(PlanOp::NotExists {
                edge_type,
                targets: edge.targets.clone(),
                symmetric,
            });
        }

        if let Some(transitive) = edge.transitive {
            let Some(edge_type) = edge_type else {
                return Err(QueryError::unknown_edge_type("any (transitive)"));
            };
            let default_min = match transitive.kind {
                TransitiveKind::Plus => 1,
                TransitiveKind::Star => 0,
            };
            let min_depth = transitive.min_depth.unwrap_or(default_min);
            // `+` means one or more hops; a zero lower bound only exists for `*`.
            let min_depth = if transitive.kind == TransitiveKind::Plus {
                min_depth.max(1)
            } else {
                min_depth
            };
            let max_depth = transitive.max_depth.unwrap_or(100);
            let _ = bound;
            return Ok(PlanOp::Transitive {
                edge_type,
                from_var: edge.targets[0].clone(),
                to_var: edge.targets.get(1).cloned().unwrap_or_else(|| "_".to_string()),
                min_depth,
                max_depth,
                symmetric,
            });
        }

        Ok(PlanOp::EdgeJoin {
            edge_type,
            targets: edge.targets.clone(),
            edge_var: edge.alias.clone(),
            symmetric,
        })
    }
}

/// Split a WHERE expression into AND-ed conjuncts.
fn split_conjuncts(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryOp(BinaryOp::And, left, right, _) => {
            let mut out = split_conjuncts(left);
            out.extend(split_conjuncts(right));
            out
        }
        other => vec![other.clone()],
    }
}

/// Recognize `var.attr = literal` / `literal = var.attr` and range shapes
/// usable by an index probe. Returns (attr, equality value, range bounds).
#[allow(clippy::type_complexity)]
fn index_probe(var: &str, conjunct: &Expr) -> Option<(String, Option<Expr>, Option<(Option<Expr>, Option<Expr>)>)> {
    let Expr::BinaryOp(op, left, right, _) = conjunct else {
        return None;
    };

    let as_attr = |e: &Expr| -> Option<String> {
        if let Expr::AttrAccess(base, attr, _) = e {
            if let Expr::Var(name, _) = base.as_ref() {
                if name == var {
                    return Some(attr.clone());
                }
            }
        }
        None
    };
    let is_literal = |e: &Expr| {
        matches!(
            e,
            Expr::Literal(mew_parser::Literal {
                kind: LiteralKind::Int(_)
                    | LiteralKind::Float(_)
                    | LiteralKind::String(_)
                    | LiteralKind::Bool(_)
                    | LiteralKind::Timestamp(_),
                ..
            }) | Expr::Param(_, _)
        )
    };

    match op {
        BinaryOp::Eq => {
            if let Some(attr) = as_attr(left) {
                if is_literal(right) {
                    return Some((attr, Some((**right).clone()), None));
                }
            }
            if let Some(attr) = as_attr(right) {
                if is_literal(left) {
                    return Some((attr, Some((**left).clone()), None));
                }
            }
            None
        }
        BinaryOp::GtEq | BinaryOp::Gt => {
            let attr = as_attr(left)?;
            is_literal(right).then(|| (attr, None, Some((Some((**right).clone()), None))))
        }
        BinaryOp::LtEq | BinaryOp::Lt => {
            let attr = as_attr(left)?;
            is_literal(right).then(|| (attr, None, Some((None, Some((**right).clone())))))
        }
        _ => None,
    }
}

/// All variables referenced by an expression.
fn expr_vars(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Var(name, _) => out.push(name.clone()),
        Expr::AttrAccess(base, _, _) => expr_vars(base, out),
        Expr::BinaryOp(_, left, right, _) => {
            expr_vars(left, out);
            expr_vars(right, out);
        }
        Expr::UnaryOp(_, operand, _) => expr_vars(operand, out),
        Expr::FnCall(fc) => {
            for arg in &fc.args {
                expr_vars(arg, out);
            }
        }
        Expr::Exists(elements, where_clause, _) | Expr::NotExists(elements, where_clause, _) => {
            // Only variables the subpattern does not itself bind count.
            let mut inner_bound = Vec::new();
            for elem in elements {
                match elem {
                    PatternElem::Node(n) => inner_bound.push(n.var.clone()),
                    PatternElem::Edge(e) => {
                        inner_bound.extend(e.targets.iter().cloned());
                        if let Some(alias) = &e.alias {
                            inner_bound.push(alias.clone());
                        }
                    }
                }
            }
            let mut inner = Vec::new();
            if let Some(w) = where_clause {
                expr_vars(w, &mut inner);
            }
            for elem in elements {
                if let PatternElem::Edge(e) = elem {
                    inner.extend(e.targets.iter().filter(|t| *t != "_").cloned());
                }
            }
            out.extend(inner.into_iter().filter(|v| !inner_bound.contains(v)));
        }
        Expr::List(items, _) => {
            for item in items {
                expr_vars(item, out);
            }
        }
        Expr::Literal(_) | Expr::IdRef(_, _) | Expr::Param(_, _) => {}
    }
}

fn expr_vars_bound(expr: &Expr, bound: &[String]) -> bool {
    let mut vars = Vec::new();
    expr_vars(expr, &mut vars);
    vars.iter().all(|v| bound.contains(v))
}

/// Column name derived from an expression when no alias is given.
pub(crate) fn column_name(expr: &Expr) -> String {
    match expr {
        Expr::Var(name, _) => name.clone(),
        Expr::AttrAccess(base, attr, _) => format!("{}.{}", column_name(base), attr),
        Expr::FnCall(fc) => fc.name.clone(),
        _ => "expr".to_string(),
    }
}

/// Recognize an aggregate call at the top of a projection.
pub(crate) fn extract_aggregate(expr: &Expr) -> Option<AggregateSpec> {
    let Expr::FnCall(fc) = expr else {
        return None;
    };
    let kind = match fc.name.to_lowercase().as_str() {
        "count" => AggregateKind::Count,
        "sum" => AggregateKind::Sum,
        "avg" => AggregateKind::Avg,
        "collect" => AggregateKind::Collect,
        // Two-argument min/max are scalar functions, not aggregates.
        "min" if fc.args.len() <= 1 => AggregateKind::Min,
        "max" if fc.args.len() <= 1 => AggregateKind::Max,
        _ => return None,
    };
    Some(AggregateSpec {
        kind,
        arg: fc.args.first().cloned(),
        distinct: fc.distinct,
    })
}
