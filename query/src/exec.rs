//! Volcano-style execution.
//!
//! Every operator exposes `open`/`next`/`close`; `next` returns a row or
//! exhaustion. The wall-clock budget of a `TIMEOUT` query is checked at
//! every `next` boundary, and a timed-out query returns the timeout
//! error, never partial results.

use crate::plan::{AggregateKind, AggregateSpec, PlanOp, QueryPlan};
use crate::{QueryError, QueryPlanner, QueryResult};
use indexmap::{IndexMap, IndexSet};
use mew_core::{EdgeTypeId, EngineLimits, EntityId, TypeId, Value};
use mew_graph::GraphRead;
use mew_parser::{EdgePattern, Expr, MatchStmt, NodePattern, PatternElem, Span};
use mew_pattern::{Binding, Bindings, CompiledPattern, Evaluator, Matcher};
use mew_registry::Registry;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Instant;

/// What a query observed, for serializable read-set validation.
#[derive(Debug, Default, Clone)]
pub struct ReadTrace {
    pub node_types: IndexSet<TypeId>,
    pub edge_types: IndexSet<EdgeTypeId>,
    pub entities: IndexSet<EntityId>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    /// Rows produced by the pattern pipeline before projection.
    pub matches: usize,
    /// Rows returned after projection, dedup, offset and limit.
    pub returned: usize,
    pub ms: u64,
}

/// The uniform observation result.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStats,
    pub warnings: Vec<String>,
    pub trace: ReadTrace,
}

/// Shared operator context.
struct ExecCtx<'r, 'g> {
    registry: &'r Registry,
    graph: &'g dyn GraphRead,
    evaluator: &'r Evaluator<'r>,
    deadline: Option<(Instant, i64)>,
    trace: RefCell<ReadTrace>,
}

impl ExecCtx<'_, '_> {
    fn check_deadline(&self) -> QueryResult<()> {
        if let Some((deadline, budget_ms)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(QueryError::Timeout { budget_ms });
            }
        }
        Ok(())
    }
}

/// A row operator.
trait RowSource {
    fn open(&mut self, cx: &ExecCtx<'_, '_>) -> QueryResult<()>;
    fn next(&mut self, cx: &ExecCtx<'_, '_>) -> QueryResult<Option<Bindings>>;
    fn close(&mut self);
}

/// Emits exactly one row: the initial bindings.
struct InitOp {
    initial: Option<Bindings>,
}

impl RowSource for InitOp {
    fn open(&mut self, _cx: &ExecCtx<'_, '_>) -> QueryResult<()> {
        Ok(())
    }

    fn next(&mut self, cx: &ExecCtx<'_, '_>) -> QueryResult<Option<Bindings>> {
        cx.check_deadline()?;
        Ok(self.initial.take())
    }

    fn close(&mut self) {}
}

/// How one pipeline operator expands an input row.
enum Expansion {
    /// A single-op compiled pattern delegated to the matcher (scans,
    /// edge joins, transitive closures, filters, negations).
    Pattern(CompiledPattern),
    /// An attribute-index probe binding `var`.
    Index {
        var: String,
        type_id: TypeId,
        attr: String,
        value: Option<Expr>,
        range: Option<(Option<Expr>, Option<Expr>)>,
    },
}

/// The generic pipeline operator: pulls a row from its child, expands it,
/// and streams the expansion.
struct ExpandOp {
    child: Box<dyn RowSource>,
    expansion: Expansion,
    pending: VecDeque<Bindings>,
}

impl ExpandOp {
    fn expand(&self, row: &Bindings, cx: &ExecCtx<'_, '_>) -> QueryResult<Vec<Bindings>> {
        match &self.expansion {
            Expansion::Pattern(pattern) => {
                let matcher =
                    Matcher::with_evaluator(cx.registry, cx.graph, cx.evaluator.clone());
                Ok(matcher.find_all_with_initial(pattern, row.clone())?)
            }
            Expansion::Index {
                var,
                type_id,
                attr,
                value,
                range,
            } => {
                cx.trace.borrow_mut().node_types.insert(*type_id);
                let mut ids = Vec::new();
                for concrete in cx.registry.concrete_types_of(*type_id) {
                    if let Some(value_expr) = value {
                        let needle = cx.evaluator.eval(value_expr, row, cx.graph)?;
                        ids.extend(cx.graph.nodes_by_attr(concrete, attr, &needle));
                    } else if let Some((lo, hi)) = range {
                        let lo = lo
                            .as_ref()
                            .map(|e| cx.evaluator.eval(e, row, cx.graph))
                            .transpose()?;
                        let hi = hi
                            .as_ref()
                            .map(|e| cx.evaluator.eval(e, row, cx.graph))
                            .transpose()?;
                        ids.extend(cx.graph.nodes_by_attr_range(
                            concrete,
                            attr,
                            lo.as_ref(),
                            hi.as_ref(),
                        ));
                    }
                }
                ids.sort();
                ids.dedup();

                let mut out = Vec::new();
                for id in ids {
                    if let Some(existing) = row.get(var) {
                        if existing.as_node() != Some(id) {
                            continue;
                        }
                        out.push(row.clone());
                    } else {
                        out.push(row.extend_with(var, Binding::Node(id)));
                    }
                }
                Ok(out)
            }
        }
    }
}

impl RowSource for ExpandOp {
    fn open(&mut self, cx: &ExecCtx<'_, '_>) -> QueryResult<()> {
        self.child.open(cx)
    }

    fn next(&mut self, cx: &ExecCtx<'_, '_>) -> QueryResult<Option<Bindings>> {
        loop {
            cx.check_deadline()?;
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            let Some(input) = self.child.next(cx)? else {
                return Ok(None);
            };
            self.pending.extend(self.expand(&input, cx)?);
        }
    }

    fn close(&mut self) {
        self.pending.clear();
        self.child.close();
    }
}

/// The executor: plans (when given a statement) and runs pipelines.
pub struct QueryExecutor<'r, 'g> {
    registry: &'r Registry,
    graph: &'g dyn GraphRead,
    evaluator: Evaluator<'r>,
    limits: EngineLimits,
}

impl<'r, 'g> QueryExecutor<'r, 'g> {
    pub fn new(registry: &'r Registry, graph: &'g dyn GraphRead) -> Self {
        Self {
            registry,
            graph,
            evaluator: Evaluator::new(registry),
            limits: EngineLimits::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator<'r>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Plan and execute a MATCH statement.
    pub fn execute_match(&self, stmt: &MatchStmt) -> QueryResult<QueryOutput> {
        self.execute_match_with(stmt, None)
    }

    /// Plan and execute with caller-provided initial bindings (compound
    /// statements, subqueries).
    pub fn execute_match_with(
        &self,
        stmt: &MatchStmt,
        initial: Option<&Bindings>,
    ) -> QueryResult<QueryOutput> {
        let planner = QueryPlanner::new(self.registry);
        let plan = planner.plan_match(stmt, self.graph)?;
        self.run_plan(&plan, initial)
    }

    /// Execute a prepared plan.
    pub fn run_plan(&self, plan: &QueryPlan, initial: Option<&Bindings>) -> QueryResult<QueryOutput> {
        let started = Instant::now();
        let cx = ExecCtx {
            registry: self.registry,
            graph: self.graph,
            evaluator: &self.evaluator,
            deadline: plan
                .timeout_ms
                .map(|ms| (started + std::time::Duration::from_millis(ms.max(0) as u64), ms)),
            trace: RefCell::new(ReadTrace::default()),
        };

        let mut pipeline = self.build_pipeline(plan, initial, &cx)?;
        pipeline.open(&cx)?;

        // Early termination: with no ordering, grouping or dedup, pulling
        // past offset+limit is wasted work.
        let pull_cap = if plan.order_by.is_empty()
            && plan.aggregates.is_empty()
            && !plan.distinct
            && plan.limit.is_some()
        {
            Some((plan.limit.unwrap().max(0) + plan.offset.unwrap_or(0).max(0)) as usize)
        } else {
            None
        };

        let mut matched: Vec<Bindings> = Vec::new();
        let mut warnings = Vec::new();
        while let Some(row) = pipeline.next(&cx)? {
            {
                let mut trace = cx.trace.borrow_mut();
                for (_, entity) in row.entities() {
                    trace.entities.insert(entity);
                }
            }
            matched.push(row);
            if let Some(cap) = pull_cap {
                if matched.len() >= cap {
                    break;
                }
            }
        }
        pipeline.close();

        if plan.limit.is_none() && matched.len() > self.limits.max_unbounded_results {
            warnings.push(format!(
                "unbounded result returned {} rows (budget {})",
                matched.len(),
                self.limits.max_unbounded_results
            ));
        }

        let matches = matched.len();

        // Projection / aggregation.
        let mut rows: Vec<(Bindings, Vec<Value>)> = if plan.aggregates.is_empty() {
            let mut out = Vec::with_capacity(matched.len());
            for bindings in matched {
                let mut values = Vec::with_capacity(plan.projections.len());
                for projection in &plan.projections {
                    values.push(self.evaluator.eval(&projection.expr, &bindings, self.graph)?);
                }
                out.push((bindings, values));
            }
            out
        } else {
            self.aggregate_rows(plan, matched)?
        };

        // ORDER BY: a term matching a projection (structurally, or by its
        // alias) sorts by that column; anything else evaluates against
        // the row's bindings. Spans differ between clauses, so structural
        // comparison goes through the renderer.
        if !plan.order_by.is_empty() {
            let column_of = |expr: &Expr| -> Option<usize> {
                let rendered = mew_parser::render_expr(expr);
                if let Some(i) = plan
                    .projections
                    .iter()
                    .position(|p| mew_parser::render_expr(&p.expr) == rendered)
                {
                    return Some(i);
                }
                if let Expr::Var(name, _) = expr {
                    return plan.projections.iter().position(|p| &p.name == name);
                }
                None
            };
            let keys: Vec<(Option<usize>, Expr, bool)> = plan
                .order_by
                .iter()
                .map(|(expr, asc)| (column_of(expr), expr.clone(), *asc))
                .collect();

            rows.sort_by(|a, b| {
                for (column, expr, asc) in &keys {
                    let left = match column {
                        Some(i) => a.1.get(*i).cloned().unwrap_or(Value::Null),
                        None => self
                            .evaluator
                            .eval(expr, &a.0, self.graph)
                            .unwrap_or(Value::Null),
                    };
                    let right = match column {
                        Some(i) => b.1.get(*i).cloned().unwrap_or(Value::Null),
                        None => self
                            .evaluator
                            .eval(expr, &b.0, self.graph)
                            .unwrap_or(Value::Null),
                    };
                    let ordering = left.cmp_sortable(&right);
                    if ordering != std::cmp::Ordering::Equal {
                        return if *asc { ordering } else { ordering.reverse() };
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        // DISTINCT over projected values.
        if plan.distinct {
            let mut seen = IndexSet::new();
            rows.retain(|(_, values)| {
                let key: Vec<String> = values.iter().map(|v| v.group_key()).collect();
                seen.insert(key)
            });
        }

        // OFFSET / LIMIT.
        let offset = plan.offset.unwrap_or(0).max(0) as usize;
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .skip(offset)
            .take(plan.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX))
            .map(|(_, values)| values)
            .collect();

        let stats = QueryStats {
            matches,
            returned: rows.len(),
            ms: started.elapsed().as_millis() as u64,
        };

        Ok(QueryOutput {
            columns: plan.columns.clone(),
            rows,
            stats,
            warnings,
            trace: cx.trace.into_inner(),
        })
    }

    fn build_pipeline(
        &self,
        plan: &QueryPlan,
        initial: Option<&Bindings>,
        cx: &ExecCtx<'_, '_>,
    ) -> QueryResult<Box<dyn RowSource>> {
        let mut source: Box<dyn RowSource> = Box::new(InitOp {
            initial: Some(initial.cloned().unwrap_or_default()),
        });

        for op in &plan.ops {
            let expansion = match op {
                PlanOp::NodeScan { var, type_id, .. } => {
                    if let Some(tid) = type_id {
                        cx.trace.borrow_mut().node_types.insert(*tid);
                        for sub in self.registry.subtypes_of(*tid) {
                            cx.trace.borrow_mut().node_types.insert(sub);
                        }
                    }
                    Expansion::Pattern(self.single_op_pattern(PatternElem::Node(NodePattern {
                        var: var.clone(),
                        type_name: type_id
                            .and_then(|tid| self.registry.get_type(tid))
                            .map(|t| t.name.clone())
                            .unwrap_or_else(|| "any".to_string()),
                        span: Span::default(),
                    }))?)
                }
                PlanOp::IndexScan {
                    var,
                    type_id,
                    attr,
                    value,
                    range,
                    ..
                } => Expansion::Index {
                    var: var.clone(),
                    type_id: *type_id,
                    attr: attr.clone(),
                    value: value.clone(),
                    range: range.clone(),
                },
                PlanOp::EdgeJoin {
                    edge_type,
                    targets,
                    edge_var,
                    ..
                } => {
                    if let Some(et) = edge_type {
                        cx.trace.borrow_mut().edge_types.insert(*et);
                    }
                    Expansion::Pattern(self.single_op_pattern(PatternElem::Edge(EdgePattern {
                        edge_type: edge_type
                            .and_then(|et| self.registry.get_edge_type(et))
                            .map(|e| e.name.clone())
                            .unwrap_or_else(|| "any".to_string()),
                        targets: targets.clone(),
                        alias: edge_var.clone(),
                        transitive: None,
                        negated: false,
                        span: Span::default(),
                    }))?)
                }
                PlanOp::Transitive {
                    edge_type,
                    from_var,
                    to_var,
                    min_depth,
                    max_depth,
                    ..
                } => {
                    cx.trace.borrow_mut().edge_types.insert(*edge_type);
                    Expansion::Pattern(self.single_op_pattern(PatternElem::Edge(EdgePattern {
                        edge_type: self
                            .registry
                            .get_edge_type(*edge_type)
                            .map(|e| e.name.clone())
                            .unwrap_or_default(),
                        targets: vec![from_var.clone(), to_var.clone()],
                        alias: None,
                        transitive: Some(mew_parser::TransitiveMod {
                            kind: if *min_depth == 0 {
                                mew_parser::TransitiveKind::Star
                            } else {
                                mew_parser::TransitiveKind::Plus
                            },
                            min_depth: Some(*min_depth),
                            max_depth: Some(*max_depth),
                        }),
                        negated: false,
                        span: Span::default(),
                    }))?)
                }
                PlanOp::Filter { condition } => {
                    Expansion::Pattern(CompiledPattern::new().with_filter(condition.clone()))
                }
                PlanOp::NotExists {
                    edge_type, targets, ..
                } => Expansion::Pattern(self.single_op_pattern(PatternElem::Edge(EdgePattern {
                    edge_type: edge_type
                        .and_then(|et| self.registry.get_edge_type(et))
                        .map(|e| e.name.clone())
                        .unwrap_or_else(|| "any".to_string()),
                    targets: targets.clone(),
                    alias: None,
                    transitive: None,
                    negated: true,
                    span: Span::default(),
                }))?),
            };

            source = Box::new(ExpandOp {
                child: source,
                expansion,
                pending: VecDeque::new(),
            });
        }

        Ok(source)
    }

    /// Compile one pattern element into a standalone compiled pattern.
    /// Target variables that upstream operators bound at runtime unify
    /// through the matcher's runtime-prebound handling.
    fn single_op_pattern(&self, elem: PatternElem) -> QueryResult<CompiledPattern> {
        Ok(CompiledPattern::compile(&[elem], self.registry)?)
    }

    /// Group rows by the implicit grouping key and fold the aggregates.
    fn aggregate_rows(
        &self,
        plan: &QueryPlan,
        matched: Vec<Bindings>,
    ) -> QueryResult<Vec<(Bindings, Vec<Value>)>> {
        // Empty input with no grouping key still yields one row of
        // aggregate defaults.
        if matched.is_empty() && plan.group_by.is_empty() {
            let mut values = Vec::new();
            for projection in &plan.projections {
                match projection.aggregate {
                    Some(i) => values.push(match plan.aggregates[i].kind {
                        AggregateKind::Count => Value::Int(0),
                        AggregateKind::Collect => Value::List(Vec::new()),
                        _ => Value::Null,
                    }),
                    None => values.push(Value::Null),
                }
            }
            return Ok(vec![(Bindings::new(), values)]);
        }

        let mut groups: IndexMap<String, Vec<Bindings>> = IndexMap::new();
        for bindings in matched {
            let mut key = String::new();
            for expr in &plan.group_by {
                let value = self.evaluator.eval(expr, &bindings, self.graph)?;
                key.push_str(&value.group_key());
                key.push('|');
            }
            groups.entry(key).or_default().push(bindings);
        }

        let mut out = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            let representative = group.first().cloned().unwrap_or_default();
            let mut values = Vec::with_capacity(plan.projections.len());
            for projection in &plan.projections {
                match projection.aggregate {
                    Some(i) => {
                        values.push(self.fold_aggregate(&plan.aggregates[i], &group)?);
                    }
                    None => {
                        values.push(self.evaluator.eval(
                            &projection.expr,
                            &representative,
                            self.graph,
                        )?);
                    }
                }
            }
            out.push((representative, values));
        }
        Ok(out)
    }

    fn fold_aggregate(&self, spec: &AggregateSpec, group: &[Bindings]) -> QueryResult<Value> {
        // Gather the argument values; `count(*)` counts rows directly.
        let mut values: Vec<Value> = Vec::with_capacity(group.len());
        if let Some(arg) = &spec.arg {
            for bindings in group {
                values.push(self.evaluator.eval(arg, bindings, self.graph)?);
            }
        }

        if spec.distinct {
            let mut seen = IndexSet::new();
            values.retain(|v| seen.insert(v.group_key()));
        }

        match spec.kind {
            AggregateKind::Count => {
                let count = if spec.arg.is_none() {
                    group.len()
                } else {
                    values.iter().filter(|v| !v.is_null()).count()
                };
                Ok(Value::Int(count as i64))
            }
            AggregateKind::Sum => fold_numeric(&values, Value::Null),
            AggregateKind::Avg => {
                let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
                if non_null.is_empty() {
                    return Ok(Value::Null);
                }
                let sum = fold_numeric(&values, Value::Null)?;
                let total = match sum {
                    Value::Int(i) => i as f64,
                    Value::Float(f) => f,
                    _ => return Ok(Value::Null),
                };
                Ok(Value::Float(total / non_null.len() as f64))
            }
            AggregateKind::Min => Ok(values
                .iter()
                .filter(|v| !v.is_null())
                .cloned()
                .min_by(|a, b| a.cmp_sortable(b))
                .unwrap_or(Value::Null)),
            AggregateKind::Max => Ok(values
                .iter()
                .filter(|v| !v.is_null())
                .cloned()
                .max_by(|a, b| a.cmp_sortable(b))
                .unwrap_or(Value::Null)),
            AggregateKind::Collect => {
                let gathered: Vec<Value> =
                    values.into_iter().filter(|v| !v.is_null()).collect();
                if gathered.len() > self.limits.max_collect_size {
                    return Err(QueryError::CollectLimit {
                        limit: self.limits.max_collect_size,
                    });
                }
                Ok(Value::List(gathered))
            }
        }
    }
}

/// Numeric fold for SUM; ints stay ints until a float appears.
fn fold_numeric(values: &[Value], empty: Value) -> QueryResult<Value> {
    let mut int_acc: i64 = 0;
    let mut float_acc: f64 = 0.0;
    let mut any = false;
    let mut is_float = false;

    for value in values {
        match value {
            Value::Null => continue,
            Value::Int(i) => {
                any = true;
                int_acc = int_acc.wrapping_add(*i);
                float_acc += *i as f64;
            }
            Value::Float(f) => {
                any = true;
                is_float = true;
                float_acc += f;
            }
            other => {
                return Err(QueryError::Pattern(mew_pattern::PatternError::type_error(
                    format!("cannot aggregate {}", other.type_name()),
                )))
            }
        }
    }

    if !any {
        return Ok(empty);
    }
    Ok(if is_float {
        Value::Float(float_acc)
    } else {
        Value::Int(int_acc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, Edge, Node, NodeId};
    use mew_graph::{Graph, IdGen};
    use mew_parser::parse_stmt;
    use mew_registry::{AttrDef, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String"))
            .attr(AttrDef::new("priority", "Int").indexed())
            .attr(AttrDef::new("done", "Bool"))
            .done()
            .unwrap();
        builder
            .add_type("Project")
            .attr(AttrDef::new("name", "String"))
            .done()
            .unwrap();
        builder
            .add_edge_type("belongs_to")
            .param("t", "Task")
            .param("p", "Project")
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    struct Fx {
        registry: Registry,
        graph: Graph,
        ids: IdGen,
    }

    impl Fx {
        fn new() -> Self {
            let registry = test_registry();
            let mut graph = Graph::new();
            for (tid, attr) in registry.indexed_attrs() {
                graph.register_attr_index(tid, &attr);
            }
            Self {
                registry,
                graph,
                ids: IdGen::new(),
            }
        }

        fn task(&mut self, title: &str, priority: i64) -> NodeId {
            let id = self.ids.alloc_node_id();
            let tid = self.registry.get_type_id("Task").unwrap();
            self.graph
                .insert_node(Node::new(
                    id,
                    tid,
                    attrs! { "title" => title, "priority" => priority, "done" => false },
                ))
                .unwrap();
            id
        }

        fn project(&mut self, name: &str) -> NodeId {
            let id = self.ids.alloc_node_id();
            let tid = self.registry.get_type_id("Project").unwrap();
            self.graph
                .insert_node(Node::new(id, tid, attrs! { "name" => name }))
                .unwrap();
            id
        }

        fn belongs(&mut self, task: NodeId, project: NodeId) {
            let id = self.ids.alloc_edge_id();
            let et = self.registry.get_edge_type_id("belongs_to").unwrap();
            self.graph
                .insert_edge(Edge::new(id, et, vec![task.into(), project.into()], attrs!()))
                .unwrap();
        }

        fn run(&self, source: &str) -> QueryResult<QueryOutput> {
            let stmt = match parse_stmt(source).unwrap() {
                mew_parser::Stmt::Match(m) => m,
                other => panic!("expected MATCH, got {:?}", other),
            };
            QueryExecutor::new(&self.registry, &self.graph).execute_match(&stmt)
        }
    }

    #[test]
    fn test_scan_and_project() {
        let mut fx = Fx::new();
        fx.task("A", 1);
        fx.task("B", 5);

        let output = fx.run("MATCH t: Task RETURN t.title ORDER BY t.title ASC").unwrap();
        assert_eq!(output.columns, vec!["t.title"]);
        assert_eq!(
            output.rows,
            vec![
                vec![Value::String("A".into())],
                vec![Value::String("B".into())]
            ]
        );
        assert_eq!(output.stats.matches, 2);
        assert_eq!(output.stats.returned, 2);
    }

    #[test]
    fn test_where_filter_and_index() {
        let mut fx = Fx::new();
        fx.task("low", 1);
        fx.task("high", 9);

        let output = fx.run("MATCH t: Task WHERE t.priority >= 5 RETURN t.title").unwrap();
        assert_eq!(output.rows, vec![vec![Value::String("high".into())]]);
    }

    #[test]
    fn test_edge_join() {
        let mut fx = Fx::new();
        let t1 = fx.task("one", 1);
        let t2 = fx.task("two", 2);
        let p = fx.project("Alpha");
        fx.belongs(t1, p);
        fx.belongs(t2, p);

        let output = fx
            .run("MATCH t: Task, p: Project, belongs_to(t, p) RETURN t.title ORDER BY t.title ASC")
            .unwrap();
        assert_eq!(output.rows.len(), 2);
    }

    #[test]
    fn test_grouped_aggregation_ordering() {
        let mut fx = Fx::new();
        let alpha = fx.project("Alpha");
        let beta = fx.project("Beta");
        let gamma = fx.project("Gamma");
        for (i, p) in [(0, alpha), (1, alpha), (2, alpha), (3, beta), (4, beta), (5, gamma)] {
            let t = fx.task(&format!("t{}", i), i);
            fx.belongs(t, p);
        }

        let output = fx
            .run(
                "MATCH t: Task, p: Project, belongs_to(t, p) \
                 RETURN p.name, count(t) AS n ORDER BY p.name ASC",
            )
            .unwrap();

        assert_eq!(output.columns, vec!["p.name", "n"]);
        assert_eq!(
            output.rows,
            vec![
                vec![Value::String("Alpha".into()), Value::Int(3)],
                vec![Value::String("Beta".into()), Value::Int(2)],
                vec![Value::String("Gamma".into()), Value::Int(1)],
            ]
        );
        // Counts sum to the number of tasks.
        let total: i64 = output.rows.iter().map(|r| r[1].as_int().unwrap()).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_count_on_empty_input() {
        let fx = Fx::new();
        let output = fx.run("MATCH t: Task RETURN count(t)").unwrap();
        assert_eq!(output.rows, vec![vec![Value::Int(0)]]);
    }

    #[test]
    fn test_sum_avg_min_max() {
        let mut fx = Fx::new();
        fx.task("a", 2);
        fx.task("b", 4);
        fx.task("c", 6);

        let output = fx
            .run("MATCH t: Task RETURN sum(t.priority), avg(t.priority), min(t.priority), max(t.priority)")
            .unwrap();
        assert_eq!(
            output.rows,
            vec![vec![
                Value::Int(12),
                Value::Float(4.0),
                Value::Int(2),
                Value::Int(6)
            ]]
        );
    }

    #[test]
    fn test_distinct_limit_offset() {
        let mut fx = Fx::new();
        fx.task("same", 1);
        fx.task("same", 2);
        fx.task("other", 3);

        let distinct = fx.run("MATCH t: Task RETURN DISTINCT t.title ORDER BY t.title ASC").unwrap();
        assert_eq!(distinct.rows.len(), 2);

        let limited = fx
            .run("MATCH t: Task RETURN t.title ORDER BY t.priority ASC LIMIT 1 OFFSET 1")
            .unwrap();
        assert_eq!(limited.rows, vec![vec![Value::String("same".into())]]);
    }

    #[test]
    fn test_timeout_zero_budget_aborts() {
        let mut fx = Fx::new();
        for i in 0..50 {
            fx.task(&format!("t{}", i), i);
        }
        let result = fx.run("MATCH t: Task RETURN t TIMEOUT 0");
        assert!(matches!(result, Err(QueryError::Timeout { .. })));
    }

    #[test]
    fn test_trace_records_scanned_types_and_entities() {
        let mut fx = Fx::new();
        let id = fx.task("traced", 1);

        let output = fx.run("MATCH t: Task RETURN t").unwrap();
        let task_t = fx.registry.get_type_id("Task").unwrap();
        assert!(output.trace.node_types.contains(&task_t));
        assert!(output.trace.entities.contains(&EntityId::Node(id)));
    }

    #[test]
    fn test_unbounded_warning() {
        let mut fx = Fx::new();
        for i in 0..30 {
            fx.task(&format!("t{}", i), i);
        }
        let stmt = match parse_stmt("MATCH t: Task RETURN t").unwrap() {
            mew_parser::Stmt::Match(m) => m,
            _ => unreachable!(),
        };
        let output = QueryExecutor::new(&fx.registry, &fx.graph)
            .with_limits(EngineLimits {
                max_unbounded_results: 10,
                ..EngineLimits::default()
            })
            .execute_match(&stmt)
            .unwrap();
        assert_eq!(output.warnings.len(), 1);
        // The rows still come back; the budget only warns.
        assert_eq!(output.rows.len(), 30);
    }
}
