//! WALK: procedural traversal on top of the pattern engine.
//!
//! Breadth-first, cycle-safe per start (each node visited at most once
//! per start), between the depth bounds, stopping expansion where the
//! UNTIL condition holds. Multiple starts yield the deduplicated union
//! of per-start results — except PATH, which yields every path. Starts
//! expand in order, and each frontier in ascending id order, so the
//! enumeration is stable.

use crate::exec::{QueryOutput, QueryStats};
use crate::{QueryError, QueryResult};
use indexmap::IndexSet;
use mew_core::{EdgeId, EdgeTypeId, EngineLimits, EntityId, NodeId, Value};
use mew_graph::GraphRead;
use mew_parser::{WalkDirection, WalkReturnType, WalkStmt};
use mew_pattern::{Binding, Bindings, Evaluator};
use mew_registry::Registry;
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

/// Execute a WALK statement. `initial` carries outer bindings for the
/// compound `MATCH … WALK` form.
pub fn execute_walk(
    registry: &Registry,
    graph: &dyn GraphRead,
    evaluator: &Evaluator<'_>,
    limits: &EngineLimits,
    stmt: &WalkStmt,
    initial: Option<&Bindings>,
) -> QueryResult<QueryOutput> {
    let started = Instant::now();
    let bindings = initial.cloned().unwrap_or_default();

    // Resolve the starting set.
    let start_value = evaluator.eval(&stmt.from, &bindings, graph)?;
    let mut starts: Vec<NodeId> = Vec::new();
    collect_starts(&start_value, &mut starts)?;

    // Union of FOLLOW clauses; `*` means every edge type. Direction and
    // depth come from the first clause that sets them.
    let mut edge_types: Vec<EdgeTypeId> = Vec::new();
    let mut any_type = false;
    let mut direction = WalkDirection::Outbound;
    let mut min_depth: i64 = 1;
    let mut max_depth: i64 = limits.default_traversal_depth.1;
    for (i, follow) in stmt.follow.iter().enumerate() {
        for name in &follow.edge_types {
            if name == "*" {
                any_type = true;
            } else {
                let id = registry
                    .get_edge_type_id(name)
                    .ok_or_else(|| QueryError::unknown_edge_type(name))?;
                edge_types.push(id);
            }
        }
        if i == 0 {
            direction = follow.direction;
            if let Some(min) = follow.min_depth {
                min_depth = min;
            }
            if let Some(max) = follow.max_depth {
                max_depth = max;
            }
        }
    }
    if any_type {
        edge_types.clear();
    }

    let mut nodes: IndexSet<NodeId> = IndexSet::new();
    let mut edges: IndexSet<EdgeId> = IndexSet::new();
    let mut terminals: IndexSet<NodeId> = IndexSet::new();
    let mut paths: Vec<Vec<EntityId>> = Vec::new();

    for start in &starts {
        walk_from(
            graph,
            evaluator,
            stmt,
            *start,
            &edge_types,
            any_type,
            direction,
            min_depth,
            max_depth,
            &bindings,
            &mut nodes,
            &mut edges,
            &mut terminals,
            &mut paths,
        )?;
    }

    let (columns, rows) = match &stmt.return_type {
        WalkReturnType::Nodes { alias } => {
            let column = alias.clone().unwrap_or_else(|| "node".to_string());
            let rows = nodes
                .into_iter()
                .map(|id| vec![Value::NodeRef(id)])
                .collect::<Vec<_>>();
            (vec![column], rows)
        }
        WalkReturnType::Edges { alias } => {
            let column = alias.clone().unwrap_or_else(|| "edge".to_string());
            let rows = edges
                .into_iter()
                .map(|id| vec![Value::EdgeRef(id)])
                .collect::<Vec<_>>();
            (vec![column], rows)
        }
        WalkReturnType::Terminal { alias } => {
            let column = alias.clone().unwrap_or_else(|| "terminal".to_string());
            let rows = terminals
                .into_iter()
                .map(|id| vec![Value::NodeRef(id)])
                .collect::<Vec<_>>();
            (vec![column], rows)
        }
        WalkReturnType::Path { alias } => {
            let column = alias.clone().unwrap_or_else(|| "path".to_string());
            let rows = paths
                .into_iter()
                .map(|path| {
                    vec![Value::List(
                        path.into_iter()
                            .map(|entity| match entity {
                                EntityId::Node(n) => Value::NodeRef(n),
                                EntityId::Edge(e) => Value::EdgeRef(e),
                            })
                            .collect(),
                    )]
                })
                .collect::<Vec<_>>();
            (vec![column], rows)
        }
    };

    let returned = rows.len();
    Ok(QueryOutput {
        columns,
        rows,
        stats: QueryStats {
            matches: returned,
            returned,
            ms: started.elapsed().as_millis() as u64,
        },
        warnings: Vec::new(),
        trace: Default::default(),
    })
}

fn collect_starts(value: &Value, out: &mut Vec<NodeId>) -> QueryResult<()> {
    match value {
        Value::NodeRef(id) => out.push(*id),
        Value::List(items) => {
            for item in items {
                collect_starts(item, out)?;
            }
        }
        _ => return Err(QueryError::InvalidWalkStart),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_from(
    graph: &dyn GraphRead,
    evaluator: &Evaluator<'_>,
    stmt: &WalkStmt,
    start: NodeId,
    edge_types: &[EdgeTypeId],
    any_type: bool,
    direction: WalkDirection,
    min_depth: i64,
    max_depth: i64,
    outer: &Bindings,
    nodes: &mut IndexSet<NodeId>,
    edges: &mut IndexSet<EdgeId>,
    terminals: &mut IndexSet<NodeId>,
    paths: &mut Vec<Vec<EntityId>>,
) -> QueryResult<()> {
    if graph.node(start).is_none() {
        return Ok(());
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut frontier: VecDeque<(NodeId, i64, Vec<EntityId>)> = VecDeque::new();
    frontier.push_back((start, 0, vec![EntityId::Node(start)]));

    while let Some((current, depth, path)) = frontier.pop_front() {
        if !visited.insert(current) {
            continue;
        }

        // UNTIL halts expansion at (and includes) the matching node.
        let halted = match &stmt.until {
            Some(condition) => {
                let mut row = outer.clone();
                row.insert("node", Binding::Node(current));
                evaluator.eval_bool(condition, &row, graph)?
            }
            None => false,
        };

        let in_window = depth >= min_depth && depth <= max_depth;
        if in_window {
            nodes.insert(current);
            paths.push(path.clone());
        }

        if halted || depth >= max_depth {
            if in_window {
                terminals.insert(current);
            }
            continue;
        }

        // Expand: collect (edge, neighbor) pairs in sorted order.
        let mut expansion: Vec<(EdgeId, NodeId)> = Vec::new();
        let outbound = matches!(direction, WalkDirection::Outbound | WalkDirection::Any);
        let inbound = matches!(direction, WalkDirection::Inbound | WalkDirection::Any);

        let mut candidate_edges: Vec<(EdgeId, bool)> = Vec::new();
        if any_type {
            if outbound {
                candidate_edges.extend(graph.edges_from(current, None).into_iter().map(|e| (e, true)));
            }
            if inbound {
                candidate_edges.extend(graph.edges_to(current, None).into_iter().map(|e| (e, false)));
            }
        } else {
            for et in edge_types {
                if outbound {
                    candidate_edges
                        .extend(graph.edges_from(current, Some(*et)).into_iter().map(|e| (e, true)));
                }
                if inbound {
                    candidate_edges
                        .extend(graph.edges_to(current, Some(*et)).into_iter().map(|e| (e, false)));
                }
            }
        }
        candidate_edges.sort();
        candidate_edges.dedup();

        for (edge_id, is_outbound) in candidate_edges {
            let Some(edge) = graph.edge(edge_id) else {
                continue;
            };
            let neighbor = if is_outbound {
                edge.targets.get(1).and_then(|t| t.as_node())
            } else {
                edge.targets.first().and_then(|t| t.as_node())
            };
            if let Some(neighbor) = neighbor {
                expansion.push((edge_id, neighbor));
            }
        }

        let mut advanced = false;
        for (edge_id, neighbor) in expansion {
            if depth + 1 <= max_depth {
                edges.insert(edge_id);
            }
            if !visited.contains(&neighbor) {
                advanced = true;
                let mut next_path = path.clone();
                next_path.push(EntityId::Edge(edge_id));
                next_path.push(EntityId::Node(neighbor));
                frontier.push_back((neighbor, depth + 1, next_path));
            }
        }

        if !advanced && in_window {
            terminals.insert(current);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, Edge, Node};
    use mew_graph::{Graph, IdGen};
    use mew_parser::parse_stmt;
    use mew_registry::{AttrDef, RegistryBuilder};

    struct Fx {
        registry: Registry,
        graph: Graph,
        ids: IdGen,
        limits: EngineLimits,
    }

    impl Fx {
        fn new() -> Self {
            let mut builder = RegistryBuilder::new();
            builder
                .add_type("Employee")
                .attr(AttrDef::new("name", "String"))
                .attr(AttrDef::new("level", "Int"))
                .done()
                .unwrap();
            builder
                .add_edge_type("reports_to")
                .param("junior", "Employee")
                .param("senior", "Employee")
                .done()
                .unwrap();
            Self {
                registry: builder.build().unwrap(),
                graph: Graph::new(),
                ids: IdGen::new(),
                limits: EngineLimits::default(),
            }
        }

        fn employee(&mut self, name: &str, level: i64) -> NodeId {
            let id = self.ids.alloc_node_id();
            let tid = self.registry.get_type_id("Employee").unwrap();
            self.graph
                .insert_node(Node::new(id, tid, attrs! { "name" => name, "level" => level }))
                .unwrap();
            id
        }

        fn reports(&mut self, junior: NodeId, senior: NodeId) -> EdgeId {
            let id = self.ids.alloc_edge_id();
            let et = self.registry.get_edge_type_id("reports_to").unwrap();
            self.graph
                .insert_edge(Edge::new(id, et, vec![junior.into(), senior.into()], attrs!()))
                .unwrap();
            id
        }

        fn walk(&self, source: &str) -> QueryResult<QueryOutput> {
            let stmt = match parse_stmt(source).unwrap() {
                mew_parser::Stmt::Walk(w) => w,
                other => panic!("expected WALK, got {:?}", other),
            };
            let evaluator = Evaluator::new(&self.registry);
            execute_walk(&self.registry, &self.graph, &evaluator, &self.limits, &stmt, None)
        }
    }

    #[test]
    fn test_walk_nodes_outbound() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 3);
        let b = fx.employee("b", 2);
        let c = fx.employee("c", 1);
        fx.reports(a, b);
        fx.reports(b, c);

        let output = fx
            .walk(&format!("WALK FROM #{} FOLLOW reports_to RETURN NODES", a.raw()))
            .unwrap();
        // Depth window defaults to 1.. so the start itself is excluded.
        let ids: Vec<NodeId> = output
            .rows
            .iter()
            .map(|r| r[0].as_node_ref().unwrap())
            .collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[test]
    fn test_walk_depth_bounds() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 3);
        let b = fx.employee("b", 2);
        let c = fx.employee("c", 1);
        let d = fx.employee("d", 0);
        fx.reports(a, b);
        fx.reports(b, c);
        fx.reports(c, d);

        let output = fx
            .walk(&format!(
                "WALK FROM #{} FOLLOW reports_to DEPTH 2..3 RETURN NODES",
                a.raw()
            ))
            .unwrap();
        let ids: Vec<NodeId> = output
            .rows
            .iter()
            .map(|r| r[0].as_node_ref().unwrap())
            .collect();
        assert_eq!(ids, vec![c, d]);
    }

    #[test]
    fn test_walk_until_stops_expansion() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 3);
        let b = fx.employee("b", 2);
        let c = fx.employee("c", 1);
        fx.reports(a, b);
        fx.reports(b, c);

        let output = fx
            .walk(&format!(
                "WALK FROM #{} FOLLOW reports_to UNTIL node.level = 2 RETURN NODES",
                a.raw()
            ))
            .unwrap();
        let ids: Vec<NodeId> = output
            .rows
            .iter()
            .map(|r| r[0].as_node_ref().unwrap())
            .collect();
        // b satisfies UNTIL: included, but c beyond it is not reached.
        assert_eq!(ids, vec![b]);
    }

    #[test]
    fn test_walk_terminal_and_edges() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 3);
        let b = fx.employee("b", 2);
        let c = fx.employee("c", 1);
        let e1 = fx.reports(a, b);
        let e2 = fx.reports(b, c);

        let terminal = fx
            .walk(&format!("WALK FROM #{} FOLLOW reports_to RETURN TERMINAL", a.raw()))
            .unwrap();
        assert_eq!(terminal.rows.len(), 1);
        assert_eq!(terminal.rows[0][0], Value::NodeRef(c));

        let edges = fx
            .walk(&format!("WALK FROM #{} FOLLOW reports_to RETURN EDGES", a.raw()))
            .unwrap();
        let seen: Vec<EdgeId> = edges.rows.iter().map(|r| r[0].as_edge_ref().unwrap()).collect();
        assert_eq!(seen, vec![e1, e2]);
    }

    #[test]
    fn test_walk_inbound() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 3);
        let b = fx.employee("b", 2);
        fx.reports(a, b);

        let output = fx
            .walk(&format!(
                "WALK FROM #{} FOLLOW reports_to INBOUND RETURN NODES",
                b.raw()
            ))
            .unwrap();
        let ids: Vec<NodeId> = output
            .rows
            .iter()
            .map(|r| r[0].as_node_ref().unwrap())
            .collect();
        assert_eq!(ids, vec![a]);
    }

    #[test]
    fn test_walk_cycle_terminates() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 1);
        let b = fx.employee("b", 2);
        fx.reports(a, b);
        fx.reports(b, a);

        let output = fx
            .walk(&format!("WALK FROM #{} FOLLOW reports_to RETURN NODES", a.raw()))
            .unwrap();
        // Reaches b, then a again (already visited): two result rows at
        // most, no infinite loop.
        assert!(output.rows.len() <= 2);
    }

    #[test]
    fn test_walk_path_includes_every_path() {
        let mut fx = Fx::new();
        let a = fx.employee("a", 1);
        let b = fx.employee("b", 2);
        fx.reports(a, b);

        let output = fx
            .walk(&format!(
                "WALK FROM #{} FOLLOW reports_to DEPTH 0..5 RETURN PATH",
                a.raw()
            ))
            .unwrap();
        // Depth 0 path [a] and depth 1 path [a, e, b].
        assert_eq!(output.rows.len(), 2);
        match &output.rows[1][0] {
            Value::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected path list, got {:?}", other),
        }
    }
}
