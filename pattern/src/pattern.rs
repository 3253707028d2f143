//! Compiled pattern representation.

use mew_core::{EdgeTypeId, TypeId};
use mew_parser::{EdgePattern, Expr, NodePattern, PatternElem, TransitiveKind};
use mew_registry::Registry;

use crate::{PatternError, PatternResult};

/// Default traversal depth window for transitive patterns.
const DEFAULT_MAX_DEPTH: i64 = 100;

/// A compiled pattern operation.
#[derive(Debug, Clone)]
pub enum PatternOp {
    /// Bind `var` to every node of the type (and its subtypes).
    /// `type_id` of `None` means `any`.
    ScanNodes {
        var: String,
        type_id: Option<TypeId>,
    },
    /// Unify an edge against target variables, binding any that are free
    /// plus the optional edge alias. `edge_type` of `None` matches any
    /// edge type (`edge<any>` patterns).
    FollowEdge {
        edge_type: Option<EdgeTypeId>,
        targets: Vec<String>,
        edge_var: Option<String>,
        symmetric: bool,
    },
    /// Transitive closure over a binary edge type between two variables.
    Transitive {
        edge_type: EdgeTypeId,
        from_var: String,
        to_var: String,
        min_depth: i64,
        max_depth: i64,
        symmetric: bool,
    },
    /// Keep bindings satisfying the condition.
    Filter { condition: Expr },
    /// Keep bindings that admit no match of the subpattern.
    NotExists { subpattern: Box<CompiledPattern> },
}

/// A compiled pattern ready for matching.
#[derive(Debug, Clone, Default)]
pub struct CompiledPattern {
    pub ops: Vec<PatternOp>,
    /// Variables bound by this pattern, in binding order.
    pub output_vars: Vec<String>,
}

impl CompiledPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile pattern elements with no pre-existing bindings.
    pub fn compile(elements: &[PatternElem], registry: &Registry) -> PatternResult<Self> {
        Self::compile_with_prebound(elements, registry, &[])
    }

    /// Compile with variables already bound by the caller. Prebound
    /// variables are unified rather than re-scanned.
    pub fn compile_with_prebound(
        elements: &[PatternElem],
        registry: &Registry,
        prebound: &[String],
    ) -> PatternResult<Self> {
        let mut ops = Vec::new();
        let mut bound: Vec<String> = prebound.to_vec();
        let mut output_vars = Vec::new();

        for elem in elements {
            match elem {
                PatternElem::Node(node) => {
                    compile_node(node, registry, &mut ops, &mut bound, &mut output_vars)?;
                }
                PatternElem::Edge(edge) if edge.negated => {
                    // A negated edge pattern is sugar for NOT EXISTS of the
                    // single-edge subpattern over the current bindings.
                    let mut positive = edge.clone();
                    positive.negated = false;
                    let sub = Self::compile_with_prebound(
                        &[PatternElem::Edge(positive)],
                        registry,
                        &bound,
                    )?;
                    ops.push(PatternOp::NotExists {
                        subpattern: Box::new(sub),
                    });
                }
                PatternElem::Edge(edge) => {
                    compile_edge(edge, registry, &mut ops, &mut bound, &mut output_vars)?;
                }
            }
        }

        Ok(Self { ops, output_vars })
    }

    /// Append a filter operation.
    pub fn with_filter(mut self, condition: Expr) -> Self {
        self.ops.push(PatternOp::Filter { condition });
        self
    }

    pub fn binds(&self, var: &str) -> bool {
        self.output_vars.iter().any(|v| v == var)
    }
}

fn compile_node(
    node: &NodePattern,
    registry: &Registry,
    ops: &mut Vec<PatternOp>,
    bound: &mut Vec<String>,
    output_vars: &mut Vec<String>,
) -> PatternResult<()> {
    let type_id = if node.type_name == "any" {
        None
    } else {
        Some(
            registry
                .get_type_id(&node.type_name)
                .ok_or_else(|| PatternError::unknown_type(&node.type_name))?,
        )
    };

    if bound.iter().any(|v| v == &node.var) {
        // Already bound by the caller: narrow by type instead of scanning.
        if let Some(tid) = type_id {
            ops.push(PatternOp::Filter {
                condition: type_check_expr(&node.var, tid, registry),
            });
        }
        return Ok(());
    }

    ops.push(PatternOp::ScanNodes {
        var: node.var.clone(),
        type_id,
    });
    bound.push(node.var.clone());
    output_vars.push(node.var.clone());
    Ok(())
}

/// A filter expression checking that `var` is an instance of `type_id`.
/// Encoded as the internal `_instance_of(var, "TypeName")` call, which the
/// evaluator resolves through the registry's subtype closure.
fn type_check_expr(var: &str, type_id: TypeId, registry: &Registry) -> Expr {
    let type_name = registry
        .get_type(type_id)
        .map(|t| t.name.clone())
        .unwrap_or_default();
    Expr::FnCall(mew_parser::FnCall {
        name: "_instance_of".to_string(),
        args: vec![
            Expr::Var(var.to_string(), mew_parser::Span::default()),
            Expr::Literal(mew_parser::Literal {
                kind: mew_parser::LiteralKind::String(type_name),
                span: mew_parser::Span::default(),
            }),
        ],
        distinct: false,
        span: mew_parser::Span::default(),
    })
}

fn compile_edge(
    edge: &EdgePattern,
    registry: &Registry,
    ops: &mut Vec<PatternOp>,
    bound: &mut Vec<String>,
    output_vars: &mut Vec<String>,
) -> PatternResult<()> {
    let (edge_type, symmetric) = if edge.edge_type == "any" {
        (None, false)
    } else {
        let def = registry
            .get_edge_type_by_name(&edge.edge_type)
            .ok_or_else(|| PatternError::unknown_edge_type(&edge.edge_type))?;
        (Some(def.id), def.symmetric)
    };

    if let Some(transitive) = edge.transitive {
        let Some(edge_type) = edge_type else {
            return Err(PatternError::invalid_operation(
                "transitive traversal requires a concrete edge type",
            ));
        };
        if edge.targets.len() != 2 {
            return Err(PatternError::invalid_operation(
                "transitive traversal requires a binary edge pattern",
            ));
        }

        let default_min = match transitive.kind {
            TransitiveKind::Plus => 1,
            TransitiveKind::Star => 0,
        };
        let min_depth = transitive.min_depth.unwrap_or(default_min);
        let max_depth = transitive.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        // `+` means one or more; a zero lower bound is only valid for `*`.
        let min_depth = if transitive.kind == TransitiveKind::Plus {
            min_depth.max(1)
        } else {
            min_depth
        };

        let to_var = edge.targets[1].clone();
        ops.push(PatternOp::Transitive {
            edge_type,
            from_var: edge.targets[0].clone(),
            to_var: to_var.clone(),
            min_depth,
            max_depth,
            symmetric,
        });
        if to_var != "_" && !bound.iter().any(|v| v == &to_var) {
            bound.push(to_var.clone());
            output_vars.push(to_var);
        }
        return Ok(());
    }

    ops.push(PatternOp::FollowEdge {
        edge_type,
        targets: edge.targets.clone(),
        edge_var: edge.alias.clone(),
        symmetric,
    });
    for target in &edge.targets {
        if target != "_" && !bound.iter().any(|v| v == target) {
            bound.push(target.clone());
            output_vars.push(target.clone());
        }
    }
    if let Some(alias) = &edge.alias {
        if !bound.iter().any(|v| v == alias) {
            bound.push(alias.clone());
            output_vars.push(alias.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_parser::Span;
    use mew_registry::{AttrDef, RegistryBuilder};

    fn test_registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .add_type("Task")
            .attr(AttrDef::new("title", "String"))
            .done()
            .unwrap();
        builder
            .add_type("Person")
            .attr(AttrDef::new("name", "String"))
            .done()
            .unwrap();
        builder
            .add_edge_type("owns")
            .param("owner", "Person")
            .param("task", "Task")
            .done()
            .unwrap();
        builder
            .add_edge_type("blocks")
            .param("a", "Task")
            .param("b", "Task")
            .done()
            .unwrap();
        builder.build().unwrap()
    }

    fn node_elem(var: &str, type_name: &str) -> PatternElem {
        PatternElem::Node(NodePattern {
            var: var.to_string(),
            type_name: type_name.to_string(),
            span: Span::default(),
        })
    }

    fn edge_elem(edge_type: &str, targets: &[&str]) -> PatternElem {
        PatternElem::Edge(EdgePattern {
            edge_type: edge_type.to_string(),
            targets: targets.iter().map(|s| s.to_string()).collect(),
            alias: None,
            transitive: None,
            negated: false,
            span: Span::default(),
        })
    }

    #[test]
    fn test_compile_scan_then_follow() {
        let registry = test_registry();
        let elements = vec![
            node_elem("p", "Person"),
            node_elem("t", "Task"),
            edge_elem("owns", &["p", "t"]),
        ];
        let pattern = CompiledPattern::compile(&elements, &registry).unwrap();

        assert_eq!(pattern.ops.len(), 3);
        assert!(matches!(&pattern.ops[0], PatternOp::ScanNodes { var, .. } if var == "p"));
        assert!(matches!(&pattern.ops[2], PatternOp::FollowEdge { .. }));
        assert_eq!(pattern.output_vars, vec!["p", "t"]);
    }

    #[test]
    fn test_compile_edge_binds_free_targets() {
        let registry = test_registry();
        // No node scans: the edge pattern itself introduces p and t.
        let elements = vec![edge_elem("owns", &["p", "t"])];
        let pattern = CompiledPattern::compile(&elements, &registry).unwrap();

        assert_eq!(pattern.ops.len(), 1);
        assert!(pattern.binds("p"));
        assert!(pattern.binds("t"));
    }

    #[test]
    fn test_compile_transitive_defaults() {
        let registry = test_registry();
        let elements = vec![
            node_elem("a", "Task"),
            PatternElem::Edge(EdgePattern {
                edge_type: "blocks".to_string(),
                targets: vec!["a".to_string(), "b".to_string()],
                alias: None,
                transitive: Some(mew_parser::TransitiveMod {
                    kind: TransitiveKind::Plus,
                    min_depth: None,
                    max_depth: None,
                }),
                negated: false,
                span: Span::default(),
            }),
        ];
        let pattern = CompiledPattern::compile(&elements, &registry).unwrap();

        match &pattern.ops[1] {
            PatternOp::Transitive {
                min_depth,
                max_depth,
                ..
            } => {
                assert_eq!(*min_depth, 1);
                assert_eq!(*max_depth, 100);
            }
            other => panic!("expected Transitive, got {:?}", other),
        }
        assert!(pattern.binds("b"));
    }

    #[test]
    fn test_compile_unknown_type_error() {
        let registry = test_registry();
        let elements = vec![node_elem("x", "Mystery")];
        let result = CompiledPattern::compile(&elements, &registry);
        assert!(matches!(result, Err(PatternError::UnknownType { .. })));
    }

    #[test]
    fn test_compile_negated_edge_becomes_not_exists() {
        let registry = test_registry();
        let elements = vec![
            node_elem("p", "Person"),
            node_elem("t", "Task"),
            PatternElem::Edge(EdgePattern {
                edge_type: "owns".to_string(),
                targets: vec!["p".to_string(), "t".to_string()],
                alias: None,
                transitive: None,
                negated: true,
                span: Span::default(),
            }),
        ];
        let pattern = CompiledPattern::compile(&elements, &registry).unwrap();
        assert!(matches!(&pattern.ops[2], PatternOp::NotExists { .. }));
    }

    #[test]
    fn test_prebound_node_var_narrows_instead_of_scanning() {
        let registry = test_registry();
        let elements = vec![node_elem("t", "Task")];
        let pattern =
            CompiledPattern::compile_with_prebound(&elements, &registry, &["t".to_string()])
                .unwrap();
        assert!(matches!(&pattern.ops[0], PatternOp::Filter { .. }));
        assert!(pattern.output_vars.is_empty());
    }
}
