//! Surface-syntax rendering.
//!
//! Renders parsed declarations back to source that round-trips through
//! the parser. The durable ontology blob is persisted in this form.

use crate::ast::*;
use std::fmt::Write;

/// Render ontology declarations to loadable source.
pub fn render_ontology_items(items: &[OntologyItem]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            OntologyItem::Node(node) => render_node(&mut out, node),
            OntologyItem::Edge(edge) => render_edge(&mut out, edge),
            OntologyItem::Constraint(constraint) => render_constraint(&mut out, constraint),
            OntologyItem::Rule(rule) => render_rule(&mut out, rule),
        }
        out.push('\n');
    }
    out
}

fn render_node(out: &mut String, node: &NodeTypeDecl) {
    if node.is_abstract {
        out.push_str("abstract ");
    }
    let _ = write!(out, "node {}", node.name);
    if !node.parents.is_empty() {
        let _ = write!(out, " : {}", node.parents.join(", "));
    }
    if node.attrs.is_empty() {
        out.push_str(" { }");
        return;
    }
    out.push_str(" {\n");
    for (i, attr) in node.attrs.iter().enumerate() {
        out.push_str("    ");
        render_attr(out, attr);
        if i + 1 < node.attrs.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push('}');
}

fn render_attr(out: &mut String, attr: &AttrDecl) {
    let _ = write!(out, "{}: {}", attr.name, attr.type_name);
    if attr.nullable {
        out.push('?');
    }
    if attr.modifiers.is_empty() {
        return;
    }
    out.push_str(" [");
    for (i, modifier) in attr.modifiers.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match modifier {
            AttrModifier::Required => out.push_str("required"),
            AttrModifier::Unique => out.push_str("unique"),
            AttrModifier::Indexed => out.push_str("indexed"),
            AttrModifier::Default(expr) => {
                let _ = write!(out, "default: {}", render_expr(expr));
            }
            AttrModifier::Range { min, max } => {
                let mut first = true;
                if let Some(min) = min {
                    let _ = write!(out, ">= {}", render_expr(min));
                    first = false;
                }
                if let Some(max) = max {
                    if !first {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "<= {}", render_expr(max));
                }
            }
            AttrModifier::InValues(values) => {
                let rendered: Vec<String> = values.iter().map(render_expr).collect();
                let _ = write!(out, "in: [{}]", rendered.join(", "));
            }
            AttrModifier::Match(pattern) => {
                let _ = write!(out, "match: \"{}\"", escape(pattern));
            }
            AttrModifier::Length { min, max } => {
                let _ = write!(out, "length: {}..{}", min, max);
            }
            AttrModifier::Format(format) => {
                let _ = write!(out, "format: {}", format);
            }
        }
    }
    out.push(']');
}

fn render_edge(out: &mut String, edge: &EdgeTypeDecl) {
    let params: Vec<String> = edge
        .params
        .iter()
        .map(|(name, spec)| format!("{}: {}", name, spec))
        .collect();
    let _ = write!(out, "edge {}({})", edge.name, params.join(", "));

    if !edge.modifiers.is_empty() {
        out.push_str(" [");
        for (i, modifier) in edge.modifiers.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match modifier {
                EdgeModifier::Acyclic => out.push_str("acyclic"),
                EdgeModifier::Unique => out.push_str("unique"),
                EdgeModifier::NoSelf => out.push_str("no_self"),
                EdgeModifier::Symmetric => out.push_str("symmetric"),
                EdgeModifier::OnKill { position, action } => {
                    let position = match position {
                        OnKillPosition::Source => "on_kill_source",
                        OnKillPosition::Target => "on_kill_target",
                    };
                    let action = match action {
                        ReferentialAction::Cascade => "cascade",
                        ReferentialAction::Unlink => "unlink",
                        ReferentialAction::Prevent => "prevent",
                    };
                    let _ = write!(out, "{}: {}", position, action);
                }
                EdgeModifier::Cardinality { param, min, max } => {
                    let max = max
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "*".to_string());
                    let _ = write!(out, "cardinality {}: {}..{}", param, min, max);
                }
            }
        }
        out.push(']');
    }

    if !edge.attrs.is_empty() {
        out.push_str(" {\n");
        for (i, attr) in edge.attrs.iter().enumerate() {
            out.push_str("    ");
            render_attr(out, attr);
            if i + 1 < edge.attrs.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push('}');
    }
}

fn render_constraint(out: &mut String, constraint: &ConstraintDecl) {
    let _ = write!(out, "constraint {}", constraint.name);
    let mut modifiers = Vec::new();
    if constraint.soft {
        modifiers.push("soft".to_string());
    }
    if constraint.deferred {
        modifiers.push("deferred".to_string());
    }
    if let Some(message) = &constraint.message {
        modifiers.push(format!("message: \"{}\"", escape(message)));
    }
    if !modifiers.is_empty() {
        let _ = write!(out, " [{}]", modifiers.join(", "));
    }
    let _ = write!(
        out,
        ": {} => {}",
        render_pattern(&constraint.pattern),
        render_expr(&constraint.condition)
    );
}

fn render_rule(out: &mut String, rule: &RuleDecl) {
    let _ = write!(out, "rule {}", rule.name);
    let mut modifiers = Vec::new();
    if !rule.auto {
        modifiers.push("manual".to_string());
    }
    if let Some(priority) = rule.priority {
        modifiers.push(format!("priority: {}", priority));
    }
    if !modifiers.is_empty() {
        let _ = write!(out, " [{}]", modifiers.join(", "));
    }
    let actions: Vec<String> = rule.production.iter().map(render_action).collect();
    let _ = write!(
        out,
        ": {} => {}",
        render_pattern(&rule.pattern),
        actions.join("; ")
    );
}

fn render_pattern(pattern: &Pattern) -> String {
    let mut parts: Vec<String> = Vec::new();
    for elem in &pattern.elements {
        match elem {
            PatternElem::Node(node) => parts.push(format!("{}: {}", node.var, node.type_name)),
            PatternElem::Edge(edge) => {
                let mut text = String::new();
                if edge.negated {
                    text.push('!');
                }
                text.push_str(&edge.edge_type);
                if let Some(transitive) = edge.transitive {
                    text.push(match transitive.kind {
                        TransitiveKind::Plus => '+',
                        TransitiveKind::Star => '*',
                    });
                    if transitive.min_depth.is_some() || transitive.max_depth.is_some() {
                        let min = transitive.min_depth.unwrap_or(1);
                        match transitive.max_depth {
                            Some(max) => {
                                let _ = write!(text, "{{{},{}}}", min, max);
                            }
                            None => {
                                let _ = write!(text, "{{{}}}", min);
                            }
                        }
                    }
                }
                let _ = write!(text, "({})", edge.targets.join(", "));
                if let Some(alias) = &edge.alias {
                    let _ = write!(text, " AS {}", alias);
                }
                parts.push(text);
            }
        }
    }
    let mut rendered = parts.join(", ");
    if let Some(where_clause) = &pattern.where_clause {
        let _ = write!(rendered, " WHERE {}", render_expr(where_clause));
    }
    rendered
}

fn render_action(action: &MutationAction) -> String {
    match action {
        MutationAction::Spawn(spawn) => {
            let items: Vec<String> = spawn
                .items
                .iter()
                .map(|item| {
                    let mut text = format!("{}: {}", item.var, item.type_name);
                    if !item.attrs.is_empty() {
                        let attrs: Vec<String> = item
                            .attrs
                            .iter()
                            .map(|a| format!("{} = {}", a.name, render_expr(&a.value)))
                            .collect();
                        let _ = write!(text, " {{ {} }}", attrs.join(", "));
                    }
                    text
                })
                .collect();
            format!("SPAWN {}", items.join(", "))
        }
        MutationAction::Link(link) => {
            let targets: Vec<String> = link
                .targets
                .iter()
                .map(|t| match t {
                    TargetRef::Var(name) => name.clone(),
                    TargetRef::Id(id) => format!("#{}", id),
                    TargetRef::InlineSpawn(item) => format!("SPAWN {}: {}", item.var, item.type_name),
                })
                .collect();
            let mut text = format!("LINK {}({})", link.edge_type, targets.join(", "));
            if let Some(var) = &link.var {
                let _ = write!(text, " AS {}", var);
            }
            if !link.attrs.is_empty() {
                let attrs: Vec<String> = link
                    .attrs
                    .iter()
                    .map(|a| format!("{} = {}", a.name, render_expr(&a.value)))
                    .collect();
                let _ = write!(text, " {{ {} }}", attrs.join(", "));
            }
            if link.if_not_exists {
                text.push_str(" IF NOT EXISTS");
            }
            text
        }
        MutationAction::Set(set) => {
            let target = render_target(&set.target);
            let assigns: Vec<String> = set
                .assignments
                .iter()
                .map(|a| format!("{}.{} = {}", target, a.name, render_expr(&a.value)))
                .collect();
            format!("SET {}", assigns.join(", "))
        }
        MutationAction::Kill(kill) => format!("KILL {}", render_target(&kill.target)),
        MutationAction::Unlink(unlink) => format!("UNLINK {}", render_target(&unlink.target)),
    }
}

fn render_target(target: &Target) -> String {
    match target {
        Target::Var(name) => name.clone(),
        Target::Id(id) => format!("#{}", id),
        Target::Pattern(_) => "(...)".to_string(),
        Target::EdgePattern { edge_type, targets } => {
            format!("{}({})", edge_type, targets.join(", "))
        }
    }
}

/// Render an expression with explicit grouping. Always parenthesizing
/// binary operations sidesteps precedence bookkeeping; the parser strips
/// the redundant parentheses on the way back in.
pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => lit.kind.to_string(),
        Expr::Var(name, _) => name.clone(),
        Expr::AttrAccess(base, attr, _) => format!("{}.{}", render_expr(base), attr),
        Expr::BinaryOp(op, left, right, _) => {
            format!("({} {} {})", render_expr(left), op, render_expr(right))
        }
        Expr::UnaryOp(op, operand, _) => match op {
            UnaryOp::Neg => format!("(-{})", render_expr(operand)),
            UnaryOp::Not => format!("(NOT {})", render_expr(operand)),
        },
        Expr::FnCall(fc) => {
            let args: Vec<String> = fc.args.iter().map(render_expr).collect();
            let distinct = if fc.distinct { "DISTINCT " } else { "" };
            format!("{}({}{})", fc.name, distinct, args.join(", "))
        }
        Expr::IdRef(id, _) => format!("#{}", id),
        Expr::Param(name, _) => format!("${}", name),
        Expr::Exists(elements, where_clause, span) => {
            let pattern = Pattern {
                elements: elements.clone(),
                where_clause: where_clause.as_deref().cloned(),
                span: *span,
            };
            format!("EXISTS ({})", render_pattern(&pattern))
        }
        Expr::NotExists(elements, where_clause, span) => {
            let pattern = Pattern {
                elements: elements.clone(),
                where_clause: where_clause.as_deref().cloned(),
                span: *span,
            };
            format!("NOT EXISTS ({})", render_pattern(&pattern))
        }
        Expr::List(items, _) => {
            let rendered: Vec<String> = items.iter().map(render_expr).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_ontology;

    const SOURCE: &str = r#"
        abstract node Item { label: String? }
        node Task : Item {
            title: String [required],
            priority: Int? [>= 0, <= 10, default: 5],
            status: String? [in: ["todo", "done"]]
        }
        edge depends_on(a: Task, b: Task) [acyclic, unique, on_kill_target: cascade] { weight: Int? }
        constraint titled [message: "needs a title"]: t: Task => length(t.title) > 0
        rule bump on Task [priority: 7]: SET t.priority = (t.priority + 1)
    "#;

    #[test]
    fn test_render_round_trips_through_parser() {
        let items = parse_ontology(SOURCE).unwrap();
        let rendered = render_ontology_items(&items);
        let reparsed = parse_ontology(&rendered)
            .unwrap_or_else(|e| panic!("rendered source failed to parse: {}\n{}", e, rendered));
        assert_eq!(items.len(), reparsed.len());

        // Round-tripping again is a fixpoint.
        let rendered_again = render_ontology_items(&reparsed);
        assert_eq!(rendered, rendered_again);
    }

    #[test]
    fn test_render_expr_groups_explicitly() {
        let items = parse_ontology("node N { }\nconstraint c: t: N => 1 + 2 * 3 = 7").unwrap();
        let rendered = render_ontology_items(&items);
        assert!(rendered.contains("((1 + (2 * 3)) = 7)"));
    }
}
