//! Statement analysis.

use crate::{AnalyzerError, AnalyzerResult, Scope, VarType};
use mew_parser::{
    BinaryOp, EdgePattern, Expr, MatchStmt, MutationAction, PatternElem, SetStmt, SpawnItem, Stmt,
    Target, TargetRef, UnaryOp,
};
use mew_registry::{ParamKind, Registry};

/// Inferred expression type. `Any` unifies with everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Any,
    Null,
    Bool,
    Int,
    Float,
    String,
    Timestamp,
    Duration,
    Entity,
    List,
}

impl Ty {
    fn name(&self) -> &'static str {
        match self {
            Ty::Any => "Any",
            Ty::Null => "Null",
            Ty::Bool => "Bool",
            Ty::Int => "Int",
            Ty::Float => "Float",
            Ty::String => "String",
            Ty::Timestamp => "Timestamp",
            Ty::Duration => "Duration",
            Ty::Entity => "Entity",
            Ty::List => "List",
        }
    }

    fn from_declared(name: &str) -> Ty {
        match name {
            "Bool" => Ty::Bool,
            "Int" => Ty::Int,
            "Float" => Ty::Float,
            "String" => Ty::String,
            "Timestamp" => Ty::Timestamp,
            "Duration" => Ty::Duration,
            _ => Ty::Any,
        }
    }

    fn numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float | Ty::Any | Ty::Null)
    }

    fn compatible(&self, other: Ty) -> bool {
        if matches!(self, Ty::Any | Ty::Null) || matches!(other, Ty::Any | Ty::Null) {
            return true;
        }
        if *self == other {
            return true;
        }
        matches!(
            (self, other),
            (Ty::Int, Ty::Float) | (Ty::Float, Ty::Int) | (Ty::Int, Ty::Timestamp)
        )
    }
}

/// The analyzer: one per statement (or reused with session scope).
pub struct Analyzer<'r> {
    registry: &'r Registry,
    scope: Scope,
}

impl<'r> Analyzer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            scope: Scope::new(),
        }
    }

    /// Seed the outer frame with session-level bindings (variables bound
    /// by earlier statements in the same session).
    pub fn with_session_vars(registry: &'r Registry, vars: &[(String, VarType)]) -> Self {
        let mut analyzer = Self::new(registry);
        for (name, var_type) in vars {
            analyzer.scope.declare(name.clone(), *var_type);
        }
        analyzer
    }

    pub fn analyze_stmt(&mut self, stmt: &Stmt) -> AnalyzerResult<()> {
        match stmt {
            Stmt::Match(m) => self.analyze_match(m),
            Stmt::MatchMutate(m) => {
                self.scope.push();
                self.analyze_pattern(&m.pattern)?;
                if let Some(where_clause) = &m.where_clause {
                    self.expect_boolean(where_clause, false)?;
                }
                for mutation in &m.mutations {
                    self.analyze_mutation(mutation)?;
                }
                self.scope.pop();
                Ok(())
            }
            Stmt::MatchWalk(m) => {
                self.scope.push();
                self.analyze_pattern(&m.pattern)?;
                if let Some(where_clause) = &m.where_clause {
                    self.expect_boolean(where_clause, false)?;
                }
                self.analyze_walk(&m.walk)?;
                self.scope.pop();
                Ok(())
            }
            Stmt::Spawn(s) => {
                for item in &s.items {
                    self.analyze_spawn_item(item)?;
                }
                Ok(())
            }
            Stmt::Kill(k) => self.analyze_target(&k.target, TargetKind::Node),
            Stmt::Link(l) => self.analyze_link(l),
            Stmt::Unlink(u) => self.analyze_target(&u.target, TargetKind::Edge),
            Stmt::Set(s) => self.analyze_set(s),
            Stmt::Walk(w) => self.analyze_walk(w),
            Stmt::Inspect(_) => Ok(()),
            Stmt::Txn(_) | Stmt::Show(_) | Stmt::Versioning(_) => Ok(()),
            Stmt::CreateIndex(i) | Stmt::DropIndex(i) => {
                let type_def = self.registry.get_type_by_name(&i.type_name).ok_or_else(|| {
                    let (line, column) = AnalyzerError::at(i.span);
                    AnalyzerError::UnknownType {
                        name: i.type_name.clone(),
                        line,
                        column,
                    }
                })?;
                if self.registry.get_type_attr(type_def.id, &i.attr).is_none() {
                    let (line, column) = AnalyzerError::at(i.span);
                    return Err(AnalyzerError::UnknownAttribute {
                        owner: i.type_name.clone(),
                        attr: i.attr.clone(),
                        line,
                        column,
                    });
                }
                Ok(())
            }
            // Ontology statements are validated by the compiler.
            Stmt::Ontology(_) => Ok(()),
            Stmt::Explain(e) => self.analyze_stmt(&e.statement),
            Stmt::Profile(p) => self.analyze_stmt(&p.statement),
            Stmt::DryRun(d) => self.analyze_stmt(&d.statement),
        }
    }

    // ==================== Patterns ====================

    fn analyze_match(&mut self, stmt: &MatchStmt) -> AnalyzerResult<()> {
        self.scope.push();
        self.analyze_pattern(&stmt.pattern)?;

        if let Some(where_clause) = &stmt.where_clause {
            self.expect_boolean(where_clause, false)?;
        }

        for projection in &stmt.return_clause.projections {
            self.infer(&projection.expr, true)?;
        }
        if let Some(order_by) = &stmt.order_by {
            for term in order_by {
                self.infer(&term.expr, true)?;
            }
        }

        self.scope.pop();
        Ok(())
    }

    fn analyze_pattern(&mut self, elements: &[PatternElem]) -> AnalyzerResult<()> {
        for elem in elements {
            match elem {
                PatternElem::Node(node) => {
                    let var_type = if node.type_name == "any" {
                        VarType::AnyNode
                    } else {
                        let type_def =
                            self.registry.get_type_by_name(&node.type_name).ok_or_else(|| {
                                let (line, column) = AnalyzerError::at(node.span);
                                AnalyzerError::UnknownType {
                                    name: node.type_name.clone(),
                                    line,
                                    column,
                                }
                            })?;
                        VarType::Node(type_def.id)
                    };
                    if !self.scope.declare(&node.var, var_type) {
                        let (line, column) = AnalyzerError::at(node.span);
                        return Err(AnalyzerError::DuplicateVariable {
                            name: node.var.clone(),
                            line,
                            column,
                        });
                    }
                }
                PatternElem::Edge(edge) => self.analyze_edge_pattern(edge)?,
            }
        }
        Ok(())
    }

    fn analyze_edge_pattern(&mut self, edge: &EdgePattern) -> AnalyzerResult<()> {
        let (line, column) = AnalyzerError::at(edge.span);

        if edge.edge_type == "any" {
            // Anonymous edge type: targets bind as untyped entities.
            for target in &edge.targets {
                if target != "_" && self.scope.lookup(target).is_none() {
                    self.scope.declare(target.clone(), VarType::AnyNode);
                }
            }
            if let Some(alias) = &edge.alias {
                self.scope.declare(alias.clone(), VarType::AnyEdge);
            }
            return Ok(());
        }

        let edge_def = self
            .registry
            .get_edge_type_by_name(&edge.edge_type)
            .ok_or_else(|| AnalyzerError::UnknownEdgeType {
                name: edge.edge_type.clone(),
                line,
                column,
            })?;

        if edge.targets.len() != edge_def.arity() {
            return Err(AnalyzerError::WrongArity {
                edge_type: edge.edge_type.clone(),
                expected: edge_def.arity(),
                actual: edge.targets.len(),
                line,
                column,
            });
        }

        for (target, param) in edge.targets.iter().zip(&edge_def.params) {
            if target == "_" {
                continue;
            }
            match self.scope.lookup(target) {
                Some(VarType::Node(bound)) => {
                    if let ParamKind::Node(expected) = param.kind {
                        // Compatible when either subtypes the other:
                        // matching narrows, it never contradicts.
                        let ok = self.registry.is_subtype(bound, expected)
                            || self.registry.is_subtype(expected, bound);
                        if !ok {
                            return Err(AnalyzerError::TypeMismatch {
                                expected: self
                                    .registry
                                    .get_type(expected)
                                    .map(|t| t.name.clone())
                                    .unwrap_or_default(),
                                actual: self
                                    .registry
                                    .get_type(bound)
                                    .map(|t| t.name.clone())
                                    .unwrap_or_default(),
                                line,
                                column,
                            });
                        }
                    }
                }
                Some(VarType::Edge(_)) | Some(VarType::AnyEdge) => {
                    if matches!(param.kind, ParamKind::Node(_)) {
                        return Err(AnalyzerError::TypeMismatch {
                            expected: "a node variable".to_string(),
                            actual: "an edge variable".to_string(),
                            line,
                            column,
                        });
                    }
                }
                Some(VarType::AnyNode) => {}
                None => {
                    // The edge pattern introduces the variable, typed by
                    // its signature position.
                    let var_type = match param.kind {
                        ParamKind::Node(tid) => VarType::Node(tid),
                        ParamKind::AnyEntity => VarType::AnyNode,
                        ParamKind::Edge(Some(et)) => VarType::Edge(et),
                        ParamKind::Edge(None) => VarType::AnyEdge,
                    };
                    self.scope.declare(target.clone(), var_type);
                }
            }
        }

        if let Some(alias) = &edge.alias {
            if !self.scope.declare(alias.clone(), VarType::Edge(edge_def.id)) {
                return Err(AnalyzerError::DuplicateVariable {
                    name: alias.clone(),
                    line,
                    column,
                });
            }
        }
        Ok(())
    }

    // ==================== Mutations ====================

    fn analyze_mutation(&mut self, mutation: &MutationAction) -> AnalyzerResult<()> {
        match mutation {
            MutationAction::Spawn(s) => {
                for item in &s.items {
                    self.analyze_spawn_item(item)?;
                }
                Ok(())
            }
            MutationAction::Link(l) => self.analyze_link(l),
            MutationAction::Set(s) => self.analyze_set(s),
            MutationAction::Kill(k) => self.analyze_target(&k.target, TargetKind::Node),
            MutationAction::Unlink(u) => self.analyze_target(&u.target, TargetKind::Edge),
        }
    }

    fn analyze_spawn_item(&mut self, item: &SpawnItem) -> AnalyzerResult<()> {
        let (line, column) = AnalyzerError::at(item.span);
        let type_def = self
            .registry
            .get_type_by_name(&item.type_name)
            .ok_or_else(|| AnalyzerError::UnknownType {
                name: item.type_name.clone(),
                line,
                column,
            })?;
        if type_def.is_abstract {
            return Err(AnalyzerError::AbstractType {
                name: item.type_name.clone(),
                line,
                column,
            });
        }
        let type_id = type_def.id;

        for assign in &item.attrs {
            let attr_def = self
                .registry
                .get_type_attr(type_id, &assign.name)
                .ok_or_else(|| {
                    let (line, column) = AnalyzerError::at(assign.span);
                    AnalyzerError::UnknownAttribute {
                        owner: item.type_name.clone(),
                        attr: assign.name.clone(),
                        line,
                        column,
                    }
                })?;
            let declared = Ty::from_declared(&attr_def.type_name);
            let actual = self.infer(&assign.value, false)?;
            if !actual.compatible(declared) {
                let (line, column) = AnalyzerError::at(assign.span);
                return Err(AnalyzerError::TypeMismatch {
                    expected: declared.name().to_string(),
                    actual: actual.name().to_string(),
                    line,
                    column,
                });
            }
        }

        // Spawned variables are visible to the rest of the statement and
        // to later statements in the session.
        self.scope.declare(&item.var, VarType::Node(type_id));
        Ok(())
    }

    fn analyze_link(&mut self, stmt: &mew_parser::LinkStmt) -> AnalyzerResult<()> {
        let (line, column) = AnalyzerError::at(stmt.span);
        let edge_def = self
            .registry
            .get_edge_type_by_name(&stmt.edge_type)
            .ok_or_else(|| AnalyzerError::UnknownEdgeType {
                name: stmt.edge_type.clone(),
                line,
                column,
            })?;
        let edge_id = edge_def.id;
        let arity = edge_def.arity();

        if stmt.targets.len() != arity {
            return Err(AnalyzerError::WrongArity {
                edge_type: stmt.edge_type.clone(),
                expected: arity,
                actual: stmt.targets.len(),
                line,
                column,
            });
        }

        for target in &stmt.targets {
            match target {
                TargetRef::Var(name) => {
                    if self.scope.lookup(name).is_none() {
                        return Err(AnalyzerError::UndefinedVariable {
                            name: name.clone(),
                            line,
                            column,
                        });
                    }
                }
                TargetRef::Id(_) => {}
                TargetRef::InlineSpawn(item) => self.analyze_spawn_item(item)?,
            }
        }

        for assign in &stmt.attrs {
            let edge_def = self.registry.get_edge_type(edge_id).expect("edge def");
            if edge_def.get_attr(&assign.name).is_none() {
                let (line, column) = AnalyzerError::at(assign.span);
                return Err(AnalyzerError::UnknownAttribute {
                    owner: stmt.edge_type.clone(),
                    attr: assign.name.clone(),
                    line,
                    column,
                });
            }
            self.infer(&assign.value, false)?;
        }

        if let Some(var) = &stmt.var {
            self.scope.declare(var.clone(), VarType::Edge(edge_id));
        }
        Ok(())
    }

    fn analyze_set(&mut self, stmt: &SetStmt) -> AnalyzerResult<()> {
        let target_type = self.analyze_target_lookup(&stmt.target, stmt.span)?;

        for assign in &stmt.assignments {
            // Attribute existence is checkable when the target's type is
            // statically known; id targets resolve at execution.
            if let Some(VarType::Node(type_id)) = target_type {
                let attr_def = self
                    .registry
                    .get_type_attr(type_id, &assign.name)
                    .ok_or_else(|| {
                        let (line, column) = AnalyzerError::at(assign.span);
                        AnalyzerError::UnknownAttribute {
                            owner: self
                                .registry
                                .get_type(type_id)
                                .map(|t| t.name.clone())
                                .unwrap_or_default(),
                            attr: assign.name.clone(),
                            line,
                            column,
                        }
                    })?;
                let declared = Ty::from_declared(&attr_def.type_name);
                let actual = self.infer(&assign.value, false)?;
                if !actual.compatible(declared) {
                    let (line, column) = AnalyzerError::at(assign.span);
                    return Err(AnalyzerError::TypeMismatch {
                        expected: declared.name().to_string(),
                        actual: actual.name().to_string(),
                        line,
                        column,
                    });
                }
            } else {
                self.infer(&assign.value, false)?;
            }
        }
        Ok(())
    }

    fn analyze_walk(&mut self, stmt: &mew_parser::WalkStmt) -> AnalyzerResult<()> {
        self.infer(&stmt.from, false)?;
        for follow in &stmt.follow {
            for edge_type in &follow.edge_types {
                if edge_type != "*" && self.registry.get_edge_type_by_name(edge_type).is_none() {
                    let (line, column) = AnalyzerError::at(follow.span);
                    return Err(AnalyzerError::UnknownEdgeType {
                        name: edge_type.clone(),
                        line,
                        column,
                    });
                }
            }
        }
        if let Some(until) = &stmt.until {
            // UNTIL sees the iteration variable `node`.
            self.scope.push();
            self.scope.declare("node", VarType::AnyNode);
            self.expect_boolean(until, false)?;
            self.scope.pop();
        }
        Ok(())
    }

    fn analyze_target(&mut self, target: &Target, kind: TargetKind) -> AnalyzerResult<()> {
        let var_type = self.analyze_target_lookup(target, mew_parser::Span::default())?;
        if let Some(var_type) = var_type {
            let ok = match kind {
                TargetKind::Node => matches!(var_type, VarType::Node(_) | VarType::AnyNode),
                TargetKind::Edge => matches!(var_type, VarType::Edge(_) | VarType::AnyEdge),
            };
            if !ok {
                return Err(AnalyzerError::TypeMismatch {
                    expected: match kind {
                        TargetKind::Node => "a node target".to_string(),
                        TargetKind::Edge => "an edge target".to_string(),
                    },
                    actual: "the other entity kind".to_string(),
                    line: 0,
                    column: 0,
                });
            }
        }
        Ok(())
    }

    /// Resolve a target; `None` when only execution can know (ids,
    /// subqueries, endpoint patterns).
    fn analyze_target_lookup(
        &mut self,
        target: &Target,
        span: mew_parser::Span,
    ) -> AnalyzerResult<Option<VarType>> {
        match target {
            Target::Var(name) => {
                let var_type = self.scope.lookup(name).ok_or_else(|| {
                    let (line, column) = AnalyzerError::at(span);
                    AnalyzerError::UndefinedVariable {
                        name: name.clone(),
                        line,
                        column,
                    }
                })?;
                Ok(Some(var_type))
            }
            Target::Id(_) => Ok(None),
            Target::Pattern(inner) => {
                self.analyze_match(inner)?;
                Ok(None)
            }
            Target::EdgePattern { edge_type, .. } => {
                if self.registry.get_edge_type_by_name(edge_type).is_none() {
                    let (line, column) = AnalyzerError::at(span);
                    return Err(AnalyzerError::UnknownEdgeType {
                        name: edge_type.clone(),
                        line,
                        column,
                    });
                }
                Ok(None)
            }
        }
    }

    // ==================== Expressions ====================

    fn expect_boolean(&mut self, expr: &Expr, allow_aggregates: bool) -> AnalyzerResult<()> {
        let ty = self.infer(expr, allow_aggregates)?;
        if !ty.compatible(Ty::Bool) {
            let (line, column) = AnalyzerError::at(expr.span());
            return Err(AnalyzerError::TypeMismatch {
                expected: "Bool".to_string(),
                actual: ty.name().to_string(),
                line,
                column,
            });
        }
        Ok(())
    }

    fn infer(&mut self, expr: &Expr, allow_aggregates: bool) -> AnalyzerResult<Ty> {
        match expr {
            Expr::Literal(lit) => Ok(match lit.kind {
                mew_parser::LiteralKind::Null => Ty::Null,
                mew_parser::LiteralKind::Bool(_) => Ty::Bool,
                mew_parser::LiteralKind::Int(_) => Ty::Int,
                mew_parser::LiteralKind::Float(_) => Ty::Float,
                mew_parser::LiteralKind::String(_) => Ty::String,
                mew_parser::LiteralKind::Duration(_) => Ty::Duration,
                mew_parser::LiteralKind::Timestamp(_) => Ty::Timestamp,
            }),
            Expr::Var(name, span) => {
                self.scope.lookup(name).ok_or_else(|| {
                    let (line, column) = AnalyzerError::at(*span);
                    AnalyzerError::UndefinedVariable {
                        name: name.clone(),
                        line,
                        column,
                    }
                })?;
                Ok(Ty::Entity)
            }
            Expr::IdRef(_, _) => Ok(Ty::Entity),
            Expr::Param(_, _) => Ok(Ty::Any),
            Expr::AttrAccess(base, attr, span) => {
                // `var.attr` against a typed node variable checks the
                // attribute's existence and yields its declared type.
                if let Expr::Var(name, _) = base.as_ref() {
                    match self.scope.lookup(name) {
                        Some(VarType::Node(type_id)) => {
                            let attr_def =
                                self.registry.get_type_attr(type_id, attr).ok_or_else(|| {
                                    let (line, column) = AnalyzerError::at(*span);
                                    AnalyzerError::UnknownAttribute {
                                        owner: self
                                            .registry
                                            .get_type(type_id)
                                            .map(|t| t.name.clone())
                                            .unwrap_or_default(),
                                        attr: attr.clone(),
                                        line,
                                        column,
                                    }
                                })?;
                            return Ok(Ty::from_declared(&attr_def.type_name));
                        }
                        Some(_) => return Ok(Ty::Any),
                        None => {
                            let (line, column) = AnalyzerError::at(*span);
                            return Err(AnalyzerError::UndefinedVariable {
                                name: name.clone(),
                                line,
                                column,
                            });
                        }
                    }
                }
                self.infer(base, allow_aggregates)?;
                Ok(Ty::Any)
            }
            Expr::BinaryOp(op, left, right, span) => {
                let lt = self.infer(left, allow_aggregates)?;
                let rt = self.infer(right, allow_aggregates)?;
                self.infer_binary(*op, lt, rt, *span)
            }
            Expr::UnaryOp(op, operand, span) => {
                let ty = self.infer(operand, allow_aggregates)?;
                match op {
                    UnaryOp::Neg if ty.numeric() => Ok(ty),
                    UnaryOp::Not if ty.compatible(Ty::Bool) => Ok(Ty::Bool),
                    _ => {
                        let (line, column) = AnalyzerError::at(*span);
                        Err(AnalyzerError::InvalidOperator {
                            op: match op {
                                UnaryOp::Neg => "-".to_string(),
                                UnaryOp::Not => "NOT".to_string(),
                            },
                            left: ty.name().to_string(),
                            right: String::new(),
                            line,
                            column,
                        })
                    }
                }
            }
            Expr::FnCall(fc) => self.infer_call(fc, allow_aggregates),
            Expr::Exists(elements, where_clause, _)
            | Expr::NotExists(elements, where_clause, _) => {
                self.scope.push();
                self.analyze_pattern(elements)?;
                if let Some(inner) = where_clause {
                    self.expect_boolean(inner, false)?;
                }
                self.scope.pop();
                Ok(Ty::Bool)
            }
            Expr::List(items, _) => {
                for item in items {
                    self.infer(item, allow_aggregates)?;
                }
                Ok(Ty::List)
            }
        }
    }

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        left: Ty,
        right: Ty,
        span: mew_parser::Span,
    ) -> AnalyzerResult<Ty> {
        let fail = || {
            let (line, column) = AnalyzerError::at(span);
            Err(AnalyzerError::InvalidOperator {
                op: op.to_string(),
                left: left.name().to_string(),
                right: right.name().to_string(),
                line,
                column,
            })
        };

        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                // Arithmetic, plus timestamp/duration combinations.
                let temporal = matches!(left, Ty::Timestamp | Ty::Duration)
                    || matches!(right, Ty::Timestamp | Ty::Duration);
                if (left.numeric() && right.numeric()) || temporal {
                    Ok(if left == Ty::Float || right == Ty::Float {
                        Ty::Float
                    } else if temporal {
                        Ty::Any
                    } else {
                        Ty::Int
                    })
                } else {
                    fail()
                }
            }
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if left.numeric() && right.numeric() {
                    Ok(if left == Ty::Float || right == Ty::Float {
                        Ty::Float
                    } else {
                        Ty::Int
                    })
                } else {
                    fail()
                }
            }
            BinaryOp::Eq | BinaryOp::NotEq => Ok(Ty::Bool),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                if left.compatible(right) {
                    Ok(Ty::Bool)
                } else {
                    fail()
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if left.compatible(Ty::Bool) && right.compatible(Ty::Bool) {
                    Ok(Ty::Bool)
                } else {
                    fail()
                }
            }
            BinaryOp::Concat => {
                if left.compatible(Ty::String) && right.compatible(Ty::String) {
                    Ok(Ty::String)
                } else {
                    fail()
                }
            }
            BinaryOp::NullCoalesce => Ok(if left == Ty::Null { right } else { left }),
        }
    }

    fn infer_call(&mut self, fc: &mew_parser::FnCall, allow_aggregates: bool) -> AnalyzerResult<Ty> {
        let name = fc.name.to_lowercase();
        let aggregate = matches!(name.as_str(), "count" | "sum" | "avg" | "collect")
            || (matches!(name.as_str(), "min" | "max") && fc.args.len() <= 1);

        if aggregate {
            if !allow_aggregates {
                let (line, column) = AnalyzerError::at(fc.span);
                return Err(AnalyzerError::AggregateMisuse {
                    name: fc.name.clone(),
                    line,
                    column,
                });
            }
            // Aggregate arguments are ordinary scalar expressions.
            for arg in &fc.args {
                self.infer(arg, false)?;
            }
            return Ok(match name.as_str() {
                "count" => Ty::Int,
                "avg" => Ty::Float,
                "collect" => Ty::List,
                _ => Ty::Any,
            });
        }

        for arg in &fc.args {
            self.infer(arg, false)?;
        }

        match name.as_str() {
            "now" | "wall_time" => Ok(Ty::Timestamp),
            "coalesce" => Ok(Ty::Any),
            "is_null" | "is_not_null" | "starts_with" | "ends_with" | "contains" | "in" => {
                Ok(Ty::Bool)
            }
            "length" | "len" | "year" | "month" | "day" | "hour" | "minute" | "second" => {
                Ok(Ty::Int)
            }
            "upper" | "lower" | "trim" | "replace" | "substring" | "substr" => Ok(Ty::String),
            "abs" | "floor" | "ceil" | "ceiling" | "round" | "min" | "max" => Ok(Ty::Any),
            "_instance_of" => Ok(Ty::Bool),
            _ => {
                let (line, column) = AnalyzerError::at(fc.span);
                Err(AnalyzerError::UnknownFunction {
                    name: fc.name.clone(),
                    line,
                    column,
                })
            }
        }
    }
}

enum TargetKind {
    Node,
    Edge,
}
