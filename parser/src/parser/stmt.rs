//! Statement parsing.

use super::Parser;
use crate::ast::*;
use crate::error::ParseResult;
use crate::lexer::TokenKind;

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        if self.at_kw("MATCH") {
            return self.parse_match_family();
        }
        if self.at_kw("SPAWN") {
            return Ok(Stmt::Spawn(self.parse_spawn()?));
        }
        if self.at_kw("KILL") {
            return Ok(Stmt::Kill(self.parse_kill()?));
        }
        if self.at_kw("LINK") {
            return Ok(Stmt::Link(self.parse_link()?));
        }
        if self.at_kw("UNLINK") {
            return Ok(Stmt::Unlink(self.parse_unlink()?));
        }
        if self.at_kw("SET") {
            return Ok(Stmt::Set(self.parse_set()?));
        }
        if self.at_kw("WALK") {
            return Ok(Stmt::Walk(self.parse_walk()?));
        }
        if self.at_kw("INSPECT") {
            return self.parse_inspect();
        }
        if self.at_kw("BEGIN") {
            return self.parse_begin();
        }
        if self.at_kw("COMMIT") {
            self.advance();
            return Ok(Stmt::Txn(TxnStmt::Commit));
        }
        if self.at_kw("ROLLBACK") {
            self.advance();
            if self.eat_kw("TO") {
                let (name, _) = self.expect_ident()?;
                return Ok(Stmt::Txn(TxnStmt::RollbackTo(name)));
            }
            return Ok(Stmt::Txn(TxnStmt::Rollback));
        }
        if self.at_kw("SAVEPOINT") {
            self.advance();
            let (name, _) = self.expect_ident()?;
            return Ok(Stmt::Txn(TxnStmt::Savepoint(name)));
        }
        if self.at_kw("SHOW") {
            return self.parse_show();
        }
        if self.at_kw("CREATE") {
            return self.parse_index_stmt(true);
        }
        if self.at_kw("DROP") {
            return self.parse_index_stmt(false);
        }
        if self.at_kw("LOAD") {
            return self.parse_ontology_stmt(false);
        }
        if self.at_kw("EXTEND") {
            return self.parse_ontology_stmt(true);
        }
        if self.at_kw("EXPLAIN") {
            let span = self.span();
            self.advance();
            let inner = self.parse_statement()?;
            return Ok(Stmt::Explain(ExplainStmt {
                statement: Box::new(inner),
                span,
            }));
        }
        if self.at_kw("PROFILE") {
            let span = self.span();
            self.advance();
            let inner = self.parse_statement()?;
            return Ok(Stmt::Profile(ProfileStmt {
                statement: Box::new(inner),
                span,
            }));
        }
        if self.at_kw("DRY") {
            let span = self.span();
            self.advance();
            self.expect_kw("RUN")?;
            let inner = self.parse_statement()?;
            return Ok(Stmt::DryRun(DryRunStmt {
                statement: Box::new(inner),
                span,
            }));
        }
        for (kw, kind) in [
            ("SNAPSHOT", VersioningKind::Snapshot),
            ("CHECKOUT", VersioningKind::Checkout),
            ("DIFF", VersioningKind::Diff),
            ("BRANCH", VersioningKind::Branch),
            ("MERGE", VersioningKind::Merge),
        ] {
            if self.at_kw(kw) {
                let span = self.span();
                self.advance();
                let name = match self.peek_kind() {
                    TokenKind::Ident(_) => Some(self.expect_ident()?.0),
                    _ => None,
                };
                return Ok(Stmt::Versioning(VersioningStmt { kind, name, span }));
            }
        }

        Err(self.unexpected("statement"))
    }

    // ==================== MATCH ====================

    /// MATCH, MATCH..mutations and MATCH..WALK share a prefix.
    fn parse_match_family(&mut self) -> ParseResult<Stmt> {
        let span = self.span();
        self.expect_kw("MATCH")?;

        let pattern = self.parse_pattern_elems()?;
        let where_clause = if self.eat_kw("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        if self.at_kw("WALK") {
            let walk = self.parse_walk()?;
            return Ok(Stmt::MatchWalk(MatchWalkStmt {
                pattern,
                where_clause,
                walk,
                span,
            }));
        }

        if self.at_mutation_kw() {
            let mut mutations = Vec::new();
            while self.at_mutation_kw() {
                mutations.push(self.parse_mutation_action()?);
            }
            return Ok(Stmt::MatchMutate(MatchMutateStmt {
                pattern,
                where_clause,
                mutations,
                span,
            }));
        }

        let return_clause = self.parse_return_clause()?;
        let order_by = self.parse_order_by()?;

        let mut limit = None;
        let mut offset = None;
        let mut timeout_ms = None;
        loop {
            if self.eat_kw("LIMIT") {
                limit = Some(self.expect_int()?);
            } else if self.eat_kw("OFFSET") {
                offset = Some(self.expect_int()?);
            } else if self.eat_kw("TIMEOUT") {
                timeout_ms = Some(match self.peek_kind().clone() {
                    TokenKind::Duration(ms) => {
                        self.advance();
                        ms
                    }
                    _ => self.expect_int()?,
                });
            } else {
                break;
            }
        }

        Ok(Stmt::Match(MatchStmt {
            pattern,
            where_clause,
            return_clause,
            order_by,
            limit,
            offset,
            timeout_ms,
            span,
        }))
    }

    fn at_mutation_kw(&self) -> bool {
        self.at_kw("LINK")
            || self.at_kw("SET")
            || self.at_kw("KILL")
            || self.at_kw("UNLINK")
            || self.at_kw("SPAWN")
    }

    pub(crate) fn parse_mutation_action(&mut self) -> ParseResult<MutationAction> {
        if self.at_kw("SPAWN") {
            Ok(MutationAction::Spawn(self.parse_spawn()?))
        } else if self.at_kw("LINK") {
            Ok(MutationAction::Link(self.parse_link()?))
        } else if self.at_kw("SET") {
            Ok(MutationAction::Set(self.parse_set()?))
        } else if self.at_kw("KILL") {
            Ok(MutationAction::Kill(self.parse_kill()?))
        } else if self.at_kw("UNLINK") {
            Ok(MutationAction::Unlink(self.parse_unlink()?))
        } else {
            Err(self.unexpected("mutation"))
        }
    }

    /// Pattern elements: comma-separated node (`v: Type`) and edge
    /// (`[!]type[+|*][{m,n}](targets) [AS alias]`) patterns.
    pub(crate) fn parse_pattern_elems(&mut self) -> ParseResult<Vec<PatternElem>> {
        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_pattern_elem()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(elements)
    }

    fn parse_pattern_elem(&mut self) -> ParseResult<PatternElem> {
        let span = self.span();

        let negated = self.eat(&TokenKind::Bang);
        let (name, _) = self.expect_ident()?;

        // Node pattern: `var : Type`
        if !negated && self.eat(&TokenKind::Colon) {
            let (type_name, _) = self.expect_ident()?;
            return Ok(PatternElem::Node(NodePattern {
                var: name,
                type_name,
                span,
            }));
        }

        // Edge pattern, optionally transitive.
        let transitive = self.parse_transitive_mod()?;

        self.expect(&TokenKind::LParen)?;
        let mut targets = Vec::new();
        loop {
            let (target, _) = self.expect_ident()?;
            targets.push(target);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let alias = if self.eat_kw("AS") {
            Some(self.expect_ident()?.0)
        } else {
            None
        };

        Ok(PatternElem::Edge(EdgePattern {
            edge_type: name,
            targets,
            alias,
            transitive,
            negated,
            span,
        }))
    }

    fn parse_transitive_mod(&mut self) -> ParseResult<Option<TransitiveMod>> {
        let kind = if self.eat(&TokenKind::Plus) {
            TransitiveKind::Plus
        } else if self.peek_kind() == &TokenKind::Star && self.peek_at(1) == &TokenKind::LParen
            || self.peek_kind() == &TokenKind::Star && self.peek_at(1) == &TokenKind::LBrace
        {
            self.advance();
            TransitiveKind::Star
        } else {
            return Ok(None);
        };

        let mut min_depth = None;
        let mut max_depth = None;
        if self.eat(&TokenKind::LBrace) {
            min_depth = Some(self.expect_int()?);
            if self.eat(&TokenKind::Comma) {
                max_depth = Some(self.expect_int()?);
            }
            self.expect(&TokenKind::RBrace)?;
        }

        Ok(Some(TransitiveMod {
            kind,
            min_depth,
            max_depth,
        }))
    }

    fn parse_return_clause(&mut self) -> ParseResult<ReturnClause> {
        let span = self.span();
        self.expect_kw("RETURN")?;
        let distinct = self.eat_kw("DISTINCT");

        let mut projections = Vec::new();
        loop {
            let proj_span = self.span();
            let expr = self.parse_expr()?;
            let alias = if self.eat_kw("AS") {
                Some(self.expect_ident()?.0)
            } else {
                None
            };
            projections.push(Projection {
                expr,
                alias,
                span: proj_span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(ReturnClause {
            distinct,
            projections,
            span,
        })
    }

    fn parse_order_by(&mut self) -> ParseResult<Option<Vec<OrderTerm>>> {
        if !self.eat_kw("ORDER") {
            return Ok(None);
        }
        self.expect_kw("BY")?;

        let mut terms = Vec::new();
        loop {
            let span = self.span();
            let expr = self.parse_expr()?;
            let direction = if self.eat_kw("DESC") {
                OrderDirection::Desc
            } else {
                self.eat_kw("ASC");
                OrderDirection::Asc
            };
            terms.push(OrderTerm {
                expr,
                direction,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Some(terms))
    }

    // ==================== SPAWN ====================

    pub(crate) fn parse_spawn(&mut self) -> ParseResult<SpawnStmt> {
        let span = self.span();
        self.expect_kw("SPAWN")?;

        let mut items = vec![self.parse_spawn_item()?];
        while self.peek_kind() == &TokenKind::Comma {
            // A chained item: `, [SPAWN] var: Type {..}`
            self.advance();
            self.eat_kw("SPAWN");
            items.push(self.parse_spawn_item()?);
        }

        let returning = self.parse_returning()?;
        Ok(SpawnStmt {
            items,
            returning,
            span,
        })
    }

    pub(crate) fn parse_spawn_item(&mut self) -> ParseResult<SpawnItem> {
        let span = self.span();
        let (var, _) = self.expect_ident()?;
        self.expect(&TokenKind::Colon)?;
        let (type_name, _) = self.expect_ident()?;
        let attrs = self.parse_attr_block()?;
        Ok(SpawnItem {
            var,
            type_name,
            attrs,
            span,
        })
    }

    /// `{ name = expr, ... }` — the block is optional.
    fn parse_attr_block(&mut self) -> ParseResult<Vec<AttrAssignment>> {
        let mut attrs = Vec::new();
        if !self.eat(&TokenKind::LBrace) {
            return Ok(attrs);
        }
        if self.peek_kind() != &TokenKind::RBrace {
            loop {
                let span = self.span();
                let (name, _) = self.expect_ident()?;
                self.expect(&TokenKind::Eq)?;
                let value = self.parse_expr()?;
                attrs.push(AttrAssignment { name, value, span });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(attrs)
    }

    fn parse_returning(&mut self) -> ParseResult<Option<ReturningClause>> {
        if !self.eat_kw("RETURNING") {
            return Ok(None);
        }
        if self.eat(&TokenKind::Star) {
            return Ok(Some(ReturningClause::All));
        }
        if self.at_kw("id") && !matches!(self.peek_at(1), TokenKind::Comma) {
            self.advance();
            return Ok(Some(ReturningClause::Id));
        }
        let mut fields = Vec::new();
        loop {
            fields.push(self.expect_ident()?.0);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Some(ReturningClause::Fields(fields)))
    }

    // ==================== KILL ====================

    pub(crate) fn parse_kill(&mut self) -> ParseResult<KillStmt> {
        let span = self.span();
        self.expect_kw("KILL")?;

        let target = self.parse_target()?;
        let override_ = if self.eat_kw("CASCADE") {
            Some(KillOverride::Cascade)
        } else if self.eat_kw("RESTRICT") {
            Some(KillOverride::Restrict)
        } else {
            None
        };
        let returning = self.parse_returning()?;

        Ok(KillStmt {
            target,
            override_,
            returning,
            span,
        })
    }

    /// A mutation target: `#id`, a variable, a parenthesized MATCH
    /// subquery, or an endpoint edge pattern `type(a, b)`.
    fn parse_target(&mut self) -> ParseResult<Target> {
        match self.peek_kind().clone() {
            TokenKind::IdRef(id) => {
                self.advance();
                Ok(Target::Id(id))
            }
            TokenKind::LParen => {
                self.advance();
                let stmt = self.parse_match_family()?;
                self.expect(&TokenKind::RParen)?;
                match stmt {
                    Stmt::Match(m) => Ok(Target::Pattern(Box::new(m))),
                    _ => Err(self.unexpected("MATCH subquery")),
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.peek_kind() == &TokenKind::LParen {
                    self.advance();
                    let mut targets = Vec::new();
                    loop {
                        match self.peek_kind().clone() {
                            TokenKind::IdRef(id) => {
                                self.advance();
                                targets.push(format!("#{}", id));
                            }
                            _ => targets.push(self.expect_ident()?.0),
                        }
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    Ok(Target::EdgePattern {
                        edge_type: name,
                        targets,
                    })
                } else {
                    Ok(Target::Var(name))
                }
            }
            _ => Err(self.unexpected("target")),
        }
    }

    // ==================== LINK ====================

    pub(crate) fn parse_link(&mut self) -> ParseResult<LinkStmt> {
        let span = self.span();
        self.expect_kw("LINK")?;

        let (edge_type, _) = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;

        let mut targets = Vec::new();
        loop {
            targets.push(self.parse_link_target()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let var = if self.eat_kw("AS") {
            Some(self.expect_ident()?.0)
        } else {
            None
        };

        let attrs = self.parse_attr_block()?;

        let if_not_exists = if self.at_kw("IF") {
            self.advance();
            self.expect_kw("NOT")?;
            self.expect_kw("EXISTS")?;
            true
        } else {
            false
        };

        let returning = self.parse_returning()?;

        Ok(LinkStmt {
            var,
            edge_type,
            targets,
            attrs,
            if_not_exists,
            returning,
            span,
        })
    }

    fn parse_link_target(&mut self) -> ParseResult<TargetRef> {
        match self.peek_kind().clone() {
            TokenKind::IdRef(id) => {
                self.advance();
                Ok(TargetRef::Id(id))
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("SPAWN") => {
                self.advance();
                Ok(TargetRef::InlineSpawn(self.parse_spawn_item()?))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(TargetRef::Var(name))
            }
            _ => Err(self.unexpected("link target")),
        }
    }

    // ==================== UNLINK ====================

    pub(crate) fn parse_unlink(&mut self) -> ParseResult<UnlinkStmt> {
        let span = self.span();
        self.expect_kw("UNLINK")?;
        let target = self.parse_target()?;
        let returning = self.parse_returning()?;
        Ok(UnlinkStmt {
            target,
            returning,
            span,
        })
    }

    // ==================== SET ====================

    pub(crate) fn parse_set(&mut self) -> ParseResult<SetStmt> {
        let span = self.span();
        self.expect_kw("SET")?;

        let target = match self.peek_kind().clone() {
            TokenKind::IdRef(id) => {
                self.advance();
                Target::Id(id)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Target::Var(name)
            }
            _ => return Err(self.unexpected("SET target")),
        };

        let mut assignments = Vec::new();

        if self.peek_kind() == &TokenKind::LBrace {
            // Attr-block form: SET t { a = 1, b = 2 }
            assignments = self.parse_attr_block()?;
        } else {
            // Dotted form: SET t.a = 1, t.b = 2
            loop {
                self.expect(&TokenKind::Dot)?;
                let assign_span = self.span();
                let (name, _) = self.expect_ident()?;
                self.expect(&TokenKind::Eq)?;
                let value = self.parse_expr()?;
                assignments.push(AttrAssignment {
                    name,
                    value,
                    span: assign_span,
                });

                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                // Subsequent assignments repeat the target variable.
                let (repeat, _) = self.expect_ident()?;
                match &target {
                    Target::Var(v) if *v == repeat => {}
                    Target::Id(id) if *id == repeat => {}
                    _ => return Err(self.unexpected("same SET target")),
                }
            }
        }

        let returning = self.parse_returning()?;
        Ok(SetStmt {
            target,
            assignments,
            returning,
            span,
        })
    }

    // ==================== WALK ====================

    pub(crate) fn parse_walk(&mut self) -> ParseResult<WalkStmt> {
        let span = self.span();
        self.expect_kw("WALK")?;
        self.expect_kw("FROM")?;
        let from = self.parse_expr()?;

        let mut follow = Vec::new();
        while self.at_kw("FOLLOW") {
            follow.push(self.parse_follow_clause()?);
        }

        let until = if self.eat_kw("UNTIL") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        self.expect_kw("RETURN")?;
        let return_type = self.parse_walk_return()?;

        Ok(WalkStmt {
            from,
            follow,
            until,
            return_type,
            span,
        })
    }

    fn parse_follow_clause(&mut self) -> ParseResult<FollowClause> {
        let span = self.span();
        self.expect_kw("FOLLOW")?;

        let mut edge_types = Vec::new();
        if self.eat(&TokenKind::Star) {
            edge_types.push("*".to_string());
        } else {
            loop {
                edge_types.push(self.expect_ident()?.0);
                if !self.eat(&TokenKind::Pipe) {
                    break;
                }
            }
        }

        let direction = if self.eat_kw("INBOUND") {
            WalkDirection::Inbound
        } else if self.eat_kw("ANY") {
            WalkDirection::Any
        } else {
            self.eat_kw("OUTBOUND");
            WalkDirection::Outbound
        };

        let mut min_depth = None;
        let mut max_depth = None;
        if self.eat_kw("DEPTH") {
            let first = self.expect_int()?;
            if self.eat(&TokenKind::DotDot) {
                min_depth = Some(first);
                if self.eat(&TokenKind::Star) {
                    max_depth = None;
                } else {
                    max_depth = Some(self.expect_int()?);
                }
            } else {
                // Single bound: maximum depth.
                min_depth = Some(1);
                max_depth = Some(first);
            }
        }

        Ok(FollowClause {
            edge_types,
            direction,
            min_depth,
            max_depth,
            span,
        })
    }

    fn parse_walk_return(&mut self) -> ParseResult<WalkReturnType> {
        let alias = |parser: &mut Parser| -> ParseResult<Option<String>> {
            if parser.eat_kw("AS") {
                Ok(Some(parser.expect_ident()?.0))
            } else {
                Ok(None)
            }
        };

        if self.eat_kw("PATH") {
            return Ok(WalkReturnType::Path { alias: alias(self)? });
        }
        if self.eat_kw("NODES") {
            return Ok(WalkReturnType::Nodes { alias: alias(self)? });
        }
        if self.eat_kw("EDGES") {
            return Ok(WalkReturnType::Edges { alias: alias(self)? });
        }
        if self.eat_kw("TERMINAL") {
            return Ok(WalkReturnType::Terminal { alias: alias(self)? });
        }
        Err(self.unexpected("PATH, NODES, EDGES or TERMINAL"))
    }

    // ==================== INSPECT / BEGIN / SHOW / INDEX / ONTOLOGY ====================

    fn parse_inspect(&mut self) -> ParseResult<Stmt> {
        let span = self.span();
        self.expect_kw("INSPECT")?;
        match self.peek_kind().clone() {
            TokenKind::IdRef(id) => {
                self.advance();
                Ok(Stmt::Inspect(InspectStmt { id, span }))
            }
            _ => Err(self.unexpected("#id")),
        }
    }

    fn parse_begin(&mut self) -> ParseResult<Stmt> {
        self.expect_kw("BEGIN")?;
        let isolation = if self.at_kw("SERIALIZABLE") {
            self.advance();
            Some(IsolationLevel::Serializable)
        } else if self.at_kw("READ") {
            self.advance();
            self.expect_kw("COMMITTED")?;
            Some(IsolationLevel::ReadCommitted)
        } else {
            None
        };
        Ok(Stmt::Txn(TxnStmt::Begin { isolation }))
    }

    fn parse_show(&mut self) -> ParseResult<Stmt> {
        let span = self.span();
        self.expect_kw("SHOW")?;
        let kind = if self.eat_kw("TYPES") {
            ShowKind::Types
        } else if self.eat_kw("EDGES") {
            ShowKind::Edges
        } else if self.eat_kw("CONSTRAINTS") {
            ShowKind::Constraints
        } else if self.eat_kw("RULES") {
            ShowKind::Rules
        } else if self.eat_kw("INDEXES") {
            ShowKind::Indexes
        } else if self.eat_kw("STATISTICS") {
            ShowKind::Statistics
        } else if self.eat_kw("STATUS") {
            ShowKind::Status
        } else {
            return Err(self.unexpected("SHOW subject"));
        };
        Ok(Stmt::Show(ShowStmt { kind, span }))
    }

    fn parse_index_stmt(&mut self, create: bool) -> ParseResult<Stmt> {
        let span = self.span();
        self.advance(); // CREATE or DROP
        self.expect_kw("INDEX")?;
        self.expect_kw("ON")?;
        let (type_name, _) = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;
        let (attr, _) = self.expect_ident()?;
        self.expect(&TokenKind::RParen)?;

        let stmt = IndexStmt {
            type_name,
            attr,
            span,
        };
        Ok(if create {
            Stmt::CreateIndex(stmt)
        } else {
            Stmt::DropIndex(stmt)
        })
    }

    fn parse_ontology_stmt(&mut self, extend: bool) -> ParseResult<Stmt> {
        let span = self.span();
        self.advance(); // LOAD or EXTEND
        self.expect_kw("ONTOLOGY")?;
        self.expect(&TokenKind::LBrace)?;
        let items = self.parse_ontology_items(true)?;
        self.expect(&TokenKind::RBrace)?;
        Ok(Stmt::Ontology(OntologyStmt {
            extend,
            items,
            span,
        }))
    }
}
