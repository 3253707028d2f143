//! Ontology declaration parsing.
//!
//! Declarations: `node`, `abstract node`, `edge`, `constraint`, `rule`.
//! Rules come in two spellings: the explicit pattern form
//! `rule R [mods]: t: Task WHERE ... => SET ...` and the shorthand
//! `rule R on Task [mods]: SET t.x = ...` which binds the matched node
//! to `t`.

use super::Parser;
use crate::ast::*;
use crate::error::ParseResult;
use crate::lexer::TokenKind;

impl Parser {
    /// Parse declarations until EOF, or until `}` when `in_block` is set.
    pub(crate) fn parse_ontology_items(&mut self, in_block: bool) -> ParseResult<Vec<OntologyItem>> {
        let mut items = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if self.at_eof() || (in_block && self.peek_kind() == &TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_ontology_item()?);
        }
        Ok(items)
    }

    fn parse_ontology_item(&mut self) -> ParseResult<OntologyItem> {
        if self.at_kw("abstract") {
            self.advance();
            self.expect_kw("node")?;
            return Ok(OntologyItem::Node(self.parse_node_decl(true)?));
        }
        if self.eat_kw("node") {
            return Ok(OntologyItem::Node(self.parse_node_decl(false)?));
        }
        if self.eat_kw("edge") {
            return Ok(OntologyItem::Edge(self.parse_edge_decl()?));
        }
        if self.eat_kw("constraint") {
            return Ok(OntologyItem::Constraint(self.parse_constraint_decl()?));
        }
        if self.eat_kw("rule") {
            return Ok(OntologyItem::Rule(self.parse_rule_decl()?));
        }
        Err(self.unexpected("ontology declaration"))
    }

    // ==================== node ====================

    fn parse_node_decl(&mut self, is_abstract: bool) -> ParseResult<NodeTypeDecl> {
        let span = self.span();
        let (name, _) = self.expect_ident()?;

        let mut parents = Vec::new();
        if self.eat(&TokenKind::Colon) {
            loop {
                parents.push(self.expect_ident()?.0);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let mut attrs = Vec::new();
        if self.eat(&TokenKind::LBrace) {
            while self.peek_kind() != &TokenKind::RBrace {
                attrs.push(self.parse_attr_decl()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
        }

        Ok(NodeTypeDecl {
            name,
            parents,
            is_abstract,
            attrs,
            span,
        })
    }

    fn parse_attr_decl(&mut self) -> ParseResult<AttrDecl> {
        let span = self.span();
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::Colon)?;
        let (type_name, _) = self.expect_ident()?;
        let nullable = self.eat(&TokenKind::Question);
        let modifiers = self.parse_attr_modifiers()?;

        Ok(AttrDecl {
            name,
            type_name,
            nullable,
            modifiers,
            span,
        })
    }

    fn parse_attr_modifiers(&mut self) -> ParseResult<Vec<AttrModifier>> {
        let mut modifiers = Vec::new();
        if !self.eat(&TokenKind::LBracket) {
            return Ok(modifiers);
        }
        while self.peek_kind() != &TokenKind::RBracket {
            modifiers.push(self.parse_attr_modifier()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(modifiers)
    }

    fn parse_attr_modifier(&mut self) -> ParseResult<AttrModifier> {
        // Comparison-shaped range modifiers: `>= expr`, `<= expr`, `> e`, `< e`.
        match self.peek_kind() {
            TokenKind::GtEq | TokenKind::Gt => {
                self.advance();
                let min = self.parse_expr()?;
                return Ok(AttrModifier::Range {
                    min: Some(min),
                    max: None,
                });
            }
            TokenKind::LtEq | TokenKind::Lt => {
                self.advance();
                let max = self.parse_expr()?;
                return Ok(AttrModifier::Range {
                    min: None,
                    max: Some(max),
                });
            }
            _ => {}
        }

        let (word, _) = self.expect_ident()?;
        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "required" => Ok(AttrModifier::Required),
            "unique" => Ok(AttrModifier::Unique),
            "indexed" => Ok(AttrModifier::Indexed),
            "default" => {
                self.expect(&TokenKind::Colon)?;
                Ok(AttrModifier::Default(self.parse_expr()?))
            }
            "in" => {
                self.expect(&TokenKind::Colon)?;
                self.expect(&TokenKind::LBracket)?;
                let mut values = Vec::new();
                while self.peek_kind() != &TokenKind::RBracket {
                    values.push(self.parse_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(AttrModifier::InValues(values))
            }
            "match" => {
                self.expect(&TokenKind::Colon)?;
                Ok(AttrModifier::Match(self.expect_string()?))
            }
            "length" => {
                self.expect(&TokenKind::Colon)?;
                let min = self.expect_int()?;
                self.expect(&TokenKind::DotDot)?;
                let max = self.expect_int()?;
                Ok(AttrModifier::Length { min, max })
            }
            "format" => {
                self.expect(&TokenKind::Colon)?;
                let value = match self.peek_kind().clone() {
                    TokenKind::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => self.expect_ident()?.0,
                };
                Ok(AttrModifier::Format(value))
            }
            _ => Err(self.unexpected("attribute modifier")),
        }
    }

    // ==================== edge ====================

    fn parse_edge_decl(&mut self) -> ParseResult<EdgeTypeDecl> {
        let span = self.span();
        let (name, _) = self.expect_ident()?;

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        loop {
            let (param_name, _) = self.expect_ident()?;
            self.expect(&TokenKind::Colon)?;
            let type_spec = self.parse_param_type_spec()?;
            params.push((param_name, type_spec));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let modifiers = self.parse_edge_modifiers()?;

        let mut attrs = Vec::new();
        if self.eat(&TokenKind::LBrace) {
            while self.peek_kind() != &TokenKind::RBrace {
                attrs.push(self.parse_attr_decl()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
        }

        Ok(EdgeTypeDecl {
            name,
            params,
            attrs,
            modifiers,
            span,
        })
    }

    /// `Type`, `any`, `edge<any>`, or `edge<some_edge>`.
    fn parse_param_type_spec(&mut self) -> ParseResult<String> {
        let (head, _) = self.expect_ident()?;
        if head == "edge" && self.eat(&TokenKind::Lt) {
            let (inner, _) = self.expect_ident()?;
            self.expect(&TokenKind::Gt)?;
            return Ok(format!("edge<{}>", inner));
        }
        Ok(head)
    }

    fn parse_edge_modifiers(&mut self) -> ParseResult<Vec<EdgeModifier>> {
        let mut modifiers = Vec::new();
        if !self.eat(&TokenKind::LBracket) {
            return Ok(modifiers);
        }
        while self.peek_kind() != &TokenKind::RBracket {
            modifiers.push(self.parse_edge_modifier()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(modifiers)
    }

    fn parse_edge_modifier(&mut self) -> ParseResult<EdgeModifier> {
        let (word, _) = self.expect_ident()?;
        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "acyclic" => Ok(EdgeModifier::Acyclic),
            "unique" => Ok(EdgeModifier::Unique),
            "no_self" => Ok(EdgeModifier::NoSelf),
            "symmetric" => Ok(EdgeModifier::Symmetric),
            "on_kill_source" => {
                self.expect(&TokenKind::Colon)?;
                Ok(EdgeModifier::OnKill {
                    position: OnKillPosition::Source,
                    action: self.parse_referential_action()?,
                })
            }
            "on_kill_target" => {
                self.expect(&TokenKind::Colon)?;
                Ok(EdgeModifier::OnKill {
                    position: OnKillPosition::Target,
                    action: self.parse_referential_action()?,
                })
            }
            "cardinality" => {
                let (param, _) = self.expect_ident()?;
                self.expect(&TokenKind::Colon)?;
                let min = self.expect_int()?;
                self.expect(&TokenKind::DotDot)?;
                let max = if self.eat(&TokenKind::Star) {
                    None
                } else {
                    Some(self.expect_int()?)
                };
                Ok(EdgeModifier::Cardinality { param, min, max })
            }
            _ => Err(self.unexpected("edge modifier")),
        }
    }

    fn parse_referential_action(&mut self) -> ParseResult<ReferentialAction> {
        let (word, _) = self.expect_ident()?;
        match word.to_ascii_lowercase().as_str() {
            "cascade" => Ok(ReferentialAction::Cascade),
            "unlink" => Ok(ReferentialAction::Unlink),
            "prevent" => Ok(ReferentialAction::Prevent),
            _ => Err(self.unexpected("cascade, unlink or prevent")),
        }
    }

    // ==================== constraint ====================

    fn parse_constraint_decl(&mut self) -> ParseResult<ConstraintDecl> {
        let span = self.span();
        let (name, _) = self.expect_ident()?;

        let mut soft = false;
        let mut deferred = false;
        let mut message = None;
        if self.eat(&TokenKind::LBracket) {
            while self.peek_kind() != &TokenKind::RBracket {
                let (word, _) = self.expect_ident()?;
                match word.to_ascii_lowercase().as_str() {
                    "soft" => soft = true,
                    "deferred" => deferred = true,
                    "message" => {
                        self.expect(&TokenKind::Colon)?;
                        message = Some(self.expect_string()?);
                    }
                    _ => return Err(self.unexpected("constraint modifier")),
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket)?;
        }

        self.expect(&TokenKind::Colon)?;
        let pattern_span = self.span();
        let elements = self.parse_pattern_elems()?;
        let where_clause = if self.eat_kw("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Arrow)?;
        let condition = self.parse_expr()?;

        Ok(ConstraintDecl {
            name,
            pattern: Pattern {
                elements,
                where_clause,
                span: pattern_span,
            },
            condition,
            soft,
            deferred,
            message,
            span,
        })
    }

    // ==================== rule ====================

    fn parse_rule_decl(&mut self) -> ParseResult<RuleDecl> {
        let span = self.span();
        let (name, _) = self.expect_ident()?;

        // Shorthand: `rule R on Task [...]: <actions>` binds `t`.
        let shorthand_type = if self.eat_kw("on") {
            Some(self.expect_ident()?.0)
        } else {
            None
        };

        let mut auto = true;
        let mut priority = None;
        if self.eat(&TokenKind::LBracket) {
            while self.peek_kind() != &TokenKind::RBracket {
                let (word, _) = self.expect_ident()?;
                match word.to_ascii_lowercase().as_str() {
                    "auto" => auto = true,
                    "manual" => auto = false,
                    "priority" => {
                        self.expect(&TokenKind::Colon)?;
                        let negative = self.eat(&TokenKind::Minus);
                        let value = self.expect_int()?;
                        priority = Some(if negative { -value } else { value });
                    }
                    _ => return Err(self.unexpected("rule modifier")),
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket)?;
        }

        self.expect(&TokenKind::Colon)?;

        let pattern_span = self.span();
        let pattern = match shorthand_type {
            Some(type_name) => Pattern {
                elements: vec![PatternElem::Node(NodePattern {
                    var: "t".to_string(),
                    type_name,
                    span: pattern_span,
                })],
                where_clause: None,
                span: pattern_span,
            },
            None => {
                let elements = self.parse_pattern_elems()?;
                let where_clause = if self.eat_kw("WHERE") {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Arrow)?;
                Pattern {
                    elements,
                    where_clause,
                    span: pattern_span,
                }
            }
        };

        let mut production = vec![self.parse_mutation_action()?];
        loop {
            let had_semi = self.eat(&TokenKind::Semicolon);
            if self.at_kw("SPAWN")
                || self.at_kw("LINK")
                || self.at_kw("SET")
                || self.at_kw("KILL")
                || self.at_kw("UNLINK")
            {
                production.push(self.parse_mutation_action()?);
            } else {
                if had_semi {
                    // Trailing semicolon ends the production.
                }
                break;
            }
        }

        Ok(RuleDecl {
            name,
            pattern,
            auto,
            priority,
            production,
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_ontology;
    use crate::ast::*;

    #[test]
    fn test_parse_node_with_modifiers() {
        let items = parse_ontology(
            "node Person { name: String [required], age: Int? [>= 0, <= 150] }",
        )
        .unwrap();
        match &items[0] {
            OntologyItem::Node(n) => {
                assert_eq!(n.name, "Person");
                assert!(!n.is_abstract);
                assert_eq!(n.attrs.len(), 2);
                assert!(matches!(n.attrs[0].modifiers[0], AttrModifier::Required));
                assert!(n.attrs[1].nullable);
                assert_eq!(n.attrs[1].modifiers.len(), 2);
            }
            other => panic!("expected node decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_abstract_node_with_parents() {
        let items = parse_ontology(
            "abstract node Entity { id_label: String? }\nnode Task : Entity { title: String [required] }",
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        match &items[1] {
            OntologyItem::Node(n) => assert_eq!(n.parents, vec!["Entity"]),
            other => panic!("expected node decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_edge_with_modifiers() {
        let items = parse_ontology(
            "edge depends_on(a: Task, b: Task) [acyclic, unique, on_kill_target: cascade, cardinality a: 0..5] { weight: Int? }",
        )
        .unwrap();
        match &items[0] {
            OntologyItem::Edge(e) => {
                assert_eq!(e.name, "depends_on");
                assert_eq!(e.params.len(), 2);
                assert!(e.modifiers.contains(&EdgeModifier::Acyclic));
                assert!(e.modifiers.contains(&EdgeModifier::Unique));
                assert!(e.modifiers.contains(&EdgeModifier::OnKill {
                    position: OnKillPosition::Target,
                    action: ReferentialAction::Cascade,
                }));
                assert!(e.modifiers.contains(&EdgeModifier::Cardinality {
                    param: "a".to_string(),
                    min: 0,
                    max: Some(5),
                }));
                assert_eq!(e.attrs.len(), 1);
            }
            other => panic!("expected edge decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_higher_order_edge_param() {
        let items = parse_ontology("edge annotates(note: Note, about: edge<any>)").unwrap();
        match &items[0] {
            OntologyItem::Edge(e) => assert_eq!(e.params[1].1, "edge<any>"),
            other => panic!("expected edge decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_constraint() {
        let items = parse_ontology(
            "constraint positive_priority [message: \"priority must be positive\"]: t: Task => t.priority >= 0",
        )
        .unwrap();
        match &items[0] {
            OntologyItem::Constraint(c) => {
                assert_eq!(c.name, "positive_priority");
                assert!(!c.soft);
                assert_eq!(c.message.as_deref(), Some("priority must be positive"));
                assert_eq!(c.pattern.elements.len(), 1);
            }
            other => panic!("expected constraint decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rule_shorthand() {
        let items =
            parse_ontology("rule auto_ts on Task [auto, priority: 100]: SET t.created_at = now()")
                .unwrap();
        match &items[0] {
            OntologyItem::Rule(r) => {
                assert_eq!(r.name, "auto_ts");
                assert!(r.auto);
                assert_eq!(r.priority, Some(100));
                assert_eq!(r.pattern.elements.len(), 1);
                assert_eq!(r.production.len(), 1);
                assert!(matches!(r.production[0], MutationAction::Set(_)));
            }
            other => panic!("expected rule decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rule_pattern_form() {
        let items = parse_ontology(
            "rule inc_until_ten: t: Counter WHERE t.v < 10 => SET t.v = t.v + 1",
        )
        .unwrap();
        match &items[0] {
            OntologyItem::Rule(r) => {
                assert!(r.pattern.where_clause.is_some());
                assert!(matches!(r.production[0], MutationAction::Set(_)));
            }
            other => panic!("expected rule decl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rule_multi_action_production() {
        let items = parse_ontology(
            "rule audit on Task [priority: 10]: SPAWN log: AuditEntry { note = \"created\" }; LINK about(log, t)",
        )
        .unwrap();
        match &items[0] {
            OntologyItem::Rule(r) => assert_eq!(r.production.len(), 2),
            other => panic!("expected rule decl, got {:?}", other),
        }
    }
}
