//! Expression parsing.
//!
//! Precedence ladder, loosest first: `or < and < eq < cmp < add < mul <
//! unary < postfix`. Concatenation (`++`) and null-coalescing (`??`) sit at
//! the additive level.

use super::Parser;
use crate::ast::*;
use crate::error::ParseResult;
use crate::lexer::TokenKind;

impl Parser {
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.at_kw("OR") {
            let span = self.span();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinaryOp(BinaryOp::Or, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_eq()?;
        while self.at_kw("AND") {
            let span = self.span();
            self.advance();
            let right = self.parse_eq()?;
            left = Expr::BinaryOp(BinaryOp::And, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_eq(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_cmp()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_cmp()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_add()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::PlusPlus => BinaryOp::Concat,
                TokenKind::QuestionQuestion => BinaryOp::NullCoalesce,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_mul()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp(UnaryOp::Neg, Box::new(operand), span));
        }
        if self.eat(&TokenKind::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp(UnaryOp::Not, Box::new(operand), span));
        }
        // `NOT EXISTS (...)` is handled in parse_primary; bare NOT here.
        if self.at_kw("NOT") && !self.at_kw_offset(1, "EXISTS") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp(UnaryOp::Not, Box::new(operand), span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.peek_kind() == &TokenKind::Dot {
            let span = self.span();
            self.advance();
            let (attr, _) = self.expect_ident()?;
            expr = Expr::AttrAccess(Box::new(expr), attr, span);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        match self.peek_kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Literal(Literal {
                    kind: LiteralKind::Int(v),
                    span,
                }))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Literal(Literal {
                    kind: LiteralKind::Float(v),
                    span,
                }))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal {
                    kind: LiteralKind::String(s),
                    span,
                }))
            }
            TokenKind::Duration(ms) => {
                self.advance();
                Ok(Expr::Literal(Literal {
                    kind: LiteralKind::Duration(ms),
                    span,
                }))
            }
            TokenKind::Timestamp(ms) => {
                self.advance();
                Ok(Expr::Literal(Literal {
                    kind: LiteralKind::Timestamp(ms),
                    span,
                }))
            }
            TokenKind::IdRef(id) => {
                self.advance();
                Ok(Expr::IdRef(id, span))
            }
            TokenKind::Param(name) => {
                self.advance();
                Ok(Expr::Param(name, span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if self.peek_kind() != &TokenKind::RBracket {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::List(elements, span))
            }
            TokenKind::Ident(name) => {
                if name.eq_ignore_ascii_case("null") {
                    self.advance();
                    return Ok(Expr::Literal(Literal {
                        kind: LiteralKind::Null,
                        span,
                    }));
                }
                if name.eq_ignore_ascii_case("true") {
                    self.advance();
                    return Ok(Expr::Literal(Literal {
                        kind: LiteralKind::Bool(true),
                        span,
                    }));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.advance();
                    return Ok(Expr::Literal(Literal {
                        kind: LiteralKind::Bool(false),
                        span,
                    }));
                }
                if name.eq_ignore_ascii_case("EXISTS") {
                    self.advance();
                    return self.parse_exists(false, span);
                }
                if name.eq_ignore_ascii_case("NOT") && self.at_kw_offset(1, "EXISTS") {
                    self.advance();
                    self.advance();
                    return self.parse_exists(true, span);
                }

                self.advance();
                if self.peek_kind() == &TokenKind::LParen {
                    self.parse_fn_call(name, span)
                } else {
                    Ok(Expr::Var(name, span))
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_fn_call(&mut self, name: String, span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut distinct = false;
        let mut args = Vec::new();

        if self.at_kw("DISTINCT") {
            self.advance();
            distinct = true;
        }

        if self.peek_kind() != &TokenKind::RParen {
            // count(*) counts rows.
            if self.peek_kind() == &TokenKind::Star && name.eq_ignore_ascii_case("count") {
                self.advance();
            } else {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        Ok(Expr::FnCall(FnCall {
            name,
            args,
            distinct,
            span,
        }))
    }

    /// `EXISTS ( pattern [WHERE expr] )`
    fn parse_exists(&mut self, negated: bool, span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let elements = self.parse_pattern_elems()?;
        let where_clause = if self.eat_kw("WHERE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(&TokenKind::RParen)?;

        Ok(if negated {
            Expr::NotExists(elements, where_clause, span)
        } else {
            Expr::Exists(elements, where_clause, span)
        })
    }
}
