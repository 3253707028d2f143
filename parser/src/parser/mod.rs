//! Recursive-descent parser over the token stream.

mod expr;
mod ontology;
mod stmt;

use crate::ast::{OntologyItem, Stmt};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::Span;

/// Parse a single statement. Trailing semicolons are tolerated; anything
/// else after the statement is an error.
pub fn parse_stmt(source: &str) -> ParseResult<Stmt> {
    let mut parser = Parser::new(source)?;
    let stmt = parser.parse_statement()?;
    parser.eat(&TokenKind::Semicolon);
    parser.expect_eof()?;
    Ok(stmt)
}

/// Parse a sequence of statements separated by semicolons or plain
/// statement keywords.
pub fn parse_stmts(source: &str) -> ParseResult<Vec<Stmt>> {
    let mut parser = Parser::new(source)?;
    let mut stmts = Vec::new();
    loop {
        while parser.eat(&TokenKind::Semicolon) {}
        if parser.at_eof() {
            break;
        }
        stmts.push(parser.parse_statement()?);
    }
    Ok(stmts)
}

/// Parse an ontology source: a sequence of node/edge/constraint/rule
/// declarations.
pub fn parse_ontology(source: &str) -> ParseResult<Vec<OntologyItem>> {
    let mut parser = Parser::new(source)?;
    let items = parser.parse_ontology_items(false)?;
    parser.expect_eof()?;
    Ok(items)
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(source: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: Lexer::tokenize(source)?,
            pos: 0,
        })
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.peek_kind() == &TokenKind::Eof
    }

    pub(crate) fn span(&self) -> Span {
        self.peek().span
    }

    /// Consume the token if it matches exactly.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    pub(crate) fn expect_eof(&self) -> ParseResult<()> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    /// Keyword check: identifier token matching `kw` case-insensitively.
    pub(crate) fn at_kw(&self, kw: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    pub(crate) fn at_kw_offset(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    pub(crate) fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_kw(&mut self, kw: &str) -> ParseResult<Token> {
        if self.at_kw(kw) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kw))
        }
    }

    /// Consume any identifier (case preserved).
    pub(crate) fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.span();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    pub(crate) fn expect_int(&mut self) -> ParseResult<i64> {
        match *self.peek_kind() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(v)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    pub(crate) fn expect_string(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        if tok.kind == TokenKind::Eof {
            ParseError::end(expected)
        } else {
            ParseError::unexpected(expected, tok.kind.describe(), tok.span.line, tok.span.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    #[test]
    fn test_parse_single_statement_rejects_trailing_garbage() {
        let result = parse_stmt("COMMIT COMMIT");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_stmts_splits_on_semicolons() {
        let stmts = parse_stmts("BEGIN; COMMIT;").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::Txn(TxnStmt::Begin { .. })));
        assert!(matches!(stmts[1], Stmt::Txn(TxnStmt::Commit)));
    }

    #[test]
    fn test_parse_stmts_without_semicolons() {
        let stmts = parse_stmts(
            "SPAWN t: Task { title = \"A\" }\nSPAWN p: Person { name = \"B\" }",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
    }
}
