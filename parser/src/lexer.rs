//! Lexer for MEW source text.
//!
//! Keywords are not distinguished at the token level; the parser matches
//! identifier tokens case-insensitively against keyword spellings, so
//! `match`, `MATCH` and `Match` all introduce a MATCH statement while
//! attribute and type names stay case-sensitive.

use crate::error::{ParseError, ParseResult};
use crate::Span;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Duration literal normalized to milliseconds (`5s`, `2m`, `100ms`).
    Duration(i64),
    /// Timestamp literal `@1705320000000`.
    Timestamp(i64),
    /// `#id` reference (text after the `#`).
    IdRef(String),
    /// `$param` reference (text after the `$`).
    Param(String),

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    DotDot,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    PlusPlus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Question,
    QuestionQuestion,
    Pipe,
    /// `=>`
    Arrow,

    Eof,
}

impl TokenKind {
    /// Display spelling used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(s) => format!("\"{}\"", s),
            TokenKind::Duration(ms) => format!("{}ms", ms),
            TokenKind::Timestamp(ms) => format!("@{}", ms),
            TokenKind::IdRef(s) => format!("#{}", s),
            TokenKind::Param(s) => format!("${}", s),
            TokenKind::LBrace => "{".into(),
            TokenKind::RBrace => "}".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::LBracket => "[".into(),
            TokenKind::RBracket => "]".into(),
            TokenKind::Comma => ",".into(),
            TokenKind::Colon => ":".into(),
            TokenKind::Semicolon => ";".into(),
            TokenKind::Dot => ".".into(),
            TokenKind::DotDot => "..".into(),
            TokenKind::Eq => "=".into(),
            TokenKind::NotEq => "!=".into(),
            TokenKind::Lt => "<".into(),
            TokenKind::LtEq => "<=".into(),
            TokenKind::Gt => ">".into(),
            TokenKind::GtEq => ">=".into(),
            TokenKind::Plus => "+".into(),
            TokenKind::PlusPlus => "++".into(),
            TokenKind::Minus => "-".into(),
            TokenKind::Star => "*".into(),
            TokenKind::Slash => "/".into(),
            TokenKind::Percent => "%".into(),
            TokenKind::Bang => "!".into(),
            TokenKind::Question => "?".into(),
            TokenKind::QuestionQuestion => "??".into(),
            TokenKind::Pipe => "|".into(),
            TokenKind::Arrow => "=>".into(),
            TokenKind::Eof => "end of input".into(),
        }
    }
}

/// Streaming lexer over a source string.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(source: &'a str) -> ParseResult<Vec<Token>> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                // Line comments: `//` and `--`.
                Some(b'/') if self.peek2() == Some(b'/') => self.skip_line(),
                Some(b'-') if self.peek2() == Some(b'-') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.bump();
        }
    }

    fn span_here(&self, start: usize, line: usize, column: usize) -> Span {
        Span::new(start, self.pos, line, column)
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_trivia();

        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: self.span_here(start, line, column),
            });
        };

        let kind = match ch {
            b'{' => {
                self.bump();
                TokenKind::LBrace
            }
            b'}' => {
                self.bump();
                TokenKind::RBrace
            }
            b'(' => {
                self.bump();
                TokenKind::LParen
            }
            b')' => {
                self.bump();
                TokenKind::RParen
            }
            b'[' => {
                self.bump();
                TokenKind::LBracket
            }
            b']' => {
                self.bump();
                TokenKind::RBracket
            }
            b',' => {
                self.bump();
                TokenKind::Comma
            }
            b':' => {
                self.bump();
                TokenKind::Colon
            }
            b';' => {
                self.bump();
                TokenKind::Semicolon
            }
            b'.' => {
                self.bump();
                if self.peek() == Some(b'.') {
                    self.bump();
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'>') {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Eq
                }
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'+' => {
                self.bump();
                if self.peek() == Some(b'+') {
                    self.bump();
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                self.bump();
                TokenKind::Minus
            }
            b'*' => {
                self.bump();
                TokenKind::Star
            }
            b'/' => {
                self.bump();
                TokenKind::Slash
            }
            b'%' => {
                self.bump();
                TokenKind::Percent
            }
            b'|' => {
                self.bump();
                TokenKind::Pipe
            }
            b'?' => {
                self.bump();
                if self.peek() == Some(b'?') {
                    self.bump();
                    TokenKind::QuestionQuestion
                } else {
                    TokenKind::Question
                }
            }
            b'"' => return self.lex_string(start, line, column),
            b'#' => {
                self.bump();
                let text = self.take_ident_chars();
                if text.is_empty() {
                    return Err(ParseError::UnexpectedChar {
                        ch: '#',
                        line,
                        column,
                    });
                }
                TokenKind::IdRef(text)
            }
            b'$' => {
                self.bump();
                let text = self.take_ident_chars();
                if text.is_empty() {
                    return Err(ParseError::UnexpectedChar {
                        ch: '$',
                        line,
                        column,
                    });
                }
                TokenKind::Param(text)
            }
            b'@' => {
                self.bump();
                let digits = self.take_digits();
                let ms = digits.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
                    text: format!("@{}", digits),
                    line,
                    column,
                })?;
                TokenKind::Timestamp(ms)
            }
            b'0'..=b'9' => return self.lex_number(start, line, column),
            ch if ch == b'_' || ch.is_ascii_alphabetic() => {
                let text = self.take_ident_chars();
                TokenKind::Ident(text)
            }
            other => {
                return Err(ParseError::UnexpectedChar {
                    ch: other as char,
                    line,
                    column,
                })
            }
        };

        Ok(Token {
            kind,
            span: self.span_here(start, line, column),
        })
    }

    fn take_ident_chars(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == b'_' || ch.is_ascii_alphanumeric() {
                text.push(ch as char);
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn take_digits(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch as char);
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn lex_string(&mut self, start: usize, line: usize, column: usize) -> ParseResult<Token> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { line, column }),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => text.push('\n'),
                    Some(b't') => text.push('\t'),
                    Some(b'r') => text.push('\r'),
                    Some(b'\\') => text.push('\\'),
                    Some(b'"') => text.push('"'),
                    Some(other) => text.push(other as char),
                    None => return Err(ParseError::UnterminatedString { line, column }),
                },
                Some(other) => text.push(other as char),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(text),
            span: self.span_here(start, line, column),
        })
    }

    fn lex_number(&mut self, start: usize, line: usize, column: usize) -> ParseResult<Token> {
        let mut text = self.take_digits();

        // Float: digits '.' digits (but not '..' which is a range).
        let is_float = self.peek() == Some(b'.') && self.peek2().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump();
            text.push('.');
            text.push_str(&self.take_digits());
            let value = text.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                text: text.clone(),
                line,
                column,
            })?;
            return Ok(Token {
                kind: TokenKind::Float(value),
                span: self.span_here(start, line, column),
            });
        }

        let value = text.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
            text: text.clone(),
            line,
            column,
        })?;

        // Duration suffixes: ms, s, m, h, d. Only consumed when the suffix is
        // not followed by further identifier characters (so `5months` stays an
        // error rather than a surprise).
        let suffix_start = self.pos;
        let suffix = self.take_ident_chars();
        let multiplier = match suffix.as_str() {
            "ms" => Some(1),
            "s" => Some(1_000),
            "m" => Some(60_000),
            "h" => Some(3_600_000),
            "d" => Some(86_400_000),
            "" => None,
            _ => {
                return Err(ParseError::InvalidNumber {
                    text: format!("{}{}", text, suffix),
                    line,
                    column,
                })
            }
        };

        let kind = match multiplier {
            Some(mult) => TokenKind::Duration(value * mult),
            None => {
                // No suffix consumed; rewind is unnecessary because
                // take_ident_chars read nothing.
                debug_assert_eq!(suffix_start, self.pos);
                TokenKind::Int(value)
            }
        };

        Ok(Token {
            kind,
            span: self.span_here(start, line, column),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_spawn_statement() {
        let toks = kinds("SPAWN t: Task { title = \"X\" }");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("SPAWN".into()),
                TokenKind::Ident("t".into()),
                TokenKind::Colon,
                TokenKind::Ident("Task".into()),
                TokenKind::LBrace,
                TokenKind::Ident("title".into()),
                TokenKind::Eq,
                TokenKind::Str("X".into()),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        let toks = kinds("a != b <= c ++ d ?? e => f");
        assert!(toks.contains(&TokenKind::NotEq));
        assert!(toks.contains(&TokenKind::LtEq));
        assert!(toks.contains(&TokenKind::PlusPlus));
        assert!(toks.contains(&TokenKind::QuestionQuestion));
        assert!(toks.contains(&TokenKind::Arrow));
    }

    #[test]
    fn test_lex_id_and_param_refs() {
        let toks = kinds("INSPECT #42 WHERE x = $limit");
        assert!(toks.contains(&TokenKind::IdRef("42".into())));
        assert!(toks.contains(&TokenKind::Param("limit".into())));
    }

    #[test]
    fn test_lex_durations_and_timestamps() {
        let toks = kinds("5s 100ms @1705320000000");
        assert_eq!(toks[0], TokenKind::Duration(5_000));
        assert_eq!(toks[1], TokenKind::Duration(100));
        assert_eq!(toks[2], TokenKind::Timestamp(1_705_320_000_000));
    }

    #[test]
    fn test_lex_float_vs_range() {
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        let range = kinds("1..5");
        assert_eq!(range[0], TokenKind::Int(1));
        assert_eq!(range[1], TokenKind::DotDot);
        assert_eq!(range[2], TokenKind::Int(5));
    }

    #[test]
    fn test_lex_comments_skipped() {
        let toks = kinds("// a comment\nSPAWN -- trailing\nt");
        assert_eq!(toks[0], TokenKind::Ident("SPAWN".into()));
        assert_eq!(toks[1], TokenKind::Ident("t".into()));
    }

    #[test]
    fn test_lex_tracks_line_numbers() {
        let tokens = Lexer::tokenize("a\nb").unwrap();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
    }
}
