//! Parser error types.

use thiserror::Error;

/// Errors produced by the lexer and parser.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at line {line}, column {column}")]
    UnexpectedChar {
        ch: char,
        line: usize,
        column: usize,
    },

    #[error("Unterminated string literal starting at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("Invalid number '{text}' at line {line}, column {column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected token '{found}' at line {line}, column {column}: expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected end of input: expected {expected}")]
    UnexpectedEnd { expected: String },
}

impl ParseError {
    pub fn unexpected(expected: impl Into<String>, found: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            line,
            column,
        }
    }

    pub fn end(expected: impl Into<String>) -> Self {
        ParseError::UnexpectedEnd {
            expected: expected.into(),
        }
    }

    /// The source position the error points at, if any.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::UnexpectedChar { line, column, .. }
            | ParseError::UnterminatedString { line, column }
            | ParseError::InvalidNumber { line, column, .. }
            | ParseError::UnexpectedToken { line, column, .. } => Some((*line, *column)),
            ParseError::UnexpectedEnd { .. } => None,
        }
    }
}

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;
