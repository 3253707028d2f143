//! Analyzer errors, all carrying source locations.

use mew_parser::Span;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    #[error("Unknown type '{name}' at line {line}, column {column}")]
    UnknownType {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Unknown edge type '{name}' at line {line}, column {column}")]
    UnknownEdgeType {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Cannot instantiate abstract type '{name}' at line {line}, column {column}")]
    AbstractType {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Unknown attribute '{attr}' on '{owner}' at line {line}, column {column}")]
    UnknownAttribute {
        owner: String,
        attr: String,
        line: usize,
        column: usize,
    },

    #[error("Undefined variable '{name}' at line {line}, column {column}")]
    UndefinedVariable {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Duplicate variable '{name}' at line {line}, column {column}")]
    DuplicateVariable {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Edge '{edge_type}' expects {expected} targets, got {actual} at line {line}, column {column}")]
    WrongArity {
        edge_type: String,
        expected: usize,
        actual: usize,
        line: usize,
        column: usize,
    },

    #[error("Type mismatch at line {line}, column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid operator '{op}' for {left} and {right} at line {line}, column {column}")]
    InvalidOperator {
        op: String,
        left: String,
        right: String,
        line: usize,
        column: usize,
    },

    #[error("Unknown function '{name}' at line {line}, column {column}")]
    UnknownFunction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("Aggregate '{name}' is not allowed here (line {line}, column {column})")]
    AggregateMisuse {
        name: String,
        line: usize,
        column: usize,
    },
}

impl AnalyzerError {
    pub(crate) fn at(span: Span) -> (usize, usize) {
        (span.line, span.column)
    }
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
