//! The error envelope shared by every transport.
//!
//! Component crates define their own `thiserror` enums; at the session
//! boundary every failure is folded into an [`EngineError`] carrying a code,
//! a category, a human message, and optionally a source location and hints.
//! Code ranges are reserved per category: E1xxx syntax, E2xxx type, E3xxx
//! constraint, E4xxx not-found, E5xxx limits, E6xxx transaction, E7xxx
//! storage, E9xxx internal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error classification, stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    SyntaxError,
    TypeError,
    ConstraintViolation,
    NotFound,
    LimitExceeded,
    TransactionError,
    StorageError,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::SyntaxError => "SyntaxError",
            ErrorCategory::TypeError => "TypeError",
            ErrorCategory::ConstraintViolation => "ConstraintViolation",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::LimitExceeded => "LimitExceeded",
            ErrorCategory::TransactionError => "TransactionError",
            ErrorCategory::StorageError => "StorageError",
            ErrorCategory::Internal => "Internal",
        };
        write!(f, "{}", s)
    }
}

/// Well-known error codes. Components pick the closest code for the
/// condition; the category is always derivable from the leading digit.
pub mod codes {
    pub const SYNTAX: &str = "E1001";
    pub const UNEXPECTED_END: &str = "E1002";

    pub const TYPE_MISMATCH: &str = "E2001";
    pub const WRONG_ARITY: &str = "E2002";
    pub const UNKNOWN_ATTRIBUTE: &str = "E2003";
    pub const ABSTRACT_TYPE: &str = "E2004";
    pub const AGGREGATE_MISUSE: &str = "E2005";

    pub const CONSTRAINT_VIOLATION: &str = "E3001";
    pub const REQUIRED_MISSING: &str = "E3002";
    pub const UNIQUE_COLLISION: &str = "E3003";
    pub const ACYCLIC_VIOLATION: &str = "E3004";
    pub const CARDINALITY_VIOLATION: &str = "E3005";
    pub const KILL_PREVENTED: &str = "E3006";

    pub const NOT_FOUND: &str = "E4001";
    pub const UNKNOWN_TYPE: &str = "E4002";
    pub const UNKNOWN_EDGE_TYPE: &str = "E4003";
    pub const UNKNOWN_INDEX: &str = "E4004";

    pub const TIMEOUT: &str = "E5001";
    pub const RULE_DEPTH: &str = "E5002";
    pub const RULE_ACTIONS: &str = "E5003";
    pub const UNBOUNDED_RESULT: &str = "E5004";
    pub const CASCADE_LIMIT: &str = "E5005";
    pub const COLLECT_LIMIT: &str = "E5006";

    pub const NO_TRANSACTION: &str = "E6001";
    pub const COMMIT_CONFLICT: &str = "E6002";
    pub const DEFERRED_FAILURE: &str = "E6003";
    pub const RULE_CYCLE: &str = "E6004";

    pub const WAL_WRITE: &str = "E7001";
    pub const CHECKSUM_MISMATCH: &str = "E7002";

    pub const INTERNAL: &str = "E9001";
}

/// Source location attached to analysis and parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub snippet: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The uniform error envelope.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {category}: {message}")]
pub struct EngineError {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub hints: Vec<String>,
}

impl EngineError {
    pub fn new(code: &str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            category,
            message: message.into(),
            location: None,
            hints: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(codes::SYNTAX, ErrorCategory::SyntaxError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(codes::TYPE_MISMATCH, ErrorCategory::TypeError, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(
            codes::CONSTRAINT_VIOLATION,
            ErrorCategory::ConstraintViolation,
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, ErrorCategory::NotFound, message)
    }

    pub fn limit(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::LimitExceeded, message)
    }

    pub fn transaction(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::TransactionError, message)
    }

    pub fn storage(code: &str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::StorageError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, ErrorCategory::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_display() {
        let err = EngineError::constraint("required attribute 'name' is missing");
        let text = format!("{}", err);
        assert!(text.contains("E3001"));
        assert!(text.contains("ConstraintViolation"));
        assert!(text.contains("name"));
    }

    #[test]
    fn test_builder_attaches_location_and_hints() {
        let err = EngineError::syntax("unexpected token")
            .with_location(SourceLocation {
                line: 3,
                column: 14,
                snippet: Some("SPWN t: Task".to_string()),
            })
            .with_hint("did you mean SPAWN?");

        assert_eq!(err.location.as_ref().unwrap().line, 3);
        assert_eq!(err.hints.len(), 1);
    }
}
