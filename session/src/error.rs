//! The session-boundary error mapping.
//!
//! Component errors fold into the uniform envelope here: every failure
//! leaves the session as an [`EngineError`] with a code, category,
//! message, and source location when one exists.

use mew_core::{codes, EngineError, ErrorCategory, SourceLocation};
use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct SessionError(pub EngineError);

impl SessionError {
    pub fn envelope(&self) -> &EngineError {
        &self.0
    }

    pub fn category(&self) -> ErrorCategory {
        self.0.category
    }

    pub fn code(&self) -> &str {
        &self.0.code
    }

    pub fn unsupported(what: &str) -> Self {
        SessionError(
            EngineError::new(codes::SYNTAX, ErrorCategory::SyntaxError, format!(
                "{} is not supported by this build",
                what
            ))
            .with_hint("versioning statements are reserved extension points"),
        )
    }

    pub fn invalid_target(message: impl Into<String>) -> Self {
        SessionError(EngineError::type_error(message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SessionError(EngineError::not_found(message))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError(e)
    }
}

impl From<mew_parser::ParseError> for SessionError {
    fn from(e: mew_parser::ParseError) -> Self {
        let mut envelope = match &e {
            mew_parser::ParseError::UnexpectedEnd { .. } => EngineError::new(
                codes::UNEXPECTED_END,
                ErrorCategory::SyntaxError,
                e.to_string(),
            ),
            _ => EngineError::syntax(e.to_string()),
        };
        if let Some((line, column)) = e.position() {
            envelope = envelope.with_location(SourceLocation {
                line,
                column,
                snippet: None,
            });
        }
        SessionError(envelope)
    }
}

impl From<mew_analyzer::AnalyzerError> for SessionError {
    fn from(e: mew_analyzer::AnalyzerError) -> Self {
        use mew_analyzer::AnalyzerError as A;
        let (code, category) = match &e {
            A::UnknownType { .. } | A::UnknownEdgeType { .. } => {
                (codes::UNKNOWN_TYPE, ErrorCategory::NotFound)
            }
            A::UnknownAttribute { .. } => (codes::UNKNOWN_ATTRIBUTE, ErrorCategory::TypeError),
            A::AggregateMisuse { .. } => (codes::AGGREGATE_MISUSE, ErrorCategory::TypeError),
            A::WrongArity { .. } => (codes::WRONG_ARITY, ErrorCategory::TypeError),
            A::AbstractType { .. } => (codes::ABSTRACT_TYPE, ErrorCategory::TypeError),
            _ => (codes::TYPE_MISMATCH, ErrorCategory::TypeError),
        };
        SessionError(EngineError::new(code, category, e.to_string()))
    }
}

impl From<mew_compiler::CompileError> for SessionError {
    fn from(e: mew_compiler::CompileError) -> Self {
        use mew_compiler::CompileError as C;
        let envelope = match &e {
            C::Parse(parse) => return SessionError::from(parse.clone()),
            C::NondeterministicConstraint { .. } => EngineError::new(
                codes::TYPE_MISMATCH,
                ErrorCategory::TypeError,
                e.to_string(),
            ),
            _ => EngineError::new(codes::SYNTAX, ErrorCategory::SyntaxError, e.to_string()),
        };
        SessionError(envelope)
    }
}

impl From<mew_query::QueryError> for SessionError {
    fn from(e: mew_query::QueryError) -> Self {
        use mew_query::QueryError as Q;
        let envelope = match &e {
            Q::Timeout { .. } => {
                EngineError::limit(codes::TIMEOUT, e.to_string())
            }
            Q::CollectLimit { .. } => {
                EngineError::limit(codes::COLLECT_LIMIT, e.to_string())
            }
            Q::UnknownType { .. } | Q::UnknownEdgeType { .. } => {
                EngineError::new(codes::UNKNOWN_TYPE, ErrorCategory::NotFound, e.to_string())
            }
            Q::AggregateMisuse { .. } => EngineError::new(
                codes::AGGREGATE_MISUSE,
                ErrorCategory::TypeError,
                e.to_string(),
            ),
            Q::InvalidWalkStart => EngineError::type_error(e.to_string()),
            Q::Pattern(p) => return SessionError::from_pattern(p),
        };
        SessionError(envelope)
    }
}

impl SessionError {
    fn from_pattern(e: &mew_pattern::PatternError) -> Self {
        use mew_pattern::PatternError as P;
        let envelope = match e {
            P::UnknownType { .. } | P::UnknownEdgeType { .. } => {
                EngineError::new(codes::UNKNOWN_TYPE, ErrorCategory::NotFound, e.to_string())
            }
            P::ArithmeticError { .. } => EngineError::type_error(e.to_string()),
            _ => EngineError::type_error(e.to_string()),
        };
        SessionError(envelope)
    }

    fn from_mutation(e: &mew_mutation::MutationError) -> Self {
        use mew_mutation::MutationError as M;
        let envelope = match e {
            M::UnknownType { .. } | M::UnknownEdgeType { .. } => {
                EngineError::new(codes::UNKNOWN_TYPE, ErrorCategory::NotFound, e.to_string())
            }
            M::NodeNotFound(_) | M::EdgeNotFound(_) => EngineError::not_found(e.to_string()),
            M::MissingRequired { .. } => EngineError::new(
                codes::REQUIRED_MISSING,
                ErrorCategory::ConstraintViolation,
                e.to_string(),
            ),
            M::UniqueCollision { .. } | M::DuplicateEdge { .. } => EngineError::new(
                codes::UNIQUE_COLLISION,
                ErrorCategory::ConstraintViolation,
                e.to_string(),
            ),
            M::AcyclicViolation { .. } => EngineError::new(
                codes::ACYCLIC_VIOLATION,
                ErrorCategory::ConstraintViolation,
                e.to_string(),
            ),
            M::CardinalityExceeded { .. } => EngineError::new(
                codes::CARDINALITY_VIOLATION,
                ErrorCategory::ConstraintViolation,
                e.to_string(),
            ),
            M::KillPrevented { .. } => EngineError::new(
                codes::KILL_PREVENTED,
                ErrorCategory::ConstraintViolation,
                e.to_string(),
            ),
            M::ModifierViolation { .. } | M::SelfLoop { .. } => {
                EngineError::constraint(e.to_string())
            }
            M::CascadeLimit { .. } => EngineError::limit(codes::CASCADE_LIMIT, e.to_string()),
            M::InvalidArity { .. } | M::InvalidTargetType { .. } | M::UnknownAttribute { .. } => {
                EngineError::new(codes::WRONG_ARITY, ErrorCategory::TypeError, e.to_string())
            }
            M::InvalidAttrType { .. } => EngineError::type_error(e.to_string()),
            M::AbstractType { .. } => {
                EngineError::new(codes::ABSTRACT_TYPE, ErrorCategory::TypeError, e.to_string())
            }
            M::Pattern(p) => return SessionError::from_pattern(p),
            M::Graph(_) => EngineError::internal(e.to_string()),
        };
        SessionError(envelope)
    }

    fn from_rule(e: &mew_rule::RuleError) -> Self {
        use mew_rule::RuleError as R;
        let envelope = match e {
            R::MaxDepthExceeded { .. } => EngineError::limit(codes::RULE_DEPTH, e.to_string()),
            R::MaxActionsExceeded { .. } => EngineError::limit(codes::RULE_ACTIONS, e.to_string()),
            R::RuleCycle { .. } => {
                EngineError::transaction(codes::RULE_CYCLE, e.to_string())
            }
            R::ConstraintViolation { .. } => EngineError::constraint(e.to_string()),
            R::UnknownRule { .. } => EngineError::not_found(e.to_string()),
            R::InvalidProduction { .. } => EngineError::type_error(e.to_string()),
            R::Mutation(m) => return SessionError::from_mutation(m),
            R::Pattern(p) => return SessionError::from_pattern(p),
        };
        SessionError(envelope)
    }
}

impl From<mew_transaction::TxnError> for SessionError {
    fn from(e: mew_transaction::TxnError) -> Self {
        use mew_transaction::TxnError as T;
        let envelope = match &e {
            T::NoActiveTransaction | T::AlreadyActive => {
                EngineError::transaction(codes::NO_TRANSACTION, e.to_string())
            }
            T::SavepointNotFound(_) => EngineError::not_found(e.to_string()),
            T::ConstraintViolation { .. } => EngineError::constraint(e.to_string()),
            T::DeferredViolation { .. } => {
                EngineError::transaction(codes::DEFERRED_FAILURE, e.to_string())
            }
            T::CommitConflict { .. } => {
                EngineError::transaction(codes::COMMIT_CONFLICT, e.to_string())
            }
            T::Mutation(m) => return SessionError::from_mutation(m),
            T::Rule(r) => return SessionError::from_rule(r),
            T::ConstraintCheck(c) => EngineError::internal(c.to_string()),
            T::Journal(j) => EngineError::storage(codes::WAL_WRITE, j.to_string()),
            T::Graph(g) => EngineError::internal(g.to_string()),
        };
        SessionError(envelope)
    }
}

impl From<mew_journal::JournalError> for SessionError {
    fn from(e: mew_journal::JournalError) -> Self {
        use mew_journal::JournalError as J;
        let code = match &e {
            J::ChecksumMismatch { .. } => codes::CHECKSUM_MISMATCH,
            _ => codes::WAL_WRITE,
        };
        SessionError(EngineError::storage(code, e.to_string()))
    }
}

impl From<mew_graph::GraphError> for SessionError {
    fn from(e: mew_graph::GraphError) -> Self {
        use mew_graph::GraphError as G;
        let envelope = match &e {
            G::NodeNotFound(_) | G::EdgeNotFound(_) => EngineError::not_found(e.to_string()),
            G::DuplicateId(_) => EngineError::internal(e.to_string()),
        };
        SessionError(envelope)
    }
}

impl From<mew_pattern::PatternError> for SessionError {
    fn from(e: mew_pattern::PatternError) -> Self {
        SessionError::from_pattern(&e)
    }
}

impl From<mew_mutation::MutationError> for SessionError {
    fn from(e: mew_mutation::MutationError) -> Self {
        SessionError::from_mutation(&e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_maps_to_syntax_category() {
        let parse = mew_parser::ParseError::unexpected("SPAWN", "SPWN", 1, 1);
        let session: SessionError = parse.into();
        assert_eq!(session.category(), ErrorCategory::SyntaxError);
        assert!(session.envelope().location.is_some());
    }

    #[test]
    fn test_missing_required_maps_to_constraint_category() {
        let err = mew_mutation::MutationError::MissingRequired {
            type_name: "Person".into(),
            attr: "name".into(),
        };
        let session: SessionError = err.into();
        assert_eq!(session.category(), ErrorCategory::ConstraintViolation);
        assert_eq!(session.code(), codes::REQUIRED_MISSING);
        assert!(session.envelope().message.contains("name"));
    }

    #[test]
    fn test_limit_errors_map_to_limit_category() {
        let err = mew_rule::RuleError::MaxActionsExceeded { count: 11 };
        let session: SessionError = mew_transaction::TxnError::Rule(err).into();
        assert_eq!(session.category(), ErrorCategory::LimitExceeded);
        assert_eq!(session.code(), codes::RULE_ACTIONS);
    }
}
