//! Pattern engine errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("Unbound variable '{name}'")]
    UnboundVariable { name: String },

    #[error("Unknown type '{name}'")]
    UnknownType { name: String },

    #[error("Unknown edge type '{name}'")]
    UnknownEdgeType { name: String },

    #[error("Unknown parameter '${name}'")]
    UnknownParameter { name: String },

    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("Arithmetic error: {message}")]
    ArithmeticError { message: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Invalid id reference '#{id}'")]
    InvalidIdRef { id: String },
}

impl PatternError {
    pub fn unbound_variable(name: impl Into<String>) -> Self {
        PatternError::UnboundVariable { name: name.into() }
    }

    pub fn unknown_type(name: impl Into<String>) -> Self {
        PatternError::UnknownType { name: name.into() }
    }

    pub fn unknown_edge_type(name: impl Into<String>) -> Self {
        PatternError::UnknownEdgeType { name: name.into() }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        PatternError::TypeError {
            message: message.into(),
        }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        PatternError::ArithmeticError {
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        PatternError::InvalidOperation {
            message: message.into(),
        }
    }
}

pub type PatternResult<T> = Result<T, PatternError>;
