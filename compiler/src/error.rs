//! Compiler errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] mew_parser::ParseError),

    #[error(transparent)]
    Registry(#[from] mew_registry::RegistryError),

    #[error("EXTEND cannot alter existing declaration '{name}'")]
    CannotAlter { name: String },

    #[error("Declaration names beginning with '_' are reserved: '{name}'")]
    ReservedName { name: String },

    #[error("Invalid default for '{owner}.{attr}': {message}")]
    InvalidDefault {
        owner: String,
        attr: String,
        message: String,
    },

    #[error("Constraint '{name}' may not call '{function}'")]
    NondeterministicConstraint { name: String, function: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
