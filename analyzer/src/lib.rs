//! MEW Analyzer
//!
//! Resolves every identifier in a statement to its binding, checks type
//! compatibility of expressions against the registry, and verifies that
//! aggregates appear only where allowed. Rejects ambiguous or ill-typed
//! statements with source locations before anything executes.

mod analyzer;
mod error;
mod scope;

pub use analyzer::Analyzer;
pub use error::{AnalyzerError, AnalyzerResult};
pub use scope::{Scope, VarType};
