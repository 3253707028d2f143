//! MEW Pattern Engine
//!
//! The shared matching primitive used by queries, constraints and rules:
//! compile a pattern into an op pipeline, enumerate bindings against any
//! [`mew_graph::GraphRead`] view, and evaluate expressions under bindings
//! with three-valued logic.

mod binding;
mod error;
mod eval;
mod matcher;
mod pattern;

pub use binding::{Binding, Bindings};
pub use error::{PatternError, PatternResult};
pub use eval::Evaluator;
pub use matcher::Matcher;
pub use pattern::{CompiledPattern, PatternOp};
