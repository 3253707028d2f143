//! MEW Constraint Checker
//!
//! Incremental validation of declared invariants. After each mutation the
//! checker re-evaluates only constraints whose affected types intersect
//! the mutation footprint, and only bindings involving mutated entities.
//! Deferred constraints (cardinality minimums, explicitly deferred
//! declarations) run at the commit boundary.

mod checker;
mod error;
mod violation;

pub use checker::ConstraintChecker;
pub use error::{ConstraintError, ConstraintResult};
pub use violation::{Violation, ViolationSeverity, Violations};
