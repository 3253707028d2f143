//! MEW Query Planner / Executor
//!
//! Planning turns a MATCH into a tree of iterator operators: scans
//! ordered by estimated cardinality, index scans where an equality or
//! range conjunct hits a declared index, edge joins preferred over cross
//! products, filters pushed to the earliest operator whose inputs are
//! bound. Execution is volcano-style (`open`/`next`/`close`) with the
//! TIMEOUT budget checked at every `next` boundary.

mod error;
mod exec;
mod plan;
mod walk;

pub use error::{QueryError, QueryResult};
pub use exec::{QueryExecutor, QueryOutput, QueryStats, ReadTrace};
pub use plan::{PlanOp, QueryPlan, QueryPlanner};
pub use walk::execute_walk;
