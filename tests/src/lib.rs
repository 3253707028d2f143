//! Shared harness for the end-to-end suites.

use mew_core::{fixed_clock, EngineLimits, Value};
use mew_session::{Database, Session, StatementOutcome};
use std::sync::Arc;

/// Opt-in engine tracing for a test run: `MEW_TEST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MEW_TEST_LOG"))
        .with_test_writer()
        .try_init();
}

pub mod prelude {
    pub use super::{engine, engine_at, engine_with_limits, int, rows, string};
    pub use mew_core::{ErrorCategory, Value};
    pub use mew_session::{
        Database, MutationCounts, Session, SessionError, StatementOutcome, TxnAction,
    };
}

/// In-memory engine with the ontology loaded and one session attached.
pub fn engine(ontology: &str) -> (Arc<Database>, Session) {
    let db = Database::in_memory().expect("in-memory database");
    db.load_ontology(ontology).expect("ontology loads");
    let session = Session::new(db.clone());
    (db, session)
}

/// Engine with a pinned `now()` source.
pub fn engine_at(ontology: &str, now_ms: i64) -> (Arc<Database>, Session) {
    let db = Database::in_memory().expect("in-memory database");
    let db = db.configure(EngineLimits::default(), fixed_clock(now_ms));
    db.load_ontology(ontology).expect("ontology loads");
    let session = Session::new(db.clone());
    (db, session)
}

/// Engine with custom resource limits.
pub fn engine_with_limits(ontology: &str, limits: EngineLimits) -> (Arc<Database>, Session) {
    let db = Database::in_memory().expect("in-memory database");
    let db = db.configure(limits, mew_core::system_clock());
    db.load_ontology(ontology).expect("ontology loads");
    let session = Session::new(db.clone());
    (db, session)
}

/// The rows of a query outcome; panics on any other statement kind.
pub fn rows(outcome: &StatementOutcome) -> &Vec<Vec<Value>> {
    match outcome {
        StatementOutcome::Query(q) => &q.rows,
        other => panic!("expected a query outcome, got {:?}", other),
    }
}

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn string(v: &str) -> Value {
    Value::String(v.to_string())
}
