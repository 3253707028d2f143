//! MEW Session
//!
//! The single-node engine facade. A [`Database`] owns the shared graph
//! store, the swap-published registry, the journal and the serializable
//! commit log; a [`Session`] is one connection's statement loop with its
//! optional in-flight transaction and name bindings. Statements issued
//! outside BEGIN auto-commit.

mod database;
mod error;
mod result;
mod session;

pub use database::Database;
pub use error::{SessionError, SessionResult};
pub use result::{
    MutationCounts, MutationOutcome, QueryOutcome, StatementOutcome, TxnAction, TxnOutcome,
};
pub use session::Session;
