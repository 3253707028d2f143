//! MEW Transaction Manager
//!
//! One [`Transaction`] owns the write buffer, rule state, savepoints and
//! read set of an in-flight transaction, and drives the phase order for
//! every transformation: mutation → immediate constraints → rule firing
//! to quiescence → (at commit) deferred constraints → WAL append + fsync
//! → store apply under the commit barrier.

mod error;
mod manager;

pub use error::{TxnError, TxnResult};
pub use manager::{apply_ops, ReadSet, Transaction};
