//! MEW Journal
//!
//! Append-only write-ahead log of primitive mutations with monotonic
//! LSNs, per-transaction back-links and record checksums. Recovery
//! classifies transactions, replays committed records in LSN order and
//! discards uncommitted work and torn tails. Checkpoints fold the log
//! into a snapshot blob and truncate it.

mod entry;
mod snapshot;
mod wal;

pub use entry::{entries_for_ops, Lsn, WalEntry, WalRecord};
pub use snapshot::{load_snapshot, write_snapshot, Snapshot};
pub use wal::{
    recover, FileJournal, Journal, JournalError, JournalResult, MemoryJournal, RecoveryStats,
};
