//! Journal backends and recovery.

use crate::entry::{Lsn, WalEntry, WalRecord};
use mew_core::TxnId;
use mew_graph::{Graph, IdGen};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL record {lsn} failed its checksum")]
    ChecksumMismatch { lsn: Lsn },

    #[error("WAL replay failed: {0}")]
    Replay(#[from] mew_graph::GraphError),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Statistics from a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub committed_transactions: usize,
    pub discarded_transactions: usize,
    pub entries_replayed: usize,
    pub torn_records_dropped: usize,
}

/// In-memory journal for tests and ephemeral databases.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Vec<WalRecord>,
    next_lsn: Lsn,
    last_in_txn: HashMap<TxnId, Lsn>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_lsn: 1,
            last_in_txn: HashMap::new(),
        }
    }

    pub fn append(&mut self, entry: WalEntry) -> JournalResult<Lsn> {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        let prev = entry.txn().and_then(|txn| self.last_in_txn.get(&txn).copied());
        if let Some(txn) = entry.txn() {
            self.last_in_txn.insert(txn, lsn);
        }
        self.records.push(WalRecord::seal(lsn, prev, entry));
        Ok(lsn)
    }

    pub fn sync(&mut self) -> JournalResult<()> {
        Ok(())
    }

    pub fn records(&self) -> &[WalRecord] {
        &self.records
    }

    pub fn truncate_through(&mut self, lsn: Lsn) {
        self.records.retain(|r| r.lsn > lsn);
    }
}

/// Durable journal: one JSON record per line, fsynced on commit barriers.
pub struct FileJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    next_lsn: Lsn,
    last_in_txn: HashMap<TxnId, Lsn>,
    /// Records read at open plus those appended since.
    records: Vec<WalRecord>,
    torn_dropped: usize,
}

impl FileJournal {
    /// Open or create the journal, dropping any torn tail: the file is
    /// truncated at the first unparsable or checksum-failing line.
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut records = Vec::new();
        let mut good_bytes: u64 = 0;
        let mut torn_dropped = 0usize;

        if path.exists() {
            let file = File::open(&path)?;
            let mut reader = BufReader::new(file);
            let mut line = String::new();
            loop {
                line.clear();
                let read = reader.read_line(&mut line)?;
                if read == 0 {
                    break;
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    good_bytes += read as u64;
                    continue;
                }
                match serde_json::from_str::<WalRecord>(trimmed) {
                    Ok(record) if record.verify() => {
                        good_bytes += read as u64;
                        records.push(record);
                    }
                    _ => {
                        // Torn or corrupt tail: everything from here on is
                        // untrusted and gets truncated away.
                        torn_dropped += 1;
                        tracing::warn!(
                            path = %path.display(),
                            offset = good_bytes,
                            "dropping torn WAL tail"
                        );
                        break;
                    }
                }
            }
        }

        {
            let repair = OpenOptions::new().create(true).write(true).open(&path)?;
            repair.set_len(good_bytes)?;
            repair.sync_all()?;
        }
        let file = OpenOptions::new().append(true).open(&path)?;
        let writer = BufWriter::new(file);

        let next_lsn = records.last().map(|r| r.lsn + 1).unwrap_or(1);
        let mut last_in_txn = HashMap::new();
        for record in &records {
            if let Some(txn) = record.entry.txn() {
                last_in_txn.insert(txn, record.lsn);
            }
        }

        Ok(Self {
            path,
            writer,
            next_lsn,
            last_in_txn,
            records,
            torn_dropped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: WalEntry) -> JournalResult<Lsn> {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        let prev = entry.txn().and_then(|txn| self.last_in_txn.get(&txn).copied());
        if let Some(txn) = entry.txn() {
            self.last_in_txn.insert(txn, lsn);
        }
        let record = WalRecord::seal(lsn, prev, entry);
        let line = serde_json::to_string(&record)
            .map_err(|e| JournalError::Io(std::io::Error::other(e)))?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.records.push(record);
        Ok(lsn)
    }

    /// Flush to stable storage. Completes before the transaction manager
    /// acknowledges commit.
    pub fn sync(&mut self) -> JournalResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn records(&self) -> &[WalRecord] {
        &self.records
    }

    pub fn torn_records_dropped(&self) -> usize {
        self.torn_dropped
    }

    /// Rewrite the log keeping only records after `lsn` (checkpoint
    /// truncation).
    pub fn truncate_through(&mut self, lsn: Lsn) -> JournalResult<()> {
        self.records.retain(|r| r.lsn > lsn);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.records {
            let line = serde_json::to_string(record)
                .map_err(|e| JournalError::Io(std::io::Error::other(e)))?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        self.writer = writer;
        Ok(())
    }
}

/// The journal behind a database: durable or ephemeral.
pub enum Journal {
    Memory(MemoryJournal),
    File(FileJournal),
}

impl Journal {
    pub fn append(&mut self, entry: WalEntry) -> JournalResult<Lsn> {
        match self {
            Journal::Memory(j) => j.append(entry),
            Journal::File(j) => j.append(entry),
        }
    }

    pub fn sync(&mut self) -> JournalResult<()> {
        match self {
            Journal::Memory(j) => j.sync(),
            Journal::File(j) => j.sync(),
        }
    }

    pub fn records(&self) -> &[WalRecord] {
        match self {
            Journal::Memory(j) => j.records(),
            Journal::File(j) => j.records(),
        }
    }

    pub fn truncate_through(&mut self, lsn: Lsn) -> JournalResult<()> {
        match self {
            Journal::Memory(j) => {
                j.truncate_through(lsn);
                Ok(())
            }
            Journal::File(j) => j.truncate_through(lsn),
        }
    }

    pub fn last_lsn(&self) -> Lsn {
        self.records().last().map(|r| r.lsn).unwrap_or(0)
    }
}

/// Replay committed transactions into a graph, starting after the last
/// checkpoint. Uncommitted and aborted work is discarded.
pub fn recover(records: &[WalRecord], graph: &mut Graph, ids: &IdGen) -> JournalResult<RecoveryStats> {
    let mut stats = RecoveryStats::default();

    // Start after the last checkpoint marker, if any.
    let start = records
        .iter()
        .rposition(|r| matches!(r.entry, WalEntry::Checkpoint { .. }))
        .map(|i| i + 1)
        .unwrap_or(0);
    let live = &records[start..];

    let mut committed: HashSet<TxnId> = HashSet::new();
    let mut seen: HashSet<TxnId> = HashSet::new();
    for record in live {
        if let Some(txn) = record.entry.txn() {
            seen.insert(txn);
            if record.entry.is_commit() {
                committed.insert(txn);
            }
        }
    }
    stats.committed_transactions = committed.len();
    stats.discarded_transactions = seen.len() - committed.len();

    let mut max_node = mew_core::NodeId::new(0);
    let mut max_edge = mew_core::EdgeId::new(0);

    for record in live {
        let Some(txn) = record.entry.txn() else {
            continue;
        };
        if !committed.contains(&txn) {
            continue;
        }
        match &record.entry {
            WalEntry::NodeInsert { node, .. } => {
                max_node = max_node.max(node.id);
                graph.insert_node(node.clone())?;
                stats.entries_replayed += 1;
            }
            WalEntry::NodeDelete { node, .. } => {
                graph.remove_node(node.id)?;
                stats.entries_replayed += 1;
            }
            WalEntry::EdgeInsert { edge, .. } => {
                max_edge = max_edge.max(edge.id);
                graph.insert_edge(edge.clone())?;
                stats.entries_replayed += 1;
            }
            WalEntry::EdgeDelete { edge, .. } => {
                graph.remove_edge(edge.id)?;
                stats.entries_replayed += 1;
            }
            WalEntry::AttrSet {
                entity, attr, new, ..
            } => {
                match entity {
                    mew_core::EntityId::Node(id) => {
                        graph.apply_node_attr(*id, attr, new.clone())?;
                    }
                    mew_core::EntityId::Edge(id) => {
                        graph.apply_edge_attr(*id, attr, new.clone())?;
                    }
                }
                stats.entries_replayed += 1;
            }
            WalEntry::Begin { .. }
            | WalEntry::Commit { .. }
            | WalEntry::Abort { .. }
            | WalEntry::Checkpoint { .. } => {}
        }
    }

    ids.bump_past(max_node, max_edge);
    Ok(stats)
}
