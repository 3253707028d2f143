//! WAL record types.

use mew_core::{Edge, EntityId, Node, TxnId, Value};
use mew_graph::BufferOp;
use serde::{Deserialize, Serialize};

/// Log sequence number: monotonic across the whole journal.
pub type Lsn = u64;

/// One logged event. Mutation entries carry enough state to redo (the new
/// state) and undo (the old state) the primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    Begin {
        txn: TxnId,
    },
    Commit {
        txn: TxnId,
    },
    Abort {
        txn: TxnId,
    },
    NodeInsert {
        txn: TxnId,
        node: Node,
    },
    NodeDelete {
        txn: TxnId,
        node: Node,
    },
    EdgeInsert {
        txn: TxnId,
        edge: Edge,
    },
    EdgeDelete {
        txn: TxnId,
        edge: Edge,
    },
    AttrSet {
        txn: TxnId,
        entity: EntityId,
        attr: String,
        old: Option<Value>,
        new: Value,
    },
    /// Everything up to `last_lsn` is folded into the snapshot.
    Checkpoint {
        last_lsn: Lsn,
    },
}

impl WalEntry {
    pub fn txn(&self) -> Option<TxnId> {
        match self {
            WalEntry::Begin { txn }
            | WalEntry::Commit { txn }
            | WalEntry::Abort { txn }
            | WalEntry::NodeInsert { txn, .. }
            | WalEntry::NodeDelete { txn, .. }
            | WalEntry::EdgeInsert { txn, .. }
            | WalEntry::EdgeDelete { txn, .. }
            | WalEntry::AttrSet { txn, .. } => Some(*txn),
            WalEntry::Checkpoint { .. } => None,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, WalEntry::Commit { .. })
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, WalEntry::Abort { .. })
    }
}

/// A sealed record: entry plus LSN, the prior LSN of the same
/// transaction, and a checksum over the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub lsn: Lsn,
    /// Previous LSN in the same transaction, if any.
    pub prev: Option<Lsn>,
    pub crc: u64,
    pub entry: WalEntry,
}

impl WalRecord {
    pub fn seal(lsn: Lsn, prev: Option<Lsn>, entry: WalEntry) -> Self {
        let crc = checksum(lsn, prev, &entry);
        Self {
            lsn,
            prev,
            crc,
            entry,
        }
    }

    pub fn verify(&self) -> bool {
        checksum(self.lsn, self.prev, &self.entry) == self.crc
    }
}

/// Truncated blake3 over the record header and serialized entry.
fn checksum(lsn: Lsn, prev: Option<Lsn>, entry: &WalEntry) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&prev.unwrap_or(0).to_le_bytes());
    let payload = serde_json::to_vec(entry).unwrap_or_default();
    hasher.update(&payload);
    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
}

/// Translate a transaction's effective buffer operations into WAL
/// entries. The walk mirrors the store apply exactly, so the log and the
/// store can never disagree about what committed.
pub fn entries_for_ops(txn: TxnId, ops: &[BufferOp]) -> Vec<WalEntry> {
    ops.iter()
        .map(|op| match op {
            BufferOp::InsertNode(node) => WalEntry::NodeInsert {
                txn,
                node: node.clone(),
            },
            BufferOp::DeleteNode(node) => WalEntry::NodeDelete {
                txn,
                node: node.clone(),
            },
            BufferOp::InsertEdge(edge) => WalEntry::EdgeInsert {
                txn,
                edge: edge.clone(),
            },
            BufferOp::DeleteEdge(edge) => WalEntry::EdgeDelete {
                txn,
                edge: edge.clone(),
            },
            BufferOp::SetAttr {
                entity,
                attr,
                old,
                new,
            } => WalEntry::AttrSet {
                txn,
                entity: *entity,
                attr: attr.clone(),
                old: old.clone(),
                new: new.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_core::{attrs, NodeId, TypeId};

    #[test]
    fn test_record_seal_and_verify() {
        let record = WalRecord::seal(1, None, WalEntry::Begin { txn: 7 });
        assert!(record.verify());

        let mut corrupted = record.clone();
        corrupted.lsn = 2;
        assert!(!corrupted.verify());
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let node = Node::new(NodeId::new(3), TypeId::new(1), attrs! { "title" => "X" });
        let record = WalRecord::seal(5, Some(4), WalEntry::NodeInsert { txn: 2, node });

        let line = serde_json::to_string(&record).unwrap();
        let parsed: WalRecord = serde_json::from_str(&line).unwrap();
        assert!(parsed.verify());
        assert_eq!(parsed.lsn, 5);
        assert_eq!(parsed.prev, Some(4));
        assert!(matches!(parsed.entry, WalEntry::NodeInsert { txn: 2, .. }));
    }

    #[test]
    fn test_txn_extraction() {
        assert_eq!(WalEntry::Commit { txn: 9 }.txn(), Some(9));
        assert_eq!(WalEntry::Checkpoint { last_lsn: 3 }.txn(), None);
    }
}
