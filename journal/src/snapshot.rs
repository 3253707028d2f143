//! Checkpoint snapshots.
//!
//! A snapshot is the whole committed store serialized to one JSON blob
//! plus a sidecar blake3 checksum. Checkpointing writes the snapshot,
//! then truncates the WAL up to the checkpoint LSN; recovery loads the
//! snapshot (when its checksum holds) and replays the remaining log.

use crate::entry::Lsn;
use crate::wal::{JournalError, JournalResult};
use mew_core::{Edge, Node};
use mew_graph::{Graph, IdGen};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serialized committed state.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub next_node_id: u64,
    pub next_edge_id: u64,
    /// The WAL position this snapshot covers.
    pub last_lsn: Lsn,
}

impl Snapshot {
    pub fn capture(graph: &Graph, ids: &IdGen, last_lsn: Lsn) -> Self {
        let nodes = graph
            .all_node_ids()
            .into_iter()
            .filter_map(|id| graph.get_node(id).cloned())
            .collect();
        let edges = graph
            .all_edge_ids()
            .into_iter()
            .filter_map(|id| graph.get_edge(id).cloned())
            .collect();
        let (next_node_id, next_edge_id) = ids.watermarks();
        Self {
            nodes,
            edges,
            next_node_id,
            next_edge_id,
            last_lsn,
        }
    }

    /// Rebuild a store from this snapshot. Attribute indexes are
    /// re-registered by the caller (they derive from the registry).
    pub fn restore(&self, graph: &mut Graph, ids: &IdGen) -> JournalResult<()> {
        for node in &self.nodes {
            graph.insert_node(node.clone())?;
        }
        for edge in &self.edges {
            graph.insert_edge(edge.clone())?;
        }
        ids.bump_past(
            mew_core::NodeId::new(self.next_node_id.saturating_sub(1)),
            mew_core::EdgeId::new(self.next_edge_id.saturating_sub(1)),
        );
        Ok(())
    }
}

fn sum_path(path: &Path) -> std::path::PathBuf {
    path.with_extension("sum")
}

/// Write the snapshot blob and its checksum sidecar.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> JournalResult<()> {
    let payload = serde_json::to_vec(snapshot)
        .map_err(|e| JournalError::Io(std::io::Error::other(e)))?;
    let digest = blake3::hash(&payload);

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &payload)?;
    fs::rename(&tmp, path)?;
    fs::write(sum_path(path), digest.to_hex().as_bytes())?;
    Ok(())
}

/// Load a snapshot if present and intact. A checksum mismatch returns an
/// error rather than silently starting empty; the operator decides.
pub fn load_snapshot(path: &Path) -> JournalResult<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let payload = fs::read(path)?;
    let expected = fs::read_to_string(sum_path(path)).unwrap_or_default();
    let actual = blake3::hash(&payload).to_hex().to_string();
    if expected.trim() != actual {
        return Err(JournalError::ChecksumMismatch { lsn: 0 });
    }
    let snapshot: Snapshot = serde_json::from_slice(&payload)
        .map_err(|e| JournalError::Io(std::io::Error::other(e)))?;
    Ok(Some(snapshot))
}
