//! The shared single-node engine state.

use crate::{SessionError, SessionResult};
use arc_swap::ArcSwap;
use mew_core::{
    system_clock, Clock, EdgeTypeId, EngineLimits, EntityId, Node, TxnId, TypeId, Value,
};
use mew_graph::{Graph, IdGen};
use mew_journal::{
    load_snapshot, recover, write_snapshot, FileJournal, Journal, MemoryJournal, Snapshot, WalEntry,
};
use mew_parser::IsolationLevel;
use mew_query::ReadTrace;
use mew_registry::Registry;
use mew_transaction::{apply_ops, Transaction};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "snapshot.json";
const ONTOLOGY_FILE: &str = "ontology.mew";
const LOCK_FILE: &str = "LOCK";

/// The footprint one committed transaction left behind, kept for
/// serializable read-set validation.
#[derive(Debug)]
struct CommitFootprint {
    seq: u64,
    node_types: Vec<TypeId>,
    edge_types: Vec<EdgeTypeId>,
    entities: Vec<EntityId>,
}

/// The single-node engine: one shared store, one published registry, one
/// journal. Sessions are independent; they meet only at the commit
/// barrier.
pub struct Database {
    store: RwLock<Graph>,
    registry: ArcSwap<Registry>,
    journal: Mutex<Journal>,
    ids: IdGen,
    limits: EngineLimits,
    clock: Clock,
    next_txn_id: AtomicU64,
    next_session_id: AtomicU64,
    commit_seq: AtomicU64,
    commit_log: Mutex<Vec<CommitFootprint>>,
    data_dir: Option<PathBuf>,
}

impl Database {
    /// An ephemeral in-memory database with the empty (meta-only) schema.
    pub fn in_memory() -> SessionResult<Arc<Self>> {
        let registry = mew_compiler::compile_items(&[])?;
        let mut graph = Graph::new();
        for (type_id, attr) in registry.indexed_attrs() {
            graph.register_attr_index(type_id, &attr);
        }
        Ok(Arc::new(Self {
            store: RwLock::new(graph),
            registry: ArcSwap::from_pointee(registry),
            journal: Mutex::new(Journal::Memory(MemoryJournal::new())),
            ids: IdGen::new(),
            limits: EngineLimits::default(),
            clock: system_clock(),
            next_txn_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
            commit_seq: AtomicU64::new(1),
            commit_log: Mutex::new(Vec::new()),
            data_dir: None,
        }))
    }

    /// Open (or create) a durable database: take the lock file, compile
    /// the persisted ontology, load the snapshot if intact, replay the
    /// WAL's committed transactions.
    pub fn open(dir: impl Into<PathBuf>) -> SessionResult<Arc<Self>> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error)?;
        fs::write(dir.join(LOCK_FILE), std::process::id().to_string()).map_err(io_error)?;

        // Schema first: the ontology blob replays as a sequence of LOAD
        // sections, idempotently.
        let ontology_path = dir.join(ONTOLOGY_FILE);
        let mut registry = mew_compiler::compile_items(&[])?;
        if ontology_path.exists() {
            let source = fs::read_to_string(&ontology_path).map_err(io_error)?;
            let items = mew_parser::parse_ontology(&source)?;
            registry = mew_compiler::load_more(&registry, &items)?;
        }

        let mut graph = Graph::new();
        let ids = IdGen::new();
        for (type_id, attr) in registry.indexed_attrs() {
            graph.register_attr_index(type_id, &attr);
        }

        if let Some(snapshot) = load_snapshot(&dir.join(SNAPSHOT_FILE))? {
            snapshot.restore(&mut graph, &ids)?;
        }

        let journal = FileJournal::open(dir.join(WAL_FILE))?;
        let stats = recover(journal.records(), &mut graph, &ids)?;
        tracing::info!(
            committed = stats.committed_transactions,
            discarded = stats.discarded_transactions,
            replayed = stats.entries_replayed,
            "recovery complete"
        );

        let db = Arc::new(Self {
            store: RwLock::new(graph),
            registry: ArcSwap::from_pointee(registry),
            journal: Mutex::new(Journal::File(journal)),
            ids,
            limits: EngineLimits::default(),
            clock: system_clock(),
            next_txn_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
            commit_seq: AtomicU64::new(1),
            commit_log: Mutex::new(Vec::new()),
            data_dir: Some(dir),
        });
        db.sync_layer0()?;
        Ok(db)
    }

    /// Replace limits and clock. Call before serving sessions.
    pub fn configure(self: Arc<Self>, limits: EngineLimits, clock: Clock) -> Arc<Self> {
        // Safe: configuration happens during bootstrap, before sharing.
        let mut db = Arc::try_unwrap(self).map_err(|_| ()).expect("unshared database");
        db.limits = limits;
        db.clock = clock;
        Arc::new(db)
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    pub fn ids(&self) -> &IdGen {
        &self.ids
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.load_full()
    }

    pub fn store(&self) -> &RwLock<Graph> {
        &self.store
    }

    pub fn alloc_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    // ==================== Ontology ====================

    /// LOAD ONTOLOGY: first load compiles fresh; repeat loads are
    /// idempotent (declarations with known names are skipped, never
    /// altered in place).
    pub fn load_ontology(&self, source: &str) -> SessionResult<()> {
        let items = mew_parser::parse_ontology(source)?;
        self.load_ontology_items(&items, source)
    }

    pub fn load_ontology_items(
        &self,
        items: &[mew_parser::OntologyItem],
        source: &str,
    ) -> SessionResult<()> {
        let current = self.registry.load_full();
        let next = mew_compiler::load_more(&current, items)?;
        self.publish_registry(next)?;
        self.persist_ontology(source)?;
        Ok(())
    }

    /// EXTEND ONTOLOGY: adds declarations; altering an existing one is an
    /// error.
    pub fn extend_ontology(&self, source: &str) -> SessionResult<()> {
        let items = mew_parser::parse_ontology(source)?;
        self.extend_ontology_items(&items, source)
    }

    pub fn extend_ontology_items(
        &self,
        items: &[mew_parser::OntologyItem],
        source: &str,
    ) -> SessionResult<()> {
        let current = self.registry.load_full();
        let next = mew_compiler::extend_items(&current, items)?;
        self.publish_registry(next)?;
        self.persist_ontology(source)?;
        Ok(())
    }

    /// Swap the published registry and bring dependent state (declared
    /// indexes, the Layer-0 mirror) in line. In-flight transactions keep
    /// the Arc they started with.
    fn publish_registry(&self, next: Registry) -> SessionResult<()> {
        {
            let mut store = self.store.write();
            for (type_id, attr) in next.indexed_attrs() {
                store.register_attr_index(type_id, &attr);
            }
        }
        self.registry.store(Arc::new(next));
        self.sync_layer0()?;
        Ok(())
    }

    fn persist_ontology(&self, source: &str) -> SessionResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(ONTOLOGY_FILE))
            .map_err(io_error)?;
        writeln!(file, "{}", source).map_err(io_error)?;
        Ok(())
    }

    /// Make the Layer-0 mirror agree with the published registry: one
    /// `_Type`/`_EdgeType`/`_Constraint`/`_Rule` node per declaration and
    /// `_extends` edges for the inheritance graph. Idempotent; runs after
    /// every ontology mutation, under its own committed transaction.
    pub fn sync_layer0(&self) -> SessionResult<()> {
        let registry = self.registry.load_full();
        let txn_id = self.alloc_txn_id();
        let mut store = self.store.write();
        let mut journal = self.journal.lock();

        let meta_type = |name: &str| registry.get_type_id(name).expect("meta type registered");
        let t_type = meta_type("_Type");
        let t_edge = meta_type("_EdgeType");
        let t_constraint = meta_type("_Constraint");
        let t_rule = meta_type("_Rule");
        let extends = registry
            .get_edge_type_id("_extends")
            .expect("meta edge registered");

        let mut pending: Vec<WalEntry> = Vec::new();

        let find_meta = |store: &Graph, meta: TypeId, name: &str| -> Option<mew_core::NodeId> {
            store
                .nodes_by_attr(meta, "name", &Value::String(name.to_string()))
                .into_iter()
                .next()
        };

        let ensure_meta_node =
            |store: &mut Graph,
             pending: &mut Vec<WalEntry>,
             meta: TypeId,
             name: &str,
             extra: Vec<(&str, Value)>|
             -> SessionResult<mew_core::NodeId> {
                if let Some(existing) = store
                    .nodes_by_attr(meta, "name", &Value::String(name.to_string()))
                    .into_iter()
                    .next()
                {
                    return Ok(existing);
                }
                let id = self.ids.alloc_node_id();
                let mut attrs = mew_core::Attributes::new();
                attrs.insert("name".to_string(), Value::String(name.to_string()));
                for (key, value) in extra {
                    attrs.insert(key.to_string(), value);
                }
                let node = Node::new(id, meta, attrs);
                store.insert_node(node.clone())?;
                pending.push(WalEntry::NodeInsert { txn: txn_id, node });
                Ok(id)
            };

        for def in registry.all_types() {
            if def.name.starts_with('_') {
                continue;
            }
            ensure_meta_node(
                &mut store,
                &mut pending,
                t_type,
                &def.name,
                vec![("is_abstract", Value::Bool(def.is_abstract))],
            )?;
        }
        for def in registry.all_edge_types() {
            if def.name.starts_with('_') {
                continue;
            }
            ensure_meta_node(
                &mut store,
                &mut pending,
                t_edge,
                &def.name,
                vec![("arity", Value::Int(def.arity() as i64))],
            )?;
        }
        for def in registry.all_constraints() {
            ensure_meta_node(
                &mut store,
                &mut pending,
                t_constraint,
                &def.name,
                vec![
                    ("hard", Value::Bool(def.hard)),
                    (
                        "deferred",
                        Value::Bool(matches!(
                            def.phase,
                            mew_registry::ConstraintPhase::Deferred
                        )),
                    ),
                ],
            )?;
        }
        for def in registry.all_rules() {
            ensure_meta_node(
                &mut store,
                &mut pending,
                t_rule,
                &def.name,
                vec![
                    ("priority", Value::Int(def.priority)),
                    ("auto", Value::Bool(def.auto)),
                ],
            )?;
        }

        // Inheritance mirror.
        for def in registry.all_types() {
            if def.name.starts_with('_') {
                continue;
            }
            let child = find_meta(&store, t_type, &def.name).expect("child meta node");
            for parent_id in &def.parent_ids {
                let parent_name = registry
                    .get_type(*parent_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                let Some(parent) = find_meta(&store, t_type, &parent_name) else {
                    continue;
                };
                let exists = store
                    .edges_at(extends, 0, EntityId::Node(child))
                    .into_iter()
                    .any(|edge_id| {
                        store
                            .get_edge(edge_id)
                            .map(|e| e.targets.get(1) == Some(&EntityId::Node(parent)))
                            .unwrap_or(false)
                    });
                if !exists {
                    let edge = mew_core::Edge::new(
                        self.ids.alloc_edge_id(),
                        extends,
                        vec![child.into(), parent.into()],
                        mew_core::Attributes::new(),
                    );
                    store.insert_edge(edge.clone())?;
                    pending.push(WalEntry::EdgeInsert { txn: txn_id, edge });
                }
            }
        }

        if !pending.is_empty() {
            journal.append(WalEntry::Begin { txn: txn_id })?;
            for entry in pending {
                journal.append(entry)?;
            }
            journal.append(WalEntry::Commit { txn: txn_id })?;
            journal.sync()?;
        }
        Ok(())
    }

    // ==================== Transactions ====================

    pub fn alloc_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn begin(&self, isolation: IsolationLevel, explicit: bool) -> Transaction {
        Transaction::new(
            self.alloc_txn_id(),
            isolation,
            self.commit_seq.load(Ordering::Acquire),
            explicit,
        )
    }

    /// Record what an observation read, for serializable validation.
    pub fn note_reads(&self, txn: &mut Transaction, trace: &ReadTrace) {
        if txn.isolation != IsolationLevel::Serializable {
            return;
        }
        for type_id in &trace.node_types {
            txn.read_set.note_type(*type_id);
        }
        for edge_type in &trace.edge_types {
            txn.read_set.note_edge_type(*edge_type);
        }
        for entity in &trace.entities {
            txn.read_set.note_entity(*entity);
        }
    }

    /// The commit protocol: deferred constraints, serializable read-set
    /// validation, WAL append + fsync, store apply under the write lock,
    /// commit-log publication.
    pub fn commit(&self, mut txn: Transaction) -> SessionResult<Vec<String>> {
        let registry = self.registry.load_full();
        {
            let store = self.store.read();
            let evaluator = mew_pattern::Evaluator::new(&registry).with_clock(self.clock.clone());
            let ctx = mew_mutation::MutationCtx::new(
                &registry,
                &store,
                &self.ids,
                &evaluator,
                &self.limits,
            );
            txn.prepare_commit(&ctx).map_err(SessionError::from)?;
        }

        if txn.is_read_only() {
            return Ok(collect_warnings(&txn));
        }

        // Optimistic serializable validation against transactions that
        // committed after this one began.
        if txn.isolation == IsolationLevel::Serializable && !txn.read_set.is_empty() {
            let log = self.commit_log.lock();
            for footprint in log.iter().filter(|f| f.seq > txn.start_seq) {
                let type_hit = footprint
                    .node_types
                    .iter()
                    .any(|t| txn.read_set.type_ids.contains(t))
                    || footprint
                        .edge_types
                        .iter()
                        .any(|t| txn.read_set.edge_type_ids.contains(t));
                let entity_hit = footprint
                    .entities
                    .iter()
                    .any(|e| txn.read_set.entity_ids.contains(e));
                if type_hit || entity_hit {
                    return Err(mew_transaction::TxnError::CommitConflict {
                        reason: format!(
                            "transaction {} read state committed concurrently (seq {})",
                            txn.id, footprint.seq
                        ),
                    }
                    .into());
                }
            }
        }

        let ops = txn.effective_ops();
        let entries = txn.wal_entries();

        // WAL first, fsynced before anything becomes visible.
        {
            let mut journal = self.journal.lock();
            journal.append(WalEntry::Begin { txn: txn.id })?;
            for entry in entries {
                journal.append(entry)?;
            }
            journal.append(WalEntry::Commit { txn: txn.id })?;
            journal.sync()?;
        }

        // Apply under the commit barrier; indexes update in lockstep.
        {
            let mut store = self.store.write();
            apply_ops(&mut store, &ops).map_err(SessionError::from)?;
        }

        // Footprints are numbered past the begin-time watermark, so a
        // transaction that began at watermark W conflicts exactly with
        // footprints W+1 and later.
        let seq = self.commit_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let mut log = self.commit_log.lock();
        log.push(CommitFootprint {
            seq,
            node_types: txn.touched.node_types(),
            edge_types: txn.touched.edge_types(),
            entities: txn
                .touched
                .nodes
                .iter()
                .map(|(id, _)| EntityId::Node(*id))
                .chain(txn.touched.edges.iter().map(|(id, _)| EntityId::Edge(*id)))
                .collect(),
        });

        tracing::debug!(txn = txn.id, seq, "transaction committed");
        Ok(collect_warnings(&txn))
    }

    /// Rollback: an abort record (no fsync needed), then drop the buffer.
    pub fn rollback(&self, txn: Transaction) -> SessionResult<()> {
        if !txn.is_read_only() {
            let mut journal = self.journal.lock();
            journal.append(WalEntry::Abort { txn: txn.id })?;
        }
        tracing::debug!(txn = txn.id, "transaction rolled back");
        Ok(())
    }

    // ==================== Maintenance ====================

    /// Fold the log into a snapshot and truncate it.
    pub fn checkpoint(&self) -> SessionResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let store = self.store.read();
        let mut journal = self.journal.lock();
        let last_lsn = journal.last_lsn();

        let snapshot = Snapshot::capture(&store, &self.ids, last_lsn);
        write_snapshot(&dir.join(SNAPSHOT_FILE), &snapshot)?;
        journal.append(WalEntry::Checkpoint { last_lsn })?;
        journal.sync()?;
        journal.truncate_through(last_lsn)?;
        tracing::info!(last_lsn, "checkpoint written");
        Ok(())
    }

    pub fn wal_lsn(&self) -> u64 {
        self.journal.lock().last_lsn()
    }
}

fn collect_warnings(txn: &Transaction) -> Vec<String> {
    txn.warnings
        .iter()
        .map(|w| format!("{}: {}", w.constraint_name, w.message))
        .collect()
}

fn io_error(e: std::io::Error) -> SessionError {
    SessionError(mew_core::EngineError::storage(
        mew_core::codes::WAL_WRITE,
        e.to_string(),
    ))
}
