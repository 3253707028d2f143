//! One connection's statement loop.

use crate::result::{
    MutationCounts, MutationOutcome, QueryOutcome, StatementOutcome, TxnAction, TxnOutcome,
};
use crate::{Database, SessionError, SessionResult};
use indexmap::IndexMap;
use mew_analyzer::{Analyzer, VarType};
use mew_core::{EdgeId, EntityId, ErrorCategory, NodeId, Value};
use mew_graph::{GraphRead, TxnView};
use mew_mutation::MutationCtx;
use mew_parser::{
    parse_stmt, parse_stmts, InspectStmt, IsolationLevel, MatchMutateStmt, MutationAction,
    ReturningClause, ShowKind, ShowStmt, Stmt, Target, TargetRef, TxnStmt,
};
use mew_pattern::{Binding, Bindings, Evaluator};
use mew_query::{execute_walk, QueryExecutor, QueryPlanner};
use mew_registry::Registry;
use mew_transaction::Transaction;
use std::sync::Arc;

const DRY_RUN_SAVEPOINT: &str = "__dry_run__";

/// A session: independent statement loop over a shared [`Database`].
pub struct Session {
    db: Arc<Database>,
    id: u64,
    /// The in-flight explicit transaction, with the registry it began
    /// under (EXTEND republications do not affect it).
    txn: Option<(Transaction, Arc<Registry>)>,
    /// Name bindings carried across statements (`SPAWN t: ...` binds `t`).
    bindings: IndexMap<String, EntityId>,
    /// `$param` values.
    params: IndexMap<String, Value>,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        let id = db.alloc_session_id();
        Self {
            db,
            id,
            txn: None,
            bindings: IndexMap::new(),
            params: IndexMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    pub fn binding(&self, name: &str) -> Option<EntityId> {
        self.bindings.get(name).copied()
    }

    /// Parse, analyze and execute one statement.
    pub fn execute(&mut self, source: &str) -> SessionResult<StatementOutcome> {
        let stmt = parse_stmt(source)?;
        self.execute_stmt(&stmt)
    }

    /// Execute a multi-statement script, stopping at the first error.
    pub fn execute_script(&mut self, source: &str) -> SessionResult<Vec<StatementOutcome>> {
        let stmts = parse_stmts(source)?;
        let mut outcomes = Vec::with_capacity(stmts.len());
        for stmt in &stmts {
            outcomes.push(self.execute_stmt(stmt)?);
        }
        Ok(outcomes)
    }

    pub fn execute_stmt(&mut self, stmt: &Stmt) -> SessionResult<StatementOutcome> {
        self.analyze(stmt)?;

        match stmt {
            Stmt::Match(_) | Stmt::Walk(_) | Stmt::MatchWalk(_) => self.run_observation(stmt),
            Stmt::Inspect(inspect) => self.run_inspect(inspect),
            Stmt::Show(show) => self.run_show(show),
            Stmt::Explain(explain) => self.run_explain(&explain.statement),
            Stmt::Profile(profile) => self.execute_stmt(&profile.statement),
            Stmt::Txn(txn_stmt) => self.run_txn_control(txn_stmt),
            Stmt::Ontology(ontology) => {
                if ontology.extend {
                    self.db.extend_ontology_items(&ontology.items, &render_ontology(ontology))?;
                } else {
                    self.db.load_ontology_items(&ontology.items, &render_ontology(ontology))?;
                }
                Ok(StatementOutcome::Mutation(MutationOutcome {
                    success: true,
                    ..Default::default()
                }))
            }
            Stmt::CreateIndex(index) => self.run_create_index(index, true),
            Stmt::DropIndex(index) => self.run_create_index(index, false),
            Stmt::DryRun(dry) => self.run_dry(&dry.statement),
            Stmt::Versioning(v) => Err(SessionError::unsupported(match v.kind {
                mew_parser::VersioningKind::Snapshot => "SNAPSHOT",
                mew_parser::VersioningKind::Checkout => "CHECKOUT",
                mew_parser::VersioningKind::Diff => "DIFF",
                mew_parser::VersioningKind::Branch => "BRANCH",
                mew_parser::VersioningKind::Merge => "MERGE",
            })),
            Stmt::Spawn(_)
            | Stmt::Kill(_)
            | Stmt::Link(_)
            | Stmt::Unlink(_)
            | Stmt::Set(_)
            | Stmt::MatchMutate(_) => self.run_transformation(stmt),
        }
    }

    // ==================== Analysis ====================

    fn analyze(&self, stmt: &Stmt) -> SessionResult<()> {
        let registry = self.current_registry();
        let store = self.db.store().read();

        // Session bindings participate in name resolution with their
        // current runtime types.
        let mut session_vars = Vec::new();
        for (name, entity) in &self.bindings {
            let var_type = match entity {
                EntityId::Node(id) => store
                    .get_node(*id)
                    .map(|n| VarType::Node(n.type_id))
                    .unwrap_or(VarType::AnyNode),
                EntityId::Edge(id) => store
                    .get_edge(*id)
                    .map(|e| VarType::Edge(e.type_id))
                    .unwrap_or(VarType::AnyEdge),
            };
            session_vars.push((name.clone(), var_type));
        }
        drop(store);

        let mut analyzer = Analyzer::with_session_vars(&registry, &session_vars);
        analyzer.analyze_stmt(stmt)?;
        Ok(())
    }

    fn current_registry(&self) -> Arc<Registry> {
        match &self.txn {
            Some((_, registry)) => registry.clone(),
            None => self.db.registry(),
        }
    }

    fn evaluator<'r>(&self, registry: &'r Registry) -> Evaluator<'r> {
        Evaluator::new(registry)
            .with_clock(self.db.clock())
            .with_params(self.params.clone())
    }

    fn pattern_bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        for (name, entity) in &self.bindings {
            bindings.insert(name.clone(), Binding::from(*entity));
        }
        bindings
    }

    // ==================== Observations ====================

    fn run_observation(&mut self, stmt: &Stmt) -> SessionResult<StatementOutcome> {
        let registry = self.current_registry();
        let evaluator = self.evaluator(&registry);
        let store = self.db.store().read();
        let limits = self.db.limits().clone();

        let (outcome, trace) = {
            let buffer_view;
            let view: &dyn GraphRead = match &self.txn {
                Some((txn, _)) => {
                    buffer_view = TxnView::new(&store, &txn.buffer);
                    &buffer_view
                }
                None => &*store,
            };

            let session_bindings = self.pattern_bindings();
            match stmt {
                Stmt::Match(m) => {
                    // Pattern variables are fresh: a MATCH variable named
                    // like a session binding shadows it rather than being
                    // narrowed by it.
                    let executor = QueryExecutor::new(&registry, view)
                        .with_evaluator(evaluator.clone())
                        .with_limits(limits);
                    let output = executor.execute_match_with(m, None)?;
                    let trace = output.trace.clone();
                    (QueryOutcome::from(output), trace)
                }
                Stmt::Walk(w) => {
                    let output = execute_walk(
                        &registry,
                        view,
                        &evaluator,
                        self.db.limits(),
                        w,
                        Some(&session_bindings),
                    )?;
                    let trace = output.trace.clone();
                    (QueryOutcome::from(output), trace)
                }
                Stmt::MatchWalk(mw) => {
                    // Run the match, then the walk once per binding row,
                    // unioning results.
                    let executor = QueryExecutor::new(&registry, view)
                        .with_evaluator(evaluator.clone())
                        .with_limits(limits);
                    let match_stmt = mew_parser::MatchStmt {
                        pattern: mw.pattern.clone(),
                        where_clause: mw.where_clause.clone(),
                        return_clause: mew_parser::ReturnClause {
                            distinct: false,
                            projections: first_var_projection(&mw.pattern),
                            span: mw.span,
                        },
                        order_by: None,
                        limit: None,
                        offset: None,
                        timeout_ms: None,
                        span: mw.span,
                    };
                    let rows = executor.execute_match_with(&match_stmt, None)?;
                    let trace = rows.trace.clone();

                    let mut merged = QueryOutcome::default();
                    let mut seen = indexmap::IndexSet::new();
                    for row in &rows.rows {
                        let Some(start) = row.first() else { continue };
                        let mut walk_bindings = session_bindings.clone();
                        if let Some(node) = start.as_node_ref() {
                            walk_bindings.insert("start", Binding::Node(node));
                        }
                        let mut walk_stmt = mw.walk.clone();
                        // FROM defaults to the matched variable when it
                        // names one bound by the pattern.
                        let output = execute_walk(
                            &registry,
                            view,
                            &evaluator,
                            self.db.limits(),
                            &mut_walk_from(&mut walk_stmt, start),
                            Some(&walk_bindings),
                        )?;
                        merged.columns = output.columns.clone();
                        for out_row in output.rows {
                            let key: Vec<String> =
                                out_row.iter().map(|v| v.group_key()).collect();
                            if seen.insert(key) {
                                merged.rows.push(out_row);
                            }
                        }
                    }
                    merged.stats.returned = merged.rows.len();
                    merged.stats.matches = merged.rows.len();
                    (merged, trace)
                }
                _ => unreachable!("observation dispatch"),
            }
        };
        drop(store);

        if let Some((txn, _)) = &mut self.txn {
            self.db.note_reads(txn, &trace);
        }
        Ok(StatementOutcome::Query(outcome))
    }

    fn run_inspect(&mut self, stmt: &InspectStmt) -> SessionResult<StatementOutcome> {
        let registry = self.current_registry();
        let store = self.db.store().read();
        let buffer_view;
        let view: &dyn GraphRead = match &self.txn {
            Some((txn, _)) => {
                buffer_view = TxnView::new(&store, &txn.buffer);
                &buffer_view
            }
            None => &*store,
        };

        let raw: Option<u64> = stmt.id.parse().ok();
        let mut outcome = QueryOutcome::default();

        // INSPECT never raises: an unknown id answers found = false.
        let found = raw.and_then(|raw| {
            if let Some(node) = view.node(NodeId::new(raw)) {
                let type_name = registry
                    .get_type(node.type_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "?".to_string());
                let mut columns = vec!["found".to_string(), "_id".to_string(), "_type".to_string()];
                let mut values = vec![
                    Value::Bool(true),
                    Value::NodeRef(node.id),
                    Value::String(type_name),
                ];
                for (attr, value) in &node.attributes {
                    columns.push(attr.clone());
                    values.push(value.clone());
                }
                Some((columns, values))
            } else if let Some(edge) = view.edge(EdgeId::new(raw)) {
                let type_name = registry
                    .get_edge_type(edge.type_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "?".to_string());
                let mut columns = vec![
                    "found".to_string(),
                    "_id".to_string(),
                    "_type".to_string(),
                    "targets".to_string(),
                ];
                let mut values = vec![
                    Value::Bool(true),
                    Value::EdgeRef(edge.id),
                    Value::String(type_name),
                    Value::List(
                        edge.targets
                            .iter()
                            .map(|t| match t {
                                EntityId::Node(n) => Value::NodeRef(*n),
                                EntityId::Edge(e) => Value::EdgeRef(*e),
                            })
                            .collect(),
                    ),
                ];
                for (attr, value) in &edge.attributes {
                    columns.push(attr.clone());
                    values.push(value.clone());
                }
                Some((columns, values))
            } else {
                None
            }
        });

        match found {
            Some((columns, values)) => {
                outcome.columns = columns;
                outcome.rows = vec![values];
            }
            None => {
                outcome.columns = vec!["found".to_string()];
                outcome.rows = vec![vec![Value::Bool(false)]];
            }
        }
        outcome.stats.returned = outcome.rows.len();
        Ok(StatementOutcome::Query(outcome))
    }

    fn run_show(&mut self, stmt: &ShowStmt) -> SessionResult<StatementOutcome> {
        let registry = self.current_registry();
        let store = self.db.store().read();
        let mut outcome = QueryOutcome::default();

        match stmt.kind {
            ShowKind::Types => {
                outcome.columns = vec![
                    "name".into(),
                    "abstract".into(),
                    "parents".into(),
                    "attributes".into(),
                ];
                for def in registry.all_types().filter(|t| !t.name.starts_with('_')) {
                    let parents: Vec<Value> = def
                        .parent_ids
                        .iter()
                        .filter_map(|id| registry.get_type(*id))
                        .map(|t| Value::String(t.name.clone()))
                        .collect();
                    outcome.rows.push(vec![
                        Value::String(def.name.clone()),
                        Value::Bool(def.is_abstract),
                        Value::List(parents),
                        Value::Int(registry.all_type_attrs(def.id).len() as i64),
                    ]);
                }
            }
            ShowKind::Edges => {
                outcome.columns = vec![
                    "name".into(),
                    "arity".into(),
                    "symmetric".into(),
                    "unique".into(),
                    "acyclic".into(),
                ];
                for def in registry.all_edge_types().filter(|t| !t.name.starts_with('_')) {
                    outcome.rows.push(vec![
                        Value::String(def.name.clone()),
                        Value::Int(def.arity() as i64),
                        Value::Bool(def.symmetric),
                        Value::Bool(def.unique),
                        Value::Bool(def.acyclic),
                    ]);
                }
            }
            ShowKind::Constraints => {
                outcome.columns = vec!["name".into(), "hard".into(), "deferred".into()];
                for def in registry.all_constraints() {
                    outcome.rows.push(vec![
                        Value::String(def.name.clone()),
                        Value::Bool(def.hard),
                        Value::Bool(matches!(
                            def.phase,
                            mew_registry::ConstraintPhase::Deferred
                        )),
                    ]);
                }
            }
            ShowKind::Rules => {
                outcome.columns = vec!["name".into(), "priority".into(), "auto".into()];
                for def in registry.all_rules() {
                    outcome.rows.push(vec![
                        Value::String(def.name.clone()),
                        Value::Int(def.priority),
                        Value::Bool(def.auto),
                    ]);
                }
            }
            ShowKind::Indexes => {
                outcome.columns = vec!["type".into(), "attribute".into()];
                for (type_id, attr) in store.attr_index_pairs() {
                    let type_name = registry
                        .get_type(type_id)
                        .map(|t| t.name.clone())
                        .unwrap_or_else(|| type_id.to_string());
                    if type_name.starts_with('_') {
                        continue;
                    }
                    outcome
                        .rows
                        .push(vec![Value::String(type_name), Value::String(attr)]);
                }
            }
            ShowKind::Statistics => {
                outcome.columns = vec!["metric".into(), "value".into()];
                outcome.rows.push(vec![
                    Value::String("nodes".into()),
                    Value::Int(store.node_count() as i64),
                ]);
                outcome.rows.push(vec![
                    Value::String("edges".into()),
                    Value::Int(store.edge_count() as i64),
                ]);
                for def in registry.all_types().filter(|t| !t.name.starts_with('_')) {
                    outcome.rows.push(vec![
                        Value::String(format!("nodes:{}", def.name)),
                        Value::Int(store.count_nodes_of_type(def.id) as i64),
                    ]);
                }
            }
            ShowKind::Status => {
                outcome.columns = vec!["field".into(), "value".into()];
                outcome.rows.push(vec![
                    Value::String("registry_version".into()),
                    Value::Int(registry.version() as i64),
                ]);
                outcome.rows.push(vec![
                    Value::String("in_transaction".into()),
                    Value::Bool(self.txn.is_some()),
                ]);
                outcome.rows.push(vec![
                    Value::String("wal_lsn".into()),
                    Value::Int(self.db.wal_lsn() as i64),
                ]);
            }
        }

        outcome.stats.returned = outcome.rows.len();
        Ok(StatementOutcome::Query(outcome))
    }

    fn run_explain(&mut self, stmt: &Stmt) -> SessionResult<StatementOutcome> {
        let registry = self.current_registry();
        let store = self.db.store().read();

        let text = match stmt {
            Stmt::Match(m) => {
                let planner = QueryPlanner::new(&registry);
                let plan = planner.plan_match(m, &*store)?;
                format!("{:#?}", plan.ops)
            }
            other => format!("no plan for {:?}", std::mem::discriminant(other)),
        };

        Ok(StatementOutcome::Query(QueryOutcome {
            columns: vec!["plan".to_string()],
            rows: vec![vec![Value::String(text)]],
            ..Default::default()
        }))
    }

    fn run_create_index(
        &mut self,
        stmt: &mew_parser::IndexStmt,
        create: bool,
    ) -> SessionResult<StatementOutcome> {
        let registry = self.current_registry();
        let type_id = registry
            .get_type_id(&stmt.type_name)
            .ok_or_else(|| SessionError::not_found(format!("unknown type '{}'", stmt.type_name)))?;

        let mut store = self.db.store().write();
        let changed = if create {
            let mut any = false;
            for concrete in registry.concrete_types_of(type_id) {
                any |= store.register_attr_index(concrete, &stmt.attr);
            }
            any
        } else {
            let mut any = false;
            for concrete in registry.concrete_types_of(type_id) {
                any |= store.drop_attr_index(concrete, &stmt.attr);
            }
            if !any {
                return Err(SessionError(mew_core::EngineError::new(
                    mew_core::codes::UNKNOWN_INDEX,
                    ErrorCategory::NotFound,
                    format!("no index on {}({})", stmt.type_name, stmt.attr),
                )));
            }
            true
        };

        Ok(StatementOutcome::Mutation(MutationOutcome {
            success: changed,
            ..Default::default()
        }))
    }

    // ==================== Transaction control ====================

    fn run_txn_control(&mut self, stmt: &TxnStmt) -> SessionResult<StatementOutcome> {
        match stmt {
            TxnStmt::Begin { isolation } => {
                if self.txn.is_some() {
                    return Err(mew_transaction::TxnError::AlreadyActive.into());
                }
                let isolation = isolation.unwrap_or(IsolationLevel::ReadCommitted);
                let txn = self.db.begin(isolation, true);
                let txn_id = txn.id;
                self.txn = Some((txn, self.db.registry()));
                Ok(StatementOutcome::Txn(TxnOutcome {
                    action: TxnAction::Begin,
                    txn_id,
                    success: true,
                }))
            }
            TxnStmt::Commit => {
                let (txn, _) = self
                    .txn
                    .take()
                    .ok_or(mew_transaction::TxnError::NoActiveTransaction)?;
                let txn_id = txn.id;
                self.db.commit(txn)?;
                Ok(StatementOutcome::Txn(TxnOutcome {
                    action: TxnAction::Commit,
                    txn_id,
                    success: true,
                }))
            }
            TxnStmt::Rollback => {
                let (txn, _) = self
                    .txn
                    .take()
                    .ok_or(mew_transaction::TxnError::NoActiveTransaction)?;
                let txn_id = txn.id;
                self.db.rollback(txn)?;
                Ok(StatementOutcome::Txn(TxnOutcome {
                    action: TxnAction::Rollback,
                    txn_id,
                    success: true,
                }))
            }
            TxnStmt::Savepoint(name) => {
                let (txn, _) = self
                    .txn
                    .as_mut()
                    .ok_or(mew_transaction::TxnError::NoActiveTransaction)?;
                txn.savepoint(name);
                let txn_id = txn.id;
                Ok(StatementOutcome::Txn(TxnOutcome {
                    action: TxnAction::Savepoint,
                    txn_id,
                    success: true,
                }))
            }
            TxnStmt::RollbackTo(name) => {
                let (txn, _) = self
                    .txn
                    .as_mut()
                    .ok_or(mew_transaction::TxnError::NoActiveTransaction)?;
                txn.rollback_to(name).map_err(SessionError::from)?;
                let txn_id = txn.id;
                Ok(StatementOutcome::Txn(TxnOutcome {
                    action: TxnAction::RollbackTo,
                    txn_id,
                    success: true,
                }))
            }
        }
    }

    // ==================== Transformations ====================

    fn run_transformation(&mut self, stmt: &Stmt) -> SessionResult<StatementOutcome> {
        let auto_commit = self.txn.is_none();
        if auto_commit {
            let txn = self.db.begin(IsolationLevel::ReadCommitted, false);
            self.txn = Some((txn, self.db.registry()));
        }

        let result = self.apply_transformation(stmt);

        match result {
            Ok(mut outcome) => {
                if auto_commit {
                    let (txn, _) = self.txn.take().expect("auto txn present");
                    match self.db.commit(txn) {
                        Ok(warnings) => outcome.warnings.extend(warnings),
                        Err(e) => return Err(e),
                    }
                }
                Ok(StatementOutcome::Mutation(outcome))
            }
            Err(e) => {
                // Constraint, limit and transaction failures abort the
                // whole transaction; statement-level errors (type,
                // not-found) only abort the statement inside an explicit
                // transaction.
                let aborts_txn = matches!(
                    e.category(),
                    ErrorCategory::ConstraintViolation
                        | ErrorCategory::LimitExceeded
                        | ErrorCategory::TransactionError
                        | ErrorCategory::StorageError
                        | ErrorCategory::Internal
                );
                if auto_commit || aborts_txn {
                    if let Some((txn, _)) = self.txn.take() {
                        let _ = self.db.rollback(txn);
                    }
                }
                Err(e)
            }
        }
    }

    fn apply_transformation(&mut self, stmt: &Stmt) -> SessionResult<MutationOutcome> {
        let registry = self.current_registry();
        let evaluator = self.evaluator(&registry);
        let store = self.db.store().read();
        let ctx = MutationCtx::new(
            &registry,
            &store,
            self.db.ids(),
            &evaluator,
            self.db.limits(),
        );

        let (txn, _) = self.txn.as_mut().expect("transaction active");
        let before = txn.counts();
        let session_bindings = {
            let mut bindings = Bindings::new();
            for (name, entity) in &self.bindings {
                bindings.insert(name.clone(), Binding::from(*entity));
            }
            bindings
        };

        let mut ids: Vec<EntityId> = Vec::new();
        let mut cascaded = 0usize;
        let mut new_bindings: Vec<(String, EntityId)> = Vec::new();
        let mut returning: Option<QueryOutcome> = None;

        match stmt {
            Stmt::Spawn(spawn) => {
                let effects = txn.run_spawn(&ctx, spawn, &session_bindings)?;
                for (item, id) in spawn.items.iter().zip(&effects.created_nodes) {
                    new_bindings.push((item.var.clone(), EntityId::Node(*id)));
                }
                ids.extend(effects.created_nodes.iter().map(|id| EntityId::Node(*id)));
                returning = build_returning(
                    &store,
                    txn,
                    &spawn.returning,
                    &ids,
                )?;
            }
            Stmt::Kill(kill) => {
                let victims = resolve_kill_victims(
                    &registry,
                    &store,
                    txn,
                    &evaluator,
                    &session_bindings,
                    &kill.target,
                    self.db.limits(),
                )?;
                ids.extend(victims.iter().map(|id| EntityId::Node(*id)));
                let effects = txn.run_kill(&ctx, victims, kill.override_)?;
                cascaded = effects.cascaded;
            }
            Stmt::Link(link) => {
                let mut targets = Vec::new();
                for target_ref in &link.targets {
                    let entity = match target_ref {
                        TargetRef::Var(name) => self
                            .bindings
                            .get(name)
                            .copied()
                            .ok_or_else(|| {
                                SessionError::invalid_target(format!(
                                    "unbound variable '{}'",
                                    name
                                ))
                            })?,
                        TargetRef::Id(id) => {
                            resolve_id(&store, txn, id)?
                        }
                        TargetRef::InlineSpawn(item) => {
                            let node = txn.run_inline_spawn(&ctx, item, &session_bindings)?;
                            new_bindings.push((item.var.clone(), EntityId::Node(node)));
                            EntityId::Node(node)
                        }
                    };
                    targets.push(entity);
                }

                let effects = txn.run_link(&ctx, link, targets, &session_bindings)?;
                let edge = effects
                    .created_edges
                    .first()
                    .copied()
                    .or(effects.existing_edge);
                if let Some(edge) = edge {
                    ids.push(EntityId::Edge(edge));
                    if let Some(var) = &link.var {
                        new_bindings.push((var.clone(), EntityId::Edge(edge)));
                    }
                }
                returning = build_returning(&store, txn, &link.returning, &ids)?;
            }
            Stmt::Unlink(unlink) => {
                let edge = resolve_edge_target(
                    &registry,
                    &store,
                    txn,
                    &self.bindings,
                    &unlink.target,
                )?;
                ids.push(EntityId::Edge(edge));
                txn.run_unlink(&ctx, edge)?;
            }
            Stmt::Set(set) => {
                let target = resolve_entity_target(&store, txn, &self.bindings, &set.target)?;
                ids.push(target);
                txn.run_set(&ctx, target, &set.assignments, &session_bindings)?;
                returning = build_returning(&store, txn, &set.returning, &ids)?;
            }
            Stmt::MatchMutate(compound) => {
                cascaded = apply_match_mutate(
                    &ctx,
                    txn,
                    &session_bindings,
                    &self.bindings,
                    compound,
                    &mut ids,
                )?;
            }
            _ => unreachable!("transformation dispatch"),
        }

        let (txn, _) = self.txn.as_mut().expect("transaction active");
        let after = txn.counts();
        let counts = MutationCounts {
            created: after.0.saturating_sub(before.0),
            deleted: after.1.saturating_sub(before.1),
            modified: after.2.saturating_sub(before.2),
            cascaded,
        };

        for (name, entity) in new_bindings {
            self.bindings.insert(name, entity);
        }

        Ok(MutationOutcome {
            success: true,
            ids,
            counts,
            returning,
            warnings: Vec::new(),
        })
    }


    // ==================== DRY RUN ====================

    fn run_dry(&mut self, inner: &Stmt) -> SessionResult<StatementOutcome> {
        if !inner.is_transformation() {
            // Observations are side-effect free; DRY RUN is a no-op shell.
            return self.execute_stmt(inner);
        }

        let standalone = self.txn.is_none();
        if standalone {
            let txn = self.db.begin(IsolationLevel::ReadCommitted, false);
            self.txn = Some((txn, self.db.registry()));
        } else {
            let (txn, _) = self.txn.as_mut().expect("transaction active");
            txn.savepoint(DRY_RUN_SAVEPOINT);
        }

        let result = self.apply_transformation(inner);

        if standalone {
            if let Some((txn, _)) = self.txn.take() {
                let _ = self.db.rollback(txn);
            }
        } else if let Some((txn, _)) = self.txn.as_mut() {
            txn.rollback_to(DRY_RUN_SAVEPOINT)
                .map_err(SessionError::from)?;
        }

        result.map(|mut outcome| {
            outcome
                .warnings
                .push("dry run: no changes were applied".to_string());
            StatementOutcome::Mutation(outcome)
        })
    }
}

/// `MATCH … <mutations>`: materialize the match, then run the mutation
/// list once per binding row.
fn apply_match_mutate(
    ctx: &MutationCtx<'_>,
    txn: &mut Transaction,
    session_bindings: &Bindings,
    session_entities: &IndexMap<String, EntityId>,
    compound: &MatchMutateStmt,
    ids: &mut Vec<EntityId>,
) -> SessionResult<usize> {
    // Materialize matches against the pre-statement view so the mutation
    // list sees a stable row set. Pattern variables are fresh; session
    // bindings resolve only inside the actions.
    let rows = {
        let view = TxnView::new(ctx.graph, &txn.buffer);
        let mut pattern =
            mew_pattern::CompiledPattern::compile(&compound.pattern, ctx.registry)?;
        if let Some(where_clause) = &compound.where_clause {
            pattern = pattern.with_filter(where_clause.clone());
        }
        let matcher =
            mew_pattern::Matcher::with_evaluator(ctx.registry, &view, ctx.evaluator.clone());
        matcher.find_all(&pattern)?
    };

    let mut cascaded = 0usize;
    for matched in rows {
        // Actions see the matched row over the session bindings.
        let mut row = session_bindings.clone();
        row.merge(&matched);
        for action in &compound.mutations {
            match action {
                MutationAction::Spawn(spawn) => {
                    let effects = txn.run_spawn(ctx, spawn, &row)?;
                    ids.extend(effects.created_nodes.iter().map(|id| EntityId::Node(*id)));
                }
                MutationAction::Link(link) => {
                    let mut targets = Vec::new();
                    for target_ref in &link.targets {
                        let entity = match target_ref {
                            TargetRef::Var(name) => row
                                .get(name)
                                .and_then(|b| b.as_entity())
                                .ok_or_else(|| {
                                    SessionError::invalid_target(format!(
                                        "unbound variable '{}'",
                                        name
                                    ))
                                })?,
                            TargetRef::Id(id) => resolve_id(ctx.graph, txn, id)?,
                            TargetRef::InlineSpawn(item) => {
                                EntityId::Node(txn.run_inline_spawn(ctx, item, &row)?)
                            }
                        };
                        targets.push(entity);
                    }
                    let effects = txn.run_link(ctx, link, targets, &row)?;
                    ids.extend(effects.created_edges.iter().map(|id| EntityId::Edge(*id)));
                }
                MutationAction::Set(set) => {
                    let target = match &set.target {
                        Target::Var(name) => row
                            .get(name)
                            .and_then(|b| b.as_entity())
                            .ok_or_else(|| {
                                SessionError::invalid_target(format!(
                                    "unbound variable '{}'",
                                    name
                                ))
                            })?,
                        Target::Id(id) => resolve_id(ctx.graph, txn, id)?,
                        _ => {
                            return Err(SessionError::invalid_target(
                                "SET in a compound statement takes a variable target",
                            ))
                        }
                    };
                    txn.run_set(ctx, target, &set.assignments, &row)?;
                }
                MutationAction::Kill(kill) => {
                    let victim = match &kill.target {
                        Target::Var(name) => row
                            .get(name)
                            .and_then(|b| b.as_node())
                            .ok_or_else(|| {
                                SessionError::invalid_target("KILL requires a node target")
                            })?,
                        Target::Id(id) => resolve_id(ctx.graph, txn, id)?
                            .as_node()
                            .ok_or_else(|| {
                                SessionError::invalid_target("KILL requires a node target")
                            })?,
                        _ => {
                            return Err(SessionError::invalid_target(
                                "KILL in a compound statement takes a variable target",
                            ))
                        }
                    };
                    // A victim may already be gone through an earlier
                    // row's cascade.
                    {
                        let view = TxnView::new(ctx.graph, &txn.buffer);
                        if view.node(victim).is_none() {
                            continue;
                        }
                    }
                    let effects = txn.run_kill(ctx, vec![victim], kill.override_)?;
                    cascaded += effects.cascaded;
                    ids.push(EntityId::Node(victim));
                }
                MutationAction::Unlink(unlink) => {
                    let edge = match &unlink.target {
                        Target::Var(name) => row
                            .get(name)
                            .and_then(|b| b.as_edge())
                            .ok_or_else(|| {
                                SessionError::invalid_target("UNLINK requires an edge target")
                            })?,
                        _ => resolve_edge_target(
                            ctx.registry,
                            ctx.graph,
                            txn,
                            session_entities,
                            &unlink.target,
                        )?,
                    };
                    {
                        let view = TxnView::new(ctx.graph, &txn.buffer);
                        if view.edge(edge).is_none() {
                            continue;
                        }
                    }
                    txn.run_unlink(ctx, edge)?;
                    ids.push(EntityId::Edge(edge));
                }
            }
        }
    }
    Ok(cascaded)
}

// ==================== Target resolution helpers ====================

fn resolve_id(
    store: &mew_graph::Graph,
    txn: &Transaction,
    id: &str,
) -> SessionResult<EntityId> {
    let raw: u64 = id
        .parse()
        .map_err(|_| SessionError::invalid_target(format!("invalid id '#{}'", id)))?;
    let view = TxnView::new(store, &txn.buffer);
    if view.node(NodeId::new(raw)).is_some() {
        Ok(EntityId::Node(NodeId::new(raw)))
    } else if view.edge(EdgeId::new(raw)).is_some() {
        Ok(EntityId::Edge(EdgeId::new(raw)))
    } else {
        Err(SessionError::not_found(format!("no entity with id #{}", id)))
    }
}

fn resolve_entity_target(
    store: &mew_graph::Graph,
    txn: &Transaction,
    bindings: &IndexMap<String, EntityId>,
    target: &Target,
) -> SessionResult<EntityId> {
    match target {
        Target::Var(name) => bindings
            .get(name)
            .copied()
            .ok_or_else(|| SessionError::invalid_target(format!("unbound variable '{}'", name))),
        Target::Id(id) => resolve_id(store, txn, id),
        _ => Err(SessionError::invalid_target(
            "this statement takes a variable or id target",
        )),
    }
}

/// KILL's target may be a deduplicated subquery result.
fn resolve_kill_victims(
    registry: &Registry,
    store: &mew_graph::Graph,
    txn: &Transaction,
    evaluator: &Evaluator<'_>,
    session_bindings: &Bindings,
    target: &Target,
    limits: &mew_core::EngineLimits,
) -> SessionResult<Vec<NodeId>> {
    match target {
        Target::Var(name) => {
            let entity = session_bindings
                .get(name)
                .and_then(|b| b.as_node())
                .ok_or_else(|| SessionError::invalid_target("KILL requires a node target"))?;
            Ok(vec![entity])
        }
        Target::Id(id) => {
            let entity = resolve_id(store, txn, id)?;
            entity
                .as_node()
                .map(|n| vec![n])
                .ok_or_else(|| SessionError::invalid_target("KILL requires a node target"))
        }
        Target::Pattern(subquery) => {
            let view = TxnView::new(store, &txn.buffer);
            let executor = QueryExecutor::new(registry, &view)
                .with_evaluator(evaluator.clone())
                .with_limits(limits.clone());
            let output = executor.execute_match_with(subquery, Some(session_bindings))?;

            let mut victims = Vec::new();
            for row in &output.rows {
                if let Some(node) = row.first().and_then(|v| v.as_node_ref()) {
                    victims.push(node);
                }
            }
            victims.sort();
            victims.dedup();
            Ok(victims)
        }
        Target::EdgePattern { .. } => {
            Err(SessionError::invalid_target("KILL requires a node target"))
        }
    }
}

/// UNLINK's target may identify the edge by endpoints.
fn resolve_edge_target(
    registry: &Registry,
    store: &mew_graph::Graph,
    txn: &Transaction,
    bindings: &IndexMap<String, EntityId>,
    target: &Target,
) -> SessionResult<EdgeId> {
    match target {
        Target::Var(name) => bindings
            .get(name)
            .and_then(|e| e.as_edge())
            .ok_or_else(|| SessionError::invalid_target("UNLINK requires an edge target")),
        Target::Id(id) => resolve_id(store, txn, id)?
            .as_edge()
            .ok_or_else(|| SessionError::invalid_target("UNLINK requires an edge target")),
        Target::EdgePattern { edge_type, targets } => {
            let def = registry
                .get_edge_type_by_name(edge_type)
                .ok_or_else(|| SessionError::not_found(format!("unknown edge type '{}'", edge_type)))?;

            let view = TxnView::new(store, &txn.buffer);
            let mut wanted: Vec<EntityId> = Vec::new();
            for name in targets {
                let entity = if let Some(id) = name.strip_prefix('#') {
                    resolve_id(store, txn, id)?
                } else {
                    bindings.get(name).copied().ok_or_else(|| {
                        SessionError::invalid_target(format!("unbound variable '{}'", name))
                    })?
                };
                wanted.push(entity);
            }

            let candidates = view.edges_at(def.id, 0, wanted[0]);
            for edge_id in candidates {
                if let Some(edge) = view.edge(edge_id) {
                    if edge.targets == wanted {
                        return Ok(edge_id);
                    }
                }
            }
            Err(SessionError::not_found(format!(
                "no live '{}' edge over those targets",
                edge_type
            )))
        }
        Target::Pattern(_) => Err(SessionError::invalid_target(
            "UNLINK takes an edge variable, id or endpoint pattern",
        )),
    }
}

/// Build a RETURNING projection over the statement's primary entities.
fn build_returning(
    store: &mew_graph::Graph,
    txn: &Transaction,
    returning: &Option<ReturningClause>,
    ids: &[EntityId],
) -> SessionResult<Option<QueryOutcome>> {
    let Some(clause) = returning else {
        return Ok(None);
    };
    let view = TxnView::new(store, &txn.buffer);
    let mut outcome = QueryOutcome::default();

    match clause {
        ReturningClause::Id => {
            outcome.columns = vec!["id".to_string()];
            for entity in ids {
                outcome.rows.push(vec![match entity {
                    EntityId::Node(n) => Value::NodeRef(*n),
                    EntityId::Edge(e) => Value::EdgeRef(*e),
                }]);
            }
        }
        ReturningClause::All => {
            // Columns from the first entity's attributes.
            for entity in ids {
                let (id_value, attrs) = match entity {
                    EntityId::Node(n) => {
                        let Some(node) = view.node(*n) else { continue };
                        (Value::NodeRef(*n), node.attributes.clone())
                    }
                    EntityId::Edge(e) => {
                        let Some(edge) = view.edge(*e) else { continue };
                        (Value::EdgeRef(*e), edge.attributes.clone())
                    }
                };
                if outcome.columns.is_empty() {
                    outcome.columns.push("id".to_string());
                    outcome.columns.extend(attrs.keys().cloned());
                }
                let mut row = vec![id_value];
                for column in outcome.columns.iter().skip(1) {
                    row.push(attrs.get(column).cloned().unwrap_or(Value::Null));
                }
                outcome.rows.push(row);
            }
        }
        ReturningClause::Fields(fields) => {
            outcome.columns = fields.clone();
            for entity in ids {
                let mut row = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = match entity {
                        EntityId::Node(n) => view.node_attr(*n, field),
                        EntityId::Edge(e) => view.edge_attr(*e, field),
                    };
                    row.push(value.unwrap_or(Value::Null));
                }
                outcome.rows.push(row);
            }
        }
    }

    outcome.stats.returned = outcome.rows.len();
    Ok(Some(outcome))
}

/// Render an inline ontology statement back to loadable source for the
/// durable ontology blob.
fn render_ontology(stmt: &mew_parser::OntologyStmt) -> String {
    mew_parser::render_ontology_items(&stmt.items)
}

/// Projection returning the first node variable of a pattern.
fn first_var_projection(pattern: &[mew_parser::PatternElem]) -> Vec<mew_parser::Projection> {
    let var = pattern
        .iter()
        .find_map(|elem| match elem {
            mew_parser::PatternElem::Node(n) => Some(n.var.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "_".to_string());
    vec![mew_parser::Projection {
        expr: mew_parser::Expr::Var(var, mew_parser::Span::default()),
        alias: None,
        span: mew_parser::Span::default(),
    }]
}

/// WALK FROM in the compound form follows the matched start.
fn mut_walk_from(walk: &mut mew_parser::WalkStmt, start: &Value) -> mew_parser::WalkStmt {
    if let Some(node) = start.as_node_ref() {
        walk.from = mew_parser::Expr::IdRef(node.raw().to_string(), mew_parser::Span::default());
    }
    walk.clone()
}
