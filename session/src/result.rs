//! Result envelopes, identical across transports.

use mew_core::{EntityId, TxnId, Value};
use mew_query::QueryStats;

/// Observation result: `{columns, rows, stats}`.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStats,
    pub warnings: Vec<String>,
}

impl From<mew_query::QueryOutput> for QueryOutcome {
    fn from(output: mew_query::QueryOutput) -> Self {
        Self {
            columns: output.columns,
            rows: output.rows,
            stats: output.stats,
            warnings: output.warnings,
        }
    }
}

/// Transformation counts: `{created, deleted, modified, cascaded}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
    pub created: usize,
    pub deleted: usize,
    pub modified: usize,
    pub cascaded: usize,
}

/// Transformation result.
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    pub success: bool,
    /// Ids the statement created or primarily affected.
    pub ids: Vec<EntityId>,
    pub counts: MutationCounts,
    pub returning: Option<QueryOutcome>,
    /// Soft-constraint reports and result-budget warnings.
    pub warnings: Vec<String>,
}

/// Transaction control result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnAction {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    RollbackTo,
}

#[derive(Debug, Clone, Copy)]
pub struct TxnOutcome {
    pub action: TxnAction,
    pub txn_id: TxnId,
    pub success: bool,
}

/// Every statement resolves to one of these.
#[derive(Debug, Clone)]
pub enum StatementOutcome {
    Query(QueryOutcome),
    Mutation(MutationOutcome),
    Txn(TxnOutcome),
}

impl StatementOutcome {
    pub fn as_query(&self) -> Option<&QueryOutcome> {
        match self {
            StatementOutcome::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_mutation(&self) -> Option<&MutationOutcome> {
        match self {
            StatementOutcome::Mutation(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_txn(&self) -> Option<&TxnOutcome> {
        match self {
            StatementOutcome::Txn(t) => Some(t),
            _ => None,
        }
    }
}
