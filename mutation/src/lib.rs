//! MEW Mutation Executor
//!
//! The five transformation primitives. Every primitive validates first,
//! then writes to the transaction buffer; nothing touches the committed
//! store until the transaction manager applies the buffer at commit.

mod error;
pub mod ops;
mod result;
pub mod validation;

pub use error::{MutationError, MutationResult};
pub use result::{MutationEffects, TouchSet};

use mew_core::EngineLimits;
use mew_graph::{Graph, IdGen};
use mew_pattern::Evaluator;
use mew_registry::Registry;

/// Everything a primitive needs besides the buffer it writes to.
pub struct MutationCtx<'a> {
    pub registry: &'a Registry,
    /// Committed store; reads go through a `TxnView` over this plus the
    /// buffer, never directly.
    pub graph: &'a Graph,
    pub ids: &'a IdGen,
    pub evaluator: &'a Evaluator<'a>,
    pub limits: &'a EngineLimits,
}

impl<'a> MutationCtx<'a> {
    pub fn new(
        registry: &'a Registry,
        graph: &'a Graph,
        ids: &'a IdGen,
        evaluator: &'a Evaluator<'a>,
        limits: &'a EngineLimits,
    ) -> Self {
        Self {
            registry,
            graph,
            ids,
            evaluator,
            limits,
        }
    }
}
