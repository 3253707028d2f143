//! MEW Graph Store
//!
//! The sole authority on entity existence. Stores nodes and edges keyed by
//! id, maintains the type/attribute/edge-position/adjacency/higher-order
//! indexes in lockstep with entity mutation, and exposes read views:
//! the committed [`Graph`] itself, and [`TxnView`] overlaying an open
//! transaction's buffer for read-your-writes.

mod buffer;
mod error;
mod index;
mod store;
mod view;

pub use buffer::{BufferOp, TxnBuffer, TxnBufferMark};
pub use error::{GraphError, GraphResult};
pub use index::IndexKey;
pub use store::{Graph, IdGen};
pub use view::{GraphRead, TxnView};
