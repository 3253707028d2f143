//! MEW Registry
//!
//! Immutable schema repositories built by the compiler: node types, edge
//! types, constraints and rules, with precomputed subtype closure and
//! affected-type sets. Registries are shared read-only between sessions
//! and re-published by copy on EXTEND.

mod builder;
mod registry;
mod types;

pub use builder::{RegistryBuilder, RegistryError, RegistryResult};
pub use registry::Registry;
pub use types::*;
