//! Protoschema core: schema assembly for a protocol-definition compiler.
//!
//! This crate takes parsed `.proto` ASTs from a caller-supplied parser and
//! turns them into an immutable, fully-linked [`Schema`].  On top of that
//! snapshot it provides reachability pruning, manifest-driven partitioning
//! into build modules, and a type relocation pass that repairs imports.
//!
//! Everything here is a pure transformation from one `Schema` to another;
//! only the loader touches the filesystem.

pub mod diagnostics;
pub mod errors;
pub mod graph;
pub mod loader;
pub mod models;
pub mod partition;
pub mod prune;
pub mod refactor;
pub mod schema;

#[cfg(test)]
mod testing;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use diagnostics::ErrorCollector;
pub use errors::{SchemaError, SchemaResult};
pub use graph::find_cycles;
pub use loader::{load, LoadOptions, ProtoParser, SchemaLoader};
pub use models::{Location, ProtoFile, ProtoMember, ProtoType};
pub use partition::{Manifest, Module, Partitioned};
pub use prune::{Pruned, PruningRules};
pub use refactor::{Move, TypeMover};
pub use schema::Schema;
