//! Loading: source and search locations in, one linked [`Schema`] out.

pub mod builtins;
pub mod filesystem;
pub mod imports;
pub mod linker;
pub mod pipeline;

use crate::errors::SchemaResult;
use crate::models::{Location, ProtoFile};
use crate::schema::Schema;

pub use linker::Linker;
pub use pipeline::SchemaLoader;

pub const DEFAULT_LOAD_WORKERS: usize = 4;
pub const MAX_LOAD_WORKERS: usize = 64;

/// Turns proto source text into an AST. Implementations emit declarations
/// with fully-qualified names and leave references as written.
pub trait ProtoParser: Sync {
    fn parse(&self, location: &Location, source: &str) -> SchemaResult<ProtoFile>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load imports transitively. When false only the direct imports of
    /// source files (and what they re-export publicly) are loaded.
    pub exhaustive: bool,
    /// Threads used to read and parse files.
    pub workers: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            exhaustive: true,
            workers: DEFAULT_LOAD_WORKERS,
        }
    }
}

pub fn clamp_workers(workers: usize) -> usize {
    workers.clamp(1, MAX_LOAD_WORKERS)
}

impl LoadOptions {
    /// Defaults overridden by `PROTOSCHEMA_EXHAUSTIVE` and
    /// `PROTOSCHEMA_LOAD_WORKERS`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(val) = std::env::var("PROTOSCHEMA_EXHAUSTIVE") {
            let v = val.trim().to_lowercase();
            options.exhaustive = !matches!(v.as_str(), "0" | "false" | "no" | "off");
        }
        if let Ok(val) = std::env::var("PROTOSCHEMA_LOAD_WORKERS") {
            if let Ok(workers) = val.trim().parse::<usize>() {
                options.workers = clamp_workers(workers);
            }
        }
        options
    }
}

/// Load `sources` unconditionally and whatever their imports need from
/// `search`, returning one linked schema.
pub fn load<P: ProtoParser>(
    parser: &P,
    sources: &[Location],
    search: &[Location],
    exhaustive: bool,
) -> SchemaResult<Schema> {
    let options = LoadOptions {
        exhaustive,
        ..LoadOptions::default()
    };
    SchemaLoader::new(parser).with_options(options).load(sources, search)
}
