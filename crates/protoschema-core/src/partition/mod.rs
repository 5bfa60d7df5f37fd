//! Module manifests and per-module partitioning.

pub mod manifest;
pub mod partitioner;

pub use manifest::{Manifest, Module, IDENTITY_MODULE};
pub use partitioner::{partition, Partitioned};

use crate::errors::SchemaResult;
use crate::schema::Schema;

impl Schema {
    pub fn partition(&self, manifest: &Manifest) -> SchemaResult<Partitioned> {
        partition(self, manifest)
    }
}
