//! Schema refactorings.

pub mod mover;

pub use mover::{move_types, Move, TypeMover};

use crate::errors::SchemaResult;
use crate::schema::Schema;

impl Schema {
    /// Apply `moves` in order and repair the imports of every touched file.
    pub fn move_types(&self, moves: impl IntoIterator<Item = Move>) -> SchemaResult<Schema> {
        move_types(self, moves)
    }
}
