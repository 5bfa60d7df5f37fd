//! Tree-shaking a schema down to what a set of roots reaches.

pub mod marks;
pub mod pruner;
pub mod rules;

pub use marks::MarkSet;
pub use pruner::{prune, Pruned, Pruner};
pub use rules::{is_valid_pattern, pattern_matches, PruningRules, PruningRulesBuilder, WILDCARD};

use crate::errors::SchemaResult;
use crate::schema::Schema;

impl Schema {
    /// The closed subset of this schema reachable from `rules`' roots,
    /// with prunes taking precedence over roots.
    pub fn prune(&self, rules: &PruningRules) -> SchemaResult<Pruned> {
        prune(self, rules)
    }
}
