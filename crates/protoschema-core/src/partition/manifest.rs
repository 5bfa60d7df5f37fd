//! Module manifests: named modules with dependencies, roots and prunes.
//!
//! Authored as YAML or JSON, one entry per module:
//!
//! ```yaml
//! common:
//!   roots: [acme.common]
//! feature:
//!   dependencies: [common]
//!   roots: [acme.feature.Api]
//!   prunes: [acme.feature.Debug]
//! ```
//!
//! Unknown keys inside a module are rejected.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{SchemaError, SchemaResult};
use crate::graph::find_cycles;
use crate::prune::rules::{is_valid_pattern, WILDCARD};

/// Name of the single module in the identity manifest.
pub const IDENTITY_MODULE: &str = "./";

fn default_roots() -> BTreeSet<String> {
    BTreeSet::from([WILDCARD.to_string()])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Module {
    /// In declaration order.
    #[serde(default)]
    pub dependencies: IndexSet<String>,
    #[serde(default = "default_roots")]
    pub roots: BTreeSet<String>,
    #[serde(default)]
    pub prunes: BTreeSet<String>,
}

impl Default for Module {
    fn default() -> Self {
        Self {
            dependencies: IndexSet::new(),
            roots: default_roots(),
            prunes: BTreeSet::new(),
        }
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(mut self, module: impl Into<String>) -> Self {
        self.dependencies.insert(module.into());
        self
    }

    /// Adds a root. The first explicit root replaces the default `*`.
    pub fn with_root(mut self, pattern: impl Into<String>) -> Self {
        if self.roots == default_roots() {
            self.roots.clear();
        }
        self.roots.insert(pattern.into());
        self
    }

    pub fn with_prune(mut self, pattern: impl Into<String>) -> Self {
        self.prunes.insert(pattern.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    /// Modules in declaration order.
    pub modules: IndexMap<String, Module>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// One module keeping everything: no partitioning.
    pub fn identity() -> Self {
        Self::new().with_module(IDENTITY_MODULE, Module::default())
    }

    pub fn is_identity(&self) -> bool {
        self.modules.len() == 1
            && self
                .modules
                .get(IDENTITY_MODULE)
                .is_some_and(|m| *m == Module::default())
    }

    pub fn with_module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn from_yaml(document: &str) -> SchemaResult<Self> {
        let manifest: Manifest = serde_yaml::from_str(document)?;
        manifest.check_not_empty()?;
        Ok(manifest)
    }

    pub fn from_json(document: &str) -> SchemaResult<Self> {
        let manifest: Manifest = serde_json::from_str(document)?;
        manifest.check_not_empty()?;
        Ok(manifest)
    }

    fn check_not_empty(&self) -> SchemaResult<()> {
        if self.modules.is_empty() {
            return Err(SchemaError::InvalidManifest("no modules declared".into()));
        }
        Ok(())
    }

    /// Every module-graph cycle, as produced by the cycle detector over
    /// modules in declaration order.
    pub fn module_cycles(&self) -> Vec<Vec<String>> {
        find_cycles(self.modules.keys().cloned(), |name| {
            self.modules
                .get(name)
                .map(|m| m.dependencies.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })
    }

    /// Fails on a malformed root or prune pattern, on a dependency naming
    /// an undeclared module, then on any cycle. The cycle message names one edge: the earliest-declared
    /// module of the earliest cycle and its first dependency inside it.
    pub fn validate(&self) -> SchemaResult<()> {
        for (name, module) in &self.modules {
            if let Some(pattern) = module
                .roots
                .iter()
                .chain(module.prunes.iter())
                .find(|p| !is_valid_pattern(p))
            {
                return Err(SchemaError::InvalidManifest(format!(
                    "module `{name}` has malformed pattern `{pattern}`"
                )));
            }
            if let Some(dependency) = module
                .dependencies
                .iter()
                .find(|d| !self.modules.contains_key(*d))
            {
                return Err(SchemaError::UnknownModule {
                    module: name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let cycles = self.module_cycles();
        if cycles.is_empty() {
            return Ok(());
        }
        let position = |name: &String| self.modules.get_index_of(name).unwrap_or(usize::MAX);
        let first = cycles
            .iter()
            .min_by_key(|cycle| cycle.iter().map(position).min().unwrap_or(usize::MAX));
        let message = match first.and_then(|cycle| {
            let members: BTreeSet<&String> = cycle.iter().collect();
            let from = cycle.iter().min_by_key(|name| position(*name))?;
            let to = self.modules.get(from)?.dependencies.iter().find(|d| members.contains(d))?;
            Some(format!("`{from}`'s dependency on `{to}` forms a cycle"))
        }) {
            Some(message) => message,
            None => "module dependencies form a cycle".to_string(),
        };
        Err(SchemaError::ModuleCycle { message, cycles })
    }

    /// Modules ordered so every module follows its dependencies; among
    /// modules that are ready at the same time, declaration order wins.
    pub fn topological_order(&self) -> SchemaResult<Vec<String>> {
        self.validate()?;
        let mut done: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.modules.len());
        while order.len() < self.modules.len() {
            let next = self.modules.iter().find(|(name, module)| {
                !done.contains(name.as_str())
                    && module.dependencies.iter().all(|d| done.contains(d.as_str()))
            });
            match next {
                Some((name, _)) => {
                    done.insert(name.as_str());
                    order.push(name.clone());
                }
                None => {
                    return Err(SchemaError::ModuleCycle {
                        message: "module dependencies form a cycle".into(),
                        cycles: self.module_cycles(),
                    })
                }
            }
        }
        debug!("module order: {}", order.join(", "));
        Ok(order)
    }

    /// Every module `name` depends on, directly or not.
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&String> = self
            .modules
            .get(name)
            .map(|m| m.dependencies.iter().collect())
            .unwrap_or_default();
        while let Some(dependency) = pending.pop() {
            if seen.insert(dependency.clone()) {
                if let Some(module) = self.modules.get(dependency) {
                    pending.extend(module.dependencies.iter());
                }
            }
        }
        seen
    }
}
