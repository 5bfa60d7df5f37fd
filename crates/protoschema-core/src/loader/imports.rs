//! Import resolution against loaded sources, bundled files and search roots.

use std::collections::{BTreeMap, BTreeSet};

use crate::loader::builtins::is_builtin;
use crate::loader::filesystem::Root;
use crate::models::{Location, ProtoFile};

/// Where an import statement leads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportTarget {
    /// Already part of the load (a source file or an earlier resolution).
    Loaded,
    /// One of the bundled `google/protobuf` files.
    Builtin,
    /// Exactly one search root holds the file; `root` indexes the roots
    /// handed to the resolver.
    Found { root: usize, location: Location },
    /// Several distinct physical files match; carries their sorted paths.
    Ambiguous(Vec<String>),
    Missing,
}

pub struct ImportResolver<'a> {
    roots: &'a [Root],
}

impl<'a> ImportResolver<'a> {
    pub fn new(roots: &'a [Root]) -> Self {
        Self { roots }
    }

    /// Resolve `import` given the import paths already loaded. Every search
    /// root is consulted so ambiguity is never hidden by root order; the
    /// same physical file reached through two roots is not ambiguous.
    pub fn resolve(&self, import: &str, loaded: &BTreeSet<String>) -> ImportTarget {
        if loaded.contains(import) {
            return ImportTarget::Loaded;
        }
        if is_builtin(import) {
            return ImportTarget::Builtin;
        }

        let mut matches: BTreeMap<String, (usize, Location)> = BTreeMap::new();
        for (index, root) in self.roots.iter().enumerate() {
            if let Some(location) = root.find(import) {
                matches
                    .entry(root.physical_path(&location.path))
                    .or_insert((index, location));
            }
        }

        match matches.len() {
            0 => ImportTarget::Missing,
            1 => match matches.into_values().next() {
                Some((root, location)) => ImportTarget::Found { root, location },
                None => ImportTarget::Missing,
            },
            _ => ImportTarget::Ambiguous(matches.into_keys().collect()),
        }
    }

    pub fn missing_message(&self, import: &str, importer: &ProtoFile) -> String {
        missing_import_message(import, self.roots, &importer.location)
    }
}

/// `unable to find <import>, searching <n> proto paths: <roots>, for file <importer>`
pub fn missing_import_message(import: &str, roots: &[Root], importer: &Location) -> String {
    let bases: Vec<&str> = roots.iter().map(|r| r.base()).collect();
    format!(
        "unable to find {import}, searching {} proto paths: {}, for file {importer}",
        bases.len(),
        bases.join(", ")
    )
}

pub fn ambiguous_import_message(import: &str, paths: &[String], importer: &Location) -> String {
    format!(
        "ambiguous import {import} in {importer}, found at: {}",
        paths.join(", ")
    )
}

/// A bare file's path must end with the directories its package implies.
pub fn check_package_path(file: &ProtoFile) -> Result<(), String> {
    let expected = file.expected_path();
    let path = &file.location.path;
    if path == &expected || path.ends_with(&format!("/{expected}")) {
        Ok(())
    } else {
        Err(format!(
            "expected path ending with {expected} for file {path} declaring package {}",
            file.package.as_deref().unwrap_or("")
        ))
    }
}
