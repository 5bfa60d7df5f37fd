//! Splitting one schema into per-module schemas.
//!
//! Modules are pruned in dependency order. Each module's closure treats
//! every type produced by its (transitive) dependencies as upstream, so a
//! type lands in the first module along a dependency chain that reaches it.
//! An enclosing message kept only as a shell around a nested type is not
//! produced by that module; a downstream module reaching it emits its
//! fields.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::diagnostics::ErrorCollector;
use crate::errors::SchemaResult;
use crate::models::ProtoType;
use crate::prune::{prune, Pruned, PruningRules};
use crate::schema::Schema;

use super::manifest::Manifest;

/// Per-module results, in topological order.
#[derive(Debug)]
pub struct Partitioned {
    pub modules: IndexMap<String, Pruned>,
}

impl Partitioned {
    pub fn get(&self, module: &str) -> Option<&Pruned> {
        self.modules.get(module)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &String> {
        self.modules.keys()
    }

    /// Module producing `ty`. Sibling modules with no dependency between
    /// them may both produce a type; the first in order is returned.
    pub fn owner_of(&self, ty: &ProtoType) -> Option<&str> {
        self.modules
            .iter()
            .find(|(_, pruned)| pruned.produced.contains(ty))
            .map(|(name, _)| name.as_str())
    }

    /// Types produced by more than one module, each with its producers in
    /// module order.
    pub fn overlaps(&self) -> BTreeMap<ProtoType, Vec<String>> {
        let mut producers: BTreeMap<ProtoType, Vec<String>> = BTreeMap::new();
        for (name, pruned) in &self.modules {
            for ty in &pruned.produced {
                producers.entry(ty.clone()).or_default().push(name.clone());
            }
        }
        producers.retain(|_, modules| modules.len() > 1);
        producers
    }

    /// Warnings for every module, prefixed with its name, then one per
    /// type generated by several modules.
    pub fn report(&self, errors: &mut ErrorCollector) {
        for (name, pruned) in &self.modules {
            for warning in pruned.warnings() {
                errors.add_warning(format!("module {name}: {warning}"));
            }
        }
        for (ty, modules) in self.overlaps() {
            let quoted: Vec<String> = modules.iter().map(|m| format!("`{m}`")).collect();
            let producers = match quoted.as_slice() {
                [first, second] => format!("both {first} and {second}"),
                _ => quoted.join(", "),
            };
            errors.add_warning(format!(
                "`{ty}` is generated by {producers}; move it into a common dependency"
            ));
        }
    }
}

/// Prunes `schema` once per manifest module. The manifest is validated
/// first; a cyclic or dangling manifest fails before any pruning runs.
pub fn partition(schema: &Schema, manifest: &Manifest) -> SchemaResult<Partitioned> {
    let order = manifest.topological_order()?;
    let mut produced: BTreeMap<String, BTreeSet<ProtoType>> = BTreeMap::new();
    let mut modules = IndexMap::with_capacity(order.len());

    for name in order {
        let Some(module) = manifest.modules.get(&name) else {
            continue;
        };
        let upstream: BTreeSet<ProtoType> = manifest
            .transitive_dependencies(&name)
            .iter()
            .filter_map(|dependency| produced.get(dependency))
            .flat_map(|types| types.iter().cloned())
            .collect();
        let rules = PruningRules::builder()
            .add_roots(module.roots.iter().cloned())
            .add_prunes(module.prunes.iter().cloned())
            .upstream(upstream.iter().cloned())
            .build();
        let pruned = prune(schema, &rules)?;
        debug!(
            "module {name}: {} upstream, {} produced",
            upstream.len(),
            pruned.produced.len()
        );
        produced.insert(name.clone(), pruned.produced.clone());
        modules.insert(name, pruned);
    }

    let partitioned = Partitioned { modules };
    let overlapping = partitioned.overlaps().len();
    if overlapping > 0 {
        debug!("{overlapping} types are produced by more than one module");
    }
    info!("partitioned schema into {} modules", partitioned.modules.len());
    Ok(partitioned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SchemaError;
    use crate::partition::manifest::Module;
    use crate::testing::{field_names, link, message, parse, type_names};

    fn chain() -> Schema {
        link(vec![
            parse(
                "acme/a.proto",
                "package acme; import \"acme/b.proto\"; message A { B b = 1; int32 n = 2; }",
            ),
            parse(
                "acme/b.proto",
                "package acme; import \"acme/c.proto\"; message B { C c = 1; string s = 2; }",
            ),
            parse("acme/c.proto", "package acme; message C { string s = 1; }"),
            parse("acme/d.proto", "package acme; message D { string s = 1; }"),
        ])
    }

    #[test]
    fn dependencies_own_their_types() {
        let manifest = Manifest::new()
            .with_module("common", Module::new().with_root("acme.B"))
            .with_module(
                "feature",
                Module::new().with_dependency("common").with_root("acme.A"),
            );
        let partitioned = chain().partition(&manifest).unwrap();

        let common = partitioned.get("common").unwrap();
        assert_eq!(type_names(&common.schema), vec!["acme.B", "acme.C"]);

        let feature = partitioned.get("feature").unwrap();
        assert_eq!(type_names(&feature.schema), vec!["acme.A"]);
        assert_eq!(field_names(message(&feature.schema, "acme.A")), vec!["b", "n"]);
        assert_eq!(
            partitioned.owner_of(&ProtoType::get("acme.C")),
            Some("common")
        );
    }

    #[test]
    fn chained_modules_are_disjoint_and_cover_the_roots() {
        let manifest = Manifest::new()
            .with_module(
                "feature",
                Module::new().with_dependency("mid").with_root("acme.A"),
            )
            .with_module(
                "mid",
                Module::new().with_dependency("common").with_root("acme.B"),
            )
            .with_module("common", Module::new().with_root("acme.C"));
        let schema = chain();
        let partitioned = schema.partition(&manifest).unwrap();
        let names: Vec<&String> = partitioned.module_names().collect();
        assert_eq!(names, vec!["common", "mid", "feature"]);

        let mut seen = BTreeSet::new();
        for pruned in partitioned.modules.values() {
            for ty in pruned.schema.types() {
                assert!(seen.insert(ty.clone()), "{ty} is owned twice");
            }
        }
        let whole = schema
            .prune(&PruningRules::new(["acme.A", "acme.B", "acme.C"], Vec::<String>::new()))
            .unwrap();
        let expected: BTreeSet<ProtoType> = whole.schema.types().cloned().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn wildcard_module_takes_the_rest() {
        let manifest = Manifest::new()
            .with_module("common", Module::new().with_root("acme.B"))
            .with_module("rest", Module::new().with_dependency("common"));
        let partitioned = chain().partition(&manifest).unwrap();
        assert_eq!(
            type_names(&partitioned.get("rest").unwrap().schema),
            vec!["acme.A", "acme.D"]
        );
    }

    #[test]
    fn prunes_are_not_inherited_downstream() {
        let schema = link(vec![parse(
            "acme/all.proto",
            "package acme; message A { B b = 1; C c = 2; } message B { C c = 1; } message C {}",
        )]);
        let manifest = Manifest::new()
            .with_module(
                "common",
                Module::new().with_root("acme.B").with_prune("acme.C"),
            )
            .with_module(
                "feature",
                Module::new().with_dependency("common").with_root("acme.A"),
            );
        let partitioned = schema.partition(&manifest).unwrap();

        let common = &partitioned.get("common").unwrap().schema;
        assert_eq!(type_names(common), vec!["acme.B"]);
        assert!(field_names(message(common, "acme.B")).is_empty());

        // C was pruned from common only; feature reaches it again.
        let feature = &partitioned.get("feature").unwrap().schema;
        assert_eq!(type_names(feature), vec!["acme.A", "acme.C"]);
    }

    #[test]
    fn shell_types_are_not_upstream() {
        let schema = link(vec![parse(
            "acme/outer.proto",
            r#"
            package acme;
            message Outer {
              string name = 1;
              message Inner { int32 x = 1; }
            }
            "#,
        )]);
        let manifest = Manifest::new()
            .with_module("common", Module::new().with_root("acme.Outer.Inner"))
            .with_module(
                "feature",
                Module::new().with_dependency("common").with_root("acme.Outer"),
            );
        let partitioned = schema.partition(&manifest).unwrap();

        let common = partitioned.get("common").unwrap();
        assert!(field_names(message(&common.schema, "acme.Outer")).is_empty());
        assert_eq!(
            common.produced,
            BTreeSet::from([ProtoType::get("acme.Outer.Inner")])
        );

        let feature = partitioned.get("feature").unwrap();
        let outer = message(&feature.schema, "acme.Outer");
        assert_eq!(field_names(outer), vec!["name"]);
        assert!(outer.nested.is_empty());
        assert_eq!(
            partitioned.owner_of(&ProtoType::get("acme.Outer")),
            Some("feature")
        );
        assert_eq!(
            partitioned.owner_of(&ProtoType::get("acme.Outer.Inner")),
            Some("common")
        );
        assert!(partitioned.overlaps().is_empty());
    }

    #[test]
    fn sibling_overlap_is_reported() {
        let manifest = Manifest::new()
            .with_module("a", Module::new().with_root("acme.C"))
            .with_module("b", Module::new().with_root("acme.C"));
        let partitioned = chain().partition(&manifest).unwrap();
        assert_eq!(
            partitioned.overlaps(),
            BTreeMap::from([(
                ProtoType::get("acme.C"),
                vec!["a".to_string(), "b".to_string()]
            )])
        );

        let mut errors = ErrorCollector::new();
        partitioned.report(&mut errors);
        assert!(errors.warnings().contains(
            &"`acme.C` is generated by both `a` and `b`; move it into a common dependency"
                .to_string()
        ));
    }

    #[test]
    fn cyclic_manifest_fails_before_pruning() {
        let manifest = Manifest::new()
            .with_module("one", Module::new().with_dependency("three"))
            .with_module("two", Module::new().with_dependency("one"))
            .with_module("three", Module::new().with_dependency("two"));
        let err = chain().partition(&manifest).unwrap_err();
        assert!(matches!(err, SchemaError::ModuleCycle { .. }));
        assert_eq!(err.to_string(), "`one`'s dependency on `three` forms a cycle");
    }

    #[test]
    fn undeclared_dependency_fails() {
        let manifest = Manifest::new().with_module("feature", Module::new().with_dependency("common"));
        assert!(matches!(
            chain().partition(&manifest).unwrap_err(),
            SchemaError::UnknownModule { .. }
        ));
    }

    #[test]
    fn identity_manifest_keeps_the_schema() {
        let schema = chain();
        let partitioned = schema.partition(&Manifest::identity()).unwrap();
        assert_eq!(partitioned.modules.len(), 1);
        let only = partitioned.get("./").unwrap();
        assert_eq!(only.schema.fingerprint().unwrap(), schema.fingerprint().unwrap());
    }

    #[test]
    fn unused_patterns_are_reported_per_module() {
        let manifest = Manifest::new()
            .with_module("common", Module::new().with_root("acme.C").with_root("acme.Gone"))
            .with_module(
                "feature",
                Module::new().with_dependency("common").with_root("acme.A"),
            );
        let partitioned = chain().partition(&manifest).unwrap();
        assert_eq!(
            partitioned.get("common").unwrap().rules.unused_roots(),
            vec!["acme.Gone"]
        );
        let mut errors = ErrorCollector::new();
        partitioned.report(&mut errors);
        assert!(errors
            .warnings()
            .contains(&"module common: unused root: acme.Gone".to_string()));
    }
}
