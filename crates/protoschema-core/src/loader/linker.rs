//! Linking: rewrite every reference in a set of parsed files to its
//! fully-qualified form and index the result as a [`Schema`].
//!
//! Names resolve from the innermost enclosing scope outward, as in
//! protoc: a reference `Bar` inside `acme.Outer` tries `acme.Outer.Bar`,
//! then `acme.Bar`, then `Bar`. A leading `.` makes the name absolute.
//! Custom options `(a.b)` resolve to extension fields the same way.
//! Resolved declarations must be visible from the referencing file: the
//! same file, a direct import, or anything those re-export publicly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::ErrorCollector;
use crate::errors::{SchemaError, SchemaResult};
use crate::models::{
    EnumType, Extend, Field, MessageType, OptionElement, ProtoFile, ProtoMember, ProtoType,
    Service, TypeDecl,
};
use crate::schema::Schema;

/// Candidate fully-qualified names for `name` referenced inside `scope`,
/// innermost first.
fn candidates(scope: &str, name: &str) -> Vec<String> {
    if let Some(absolute) = name.strip_prefix('.') {
        return vec![absolute.to_string()];
    }
    let mut out = Vec::new();
    let mut current = scope;
    loop {
        if current.is_empty() {
            out.push(name.to_string());
            return out;
        }
        out.push(format!("{current}.{name}"));
        current = current.rsplit_once('.').map_or("", |(head, _)| head);
    }
}

#[derive(Default)]
struct SymbolTable {
    /// Fully-qualified type or service name to declaring import path.
    types: BTreeMap<String, String>,
    /// Qualified extension name to its member and declaring import path.
    extensions: BTreeMap<String, (ProtoMember, String)>,
}

impl SymbolTable {
    fn lookup_type(&self, scope: &str, name: &str) -> Option<(String, &str)> {
        candidates(scope, name)
            .into_iter()
            .find_map(|c| self.types.get(&c).map(|owner| (c.clone(), owner.as_str())))
    }

    fn lookup_extension(&self, scope: &str, name: &str) -> Option<&(ProtoMember, String)> {
        candidates(scope, name)
            .into_iter()
            .find_map(|c| self.extensions.get(&c))
    }
}

/// Links one file against the table, accumulating errors.
struct FileLinker<'a> {
    table: &'a SymbolTable,
    path: String,
    visible: BTreeSet<String>,
    lenient: bool,
    errors: &'a mut ErrorCollector,
}

impl FileLinker<'_> {
    fn check_visible(&mut self, what: &str, owner: &str) {
        if self.lenient || self.visible.contains(owner) {
            return;
        }
        self.errors.add_error(format!(
            "{}: {what} is declared in {owner}, which is not imported",
            self.path
        ));
    }

    fn resolve_type(&mut self, scope: &str, ty: &ProtoType) -> ProtoType {
        if ty.is_scalar() {
            return ty.clone();
        }
        if let Some((key, value)) = ty.map_types() {
            let key = self.resolve_type(scope, &key);
            let value = self.resolve_type(scope, &value);
            return ProtoType::map(&key, &value);
        }
        match self.table.lookup_type(scope, ty.as_str()) {
            Some((name, owner)) => {
                let owner = owner.to_string();
                self.check_visible(&format!("`{name}`"), &owner);
                ProtoType::get(name)
            }
            None => {
                if !self.lenient {
                    self.errors.add_error(format!(
                        "{}: unable to resolve `{ty}` in scope `{scope}`",
                        self.path
                    ));
                }
                ty.clone()
            }
        }
    }

    fn link_options(&mut self, scope: &str, options: &mut [OptionElement]) {
        for option in options {
            let Some(name) = option.extension_name().map(str::to_string) else {
                continue;
            };
            match self.table.lookup_extension(scope, &name) {
                Some((member, owner)) => {
                    let (member, owner) = (member.clone(), owner.clone());
                    self.check_visible(&format!("option `({name})`"), &owner);
                    option.extension = Some(member);
                }
                None if !self.lenient => self.errors.add_error(format!(
                    "{}: unable to resolve option `({name})`",
                    self.path
                )),
                None => {}
            }
        }
    }

    fn link_field(&mut self, scope: &str, field: &mut Field) {
        field.ty = self.resolve_type(scope, &field.ty);
        self.link_options(scope, &mut field.options);
    }

    fn link_extend(&mut self, extend: &mut Extend) {
        let scope = extend.namespace.clone();
        extend.extendee = self.resolve_type(&scope, &extend.extendee);
        for field in &mut extend.fields {
            self.link_field(&scope, field);
        }
    }

    fn link_message(&mut self, message: &mut MessageType) {
        let scope = message.ty.as_str().to_string();
        self.link_options(&scope, &mut message.options);
        for field in &mut message.fields {
            self.link_field(&scope, field);
        }
        for oneof in &mut message.oneofs {
            for field in &mut oneof.fields {
                self.link_field(&scope, field);
            }
        }
        for extend in &mut message.extends {
            self.link_extend(extend);
        }
        for nested in &mut message.nested {
            self.link_decl(nested);
        }
    }

    fn link_enum(&mut self, enum_type: &mut EnumType) {
        let scope = enum_type.ty.as_str().to_string();
        self.link_options(&scope, &mut enum_type.options);
        for constant in &mut enum_type.constants {
            self.link_options(&scope, &mut constant.options);
        }
    }

    fn link_decl(&mut self, decl: &mut TypeDecl) {
        match decl {
            TypeDecl::Message(message) => self.link_message(message),
            TypeDecl::Enum(enum_type) => self.link_enum(enum_type),
        }
    }

    fn link_service(&mut self, service: &mut Service) {
        let scope = service.ty.as_str().to_string();
        self.link_options(&scope, &mut service.options);
        for rpc in &mut service.rpcs {
            rpc.request_type = self.resolve_type(&scope, &rpc.request_type);
            rpc.response_type = self.resolve_type(&scope, &rpc.response_type);
            self.link_options(&scope, &mut rpc.options);
        }
    }

    fn link_file(&mut self, file: &mut ProtoFile) {
        let scope = file.package.clone().unwrap_or_default();
        self.link_options(&scope, &mut file.options);
        for decl in &mut file.types {
            self.link_decl(decl);
        }
        for service in &mut file.services {
            self.link_service(service);
        }
        for extend in &mut file.extends {
            self.link_extend(extend);
        }
    }
}

/// Builder for a link pass over parsed files.
pub struct Linker {
    files: Vec<ProtoFile>,
    lenient: BTreeSet<String>,
}

impl Linker {
    pub fn new(files: Vec<ProtoFile>) -> Self {
        Self {
            files,
            lenient: BTreeSet::new(),
        }
    }

    /// Files (by import path) whose unresolvable references are left as
    /// written instead of failing the link. Used for files loaded only to
    /// satisfy a direct import in a non-exhaustive load.
    pub fn lenient(mut self, import_paths: impl IntoIterator<Item = String>) -> Self {
        self.lenient.extend(import_paths);
        self
    }

    fn symbol_table(&self, errors: &mut ErrorCollector) -> SymbolTable {
        let mut table = SymbolTable::default();
        for file in &self.files {
            let path = file.import_path();
            let declared = file
                .declared_types()
                .into_iter()
                .map(|d| d.ty().clone())
                .chain(file.services.iter().map(|s| s.ty.clone()));
            for ty in declared {
                match table.types.get(ty.as_str()) {
                    Some(previous) => errors.add_error(format!(
                        "`{ty}` is declared in both {previous} and {path}"
                    )),
                    None => {
                        table.types.insert(ty.as_str().to_string(), path.clone());
                    }
                }
            }
        }

        for file in &self.files {
            let path = file.import_path();
            for extend in file.all_extends() {
                let extendee = table
                    .lookup_type(&extend.namespace, extend.extendee.as_str())
                    .map_or_else(|| extend.extendee.clone(), |(name, _)| ProtoType::get(name));
                for field in &extend.fields {
                    let name = extend.qualified_name(field);
                    let member = ProtoMember::get(extendee.clone(), name.clone());
                    if let Some((_, previous)) = table.extensions.get(&name) {
                        errors.add_error(format!(
                            "extension `{name}` is declared in both {previous} and {path}"
                        ));
                        continue;
                    }
                    table.extensions.insert(name, (member, path.clone()));
                }
            }
        }
        table
    }

    /// Import paths visible from each file: itself, its direct imports,
    /// and the public re-exports reachable from those.
    fn visibility(&self) -> BTreeMap<String, BTreeSet<String>> {
        let public: BTreeMap<String, &[String]> = self
            .files
            .iter()
            .map(|f| (f.import_path(), f.public_imports.as_slice()))
            .collect();

        let mut out = BTreeMap::new();
        for file in &self.files {
            let own = file.import_path();
            let mut visible = BTreeSet::from([own.clone()]);
            let mut pending: Vec<String> = file.all_imports().cloned().collect();
            while let Some(path) = pending.pop() {
                if !visible.insert(path.clone()) {
                    continue;
                }
                if let Some(exports) = public.get(&path) {
                    pending.extend(exports.iter().cloned());
                }
            }
            out.insert(own, visible);
        }
        out
    }

    pub fn link(self) -> SchemaResult<Schema> {
        let mut errors = ErrorCollector::new();
        let table = self.symbol_table(&mut errors);
        let mut visibility = self.visibility();

        let mut linked = Vec::with_capacity(self.files.len());
        for mut file in self.files {
            let path = file.import_path();
            let mut linker = FileLinker {
                table: &table,
                visible: visibility.remove(&path).unwrap_or_default(),
                lenient: self.lenient.contains(&path),
                path,
                errors: &mut errors,
            };
            linker.link_file(&mut file);
            linked.push(Arc::new(file));
        }
        errors.throw_if_errors(SchemaError::Link)?;

        debug!(
            "linked {} files declaring {} types",
            linked.len(),
            table.types.len()
        );
        Ok(Schema::new(linked))
    }
}

impl Schema {
    /// Link parsed files strictly: every reference must resolve to a
    /// visible declaration.
    pub fn link(files: Vec<ProtoFile>) -> SchemaResult<Schema> {
        Linker::new(files).link()
    }
}
