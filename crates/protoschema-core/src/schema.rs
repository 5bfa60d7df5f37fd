//! Immutable, fully-linked schema snapshot.
//!
//! A `Schema` is an arena of immutable files addressed by `ProtoType` keys.
//! Graph algorithms work over identifier sets and maps; transforms build a
//! new `Schema` and share every untouched file behind its `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::errors::SchemaResult;
use crate::graph::find_cycles;
use crate::models::{
    EnumType, Extend, Field, MessageType, OptionElement, ProtoFile, ProtoMember, ProtoType,
    Service, TypeDecl,
};

/// A declaration found through the type index.
#[derive(Clone, Copy, Debug)]
pub enum Declaration<'a> {
    Message(&'a MessageType),
    Enum(&'a EnumType),
    Service(&'a Service),
}

impl<'a> Declaration<'a> {
    pub fn options(&self) -> &'a [OptionElement] {
        match self {
            Declaration::Message(m) => &m.options,
            Declaration::Enum(e) => &e.options,
            Declaration::Service(s) => &s.options,
        }
    }
}

#[derive(Clone, Debug)]
enum DeclPath {
    /// Indices from the file's top-level types down through nested types.
    Type(Vec<usize>),
    Service(usize),
}

#[derive(Clone, Debug)]
struct TypeEntry {
    file: usize,
    path: DeclPath,
}

#[derive(Clone, Debug)]
struct ExtensionEntry {
    file: usize,
    field: Field,
}

#[derive(Clone, Debug)]
pub struct Schema {
    files: Vec<Arc<ProtoFile>>,
    /// Import path to file index; the first file wins on duplicates.
    files_by_path: BTreeMap<String, usize>,
    types: BTreeMap<ProtoType, TypeEntry>,
    extensions: BTreeMap<ProtoMember, ExtensionEntry>,
    extensions_by_extendee: BTreeMap<ProtoType, Vec<ProtoMember>>,
}

impl Schema {
    /// Index already-linked files. Linking and closure checks happen in
    /// [`crate::loader::linker`]; transforms call this on their output.
    pub(crate) fn new(files: Vec<Arc<ProtoFile>>) -> Self {
        let mut files_by_path = BTreeMap::new();
        let mut types = BTreeMap::new();
        let mut extensions = BTreeMap::new();
        let mut extensions_by_extendee: BTreeMap<ProtoType, Vec<ProtoMember>> = BTreeMap::new();

        fn index_types(
            decls: &[TypeDecl],
            file: usize,
            prefix: &[usize],
            types: &mut BTreeMap<ProtoType, TypeEntry>,
        ) {
            for (i, decl) in decls.iter().enumerate() {
                let mut path = prefix.to_vec();
                path.push(i);
                types.entry(decl.ty().clone()).or_insert(TypeEntry {
                    file,
                    path: DeclPath::Type(path.clone()),
                });
                index_types(decl.nested(), file, &path, types);
            }
        }

        for (file_index, file) in files.iter().enumerate() {
            files_by_path.entry(file.import_path()).or_insert(file_index);
            index_types(&file.types, file_index, &[], &mut types);
            for (i, service) in file.services.iter().enumerate() {
                types.entry(service.ty.clone()).or_insert(TypeEntry {
                    file: file_index,
                    path: DeclPath::Service(i),
                });
            }
            for extend in file.all_extends() {
                for field in &extend.fields {
                    let member = extend.member(field);
                    if extensions.contains_key(&member) {
                        continue;
                    }
                    extensions_by_extendee
                        .entry(extend.extendee.clone())
                        .or_default()
                        .push(member.clone());
                    extensions.insert(
                        member,
                        ExtensionEntry {
                            file: file_index,
                            field: field.clone(),
                        },
                    );
                }
            }
        }

        Self {
            files,
            files_by_path,
            types,
            extensions,
            extensions_by_extendee,
        }
    }

    pub fn proto_files(&self) -> &[Arc<ProtoFile>] {
        &self.files
    }

    /// The file imported as `import_path`.
    pub fn proto_file(&self, import_path: &str) -> Option<&ProtoFile> {
        let index = *self.files_by_path.get(import_path)?;
        self.files.get(index).map(|f| f.as_ref())
    }

    /// Every declared type and service, in sorted order.
    pub fn types(&self) -> impl Iterator<Item = &ProtoType> {
        self.types.keys()
    }

    pub fn contains_type(&self, ty: &ProtoType) -> bool {
        self.types.contains_key(ty)
    }

    pub fn get_type(&self, ty: &ProtoType) -> Option<Declaration<'_>> {
        let entry = self.types.get(ty)?;
        let file = &self.files[entry.file];
        match &entry.path {
            DeclPath::Service(i) => file.services.get(*i).map(Declaration::Service),
            DeclPath::Type(path) => {
                let (first, rest) = path.split_first()?;
                let mut decl = file.types.get(*first)?;
                for i in rest {
                    decl = decl.nested().get(*i)?;
                }
                Some(match decl {
                    TypeDecl::Message(m) => Declaration::Message(m),
                    TypeDecl::Enum(e) => Declaration::Enum(e),
                })
            }
        }
    }

    /// The file declaring `ty`.
    pub fn file_of(&self, ty: &ProtoType) -> Option<&ProtoFile> {
        self.types.get(ty).map(|e| self.files[e.file].as_ref())
    }

    pub fn extension_field(&self, member: &ProtoMember) -> Option<&Field> {
        self.extensions.get(member).map(|e| &e.field)
    }

    /// The file declaring the extension field `member`.
    pub fn extension_file(&self, member: &ProtoMember) -> Option<&ProtoFile> {
        self.extensions
            .get(member)
            .map(|e| self.files[e.file].as_ref())
    }

    /// Extension fields declared anywhere in the schema for `extendee`.
    pub fn extensions_of(&self, extendee: &ProtoType) -> &[ProtoMember] {
        self.extensions_by_extendee
            .get(extendee)
            .map_or(&[], Vec::as_slice)
    }

    /// True when some file references a type that is not declared here.
    /// Only intermediate schemas (non-exhaustive loads, module partitions
    /// relying on upstream modules) are open.
    pub fn is_open(&self) -> bool {
        !self.unresolved_references().is_empty()
    }

    /// Referenced types that no file in this schema declares, sorted.
    pub fn unresolved_references(&self) -> Vec<ProtoType> {
        let mut missing = BTreeSet::new();
        for file in &self.files {
            for ty in file_references(file).types {
                if !self.types.contains_key(&ty) {
                    missing.insert(ty);
                }
            }
        }
        missing.into_iter().collect()
    }

    /// Import cycles between files, by import path.
    pub fn import_cycles(&self) -> Vec<Vec<String>> {
        let known: BTreeSet<String> = self.files.iter().map(|f| f.import_path()).collect();
        let imports: BTreeMap<String, Vec<String>> = self
            .files
            .iter()
            .map(|f| {
                let targets = f
                    .all_imports()
                    .filter(|i| known.contains(*i))
                    .cloned()
                    .collect();
                (f.import_path(), targets)
            })
            .collect();
        find_cycles(
            self.files.iter().map(|f| f.import_path()),
            |path| imports.get(path).cloned().unwrap_or_default(),
        )
    }

    /// Cycles in the package graph, where a package depends on every
    /// package owning a type its files reference.
    pub fn package_cycles(&self) -> Vec<Vec<String>> {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for file in &self.files {
            let package = file.package.clone().unwrap_or_default();
            let targets = edges.entry(package.clone()).or_default();
            let references = file_references(file);
            let owners = references
                .types
                .iter()
                .filter_map(|ty| self.file_of(ty))
                .chain(
                    references
                        .extensions
                        .iter()
                        .filter_map(|m| self.extension_file(m)),
                );
            for owner in owners {
                let target = owner.package.clone().unwrap_or_default();
                if target != package {
                    targets.insert(target);
                }
            }
        }
        let packages: Vec<String> = edges.keys().cloned().collect();
        find_cycles(packages, |package| {
            edges
                .get(package)
                .map(|t| t.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })
    }

    /// Import paths of the files that declare what `file` references,
    /// excluding `file` itself, sorted.
    pub(crate) fn referenced_files(&self, file: &ProtoFile) -> BTreeSet<String> {
        let references = file_references(file);
        let own = file.import_path();
        references
            .types
            .iter()
            .filter_map(|ty| self.file_of(ty))
            .chain(
                references
                    .extensions
                    .iter()
                    .filter_map(|m| self.extension_file(m)),
            )
            .map(|f| f.import_path())
            .filter(|path| *path != own)
            .collect()
    }

    /// `(importer, import)` pairs where the imported file contributes
    /// nothing the importer references, directly or through its public
    /// imports.
    pub fn unused_imports(&self) -> Vec<(String, String)> {
        let mut unused = Vec::new();
        for file in &self.files {
            let used = self.referenced_files(file);
            for import in &file.imports {
                if self.proto_file(import).is_none() {
                    continue;
                }
                let reachable = self.public_closure(import);
                if !reachable.iter().any(|path| used.contains(path)) {
                    unused.push((file.import_path(), import.clone()));
                }
            }
        }
        unused
    }

    /// `import_path` plus every file it re-exports through `import public`.
    pub(crate) fn public_closure(&self, import_path: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![import_path.to_string()];
        while let Some(path) = pending.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(file) = self.proto_file(&path) {
                pending.extend(file.public_imports.iter().cloned());
            }
        }
        seen
    }

    /// SHA-256 over the serialized file list; equal for equal schemas.
    pub fn fingerprint(&self) -> SchemaResult<String> {
        let files: Vec<&ProtoFile> = self.files.iter().map(|f| f.as_ref()).collect();
        let bytes = serde_json::to_vec(&files)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ---------------------------------------------------------------------------
// Reference collection
// ---------------------------------------------------------------------------

/// Everything a file points at outside its own declarations' names.
#[derive(Debug, Default)]
pub(crate) struct References {
    pub types: BTreeSet<ProtoType>,
    pub extensions: BTreeSet<ProtoMember>,
}

impl References {
    fn add_type(&mut self, ty: &ProtoType) {
        self.types.extend(ty.referenced_types());
    }

    fn add_options(&mut self, options: &[OptionElement]) {
        for option in options {
            if let Some(member) = &option.extension {
                self.extensions.insert(member.clone());
            }
        }
    }

    fn add_field(&mut self, field: &Field) {
        self.add_type(&field.ty);
        self.add_options(&field.options);
    }

    fn add_extend(&mut self, extend: &Extend) {
        self.add_type(&extend.extendee);
        for field in &extend.fields {
            self.add_field(field);
        }
    }

    pub(crate) fn add_type_decl(&mut self, decl: &TypeDecl) {
        self.add_options(decl.options());
        match decl {
            TypeDecl::Message(message) => {
                for field in message.all_fields() {
                    self.add_field(field);
                }
                for extend in &message.extends {
                    self.add_extend(extend);
                }
            }
            TypeDecl::Enum(enum_type) => {
                for constant in &enum_type.constants {
                    self.add_options(&constant.options);
                }
            }
        }
        for nested in decl.nested() {
            self.add_type_decl(nested);
        }
    }

    fn add_service(&mut self, service: &Service) {
        self.add_options(&service.options);
        for rpc in &service.rpcs {
            self.add_type(&rpc.request_type);
            self.add_type(&rpc.response_type);
            self.add_options(&rpc.options);
        }
    }
}

pub(crate) fn file_references(file: &ProtoFile) -> References {
    let mut references = References::default();
    references.add_options(&file.options);
    for decl in &file.types {
        references.add_type_decl(decl);
    }
    for service in &file.services {
        references.add_service(service);
    }
    for extend in &file.extends {
        references.add_extend(extend);
    }
    references
}
