//! Relocating top-level declarations between files of one package.
//!
//! Only the files a move touches (its source and destination) are
//! rewritten; their imports are recomputed from what they reference after
//! all moves are applied. Every other file is shared with the input schema.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::errors::{SchemaError, SchemaResult};
use crate::models::{Location, ProtoFile, ProtoType, Service, TypeDecl};
use crate::schema::Schema;

/// Relocate `ty` into the file imported as `new_file`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub ty: ProtoType,
    pub new_file: String,
}

impl Move {
    pub fn new(ty: impl Into<String>, new_file: impl Into<String>) -> Self {
        Self {
            ty: ProtoType::get(ty),
            new_file: new_file.into(),
        }
    }
}

/// Where a top-level declaration sits in its file.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Type(usize),
    Service(usize),
}

fn top_level_slot(file: &ProtoFile, ty: &ProtoType) -> Option<Slot> {
    if let Some(i) = file.types.iter().position(|d| d.ty() == ty) {
        return Some(Slot::Type(i));
    }
    file.services.iter().position(|s| s.ty == *ty).map(Slot::Service)
}

fn declares(file: &ProtoFile, ty: &ProtoType) -> bool {
    top_level_slot(file, ty).is_some() || file.declared_types().iter().any(|d| d.ty() == ty)
}

fn package_name(file: &ProtoFile) -> &str {
    file.package.as_deref().unwrap_or("")
}

pub struct TypeMover<'s> {
    schema: &'s Schema,
    moves: Vec<Move>,
    /// Copies of the files touched so far, keyed by import path. Files not
    /// in the input schema are created here.
    edited: IndexMap<String, ProtoFile>,
}

impl<'s> TypeMover<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            moves: Vec::new(),
            edited: IndexMap::new(),
        }
    }

    pub fn add(mut self, ty: impl Into<String>, new_file: impl Into<String>) -> Self {
        self.moves.push(Move::new(ty, new_file));
        self
    }

    pub fn with_moves(mut self, moves: impl IntoIterator<Item = Move>) -> Self {
        self.moves.extend(moves);
        self
    }

    /// Import path of the file currently declaring `ty` at top level.
    /// Earlier moves are taken into account.
    fn current_owner(&self, ty: &ProtoType) -> SchemaResult<String> {
        let edited = self.edited.iter().find(|(_, file)| declares(file, ty));
        let found = match edited {
            Some((path, file)) => Some((path.clone(), file)),
            None => self
                .schema
                .file_of(ty)
                .filter(|file| !self.edited.contains_key(&file.import_path()))
                .map(|file| (file.import_path(), file)),
        };
        match found {
            Some((path, file)) if top_level_slot(file, ty).is_some() => Ok(path),
            Some(_) => Err(SchemaError::InvalidMove(format!(
                "`{ty}` is nested; only top-level types can be moved"
            ))),
            None => Err(SchemaError::UnknownType(ty.to_string())),
        }
    }

    /// The editable copy of `path`, cloning it out of the schema on first
    /// touch.
    fn touch(&mut self, path: &str) -> Option<&mut ProtoFile> {
        if !self.edited.contains_key(path) {
            let file = self.schema.proto_file(path)?.clone();
            self.edited.insert(path.to_string(), file);
        }
        self.edited.get_mut(path)
    }

    fn apply_move(&mut self, mv: &Move) -> SchemaResult<()> {
        let source_path = self.current_owner(&mv.ty)?;
        if source_path == mv.new_file {
            debug!("{} already lives in {source_path}", mv.ty);
            return Ok(());
        }
        let source = self
            .touch(&source_path)
            .ok_or_else(|| SchemaError::UnknownType(mv.ty.to_string()))?;
        let (base, package, syntax) = (
            source.location.base.clone(),
            source.package.clone(),
            source.syntax,
        );

        if self.touch(&mv.new_file).is_none() {
            let file = ProtoFile::new(Location::get(base, mv.new_file.clone()), package.as_deref())
                .with_syntax(syntax);
            if file.import_path() != mv.new_file {
                return Err(SchemaError::InvalidMove(format!(
                    "{} does not match the path implied by package `{}`",
                    mv.new_file,
                    package.as_deref().unwrap_or("")
                )));
            }
            debug!("creating {} for {}", mv.new_file, mv.ty);
            self.edited.insert(mv.new_file.clone(), file);
        }
        let destination_package = self
            .edited
            .get(&mv.new_file)
            .map(|file| package_name(file).to_string())
            .unwrap_or_default();
        if destination_package != package.as_deref().unwrap_or("") {
            return Err(SchemaError::InvalidMove(format!(
                "cannot move `{}` from package `{}` into {}, which declares package `{destination_package}`",
                mv.ty,
                package.as_deref().unwrap_or(""),
                mv.new_file
            )));
        }

        let Some(source) = self.edited.get_mut(&source_path) else {
            return Err(SchemaError::UnknownType(mv.ty.to_string()));
        };
        let taken = match top_level_slot(source, &mv.ty) {
            Some(Slot::Type(i)) => Taken::Type(source.types.remove(i)),
            Some(Slot::Service(i)) => Taken::Service(source.services.remove(i)),
            None => return Err(SchemaError::UnknownType(mv.ty.to_string())),
        };
        if let Some(destination) = self.edited.get_mut(&mv.new_file) {
            match taken {
                Taken::Type(decl) => destination.types.push(decl),
                Taken::Service(service) => destination.services.push(service),
            }
        }
        debug!("moved {} from {source_path} to {}", mv.ty, mv.new_file);
        Ok(())
    }

    /// Input files in order with edited copies swapped in, then new files.
    fn assemble(&self) -> Vec<Arc<ProtoFile>> {
        let mut files: Vec<Arc<ProtoFile>> = self
            .schema
            .proto_files()
            .iter()
            .map(|file| match self.edited.get(&file.import_path()) {
                Some(edited) => Arc::new(edited.clone()),
                None => Arc::clone(file),
            })
            .collect();
        for (path, file) in &self.edited {
            if self.schema.proto_file(path).is_none() {
                files.push(Arc::new(file.clone()));
            }
        }
        files
    }

    pub fn apply(mut self) -> SchemaResult<Schema> {
        let moves = std::mem::take(&mut self.moves);
        for mv in &moves {
            self.apply_move(mv)?;
        }
        if self.edited.is_empty() {
            return Ok(self.schema.clone());
        }

        let moved = Schema::new(self.assemble());
        for (path, file) in self.edited.iter_mut() {
            let Some(current) = moved.proto_file(path) else {
                continue;
            };
            file.imports = recompute_imports(&moved, current);
        }

        let schema = Schema::new(self.assemble());
        info!(
            "moved {} types, rewrote {} files",
            moves.len(),
            self.edited.len()
        );
        Ok(schema)
    }
}

enum Taken {
    Type(TypeDecl),
    Service(Service),
}

/// Files `file` references, minus those already re-exported through its
/// own public imports. Imports of files the schema never loaded are kept.
fn recompute_imports(schema: &Schema, file: &ProtoFile) -> Vec<String> {
    let exported: BTreeSet<String> = file
        .public_imports
        .iter()
        .flat_map(|p| schema.public_closure(p))
        .collect();
    let unloaded = file
        .imports
        .iter()
        .filter(|import| schema.proto_file(import).is_none())
        .cloned();
    let needed = schema
        .referenced_files(file)
        .into_iter()
        .filter(|path| !exported.contains(path));
    unloaded.chain(needed).collect::<BTreeSet<_>>().into_iter().collect()
}

pub fn move_types(schema: &Schema, moves: impl IntoIterator<Item = Move>) -> SchemaResult<Schema> {
    TypeMover::new(schema).with_moves(moves).apply()
}
