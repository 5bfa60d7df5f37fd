//! Reachability pruning (tree-shaking).
//!
//! A breadth-first walk from every identifier the roots match, run to a
//! fixed point. Reaching a type as a whole enqueues each of its members;
//! reaching a member enqueues the types it references. Prunes are checked
//! before every step, so a pruned identifier is never marked no matter
//! how it is reached. A field whose type is pruned is dropped; a field
//! whose type lives upstream is kept but not followed.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::diagnostics::ErrorCollector;
use crate::errors::{SchemaError, SchemaResult};
use crate::models::{
    Extend, Field, MessageType, OneOf, OptionElement, ProtoFile, ProtoMember, ProtoType, Service,
    TypeDecl,
};
use crate::prune::marks::MarkSet;
use crate::prune::rules::PruningRules;
use crate::schema::{Declaration, Schema};

#[derive(Debug)]
enum Node {
    Type(ProtoType),
    Member(ProtoMember),
}

/// What reaching a member leads to.
struct MemberEdges {
    types: Vec<ProtoType>,
    /// Set for extension fields: the extended type. Checked against prunes
    /// but never traversed as a whole.
    extendee: Option<ProtoType>,
    options: Vec<ProtoMember>,
}

fn option_extensions(options: &[OptionElement]) -> Vec<ProtoMember> {
    options.iter().filter_map(|o| o.extension.clone()).collect()
}

/// A pruned schema and the rules that produced it, with usage recorded.
#[derive(Debug)]
pub struct Pruned {
    pub schema: Schema,
    pub rules: PruningRules,
    /// Types this pass emits with their members. Enclosing shells kept only
    /// for a nested type are declared in `schema` but not listed here.
    pub produced: BTreeSet<ProtoType>,
}

impl Pruned {
    /// Patterns that matched nothing and imports the pruned schema no
    /// longer needs.
    pub fn warnings(&self) -> Vec<String> {
        let roots = self.rules.unused_roots().into_iter().map(|r| format!("unused root: {r}"));
        let prunes = self.rules.unused_prunes().into_iter().map(|p| format!("unused prune: {p}"));
        let imports = self
            .schema
            .unused_imports()
            .into_iter()
            .map(|(file, import)| format!("{file}: unused import {import}"));
        roots.chain(prunes).chain(imports).collect()
    }

    pub fn report(&self, errors: &mut ErrorCollector) {
        for warning in self.warnings() {
            errors.add_warning(warning);
        }
    }
}

pub struct Pruner<'s> {
    schema: &'s Schema,
    rules: &'s PruningRules,
    marks: MarkSet,
    visited_types: BTreeSet<ProtoType>,
    visited_members: BTreeSet<ProtoMember>,
    queue: VecDeque<Node>,
    used_roots: BTreeSet<String>,
    used_prunes: BTreeSet<String>,
    errors: ErrorCollector,
}

impl<'s> Pruner<'s> {
    pub fn new(schema: &'s Schema, rules: &'s PruningRules) -> Self {
        Self {
            schema,
            rules,
            marks: MarkSet::new(),
            visited_types: BTreeSet::new(),
            visited_members: BTreeSet::new(),
            queue: VecDeque::new(),
            used_roots: BTreeSet::new(),
            used_prunes: BTreeSet::new(),
            errors: ErrorCollector::new(),
        }
    }

    fn check_root(&mut self, identifier: &str) -> bool {
        let matched: Vec<String> = self.rules.matching_roots(identifier).cloned().collect();
        let found = !matched.is_empty();
        self.used_roots.extend(matched);
        found
    }

    fn check_prune(&mut self, identifier: &str) -> bool {
        let matched: Vec<String> = self.rules.matching_prunes(identifier).cloned().collect();
        let found = !matched.is_empty();
        self.used_prunes.extend(matched);
        found
    }

    /// Fields, constants or RPCs of `ty`, then extension fields declared
    /// for it anywhere in the schema.
    fn members_of(&self, ty: &ProtoType) -> Vec<ProtoMember> {
        let member = |name: &str| ProtoMember::get(ty.clone(), name);
        let mut out: Vec<ProtoMember> = match self.schema.get_type(ty) {
            Some(Declaration::Message(m)) => m.all_fields().map(|f| member(&f.name)).collect(),
            Some(Declaration::Enum(e)) => e.constants.iter().map(|c| member(&c.name)).collect(),
            Some(Declaration::Service(s)) => s.rpcs.iter().map(|r| member(&r.name)).collect(),
            None => Vec::new(),
        };
        out.extend(self.schema.extensions_of(ty).iter().cloned());
        out
    }

    fn member_edges(&self, member: &ProtoMember) -> Option<MemberEdges> {
        let schema = self.schema;
        if let Some(field) = schema.extension_field(member) {
            return Some(MemberEdges {
                types: field.ty.referenced_types(),
                extendee: Some(member.ty.clone()),
                options: option_extensions(&field.options),
            });
        }
        let (types, options) = match schema.get_type(&member.ty)? {
            Declaration::Message(message) => {
                let field = message.all_fields().find(|f| f.name == member.member)?;
                (field.ty.referenced_types(), &field.options)
            }
            Declaration::Enum(enum_type) => {
                let constant = enum_type.constants.iter().find(|c| c.name == member.member)?;
                (Vec::new(), &constant.options)
            }
            Declaration::Service(service) => {
                let rpc = service.rpcs.iter().find(|r| r.name == member.member)?;
                let mut types = rpc.request_type.referenced_types();
                types.extend(rpc.response_type.referenced_types());
                (types, &rpc.options)
            }
        };
        Some(MemberEdges {
            types,
            extendee: None,
            options: option_extensions(options),
        })
    }

    fn enqueue_options(&mut self, options: Vec<ProtoMember>) {
        for extension in options {
            if !self.visited_members.contains(&extension) {
                self.queue.push_back(Node::Member(extension));
            }
        }
    }

    fn seed(&mut self) {
        let types: Vec<ProtoType> = self.schema.types().cloned().collect();
        for ty in types {
            if self.rules.is_upstream(&ty) {
                continue;
            }
            let id = ty.to_string();
            if self.check_root(&id) {
                if !self.check_prune(&id) {
                    self.queue.push_back(Node::Type(ty));
                }
                continue;
            }
            for member in self.members_of(&ty) {
                let member_id = member.to_string();
                if self.check_root(&member_id) && !self.check_prune(&member_id) {
                    self.queue.push_back(Node::Member(member));
                }
            }
        }
    }

    fn visit_type(&mut self, ty: ProtoType) {
        if !self.visited_types.insert(ty.clone()) {
            return;
        }
        let schema = self.schema;
        let Some(declaration) = schema.get_type(&ty) else {
            return;
        };
        self.marks.mark_type(&ty);
        self.enqueue_options(option_extensions(declaration.options()));
        for member in self.members_of(&ty) {
            self.queue.push_back(Node::Member(member));
        }
    }

    fn visit_member(&mut self, member: ProtoMember) {
        if !self.visited_members.insert(member.clone()) {
            return;
        }
        let member_id = member.to_string();
        if self.check_prune(&member_id) {
            return;
        }
        let Some(edges) = self.member_edges(&member) else {
            return;
        };
        let owner_upstream = self.rules.is_upstream(&member.ty);
        if owner_upstream && edges.extendee.is_none() {
            // Regular members of an upstream type are emitted upstream.
            return;
        }

        for ty in edges.types.iter().chain(edges.extendee.iter()) {
            if self.rules.is_upstream(ty) {
                continue;
            }
            if self.check_prune(&ty.to_string()) {
                return;
            }
            if !self.schema.contains_type(ty) {
                self.errors.add_error(format!(
                    "{member_id} references `{ty}`, which is not in the schema"
                ));
                return;
            }
        }

        self.marks.mark_member(&member);
        if !owner_upstream {
            self.marks.mark_type(&member.ty);
        }
        for ty in edges.types {
            if !self.rules.is_upstream(&ty) && !self.visited_types.contains(&ty) {
                self.queue.push_back(Node::Type(ty));
            }
        }
        self.enqueue_options(edges.options);
    }

    fn drain(&mut self) {
        while let Some(node) = self.queue.pop_front() {
            match node {
                Node::Type(ty) => self.visit_type(ty),
                Node::Member(member) => self.visit_member(member),
            }
        }
    }

    /// Queue custom file options of files that will be retained. Returns
    /// whether anything new was queued.
    fn queue_file_options(&mut self) -> bool {
        let schema = self.schema;
        let mut queued = false;
        for file in schema.proto_files() {
            if !file_has_marks(&self.marks, file) {
                continue;
            }
            for extension in option_extensions(&file.options) {
                if !self.visited_members.contains(&extension) {
                    self.queue.push_back(Node::Member(extension));
                    queued = true;
                }
            }
        }
        queued
    }

    pub fn prune(mut self) -> SchemaResult<Pruned> {
        self.seed();
        loop {
            self.drain();
            if !self.queue_file_options() {
                break;
            }
        }
        self.errors.throw_if_errors(SchemaError::Link)?;

        let files: Vec<Arc<ProtoFile>> = self
            .schema
            .proto_files()
            .iter()
            .filter_map(|file| match retain_file(&self.marks, file) {
                Some(retained) if retained == **file => Some(Arc::clone(file)),
                Some(retained) => Some(Arc::new(retained)),
                None => None,
            })
            .collect();
        debug!(
            "pruned {} of {} files",
            self.schema.proto_files().len() - files.len(),
            self.schema.proto_files().len()
        );
        let schema = Schema::new(files);
        info!("retained {} types after pruning", schema.types().count());

        Ok(Pruned {
            schema,
            rules: self.rules.with_usage(self.used_roots, self.used_prunes),
            produced: self.marks.types().cloned().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

fn file_has_marks(marks: &MarkSet, file: &ProtoFile) -> bool {
    file.declared_types().iter().any(|d| marks.contains_type(d.ty()))
        || file.services.iter().any(|s| marks.contains_type(&s.ty))
        || file
            .all_extends()
            .iter()
            .any(|e| e.fields.iter().any(|f| marks.contains_member(&e.member(f))))
}

fn retain_options(marks: &MarkSet, options: &[OptionElement]) -> Vec<OptionElement> {
    options
        .iter()
        .filter(|o| marks.retains_option(o))
        .cloned()
        .collect()
}

fn retain_field(marks: &MarkSet, owner: &ProtoType, field: &Field) -> Option<Field> {
    if !marks.contains_member(&ProtoMember::get(owner.clone(), field.name.clone())) {
        return None;
    }
    Some(Field {
        options: retain_options(marks, &field.options),
        ..field.clone()
    })
}

fn retain_extend(marks: &MarkSet, extend: &Extend) -> Option<Extend> {
    let fields: Vec<Field> = extend
        .fields
        .iter()
        .filter(|f| marks.contains_member(&extend.member(f)))
        .map(|f| Field {
            options: retain_options(marks, &f.options),
            ..f.clone()
        })
        .collect();
    if fields.is_empty() {
        return None;
    }
    Some(Extend {
        fields,
        ..extend.clone()
    })
}

fn retain_message(marks: &MarkSet, message: &MessageType) -> Option<MessageType> {
    let nested: Vec<TypeDecl> = message
        .nested
        .iter()
        .filter_map(|n| retain_decl(marks, n))
        .collect();
    let extends: Vec<Extend> = message
        .extends
        .iter()
        .filter_map(|e| retain_extend(marks, e))
        .collect();
    let present = marks.contains_type(&message.ty);
    if !present && nested.is_empty() && extends.is_empty() {
        return None;
    }

    // A type kept only for what it encloses is an empty shell.
    let (fields, oneofs) = if present {
        let fields = message
            .fields
            .iter()
            .filter_map(|f| retain_field(marks, &message.ty, f))
            .collect();
        let oneofs = message
            .oneofs
            .iter()
            .filter_map(|o| {
                let fields: Vec<Field> = o
                    .fields
                    .iter()
                    .filter_map(|f| retain_field(marks, &message.ty, f))
                    .collect();
                (!fields.is_empty()).then(|| OneOf::new(o.name.clone(), fields))
            })
            .collect();
        (fields, oneofs)
    } else {
        (Vec::new(), Vec::new())
    };

    Some(MessageType {
        ty: message.ty.clone(),
        fields,
        oneofs,
        nested,
        extends,
        options: retain_options(marks, &message.options),
    })
}

fn retain_decl(marks: &MarkSet, decl: &TypeDecl) -> Option<TypeDecl> {
    match decl {
        TypeDecl::Message(message) => retain_message(marks, message).map(TypeDecl::Message),
        TypeDecl::Enum(enum_type) => {
            if !marks.contains_type(&enum_type.ty) {
                return None;
            }
            let mut retained = enum_type.clone();
            retained.constants.retain(|c| {
                marks.contains_member(&ProtoMember::get(enum_type.ty.clone(), c.name.clone()))
            });
            for constant in &mut retained.constants {
                constant.options = retain_options(marks, &constant.options);
            }
            retained.options = retain_options(marks, &enum_type.options);
            Some(TypeDecl::Enum(retained))
        }
    }
}

fn retain_service(marks: &MarkSet, service: &Service) -> Option<Service> {
    if !marks.contains_type(&service.ty) {
        return None;
    }
    let mut retained = service.clone();
    retained
        .rpcs
        .retain(|r| marks.contains_member(&ProtoMember::get(service.ty.clone(), r.name.clone())));
    for rpc in &mut retained.rpcs {
        rpc.options = retain_options(marks, &rpc.options);
    }
    retained.options = retain_options(marks, &service.options);
    Some(retained)
}

/// The retained part of `file`, or `None` if nothing in it survives.
/// Import statements are left as they are.
fn retain_file(marks: &MarkSet, file: &ProtoFile) -> Option<ProtoFile> {
    let types: Vec<TypeDecl> = file.types.iter().filter_map(|d| retain_decl(marks, d)).collect();
    let services: Vec<Service> = file
        .services
        .iter()
        .filter_map(|s| retain_service(marks, s))
        .collect();
    let extends: Vec<Extend> = file
        .extends
        .iter()
        .filter_map(|e| retain_extend(marks, e))
        .collect();
    if types.is_empty() && services.is_empty() && extends.is_empty() {
        return None;
    }
    Some(ProtoFile {
        types,
        services,
        extends,
        options: retain_options(marks, &file.options),
        ..file.clone()
    })
}

/// Prune `schema` down to what `rules` reach.
pub fn prune(schema: &Schema, rules: &PruningRules) -> SchemaResult<Pruned> {
    Pruner::new(schema, rules).prune()
}
