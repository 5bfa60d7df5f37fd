//! Shared typed models used across loading, linking, pruning and partitioning.
//!
//! The AST types here are produced by an external parser (see
//! [`crate::loader::ProtoParser`]) and are never mutated once they land in a
//! [`crate::schema::Schema`]; every transform builds new values and shares
//! untouched files behind `Arc`.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where a file was found: the search root it was found under and its
/// root-relative path. `base` is empty for a root given as a bare file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub base: String,
    pub path: String,
}

impl Location {
    pub fn get(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
        }
    }

    /// A location with the same base and a different relative path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self::get(self.base.clone(), path)
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.base.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}/{}", self.base, self.path)
        }
    }
}

// ---------------------------------------------------------------------------
// ProtoType / ProtoMember
// ---------------------------------------------------------------------------

const SCALAR_TYPES: &[&str] = &[
    "bool", "bytes", "double", "float", "fixed32", "fixed64", "int32", "int64", "sfixed32",
    "sfixed64", "sint32", "sint64", "string", "uint32", "uint64",
];

/// A type identifier: a scalar, a `map<K, V>`, or a dotted name. Linked
/// schemas only hold fully-qualified names; parser output may hold
/// relative names or names with a leading `.`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProtoType(String);

impl ProtoType {
    pub fn get(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn map(key: &ProtoType, value: &ProtoType) -> Self {
        Self(format!("map<{}, {}>", key.0, value.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_scalar(&self) -> bool {
        SCALAR_TYPES.contains(&self.0.as_str())
    }

    pub fn is_map(&self) -> bool {
        self.0.starts_with("map<") && self.0.ends_with('>')
    }

    /// Key and value types of a map type.
    pub fn map_types(&self) -> Option<(ProtoType, ProtoType)> {
        if !self.is_map() {
            return None;
        }
        let inner = &self.0[4..self.0.len() - 1];
        let (key, value) = inner.split_once(',')?;
        Some((ProtoType::get(key.trim()), ProtoType::get(value.trim())))
    }

    /// True for a name written with a leading `.` (already fully qualified).
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('.')
    }

    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The enclosing type or package, if any.
    pub fn enclosing(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(head, _)| head)
    }

    pub fn nested(&self, simple_name: &str) -> ProtoType {
        ProtoType(format!("{}.{simple_name}", self.0))
    }

    /// The declared types this identifier refers to: none for scalars, the
    /// non-scalar key/value types for maps, itself otherwise.
    pub fn referenced_types(&self) -> Vec<ProtoType> {
        if self.is_scalar() {
            return vec![];
        }
        match self.map_types() {
            Some((key, value)) => [key, value].into_iter().filter(|t| !t.is_scalar()).collect(),
            None => vec![self.clone()],
        }
    }
}

impl fmt::Display for ProtoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member of a type: a field, an RPC, an enum constant, or an extension
/// field (whose member name is the extension's qualified name).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProtoMember {
    pub ty: ProtoType,
    pub member: String,
}

impl ProtoMember {
    pub fn get(ty: ProtoType, member: impl Into<String>) -> Self {
        Self {
            ty,
            member: member.into(),
        }
    }
}

impl fmt::Display for ProtoMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ty, self.member)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum OptionValue {
    Scalar(String),
    Message(Vec<(String, OptionValue)>),
    List(Vec<OptionValue>),
}

/// An option such as `deprecated = true` or `(acme.redacted) = true`.
/// For custom options the linker sets `extension` to the extension field
/// that declares the option.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionElement {
    pub name: String,
    pub value: OptionValue,
    pub extension: Option<ProtoMember>,
}

impl OptionElement {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
            extension: None,
        }
    }

    /// The extension name inside the parentheses of a custom option:
    /// `(acme.redacted).level` yields `acme.redacted`.
    pub fn extension_name(&self) -> Option<&str> {
        let rest = self.name.strip_prefix('(')?;
        rest.split_once(')').map(|(name, _)| name)
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Syntax {
    Proto2,
    Proto3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub tag: u32,
    pub label: Option<Label>,
    pub ty: ProtoType,
    pub options: Vec<OptionElement>,
}

impl Field {
    pub fn new(name: impl Into<String>, tag: u32, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag,
            label: None,
            ty: ProtoType::get(ty),
            options: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_option(mut self, option: OptionElement) -> Self {
        self.options.push(option);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OneOf {
    pub name: String,
    pub fields: Vec<Field>,
}

impl OneOf {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// An `extend` block. `namespace` is the package or message the block was
/// declared in; extension fields are qualified against it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Extend {
    pub extendee: ProtoType,
    pub namespace: String,
    pub fields: Vec<Field>,
}

impl Extend {
    pub fn new(extendee: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            extendee: ProtoType::get(extendee),
            namespace: namespace.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn qualified_name(&self, field: &Field) -> String {
        if self.namespace.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", self.namespace, field.name)
        }
    }

    /// The member an extension field contributes to its extendee.
    pub fn member(&self, field: &Field) -> ProtoMember {
        ProtoMember::get(self.extendee.clone(), self.qualified_name(field))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageType {
    pub ty: ProtoType,
    pub fields: Vec<Field>,
    pub oneofs: Vec<OneOf>,
    pub nested: Vec<TypeDecl>,
    pub extends: Vec<Extend>,
    pub options: Vec<OptionElement>,
}

impl MessageType {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ProtoType::get(ty),
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested: Vec::new(),
            extends: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_oneof(mut self, oneof: OneOf) -> Self {
        self.oneofs.push(oneof);
        self
    }

    pub fn with_nested(mut self, nested: impl Into<TypeDecl>) -> Self {
        self.nested.push(nested.into());
        self
    }

    pub fn with_extend(mut self, extend: Extend) -> Self {
        self.extends.push(extend);
        self
    }

    pub fn with_option(mut self, option: OptionElement) -> Self {
        self.options.push(option);
        self
    }

    /// Declared fields followed by the fields of every oneof.
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .chain(self.oneofs.iter().flat_map(|o| o.fields.iter()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnumConstant {
    pub name: String,
    pub tag: i32,
    pub options: Vec<OptionElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnumType {
    pub ty: ProtoType,
    pub constants: Vec<EnumConstant>,
    pub options: Vec<OptionElement>,
}

impl EnumType {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ProtoType::get(ty),
            constants: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_constant(mut self, name: impl Into<String>, tag: i32) -> Self {
        self.constants.push(EnumConstant {
            name: name.into(),
            tag,
            options: Vec::new(),
        });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeDecl {
    Message(MessageType),
    Enum(EnumType),
}

impl TypeDecl {
    pub fn ty(&self) -> &ProtoType {
        match self {
            TypeDecl::Message(m) => &m.ty,
            TypeDecl::Enum(e) => &e.ty,
        }
    }

    pub fn nested(&self) -> &[TypeDecl] {
        match self {
            TypeDecl::Message(m) => &m.nested,
            TypeDecl::Enum(_) => &[],
        }
    }

    pub fn options(&self) -> &[OptionElement] {
        match self {
            TypeDecl::Message(m) => &m.options,
            TypeDecl::Enum(e) => &e.options,
        }
    }
}

impl From<MessageType> for TypeDecl {
    fn from(message: MessageType) -> Self {
        TypeDecl::Message(message)
    }
}

impl From<EnumType> for TypeDecl {
    fn from(enum_type: EnumType) -> Self {
        TypeDecl::Enum(enum_type)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rpc {
    pub name: String,
    pub request_type: ProtoType,
    pub response_type: ProtoType,
    pub request_streaming: bool,
    pub response_streaming: bool,
    pub options: Vec<OptionElement>,
}

impl Rpc {
    pub fn new(
        name: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            request_type: ProtoType::get(request_type),
            response_type: ProtoType::get(response_type),
            request_streaming: false,
            response_streaming: false,
            options: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Service {
    pub ty: ProtoType,
    pub rpcs: Vec<Rpc>,
    pub options: Vec<OptionElement>,
}

impl Service {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ProtoType::get(ty),
            rpcs: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_rpc(mut self, rpc: Rpc) -> Self {
        self.rpcs.push(rpc);
        self
    }
}

// ---------------------------------------------------------------------------
// ProtoFile
// ---------------------------------------------------------------------------

/// One parsed `.proto` file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtoFile {
    pub location: Location,
    pub package: Option<String>,
    pub syntax: Syntax,
    pub imports: Vec<String>,
    pub public_imports: Vec<String>,
    pub types: Vec<TypeDecl>,
    pub services: Vec<Service>,
    pub extends: Vec<Extend>,
    pub options: Vec<OptionElement>,
}

impl ProtoFile {
    pub fn new(location: Location, package: Option<&str>) -> Self {
        Self {
            location,
            package: package.map(str::to_string),
            syntax: Syntax::Proto3,
            imports: Vec::new(),
            public_imports: Vec::new(),
            types: Vec::new(),
            services: Vec::new(),
            extends: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_import(mut self, path: impl Into<String>) -> Self {
        self.imports.push(path.into());
        self
    }

    pub fn with_public_import(mut self, path: impl Into<String>) -> Self {
        self.public_imports.push(path.into());
        self
    }

    pub fn with_type(mut self, decl: impl Into<TypeDecl>) -> Self {
        self.types.push(decl.into());
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_extend(mut self, extend: Extend) -> Self {
        self.extends.push(extend);
        self
    }

    /// The path this file is imported by. A file found under a search root
    /// is imported by its root-relative path; a bare file (empty base) is
    /// imported by the path its package implies.
    pub fn import_path(&self) -> String {
        if self.location.base.is_empty() {
            self.expected_path()
        } else {
            self.location.path.clone()
        }
    }

    /// Package directories followed by the file name.
    pub fn expected_path(&self) -> String {
        let file_name = self.location.file_name();
        match &self.package {
            Some(package) if !package.is_empty() => {
                format!("{}/{file_name}", package.replace('.', "/"))
            }
            _ => file_name.to_string(),
        }
    }

    /// Every import, public or not, in declaration order.
    pub fn all_imports(&self) -> impl Iterator<Item = &String> {
        self.imports.iter().chain(self.public_imports.iter())
    }

    /// Every type declared in this file, outer types before nested ones.
    pub fn declared_types(&self) -> Vec<&TypeDecl> {
        fn walk<'a>(decls: &'a [TypeDecl], out: &mut Vec<&'a TypeDecl>) {
            for decl in decls {
                out.push(decl);
                walk(decl.nested(), out);
            }
        }
        let mut out = Vec::new();
        walk(&self.types, &mut out);
        out
    }

    /// File-level extend blocks followed by those nested in messages.
    pub fn all_extends(&self) -> Vec<&Extend> {
        let mut out: Vec<&Extend> = self.extends.iter().collect();
        for decl in self.declared_types() {
            if let TypeDecl::Message(message) = decl {
                out.extend(message.extends.iter());
            }
        }
        out
    }
}
