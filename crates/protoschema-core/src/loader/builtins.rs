//! Bundled `google/protobuf/*.proto` files.
//!
//! These act as a virtual root that every load can resolve imports
//! against, consulted after the loaded sources and before the search
//! roots. They are built as ASTs directly so the core never needs a text
//! parser of its own.

use crate::models::{
    EnumType, Field, Label, Location, MessageType, OneOf, ProtoFile, Syntax,
};

/// `Location::base` of every bundled file.
pub const BUILTIN_BASE: &str = "<builtin>";

pub const BUILTIN_PATHS: &[&str] = &[
    "google/protobuf/any.proto",
    "google/protobuf/descriptor.proto",
    "google/protobuf/duration.proto",
    "google/protobuf/empty.proto",
    "google/protobuf/field_mask.proto",
    "google/protobuf/struct.proto",
    "google/protobuf/timestamp.proto",
    "google/protobuf/wrappers.proto",
];

const PACKAGE: &str = "google.protobuf";

fn file(path: &str) -> ProtoFile {
    ProtoFile::new(Location::get(BUILTIN_BASE, path), Some(PACKAGE))
}

fn message(name: &str) -> MessageType {
    MessageType::new(format!("{PACKAGE}.{name}"))
}

fn any() -> ProtoFile {
    file("google/protobuf/any.proto").with_type(
        message("Any")
            .with_field(Field::new("type_url", 1, "string"))
            .with_field(Field::new("value", 2, "bytes")),
    )
}

fn seconds_and_nanos(name: &str) -> MessageType {
    message(name)
        .with_field(Field::new("seconds", 1, "int64"))
        .with_field(Field::new("nanos", 2, "int32"))
}

fn wrappers() -> ProtoFile {
    let wrapped = [
        ("DoubleValue", "double"),
        ("FloatValue", "float"),
        ("Int64Value", "int64"),
        ("UInt64Value", "uint64"),
        ("Int32Value", "int32"),
        ("UInt32Value", "uint32"),
        ("BoolValue", "bool"),
        ("StringValue", "string"),
        ("BytesValue", "bytes"),
    ];
    wrapped
        .into_iter()
        .fold(file("google/protobuf/wrappers.proto"), |file, (name, scalar)| {
            file.with_type(message(name).with_field(Field::new("value", 1, scalar)))
        })
}

fn structs() -> ProtoFile {
    let null_value = EnumType::new(format!("{PACKAGE}.NullValue")).with_constant("NULL_VALUE", 0);
    let kind = OneOf::new(
        "kind",
        vec![
            Field::new("null_value", 1, format!("{PACKAGE}.NullValue")),
            Field::new("number_value", 2, "double"),
            Field::new("string_value", 3, "string"),
            Field::new("bool_value", 4, "bool"),
            Field::new("struct_value", 5, format!("{PACKAGE}.Struct")),
            Field::new("list_value", 6, format!("{PACKAGE}.ListValue")),
        ],
    );
    file("google/protobuf/struct.proto")
        .with_type(message("Struct").with_field(Field::new(
            "fields",
            1,
            format!("map<string, {PACKAGE}.Value>"),
        )))
        .with_type(message("Value").with_oneof(kind))
        .with_type(null_value)
        .with_type(
            message("ListValue").with_field(
                Field::new("values", 1, format!("{PACKAGE}.Value")).with_label(Label::Repeated),
            ),
        )
}

/// The options messages custom options extend, with a few of their
/// standard fields. Enough to link `extend google.protobuf.FieldOptions`
/// and friends.
fn descriptor() -> ProtoFile {
    let deprecated = || Field::new("deprecated", 33, "bool").with_label(Label::Optional);
    let options = [
        ("FileOptions", vec![Field::new("java_package", 1, "string"), Field::new("go_package", 11, "string")]),
        ("MessageOptions", vec![Field::new("map_entry", 7, "bool")]),
        ("FieldOptions", vec![Field::new("packed", 2, "bool"), Field::new("lazy", 5, "bool")]),
        ("OneofOptions", vec![]),
        ("EnumOptions", vec![Field::new("allow_alias", 2, "bool")]),
        ("EnumValueOptions", vec![]),
        ("ServiceOptions", vec![]),
        ("MethodOptions", vec![]),
    ];
    options
        .into_iter()
        .fold(
            file("google/protobuf/descriptor.proto").with_syntax(Syntax::Proto2),
            |file, (name, fields)| {
                let mut options_message = message(name);
                for field in fields {
                    options_message = options_message.with_field(field.with_label(Label::Optional));
                }
                file.with_type(options_message.with_field(deprecated()))
            },
        )
}

/// The bundled file imported as `path`.
pub fn builtin(path: &str) -> Option<ProtoFile> {
    let file = match path {
        "google/protobuf/any.proto" => any(),
        "google/protobuf/descriptor.proto" => descriptor(),
        "google/protobuf/duration.proto" => {
            file(path).with_type(seconds_and_nanos("Duration"))
        }
        "google/protobuf/empty.proto" => file(path).with_type(message("Empty")),
        "google/protobuf/field_mask.proto" => file(path).with_type(
            message("FieldMask")
                .with_field(Field::new("paths", 1, "string").with_label(Label::Repeated)),
        ),
        "google/protobuf/struct.proto" => structs(),
        "google/protobuf/timestamp.proto" => {
            file(path).with_type(seconds_and_nanos("Timestamp"))
        }
        "google/protobuf/wrappers.proto" => wrappers(),
        _ => return None,
    };
    Some(file)
}

pub fn is_builtin(path: &str) -> bool {
    BUILTIN_PATHS.contains(&path)
}
