//! Test fixtures: a small proto text parser standing in for the real
//! parser collaborator, plus helpers for building schemas and file trees.
//!
//! Supports the subset the tests use: syntax, package, (public) imports,
//! options, messages with nested declarations, oneofs, maps, enums,
//! services and extend blocks. `reserved` and `extensions` are skipped.

use std::path::Path;

use crate::errors::{SchemaError, SchemaResult};
use crate::loader::ProtoParser;
use crate::models::{
    EnumConstant, EnumType, Extend, Field, Label, Location, MessageType, OneOf, OptionElement,
    OptionValue, ProtoFile, Rpc, Service, Syntax, TypeDecl,
};
use crate::schema::Schema;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Sym(char),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '"' || c == '\'' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated string".into());
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Num(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Sym(c));
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, String> {
        let token = self.tokens.get(self.pos).cloned().ok_or("unexpected end of input")?;
        self.pos += 1;
        Ok(token)
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next()? {
            Token::Ident(s) => Ok(s),
            other => Err(format!("expected identifier, got {other:?}")),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        match self.next()? {
            Token::Sym(s) if s == c => Ok(()),
            other => Err(format!("expected '{c}', got {other:?}")),
        }
    }

    fn eat_sym(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Sym(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_statement(&mut self) -> Result<(), String> {
        while !matches!(self.next()?, Token::Sym(';')) {}
        Ok(())
    }

    fn number(&mut self) -> Result<String, String> {
        match self.next()? {
            Token::Num(n) => Ok(n),
            other => Err(format!("expected number, got {other:?}")),
        }
    }

    fn option_name(&mut self) -> Result<String, String> {
        let mut name = String::new();
        loop {
            match self.peek() {
                Some(Token::Sym('=')) => break,
                Some(Token::Sym(c)) if *c == '(' || *c == ')' => {
                    name.push(*c);
                    self.pos += 1;
                }
                Some(Token::Ident(s)) => {
                    name.push_str(s);
                    self.pos += 1;
                }
                other => return Err(format!("bad option name near {other:?}")),
            }
        }
        Ok(name)
    }

    fn option_value(&mut self) -> Result<OptionValue, String> {
        match self.next()? {
            Token::Str(s) | Token::Num(s) | Token::Ident(s) => Ok(OptionValue::Scalar(s)),
            Token::Sym('{') => {
                let mut entries = Vec::new();
                while !self.eat_sym('}') {
                    let key = self.ident()?;
                    self.eat_sym(':');
                    let value = self.option_value()?;
                    entries.push((key, value));
                    if !self.eat_sym(',') {
                        self.eat_sym(';');
                    }
                }
                Ok(OptionValue::Message(entries))
            }
            Token::Sym('[') => {
                let mut items = Vec::new();
                while !self.eat_sym(']') {
                    items.push(self.option_value()?);
                    self.eat_sym(',');
                }
                Ok(OptionValue::List(items))
            }
            other => Err(format!("bad option value {other:?}")),
        }
    }

    /// `name = value` after the `option` keyword, through the `;`.
    fn option_statement(&mut self) -> Result<OptionElement, String> {
        let name = self.option_name()?;
        self.expect('=')?;
        let value = self.option_value()?;
        self.expect(';')?;
        Ok(OptionElement::new(name, value))
    }

    /// `[a = 1, (b.c) = "x"]`, if present.
    fn bracket_options(&mut self) -> Result<Vec<OptionElement>, String> {
        let mut options = Vec::new();
        if self.eat_sym('[') {
            loop {
                let name = self.option_name()?;
                self.expect('=')?;
                options.push(OptionElement::new(name, self.option_value()?));
                if !self.eat_sym(',') {
                    break;
                }
            }
            self.expect(']')?;
        }
        Ok(options)
    }

    fn field(&mut self) -> Result<Field, String> {
        let label = if self.eat_ident("repeated") {
            Some(Label::Repeated)
        } else if self.eat_ident("optional") {
            Some(Label::Optional)
        } else if self.eat_ident("required") {
            Some(Label::Required)
        } else {
            None
        };
        let mut ty = self.ident()?;
        if ty == "map" && self.eat_sym('<') {
            let key = self.ident()?;
            self.expect(',')?;
            let value = self.ident()?;
            self.expect('>')?;
            ty = format!("map<{key}, {value}>");
        }
        let name = self.ident()?;
        self.expect('=')?;
        let tag = self.number()?.parse::<u32>().map_err(|e| e.to_string())?;
        let options = self.bracket_options()?;
        self.expect(';')?;
        let mut field = Field::new(name, tag, ty);
        field.label = label;
        field.options = options;
        Ok(field)
    }

    fn message(&mut self, scope: &str) -> Result<MessageType, String> {
        let name = self.ident()?;
        let mut message = MessageType::new(qualify(scope, &name));
        let full = message.ty.as_str().to_string();
        self.expect('{')?;
        while !self.eat_sym('}') {
            if self.eat_sym(';') {
                continue;
            }
            if self.eat_ident("message") {
                let nested = self.message(&full)?;
                message.nested.push(TypeDecl::Message(nested));
            } else if self.eat_ident("enum") {
                let nested = self.enumeration(&full)?;
                message.nested.push(TypeDecl::Enum(nested));
            } else if self.eat_ident("oneof") {
                let oneof_name = self.ident()?;
                self.expect('{')?;
                let mut fields = Vec::new();
                while !self.eat_sym('}') {
                    fields.push(self.field()?);
                }
                message.oneofs.push(OneOf::new(oneof_name, fields));
            } else if self.eat_ident("extend") {
                let extend = self.extend(&full)?;
                message.extends.push(extend);
            } else if self.eat_ident("option") {
                let option = self.option_statement()?;
                message.options.push(option);
            } else if self.eat_ident("reserved") || self.eat_ident("extensions") {
                self.skip_statement()?;
            } else {
                let field = self.field()?;
                message.fields.push(field);
            }
        }
        Ok(message)
    }

    fn enumeration(&mut self, scope: &str) -> Result<EnumType, String> {
        let name = self.ident()?;
        let mut enum_type = EnumType::new(qualify(scope, &name));
        self.expect('{')?;
        while !self.eat_sym('}') {
            if self.eat_sym(';') {
                continue;
            }
            if self.eat_ident("option") {
                let option = self.option_statement()?;
                enum_type.options.push(option);
            } else if self.eat_ident("reserved") {
                self.skip_statement()?;
            } else {
                let constant = self.ident()?;
                self.expect('=')?;
                let tag = self.number()?.parse::<i32>().map_err(|e| e.to_string())?;
                let options = self.bracket_options()?;
                self.expect(';')?;
                enum_type.constants.push(EnumConstant {
                    name: constant,
                    tag,
                    options,
                });
            }
        }
        Ok(enum_type)
    }

    fn extend(&mut self, namespace: &str) -> Result<Extend, String> {
        let extendee = self.ident()?;
        let mut extend = Extend::new(extendee, namespace);
        self.expect('{')?;
        while !self.eat_sym('}') {
            extend.fields.push(self.field()?);
        }
        Ok(extend)
    }

    fn rpc_type(&mut self) -> Result<(bool, String), String> {
        self.expect('(')?;
        let streaming = self.eat_ident("stream");
        let ty = self.ident()?;
        self.expect(')')?;
        Ok((streaming, ty))
    }

    fn service(&mut self, scope: &str) -> Result<Service, String> {
        let name = self.ident()?;
        let mut service = Service::new(qualify(scope, &name));
        self.expect('{')?;
        while !self.eat_sym('}') {
            if self.eat_sym(';') {
                continue;
            }
            if self.eat_ident("option") {
                let option = self.option_statement()?;
                service.options.push(option);
                continue;
            }
            if !self.eat_ident("rpc") {
                return Err(format!("expected rpc, got {:?}", self.peek()));
            }
            let rpc_name = self.ident()?;
            let (request_streaming, request) = self.rpc_type()?;
            if !self.eat_ident("returns") {
                return Err("expected returns".into());
            }
            let (response_streaming, response) = self.rpc_type()?;
            let mut rpc = Rpc::new(rpc_name, request, response);
            rpc.request_streaming = request_streaming;
            rpc.response_streaming = response_streaming;
            if self.eat_sym('{') {
                while !self.eat_sym('}') {
                    if self.eat_sym(';') {
                        continue;
                    }
                    if !self.eat_ident("option") {
                        return Err("expected option in rpc body".into());
                    }
                    let option = self.option_statement()?;
                    rpc.options.push(option);
                }
            } else {
                self.expect(';')?;
            }
            service.rpcs.push(rpc);
        }
        Ok(service)
    }

    fn file(&mut self, location: Location) -> Result<ProtoFile, String> {
        let mut file = ProtoFile::new(location, None);
        let mut scope = String::new();
        while self.peek().is_some() {
            if self.eat_sym(';') {
                continue;
            }
            let keyword = self.ident()?;
            match keyword.as_str() {
                "syntax" => {
                    self.expect('=')?;
                    file.syntax = match self.next()? {
                        Token::Str(s) if s == "proto2" => Syntax::Proto2,
                        _ => Syntax::Proto3,
                    };
                    self.expect(';')?;
                }
                "package" => {
                    scope = self.ident()?;
                    file.package = Some(scope.clone());
                    self.expect(';')?;
                }
                "import" => {
                    let public = self.eat_ident("public");
                    self.eat_ident("weak");
                    let path = match self.next()? {
                        Token::Str(s) => s,
                        other => return Err(format!("expected import path, got {other:?}")),
                    };
                    self.expect(';')?;
                    if public {
                        file.public_imports.push(path);
                    } else {
                        file.imports.push(path);
                    }
                }
                "option" => {
                    let option = self.option_statement()?;
                    file.options.push(option);
                }
                "message" => {
                    let message = self.message(&scope)?;
                    file.types.push(TypeDecl::Message(message));
                }
                "enum" => {
                    let enum_type = self.enumeration(&scope)?;
                    file.types.push(TypeDecl::Enum(enum_type));
                }
                "service" => {
                    let service = self.service(&scope)?;
                    file.services.push(service);
                }
                "extend" => {
                    let extend = self.extend(&scope)?;
                    file.extends.push(extend);
                }
                other => return Err(format!("unexpected keyword {other}")),
            }
        }
        Ok(file)
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

pub(crate) fn parse_at(location: Location, source: &str) -> Result<ProtoFile, String> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.file(location)
}

/// The stand-in parser collaborator.
pub(crate) struct TestParser;

impl ProtoParser for TestParser {
    fn parse(&self, location: &Location, source: &str) -> SchemaResult<ProtoFile> {
        parse_at(location.clone(), source).map_err(|message| SchemaError::Parse {
            location: location.clone(),
            message,
        })
    }
}

/// Parse `source` as if found at `path` under the search root `src`.
pub(crate) fn parse(path: &str, source: &str) -> ProtoFile {
    parse_at(Location::get("src", path), source).unwrap()
}

/// Link parsed files strictly, panicking on link errors.
pub(crate) fn link(files: Vec<ProtoFile>) -> Schema {
    Schema::link(files).unwrap()
}

/// Write `(relative path, contents)` pairs under `root`.
pub(crate) fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let target = root.join(path);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(target, contents).unwrap();
    }
}

/// Sorted fully-qualified names of every declared type.
pub(crate) fn type_names(schema: &Schema) -> Vec<String> {
    schema.types().map(|t| t.to_string()).collect()
}

/// The message declared as `name`, panicking if absent.
pub(crate) fn message<'a>(schema: &'a Schema, name: &str) -> &'a MessageType {
    match schema.get_type(&crate::models::ProtoType::get(name)) {
        Some(crate::schema::Declaration::Message(m)) => m,
        other => panic!("{name} is not a message: {other:?}"),
    }
}

/// Field names of a message, oneof fields included.
pub(crate) fn field_names(message: &MessageType) -> Vec<&str> {
    message.all_fields().map(|f| f.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_supported_subset() {
        let file = parse(
            "acme/shop.proto",
            r#"
            syntax = "proto3";
            package acme;
            import "google/protobuf/timestamp.proto";
            import public "acme/common.proto";
            option java_package = "com.acme";

            message Order {
              repeated Item items = 1;
              map<string, Item> by_sku = 2 [deprecated = true];
              oneof payment { Card card = 3; Cash cash = 4; }
              message Item { string sku = 1; }
              enum State { NEW = 0; PAID = 1; }
            }
            service Shop {
              rpc Place (Order) returns (stream Order);
            }
            extend Order { string note = 100; }
            "#,
        );
        assert_eq!(file.package.as_deref(), Some("acme"));
        assert_eq!(file.imports, vec!["google/protobuf/timestamp.proto"]);
        assert_eq!(file.public_imports, vec!["acme/common.proto"]);
        let TypeDecl::Message(order) = &file.types[0] else { panic!() };
        assert_eq!(order.ty.as_str(), "acme.Order");
        assert_eq!(field_names(order), vec!["items", "by_sku", "card", "cash"]);
        assert_eq!(order.nested[1].ty().as_str(), "acme.Order.State");
        assert!(file.services[0].rpcs[0].response_streaming);
        assert_eq!(file.extends[0].namespace, "acme");
    }
}
