//! Recursive-descent parser for Avro IDL protocols
//!
//! Produces named types with references left as written; the caller resolves
//! them once imports are known (see [`super::parse_file`]).

use serde_json::{Map, Value};
use tracing::debug;

use super::lexer::{Token, TokenKind};
use crate::schema::{AvroType, Field, FieldOrder, Name, NamedKind, NamedType, Primitive, Props};

/// Parse failure with position
#[derive(Debug)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Idl,
    Protocol,
    Schema,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub kind: ImportKind,
    pub path: String,
    pub line: usize,
    pub column: usize,
}

/// A protocol message. Only kept so its references can be checked.
#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    /// `None` for `void`
    pub response: Option<AvroType>,
    pub request: Vec<Field>,
    pub one_way: bool,
    pub errors: Vec<String>,
}

/// Where a type name was written, for error reporting
#[derive(Debug, Clone)]
pub struct NameSite {
    pub name: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct Protocol {
    pub name: String,
    pub namespace: Option<String>,
    pub doc: Option<String>,
    pub props: Props,
    pub types: Vec<NamedType>,
    pub imports: Vec<Import>,
    pub messages: Vec<Message>,
    pub references: Vec<NameSite>,
    pub declarations: Vec<NameSite>,
}

pub fn parse_protocol(tokens: Vec<Token>) -> ParseResult<Protocol> {
    Parser {
        tokens,
        pos: 0,
        namespace: None,
        references: Vec::new(),
        declarations: Vec::new(),
    }
    .protocol()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    namespace: Option<String>,
    references: Vec<NameSite>,
    declarations: Vec<NameSite>,
}

impl Parser {
    fn peek(&self) -> &Token {
        // the lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        self.error_at(token, format!("expected {}, found {}", expected, token.kind))
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek().kind == TokenKind::Punct(c)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<Token> {
        if self.is_punct(c) {
            Ok(self.next())
        } else {
            Err(self.unexpected(&format!("'{}'", c)))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident { text, quoted: false } if text == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.next();
            true
        } else {
            false
        }
    }

    fn ident(&mut self, what: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Ident { text, .. } => {
                let text = text.clone();
                self.next();
                Ok(text)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn string(&mut self, what: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Str(s) => {
                let s = s.clone();
                self.next();
                Ok(s)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn protocol(mut self) -> ParseResult<Protocol> {
        let doc = self.peek().doc.clone();
        let mut props = self.annotations()?;
        if !self.eat_keyword("protocol") {
            return Err(self.unexpected("'protocol'"));
        }
        let name = self.ident("protocol name")?;
        self.namespace = take_string_prop(&mut props, "namespace").filter(|ns| !ns.is_empty());
        self.expect_punct('{')?;

        let mut types = Vec::new();
        let mut imports = Vec::new();
        let mut messages = Vec::new();
        while !self.is_punct('}') {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.unexpected("'}'"));
            }
            if self.is_keyword("import") {
                imports.push(self.import()?);
                continue;
            }

            let doc = self.peek().doc.clone();
            let props = self.annotations()?;
            if self.is_keyword("record") || self.is_keyword("error") {
                types.push(self.record(doc, props)?);
            } else if self.is_keyword("enum") {
                types.push(self.enumeration(doc, props)?);
            } else if self.is_keyword("fixed") {
                types.push(self.fixed(doc, props)?);
            } else {
                messages.push(self.message()?);
            }
        }
        self.expect_punct('}')?;
        if self.peek().kind != TokenKind::Eof {
            return Err(self.unexpected("end of file"));
        }

        Ok(Protocol {
            name,
            namespace: self.namespace,
            doc,
            props,
            types,
            imports,
            messages,
            references: self.references,
            declarations: self.declarations,
        })
    }

    fn import(&mut self) -> ParseResult<Import> {
        let start = self.next();
        let kind = match self.ident("import kind")?.as_str() {
            "idl" => ImportKind::Idl,
            "protocol" => ImportKind::Protocol,
            "schema" => ImportKind::Schema,
            other => {
                return Err(self.error_at(
                    &start,
                    format!("unknown import kind '{}', expected idl, protocol or schema", other),
                ))
            }
        };
        let path = self.string("import path")?;
        self.expect_punct(';')?;
        Ok(Import {
            kind,
            path,
            line: start.line,
            column: start.column,
        })
    }

    /// Read the declared name; `@namespace` overrides the protocol namespace
    fn declared_name(&mut self, what: &str, props: &mut Props) -> ParseResult<Name> {
        let token = self.peek().clone();
        let raw = self.ident(what)?;
        let namespace = take_string_prop(props, "namespace").or_else(|| self.namespace.clone());
        let name = Name::parse(&raw, namespace.as_deref());
        self.declarations.push(NameSite {
            name: name.fullname(),
            line: token.line,
            column: token.column,
        });
        Ok(name)
    }

    fn record(&mut self, doc: Option<String>, mut props: Props) -> ParseResult<NamedType> {
        let keyword = self.next();
        let error = matches!(&keyword.kind, TokenKind::Ident { text, .. } if text == "error");
        let name = self.declared_name("record name", &mut props)?;
        let aliases = take_aliases(&mut props).map_err(|m| self.error_at(&keyword, m))?;

        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.is_punct('}') {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.unexpected("'}'"));
            }
            fields.extend(self.field_declaration()?);
        }
        self.expect_punct('}')?;

        Ok(NamedType {
            name,
            doc,
            aliases,
            kind: NamedKind::Record { fields, error },
            props,
        })
    }

    fn enumeration(&mut self, doc: Option<String>, mut props: Props) -> ParseResult<NamedType> {
        let keyword = self.next();
        let name = self.declared_name("enum name", &mut props)?;
        let aliases = take_aliases(&mut props).map_err(|m| self.error_at(&keyword, m))?;

        self.expect_punct('{')?;
        let mut symbols = Vec::new();
        while !self.is_punct('}') {
            symbols.push(self.ident("enum symbol")?);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct('}')?;

        let default = if self.eat_punct('=') {
            let symbol = self.ident("default enum symbol")?;
            if !symbols.contains(&symbol) {
                return Err(self.error_at(
                    &keyword,
                    format!("default symbol {} is not a symbol of enum {}", symbol, name),
                ));
            }
            self.expect_punct(';')?;
            Some(symbol)
        } else {
            self.eat_punct(';');
            None
        };

        Ok(NamedType {
            name,
            doc,
            aliases,
            kind: NamedKind::Enum { symbols, default },
            props,
        })
    }

    fn fixed(&mut self, doc: Option<String>, mut props: Props) -> ParseResult<NamedType> {
        let keyword = self.next();
        let name = self.declared_name("fixed name", &mut props)?;
        let aliases = take_aliases(&mut props).map_err(|m| self.error_at(&keyword, m))?;

        self.expect_punct('(')?;
        let size = self.size("fixed size")?;
        self.expect_punct(')')?;
        self.expect_punct(';')?;

        Ok(NamedType {
            name,
            doc,
            aliases,
            kind: NamedKind::Fixed { size },
            props,
        })
    }

    fn size(&mut self, what: &str) -> ParseResult<usize> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Number(raw) => {
                let value = raw
                    .parse::<usize>()
                    .map_err(|_| self.error_at(&token, format!("invalid {}: {}", what, raw)))?;
                self.next();
                Ok(value)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// `Type name [= default] (, name [= default])* ;`
    fn field_declaration(&mut self) -> ParseResult<Vec<Field>> {
        let doc = self.peek().doc.clone();
        let type_props = self.annotations()?;
        let (ty, optional) = self.field_type()?;
        let ty = with_type_props(ty, type_props);

        let mut fields = Vec::new();
        loop {
            let var_doc = self.peek().doc.clone();
            let start = self.peek().clone();
            let mut props = self.annotations()?;
            let name = self.ident("field name")?;
            let default = if self.eat_punct('=') {
                Some(self.json_value()?)
            } else {
                None
            };

            let order = match take_string_prop(&mut props, "order") {
                Some(order) => FieldOrder::parse(&order.to_lowercase())
                    .ok_or_else(|| self.error_at(&start, format!("invalid field order '{}'", order)))?,
                None => FieldOrder::Ascending,
            };
            let aliases = take_aliases(&mut props).map_err(|m| self.error_at(&start, m))?;

            // `T? x = value` puts the non-null branch first so the default matches it
            let mut field_ty = ty.clone();
            if optional && default.as_ref().is_some_and(|d| !d.is_null()) {
                if let AvroType::Union(branches) = &mut field_ty {
                    branches.reverse();
                }
            }

            fields.push(Field {
                name,
                doc: var_doc.or_else(|| doc.clone()),
                ty: field_ty,
                default,
                order,
                aliases,
                props,
            });

            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(';')?;
        Ok(fields)
    }

    fn message(&mut self) -> ParseResult<Message> {
        let response = if self.eat_keyword("void") {
            None
        } else {
            Some(self.field_type()?.0)
        };
        let name = self.ident("message name")?;

        self.expect_punct('(')?;
        let mut request = Vec::new();
        while !self.is_punct(')') {
            let type_props = self.annotations()?;
            let (ty, _) = self.field_type()?;
            let mut props = self.annotations()?;
            let param = self.ident("parameter name")?;
            let mut field = Field::new(param, with_type_props(ty, type_props));
            if self.eat_punct('=') {
                field.default = Some(self.json_value()?);
            }
            field.aliases = take_aliases(&mut props).unwrap_or_default();
            field.props = props;
            request.push(field);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;

        let one_way = self.eat_keyword("oneway");
        let mut errors = Vec::new();
        if self.eat_keyword("throws") {
            loop {
                let site = self.peek().clone();
                let error = self.ident("error type")?;
                self.reference_site(&error, &site);
                errors.push(error);
                if !self.eat_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(';')?;

        Ok(Message {
            name,
            response,
            request,
            one_way,
            errors,
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// A type, plus whether it was written with the `?` shorthand
    fn field_type(&mut self) -> ParseResult<(AvroType, bool)> {
        let base = self.plain_type()?;
        if self.eat_punct('?') {
            Ok((
                AvroType::Union(vec![AvroType::primitive(Primitive::Null), base]),
                true,
            ))
        } else {
            Ok((base, false))
        }
    }

    fn plain_type(&mut self) -> ParseResult<AvroType> {
        let token = self.peek().clone();
        let (text, quoted) = match &token.kind {
            TokenKind::Ident { text, quoted } => (text.clone(), *quoted),
            _ => return Err(self.unexpected("type")),
        };
        self.next();

        if quoted {
            self.reference_site(&text, &token);
            return Ok(AvroType::Reference(text));
        }

        if let Some(kind) = Primitive::from_name(&text) {
            return Ok(AvroType::primitive(kind));
        }

        let ty = match text.as_str() {
            "array" => {
                self.expect_punct('<')?;
                let items = self.field_type()?.0;
                self.expect_punct('>')?;
                AvroType::Array {
                    items: Box::new(items),
                    props: Props::new(),
                }
            }
            "map" => {
                self.expect_punct('<')?;
                let values = self.field_type()?.0;
                self.expect_punct('>')?;
                AvroType::Map {
                    values: Box::new(values),
                    props: Props::new(),
                }
            }
            "union" => {
                self.expect_punct('{')?;
                let mut branches = vec![self.field_type()?.0];
                while self.eat_punct(',') {
                    branches.push(self.field_type()?.0);
                }
                self.expect_punct('}')?;
                AvroType::Union(branches)
            }
            "decimal" => {
                self.expect_punct('(')?;
                let precision = self.size("decimal precision")?;
                self.expect_punct(',')?;
                let scale = self.size("decimal scale")?;
                self.expect_punct(')')?;
                logical(Primitive::Bytes, "decimal", &[
                    ("precision", Value::from(precision)),
                    ("scale", Value::from(scale)),
                ])
            }
            "date" => logical(Primitive::Int, "date", &[]),
            "time_ms" => logical(Primitive::Int, "time-millis", &[]),
            "timestamp_ms" => logical(Primitive::Long, "timestamp-millis", &[]),
            "local_timestamp_ms" => logical(Primitive::Long, "local-timestamp-millis", &[]),
            "uuid" => logical(Primitive::String, "uuid", &[]),
            _ => {
                self.reference_site(&text, &token);
                AvroType::Reference(text)
            }
        };
        Ok(ty)
    }

    fn reference_site(&mut self, name: &str, token: &Token) {
        self.references.push(NameSite {
            name: name.to_string(),
            line: token.line,
            column: token.column,
        });
    }

    // ------------------------------------------------------------------
    // Annotations and JSON values
    // ------------------------------------------------------------------

    fn annotations(&mut self) -> ParseResult<Props> {
        let mut props = Props::new();
        while let TokenKind::At(name) = &self.peek().kind {
            let name = name.clone();
            self.next();
            self.expect_punct('(')?;
            let value = self.json_value()?;
            self.expect_punct(')')?;
            props.insert(name, value);
        }
        Ok(props)
    }

    fn json_value(&mut self) -> ParseResult<Value> {
        let token = self.next();
        match &token.kind {
            TokenKind::Str(s) => Ok(Value::String(s.clone())),
            TokenKind::Number(raw) => serde_json::from_str::<Value>(raw)
                .map_err(|_| self.error_at(&token, format!("invalid number {}", raw))),
            TokenKind::Ident { text, quoted: false } => match text.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => Err(self.error_at(&token, format!("expected JSON value, found {}", token.kind))),
            },
            TokenKind::Punct('[') => {
                let mut items = Vec::new();
                while !self.is_punct(']') {
                    items.push(self.json_value()?);
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                self.expect_punct(']')?;
                Ok(Value::Array(items))
            }
            TokenKind::Punct('{') => {
                let mut obj = Map::new();
                while !self.is_punct('}') {
                    let key = self.string("object key")?;
                    self.expect_punct(':')?;
                    obj.insert(key, self.json_value()?);
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                self.expect_punct('}')?;
                Ok(Value::Object(obj))
            }
            _ => Err(self.error_at(&token, format!("expected JSON value, found {}", token.kind))),
        }
    }
}

fn logical(kind: Primitive, logical_type: &str, extra: &[(&str, Value)]) -> AvroType {
    let mut props = Props::new();
    props.insert("logicalType".into(), Value::String(logical_type.into()));
    for (key, value) in extra {
        props.insert((*key).to_string(), value.clone());
    }
    AvroType::Primitive { kind, props }
}

/// Annotations written before a field type become properties of that type
fn with_type_props(ty: AvroType, extra: Props) -> AvroType {
    if extra.is_empty() {
        return ty;
    }
    match ty {
        AvroType::Primitive { kind, mut props } => {
            props.extend(extra);
            AvroType::Primitive { kind, props }
        }
        AvroType::Array { items, mut props } => {
            props.extend(extra);
            AvroType::Array { items, props }
        }
        AvroType::Map { values, mut props } => {
            props.extend(extra);
            AvroType::Map { values, props }
        }
        AvroType::Reference(name) => {
            debug!("ignoring properties {:?} on reference to {}", extra.keys().collect::<Vec<_>>(), name);
            AvroType::Reference(name)
        }
        AvroType::Union(branches) => {
            debug!("ignoring properties {:?} on union", extra.keys().collect::<Vec<_>>());
            AvroType::Union(branches)
        }
    }
}

fn take_string_prop(props: &mut Props, key: &str) -> Option<String> {
    match props.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // keep non-string values as plain properties
            props.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn take_aliases(props: &mut Props) -> Result<Vec<String>, String> {
    match props.remove("aliases") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(format!("alias must be a string, found {}", other)),
            })
            .collect(),
        Some(other) => Err(format!("@aliases must be an array of strings, found {}", other)),
    }
}
