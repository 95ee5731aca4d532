//! Avro type model and schema definitions
//!
//! The IDL parser produces [`NamedType`]s; the loader turns each of them into a
//! self-contained [`SchemaDefinition`] that carries every named type it
//! reaches, its JSON rendering and a structural fingerprint.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::checksum::Fingerprint;
use crate::error::{CompatError, Result};

/// Extra JSON properties attached to a type or field
pub type Props = BTreeMap<String, Value>;

/// Named types indexed by full name
pub type TypeTable = BTreeMap<String, NamedType>;

/// Avro primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Primitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Primitive::Null,
            "boolean" => Primitive::Boolean,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "bytes" => Primitive::Bytes,
            "string" => Primitive::String,
            _ => return None,
        })
    }
}

/// A type as it appears in a field, union branch or collection
#[derive(Debug, Clone, PartialEq)]
pub enum AvroType {
    Primitive { kind: Primitive, props: Props },
    Array { items: Box<AvroType>, props: Props },
    Map { values: Box<AvroType>, props: Props },
    Union(Vec<AvroType>),
    /// Reference to a named type by full name
    Reference(String),
}

impl AvroType {
    pub fn primitive(kind: Primitive) -> Self {
        AvroType::Primitive { kind, props: Props::new() }
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            AvroType::Primitive { .. } => {}
            AvroType::Array { items, .. } => items.collect_references(out),
            AvroType::Map { values, .. } => values.collect_references(out),
            AvroType::Union(branches) => {
                for branch in branches {
                    branch.collect_references(out);
                }
            }
            AvroType::Reference(name) => out.push(name),
        }
    }
}

/// Namespace-qualified name of a record, enum, fixed or error
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    pub namespace: Option<String>,
    pub name: String,
}

impl Name {
    /// Parse a possibly dotted name; undotted names take `default_namespace`
    pub fn parse(name: &str, default_namespace: Option<&str>) -> Self {
        match name.rsplit_once('.') {
            Some((namespace, simple)) => Self {
                namespace: non_empty(namespace),
                name: simple.to_string(),
            },
            None => Self {
                namespace: default_namespace.and_then(non_empty),
                name: name.to_string(),
            },
        }
    }

    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Qualify an alias the way Avro does: undotted aliases share this namespace
    pub fn qualify_alias(&self, alias: &str) -> String {
        Name::parse(alias, self.namespace.as_deref()).fullname()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Sort order of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    Ascending,
    Descending,
    Ignore,
}

impl FieldOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ascending" => Some(FieldOrder::Ascending),
            "descending" => Some(FieldOrder::Descending),
            "ignore" => Some(FieldOrder::Ignore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOrder::Ascending => "ascending",
            FieldOrder::Descending => "descending",
            FieldOrder::Ignore => "ignore",
        }
    }
}

/// A record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub doc: Option<String>,
    pub ty: AvroType,
    pub default: Option<Value>,
    pub order: FieldOrder,
    pub aliases: Vec<String>,
    pub props: Props,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: AvroType) -> Self {
        Self {
            name: name.into(),
            doc: None,
            ty,
            default: None,
            order: FieldOrder::Ascending,
            aliases: Vec::new(),
            props: Props::new(),
        }
    }
}

/// Structure of a named type
#[derive(Debug, Clone, PartialEq)]
pub enum NamedKind {
    Record { fields: Vec<Field>, error: bool },
    Enum { symbols: Vec<String>, default: Option<String> },
    Fixed { size: usize },
}

/// A record, error, enum or fixed declaration
#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    pub name: Name,
    pub doc: Option<String>,
    pub aliases: Vec<String>,
    pub kind: NamedKind,
    pub props: Props,
}

impl NamedType {
    pub fn new(name: Name, kind: NamedKind) -> Self {
        Self {
            name,
            doc: None,
            aliases: Vec::new(),
            kind,
            props: Props::new(),
        }
    }

    pub fn fullname(&self) -> String {
        self.name.fullname()
    }

    /// The Avro `type` keyword for this declaration
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NamedKind::Record { error: false, .. } => "record",
            NamedKind::Record { error: true, .. } => "error",
            NamedKind::Enum { .. } => "enum",
            NamedKind::Fixed { .. } => "fixed",
        }
    }

    /// Full names of the named types this declaration refers to directly
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let NamedKind::Record { fields, .. } = &self.kind {
            for field in fields {
                field.ty.collect_references(&mut out);
            }
        }
        out
    }

    /// Same declaration with type and field docs cleared
    pub fn without_docs(&self) -> NamedType {
        let mut named = self.clone();
        named.doc = None;
        if let NamedKind::Record { fields, .. } = &mut named.kind {
            for field in fields.iter_mut() {
                field.doc = None;
            }
        }
        named
    }

    /// Whether two declarations differ at most in their docs
    pub fn same_structure(&self, other: &NamedType) -> bool {
        self.without_docs() == other.without_docs()
    }

    /// Whether `fullname` names this type directly or through an alias
    pub fn answers_to(&self, fullname: &str) -> bool {
        self.fullname() == fullname
            || self.aliases.iter().any(|a| self.name.qualify_alias(a) == fullname)
    }
}

/// One parsed schema: a named type plus every named type it reaches.
///
/// Equality and hashing are structural, by fingerprint of the JSON form with
/// `doc` attributes left out.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    name: Name,
    types: TypeTable,
    json: Value,
    fingerprint: Fingerprint,
    avro: apache_avro::Schema,
}

impl SchemaDefinition {
    /// Build the definition for `root`, pulling referenced types from `table`.
    ///
    /// The rendered JSON is re-parsed with apache-avro, so anything that
    /// would not be a valid Avro schema is rejected here.
    pub fn from_named(root: &NamedType, table: &TypeTable) -> Result<Self> {
        let mut types = TypeTable::new();
        let mut pending = vec![root.clone()];
        while let Some(named) = pending.pop() {
            let fullname = named.fullname();
            if types.contains_key(&fullname) {
                continue;
            }
            for reference in named.references() {
                if types.contains_key(reference) {
                    continue;
                }
                let target = table.get(reference).ok_or_else(|| {
                    CompatError::InvalidSchema(format!(
                        "{} refers to undefined type {}",
                        fullname, reference
                    ))
                })?;
                pending.push(target.clone());
            }
            types.insert(fullname, named);
        }

        let mut seen = BTreeSet::new();
        let json = render_named(root, &types, &mut seen);
        let avro = apache_avro::Schema::parse_str(&errors_as_records(&json).to_string())?;
        let fingerprint = Fingerprint::from_json(&without_docs(&json));

        Ok(Self {
            name: root.name.clone(),
            types,
            json,
            fingerprint,
            avro,
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Fully-qualified name, the key schemas are matched on
    pub fn fullname(&self) -> String {
        self.name.fullname()
    }

    /// The root declaration
    pub fn root(&self) -> &NamedType {
        // from_named always inserts the root
        &self.types[&self.name.fullname()]
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Resolve a named type reference inside this schema
    pub fn lookup(&self, fullname: &str) -> Option<&NamedType> {
        self.types.get(fullname)
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.json).unwrap_or_else(|_| self.json.to_string())
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Avro Parsing Canonical Form, as computed by apache-avro
    pub fn canonical_form(&self) -> String {
        self.avro.canonical_form()
    }
}

impl PartialEq for SchemaDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for SchemaDefinition {}

impl Hash for SchemaDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

// ============================================================================
// JSON rendering
// ============================================================================

/// Render a type, inlining each named type at its first occurrence
pub fn render_type(ty: &AvroType, types: &TypeTable, seen: &mut BTreeSet<String>) -> Value {
    match ty {
        AvroType::Primitive { kind, props } => {
            if props.is_empty() {
                Value::String(kind.as_str().to_string())
            } else {
                let mut obj = props_object(props);
                obj.insert("type".into(), Value::String(kind.as_str().to_string()));
                Value::Object(obj)
            }
        }
        AvroType::Array { items, props } => {
            let mut obj = props_object(props);
            obj.insert("type".into(), Value::String("array".into()));
            obj.insert("items".into(), render_type(items, types, seen));
            Value::Object(obj)
        }
        AvroType::Map { values, props } => {
            let mut obj = props_object(props);
            obj.insert("type".into(), Value::String("map".into()));
            obj.insert("values".into(), render_type(values, types, seen));
            Value::Object(obj)
        }
        AvroType::Union(branches) => Value::Array(
            branches
                .iter()
                .map(|branch| render_type(branch, types, seen))
                .collect(),
        ),
        AvroType::Reference(name) => match types.get(name) {
            Some(named) if !seen.contains(name) => render_named(named, types, seen),
            _ => Value::String(name.clone()),
        },
    }
}

/// Render a named type in full
pub fn render_named(named: &NamedType, types: &TypeTable, seen: &mut BTreeSet<String>) -> Value {
    seen.insert(named.fullname());

    let mut obj = props_object(&named.props);
    obj.insert("type".into(), Value::String(named.kind_name().into()));
    obj.insert("name".into(), Value::String(named.name.name.clone()));
    if let Some(ns) = &named.name.namespace {
        obj.insert("namespace".into(), Value::String(ns.clone()));
    }
    if let Some(doc) = &named.doc {
        obj.insert("doc".into(), Value::String(doc.clone()));
    }
    if !named.aliases.is_empty() {
        obj.insert("aliases".into(), string_array(&named.aliases));
    }

    match &named.kind {
        NamedKind::Record { fields, .. } => {
            let rendered = fields
                .iter()
                .map(|field| render_field(field, types, seen))
                .collect();
            obj.insert("fields".into(), Value::Array(rendered));
        }
        NamedKind::Enum { symbols, default } => {
            obj.insert("symbols".into(), string_array(symbols));
            if let Some(default) = default {
                obj.insert("default".into(), Value::String(default.clone()));
            }
        }
        NamedKind::Fixed { size } => {
            obj.insert("size".into(), Value::from(*size));
        }
    }

    Value::Object(obj)
}

fn render_field(field: &Field, types: &TypeTable, seen: &mut BTreeSet<String>) -> Value {
    let mut obj = props_object(&field.props);
    obj.insert("name".into(), Value::String(field.name.clone()));
    obj.insert("type".into(), render_type(&field.ty, types, seen));
    if let Some(doc) = &field.doc {
        obj.insert("doc".into(), Value::String(doc.clone()));
    }
    if let Some(default) = &field.default {
        obj.insert("default".into(), default.clone());
    }
    if field.order != FieldOrder::Ascending {
        obj.insert("order".into(), Value::String(field.order.as_str().into()));
    }
    if !field.aliases.is_empty() {
        obj.insert("aliases".into(), string_array(&field.aliases));
    }
    Value::Object(obj)
}

/// Drop `doc` from type and field objects; default values are data and kept as is
fn without_docs(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(key, _)| !(key.as_str() == "doc" && obj.contains_key("type")))
                .map(|(key, v)| {
                    if key == "default" {
                        (key.clone(), v.clone())
                    } else {
                        (key.clone(), without_docs(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_docs).collect()),
        other => other.clone(),
    }
}

/// apache-avro only knows protocol errors as plain records
fn errors_as_records(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| {
                    let v = if k == "type" && v == "error" {
                        Value::String("record".into())
                    } else {
                        errors_as_records(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(errors_as_records).collect()),
        other => other.clone(),
    }
}

fn props_object(props: &Props) -> Map<String, Value> {
    props.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

// ============================================================================
// JSON parsing (.avsc / .avpr imports)
// ============================================================================

const NAMED_KEYS: &[&str] = &[
    "type", "name", "namespace", "doc", "aliases", "fields", "symbols", "default", "size",
];
const FIELD_KEYS: &[&str] = &["name", "type", "doc", "default", "order", "aliases"];

/// Parse an Avro JSON schema, appending every named type it declares to `out`
pub fn parse_json_type(
    value: &Value,
    namespace: Option<&str>,
    out: &mut Vec<NamedType>,
) -> std::result::Result<AvroType, String> {
    match value {
        Value::String(name) => Ok(match Primitive::from_name(name) {
            Some(kind) => AvroType::primitive(kind),
            None => AvroType::Reference(Name::parse(name, namespace).fullname()),
        }),
        Value::Array(branches) => branches
            .iter()
            .map(|branch| parse_json_type(branch, namespace, out))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(AvroType::Union),
        Value::Object(obj) => parse_json_object(obj, namespace, out),
        other => Err(format!("unexpected schema value: {}", other)),
    }
}

fn parse_json_object(
    obj: &Map<String, Value>,
    namespace: Option<&str>,
    out: &mut Vec<NamedType>,
) -> std::result::Result<AvroType, String> {
    let type_name = match obj.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(nested) => return parse_json_type(nested, namespace, out),
        None => return Err("schema object without \"type\"".to_string()),
    };

    match type_name {
        "record" | "error" | "enum" | "fixed" => {
            let raw_name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("{} without a name", type_name))?;
            let explicit_ns = obj.get("namespace").and_then(Value::as_str);
            let name = if raw_name.contains('.') {
                Name::parse(raw_name, None)
            } else {
                Name::parse(raw_name, explicit_ns.or(namespace))
            };
            let inner_ns = name.namespace.clone();

            let kind = match type_name {
                "record" | "error" => {
                    let raw_fields = obj
                        .get("fields")
                        .and_then(Value::as_array)
                        .ok_or_else(|| format!("record {} without fields", name))?;
                    let mut fields = Vec::with_capacity(raw_fields.len());
                    for raw in raw_fields {
                        fields.push(parse_json_field(raw, inner_ns.as_deref(), out)?);
                    }
                    NamedKind::Record {
                        fields,
                        error: type_name == "error",
                    }
                }
                "enum" => NamedKind::Enum {
                    symbols: string_list(obj.get("symbols"))
                        .ok_or_else(|| format!("enum {} without symbols", name))?,
                    default: obj.get("default").and_then(Value::as_str).map(String::from),
                },
                _ => NamedKind::Fixed {
                    size: obj
                        .get("size")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| format!("fixed {} without size", name))?
                        as usize,
                },
            };

            let fullname = name.fullname();
            out.push(NamedType {
                name,
                doc: obj.get("doc").and_then(Value::as_str).map(String::from),
                aliases: string_list(obj.get("aliases")).unwrap_or_default(),
                kind,
                props: extra_props(obj, NAMED_KEYS),
            });
            Ok(AvroType::Reference(fullname))
        }
        "array" => {
            let items = obj.get("items").ok_or("array without items")?;
            Ok(AvroType::Array {
                items: Box::new(parse_json_type(items, namespace, out)?),
                props: extra_props(obj, &["type", "items"]),
            })
        }
        "map" => {
            let values = obj.get("values").ok_or("map without values")?;
            Ok(AvroType::Map {
                values: Box::new(parse_json_type(values, namespace, out)?),
                props: extra_props(obj, &["type", "values"]),
            })
        }
        other => match Primitive::from_name(other) {
            Some(kind) => Ok(AvroType::Primitive {
                kind,
                props: extra_props(obj, &["type"]),
            }),
            None => Ok(AvroType::Reference(Name::parse(other, namespace).fullname())),
        },
    }
}

fn parse_json_field(
    raw: &Value,
    namespace: Option<&str>,
    out: &mut Vec<NamedType>,
) -> std::result::Result<Field, String> {
    let obj = raw.as_object().ok_or("field must be an object")?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or("field without a name")?;
    let ty = obj
        .get("type")
        .ok_or_else(|| format!("field {} without a type", name))?;

    let order = match obj.get("order").and_then(Value::as_str) {
        Some(order) => FieldOrder::parse(order).ok_or_else(|| format!("invalid order {}", order))?,
        None => FieldOrder::Ascending,
    };

    Ok(Field {
        name: name.to_string(),
        doc: obj.get("doc").and_then(Value::as_str).map(String::from),
        ty: parse_json_type(ty, namespace, out)?,
        default: obj.get("default").cloned(),
        order,
        aliases: string_list(obj.get("aliases")).unwrap_or_default(),
        props: extra_props(obj, FIELD_KEYS),
    })
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(String::from))
        .collect()
}

fn extra_props(obj: &Map<String, Value>, reserved: &[&str]) -> Props {
    obj.iter()
        .filter(|(k, _)| !reserved.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_record(fields: Vec<Field>) -> NamedType {
        NamedType::new(
            Name::parse("com.x.Order", None),
            NamedKind::Record { fields, error: false },
        )
    }

    #[test]
    fn test_name_parse() {
        let dotted = Name::parse("com.x.Order", Some("org.other"));
        assert_eq!(dotted.namespace.as_deref(), Some("com.x"));
        assert_eq!(dotted.name, "Order");

        let simple = Name::parse("Order", Some("com.x"));
        assert_eq!(simple.fullname(), "com.x.Order");

        let bare = Name::parse("Order", Some(""));
        assert_eq!(bare.fullname(), "Order");
        assert_eq!(simple.qualify_alias("OldOrder"), "com.x.OldOrder");
    }

    #[test]
    fn test_definition_inlines_references_once() {
        let status = NamedType::new(
            Name::parse("com.x.Status", None),
            NamedKind::Enum {
                symbols: vec!["NEW".into(), "DONE".into()],
                default: None,
            },
        );
        let order = order_record(vec![
            Field::new("current", AvroType::Reference("com.x.Status".into())),
            Field::new("previous", AvroType::Reference("com.x.Status".into())),
        ]);

        let mut table = TypeTable::new();
        table.insert(status.fullname(), status);
        table.insert(order.fullname(), order.clone());

        let def = SchemaDefinition::from_named(&order, &table).unwrap();
        assert_eq!(def.fullname(), "com.x.Order");
        assert_eq!(def.types().len(), 2);

        let fields = def.json()["fields"].as_array().unwrap();
        assert_eq!(fields[0]["type"]["type"], json!("enum"));
        assert_eq!(fields[1]["type"], json!("com.x.Status"));
        assert!(def
            .canonical_form()
            .starts_with(r#"{"name":"com.x.Order","type":"record""#));
    }

    #[test]
    fn test_definition_rejects_undefined_reference() {
        let order = order_record(vec![Field::new(
            "payment",
            AvroType::Reference("com.x.Payment".into()),
        )]);
        let table = TypeTable::new();
        let err = SchemaDefinition::from_named(&order, &table).unwrap_err();
        assert!(err.to_string().contains("undefined type com.x.Payment"));
    }

    #[test]
    fn test_structural_equality() {
        let mut qty = Field::new("qty", AvroType::primitive(Primitive::Int));
        qty.default = Some(json!(0));
        let a = order_record(vec![qty.clone()]);
        let b = order_record(vec![qty]);
        let c = order_record(vec![Field::new("qty", AvroType::primitive(Primitive::Long))]);

        let table = TypeTable::new();
        let da = SchemaDefinition::from_named(&a, &table).unwrap();
        let db = SchemaDefinition::from_named(&b, &table).unwrap();
        let dc = SchemaDefinition::from_named(&c, &table).unwrap();
        assert_eq!(da, db);
        assert_ne!(da, dc);
    }

    #[test]
    fn test_docs_do_not_affect_equality() {
        let mut id = Field::new("id", AvroType::primitive(Primitive::Int));
        id.doc = Some("order id".into());
        let mut a = order_record(vec![id.clone()]);
        a.doc = Some("the order".into());
        id.doc = None;
        let mut b = order_record(vec![id]);
        b.doc = Some("an order".into());

        let table = TypeTable::new();
        let da = SchemaDefinition::from_named(&a, &table).unwrap();
        let db = SchemaDefinition::from_named(&b, &table).unwrap();
        assert_eq!(da, db);
        assert!(a.same_structure(&b));
        assert_eq!(da.json()["doc"], json!("the order"));
        assert_eq!(da.json()["fields"][0]["doc"], json!("order id"));
    }

    #[test]
    fn test_defaults_keep_doc_keys() {
        let value = json!({
            "type": "record",
            "doc": "dropped",
            "fields": [{"name": "meta", "type": "Meta", "default": {"doc": "kept"}}]
        });
        let stripped = without_docs(&value);
        assert_eq!(stripped.get("doc"), None);
        assert_eq!(stripped["fields"][0]["default"]["doc"], json!("kept"));
    }

    #[test]
    fn test_parse_json_record() {
        let value = json!({
            "type": "record",
            "name": "Order",
            "namespace": "com.x",
            "fields": [
                {"name": "id", "type": "int"},
                {"name": "ts", "type": {"type": "long", "logicalType": "timestamp-millis"}},
                {"name": "line", "type": {"type": "record", "name": "Line", "fields": [
                    {"name": "sku", "type": "string", "default": ""}
                ]}},
                {"name": "lines", "type": {"type": "array", "items": "Line"}}
            ]
        });

        let mut out = Vec::new();
        let root = parse_json_type(&value, None, &mut out).unwrap();
        assert_eq!(root, AvroType::Reference("com.x.Order".into()));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].fullname(), "com.x.Line");

        let NamedKind::Record { fields, .. } = &out[1].kind else {
            panic!("expected record");
        };
        assert_eq!(fields[1].ty, AvroType::Primitive {
            kind: Primitive::Long,
            props: [("logicalType".to_string(), json!("timestamp-millis"))].into_iter().collect(),
        });
        assert_eq!(
            fields[3].ty,
            AvroType::Array {
                items: Box::new(AvroType::Reference("com.x.Line".into())),
                props: Props::new(),
            }
        );
    }
}
