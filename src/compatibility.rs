//! Schema compatibility checking
//!
//! Implements the Avro schema resolution rules: whether data written with one
//! schema (the writer) can be read with another (the reader). A
//! [`CompatibilityChecker`] applies those rules between a new schema and its
//! earlier revisions according to a [`CompatibilityLevel`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::{AvroType, NamedKind, NamedType, Primitive, SchemaDefinition};

/// How a new schema must relate to its earlier revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityLevel {
    None,
    /// New schema reads data written with the latest revision
    Backward,
    /// Latest revision reads data written with the new schema
    Forward,
    Full,
    BackwardTransitive,
    ForwardTransitive,
    #[default]
    FullTransitive,
}

impl CompatibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::None => "none",
            CompatibilityLevel::Backward => "backward",
            CompatibilityLevel::Forward => "forward",
            CompatibilityLevel::Full => "full",
            CompatibilityLevel::BackwardTransitive => "backward_transitive",
            CompatibilityLevel::ForwardTransitive => "forward_transitive",
            CompatibilityLevel::FullTransitive => "full_transitive",
        }
    }

    /// Whether every revision is checked rather than only the latest
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }

    fn checks_backward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Backward
                | CompatibilityLevel::Full
                | CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }

    fn checks_forward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Forward
                | CompatibilityLevel::Full
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => CompatibilityLevel::None,
            "backward" => CompatibilityLevel::Backward,
            "forward" => CompatibilityLevel::Forward,
            "full" => CompatibilityLevel::Full,
            "backward_transitive" => CompatibilityLevel::BackwardTransitive,
            "forward_transitive" => CompatibilityLevel::ForwardTransitive,
            "full_transitive" => CompatibilityLevel::FullTransitive,
            other => return Err(format!("unknown compatibility level: {}", other)),
        };
        Ok(level)
    }
}

/// Category of a resolution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncompatibilityKind {
    NameMismatch,
    FixedSizeMismatch,
    MissingEnumSymbols,
    ReaderFieldMissingDefaultValue,
    TypeMismatch,
    MissingUnionBranch,
}

impl IncompatibilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncompatibilityKind::NameMismatch => "NAME_MISMATCH",
            IncompatibilityKind::FixedSizeMismatch => "FIXED_SIZE_MISMATCH",
            IncompatibilityKind::MissingEnumSymbols => "MISSING_ENUM_SYMBOLS",
            IncompatibilityKind::ReaderFieldMissingDefaultValue => "READER_FIELD_MISSING_DEFAULT_VALUE",
            IncompatibilityKind::TypeMismatch => "TYPE_MISMATCH",
            IncompatibilityKind::MissingUnionBranch => "MISSING_UNION_BRANCH",
        }
    }
}

impl fmt::Display for IncompatibilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason a reader cannot read a writer's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatibility {
    pub kind: IncompatibilityKind,
    /// JSON-pointer style location in the reader schema, `/` for the root
    pub location: String,
    pub message: String,
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.location, self.message)
    }
}

/// Check whether `reader` can read data written with `writer`
pub fn check_reader_writer(reader: &SchemaDefinition, writer: &SchemaDefinition) -> Vec<Incompatibility> {
    let mut walker = Walker {
        reader,
        writer,
        visited: HashSet::new(),
        found: Vec::new(),
    };
    walker.named(writer.root(), reader.root(), "");
    walker.found
}

/// Applies a [`CompatibilityLevel`] between a schema and its history
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityChecker {
    level: CompatibilityLevel,
}

impl CompatibilityChecker {
    pub fn new(level: CompatibilityLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompatibilityLevel {
        self.level
    }

    /// Violation messages of `new` against `previous` (oldest first).
    ///
    /// An empty list means compatible. Non-transitive levels only look at the
    /// last entry of `previous`.
    pub fn is_compatible(&self, new: &SchemaDefinition, previous: &[SchemaDefinition]) -> Vec<String> {
        let revisions: Vec<(usize, &SchemaDefinition)> = if self.level.is_transitive() {
            previous.iter().enumerate().collect()
        } else {
            previous.iter().enumerate().last().into_iter().collect()
        };

        let mut messages = Vec::new();
        for (index, old) in revisions {
            if self.level.checks_backward() {
                for incompatibility in check_reader_writer(new, old) {
                    messages.push(format!(
                        "reader: new schema, writer: revision {}: {}",
                        index, incompatibility
                    ));
                }
            }
            if self.level.checks_forward() {
                for incompatibility in check_reader_writer(old, new) {
                    messages.push(format!(
                        "reader: revision {}, writer: new schema: {}",
                        index, incompatibility
                    ));
                }
            }
        }
        messages
    }
}

/// A type with references resolved against its schema's type table
enum Node<'a> {
    Primitive(Primitive),
    Array(&'a AvroType),
    Map(&'a AvroType),
    Union(&'a [AvroType]),
    Named(&'a NamedType),
    Unresolved(&'a str),
}

impl Node<'_> {
    fn label(&self) -> String {
        match self {
            Node::Primitive(kind) => kind.as_str().to_string(),
            Node::Array(_) => "array".to_string(),
            Node::Map(_) => "map".to_string(),
            Node::Union(_) => "union".to_string(),
            Node::Named(named) => format!("{} {}", named.kind_name(), named.fullname()),
            Node::Unresolved(name) => name.to_string(),
        }
    }
}

fn node<'a>(ty: &'a AvroType, schema: &'a SchemaDefinition) -> Node<'a> {
    match ty {
        AvroType::Primitive { kind, .. } => Node::Primitive(*kind),
        AvroType::Array { items, .. } => Node::Array(items),
        AvroType::Map { values, .. } => Node::Map(values),
        AvroType::Union(branches) => Node::Union(branches),
        AvroType::Reference(name) => match schema.lookup(name) {
            Some(named) => Node::Named(named),
            None => Node::Unresolved(name),
        },
    }
}

/// Writer type may be read as reader type
fn promotes(writer: Primitive, reader: Primitive) -> bool {
    use Primitive::*;
    writer == reader
        || matches!(
            (writer, reader),
            (Int, Long | Float | Double) | (Long, Float | Double) | (Float, Double) | (String, Bytes) | (Bytes, String)
        )
}

fn pointer(location: &str) -> String {
    if location.is_empty() {
        "/".to_string()
    } else {
        location.to_string()
    }
}

struct Walker<'a> {
    reader: &'a SchemaDefinition,
    writer: &'a SchemaDefinition,
    /// (writer, reader) named pairs already under comparison
    visited: HashSet<(String, String)>,
    found: Vec<Incompatibility>,
}

impl<'a> Walker<'a> {
    fn report(&mut self, kind: IncompatibilityKind, location: &str, message: String) {
        self.found.push(Incompatibility {
            kind,
            location: pointer(location),
            message,
        });
    }

    /// Compare without reporting; returns whether the pair resolves
    fn accepts(&mut self, writer: &'a AvroType, reader: &'a AvroType) -> bool {
        let mark = self.found.len();
        let visited = self.visited.clone();
        self.types(writer, reader, "");
        let ok = self.found.len() == mark;
        self.found.truncate(mark);
        if !ok {
            self.visited = visited;
        }
        ok
    }

    fn types(&mut self, writer: &'a AvroType, reader: &'a AvroType, location: &str) {
        let w = node(writer, self.writer);
        let r = node(reader, self.reader);

        if let Node::Union(branches) = w {
            for (i, branch) in branches.iter().enumerate() {
                if let Node::Union(_) = r {
                    if !self.accepts(branch, reader) {
                        self.report(
                            IncompatibilityKind::MissingUnionBranch,
                            location,
                            format!(
                                "reader union lacking writer type: {}",
                                node(branch, self.writer).label()
                            ),
                        );
                    }
                } else {
                    self.types(branch, reader, &format!("{}/{}", location, i));
                }
            }
            return;
        }

        match (w, r) {
            (_, Node::Union(branches)) => {
                if !branches.iter().any(|branch| self.accepts(writer, branch)) {
                    self.report(
                        IncompatibilityKind::MissingUnionBranch,
                        location,
                        format!("reader union lacking writer type: {}", node(writer, self.writer).label()),
                    );
                }
            }
            (Node::Primitive(wk), Node::Primitive(rk)) => {
                if !promotes(wk, rk) {
                    self.report(
                        IncompatibilityKind::TypeMismatch,
                        location,
                        format!(
                            "reader type {} not compatible with writer type {}",
                            rk.as_str(),
                            wk.as_str()
                        ),
                    );
                }
            }
            (Node::Array(wi), Node::Array(ri)) => self.types(wi, ri, &format!("{}/items", location)),
            (Node::Map(wv), Node::Map(rv)) => self.types(wv, rv, &format!("{}/values", location)),
            (Node::Named(wn), Node::Named(rn)) => self.named(wn, rn, location),
            (w, r) => {
                let (wl, rl) = (w.label(), r.label());
                self.report(
                    IncompatibilityKind::TypeMismatch,
                    location,
                    format!("reader type {} not compatible with writer type {}", rl, wl),
                );
            }
        }
    }

    fn named(&mut self, writer: &'a NamedType, reader: &'a NamedType, location: &str) {
        let same_kind = matches!(
            (&writer.kind, &reader.kind),
            (NamedKind::Record { .. }, NamedKind::Record { .. })
                | (NamedKind::Enum { .. }, NamedKind::Enum { .. })
                | (NamedKind::Fixed { .. }, NamedKind::Fixed { .. })
        );
        if !same_kind {
            self.report(
                IncompatibilityKind::TypeMismatch,
                location,
                format!(
                    "reader type {} not compatible with writer type {}",
                    reader.kind_name(),
                    writer.kind_name()
                ),
            );
            return;
        }

        if reader.name.name != writer.name.name && !reader.answers_to(&writer.fullname()) {
            self.report(
                IncompatibilityKind::NameMismatch,
                &format!("{}/name", location),
                format!(
                    "expected: {}, found: {}",
                    writer.fullname(),
                    reader.fullname()
                ),
            );
            return;
        }

        if !self.visited.insert((writer.fullname(), reader.fullname())) {
            return;
        }

        match (&writer.kind, &reader.kind) {
            (NamedKind::Fixed { size: ws }, NamedKind::Fixed { size: rs }) => {
                if ws != rs {
                    self.report(
                        IncompatibilityKind::FixedSizeMismatch,
                        &format!("{}/size", location),
                        format!("expected: {}, found: {}", ws, rs),
                    );
                }
            }
            (
                NamedKind::Enum { symbols: wsyms, .. },
                NamedKind::Enum {
                    symbols: rsyms,
                    default,
                },
            ) => {
                let missing: Vec<&str> = wsyms
                    .iter()
                    .filter(|s| !rsyms.contains(s))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() && default.is_none() {
                    self.report(
                        IncompatibilityKind::MissingEnumSymbols,
                        &format!("{}/symbols", location),
                        format!("[{}]", missing.join(", ")),
                    );
                }
            }
            (NamedKind::Record { fields: wfields, .. }, NamedKind::Record { fields: rfields, .. }) => {
                for (i, rfield) in rfields.iter().enumerate() {
                    let wfield = wfields.iter().find(|w| {
                        w.name == rfield.name || rfield.aliases.iter().any(|a| *a == w.name)
                    });
                    match wfield {
                        Some(wfield) => {
                            self.types(&wfield.ty, &rfield.ty, &format!("{}/fields/{}/type", location, i))
                        }
                        None if rfield.default.is_none() => self.report(
                            IncompatibilityKind::ReaderFieldMissingDefaultValue,
                            &format!("{}/fields/{}", location, i),
                            rfield.name.clone(),
                        ),
                        None => {}
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl;
    use std::path::Path;

    fn schema(source: &str, name: &str) -> SchemaDefinition {
        let file = idl::parse_str(source, Path::new("test.avdl")).unwrap();
        SchemaDefinition::from_named(&file.types[name], &file.types).unwrap()
    }

    fn order(fields: &str) -> SchemaDefinition {
        schema(
            &format!(r#"@namespace("com.x") protocol P {{ record Order {{ {} }} }}"#, fields),
            "com.x.Order",
        )
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("full_transitive".parse::<CompatibilityLevel>().unwrap(), CompatibilityLevel::FullTransitive);
        assert_eq!("BACKWARD".parse::<CompatibilityLevel>().unwrap(), CompatibilityLevel::Backward);
        assert_eq!("forward-transitive".parse::<CompatibilityLevel>().unwrap(), CompatibilityLevel::ForwardTransitive);
        assert!("sideways".parse::<CompatibilityLevel>().is_err());
        assert_eq!(CompatibilityLevel::default(), CompatibilityLevel::FullTransitive);
    }

    #[test]
    fn test_added_field_with_default_is_fully_compatible() {
        let old = order("int id;");
        let new = order("int id; int qty = 0;");
        let checker = CompatibilityChecker::default();
        assert!(checker.is_compatible(&new, &[old]).is_empty());
    }

    #[test]
    fn test_added_field_without_default_breaks_backward() {
        let old = order("int id;");
        let new = order("int id; int qty;");

        let found = check_reader_writer(&new, &old);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncompatibilityKind::ReaderFieldMissingDefaultValue);
        assert_eq!(found[0].location, "/fields/1");

        let forward = CompatibilityChecker::new(CompatibilityLevel::Forward);
        assert!(forward.is_compatible(&new, &[order("int id;")]).is_empty());
    }

    #[test]
    fn test_type_change_reports_location() {
        let old = order("int id;");
        let new = order("string id;");
        let messages = CompatibilityChecker::default().is_compatible(&new, &[old]);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            "reader: new schema, writer: revision 0: TYPE_MISMATCH at /fields/0/type: \
             reader type string not compatible with writer type int"
        );
    }

    #[test]
    fn test_promotions_are_one_way() {
        let narrow = order("int id;");
        let wide = order("long id;");
        assert!(check_reader_writer(&wide, &narrow).is_empty());
        assert_eq!(check_reader_writer(&narrow, &wide)[0].kind, IncompatibilityKind::TypeMismatch);

        let text = order("string id;");
        let raw = order("bytes id;");
        assert!(check_reader_writer(&text, &raw).is_empty());
        assert!(check_reader_writer(&raw, &text).is_empty());
    }

    #[test]
    fn test_enum_symbols() {
        let src = |symbols: &str, default: &str| {
            schema(
                &format!(r#"protocol P {{ enum Status {{ {} }}{} }}"#, symbols, default),
                "Status",
            )
        };
        let old = src("NEW, DONE", "");
        let grown = src("NEW, DONE, CANCELLED", "");

        assert!(check_reader_writer(&grown, &old).is_empty());
        let found = check_reader_writer(&old, &grown);
        assert_eq!(found[0].kind, IncompatibilityKind::MissingEnumSymbols);
        assert_eq!(found[0].location, "/symbols");
        assert_eq!(found[0].message, "[CANCELLED]");

        let defaulted = src("NEW, DONE", " = NEW;");
        assert!(check_reader_writer(&defaulted, &grown).is_empty());
    }

    #[test]
    fn test_fixed_size_and_name() {
        let a = schema("protocol P { fixed Hash(16); }", "Hash");
        let b = schema("protocol P { fixed Hash(32); }", "Hash");
        let c = schema("protocol P { fixed Digest(16); }", "Digest");
        assert_eq!(check_reader_writer(&a, &b)[0].kind, IncompatibilityKind::FixedSizeMismatch);
        assert_eq!(check_reader_writer(&a, &c)[0].kind, IncompatibilityKind::NameMismatch);

        let aliased = schema(r#"protocol P { @aliases(["Digest"]) fixed Hash(16); }"#, "Hash");
        assert!(check_reader_writer(&aliased, &c).is_empty());
    }

    #[test]
    fn test_optional_field_widening() {
        let old = order("int id; string note;");
        let new = order("int id; string? note;");
        assert!(check_reader_writer(&new, &old).is_empty());

        let found = check_reader_writer(&old, &new);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncompatibilityKind::TypeMismatch);
        assert_eq!(found[0].location, "/fields/1/type/0");
    }

    #[test]
    fn test_union_branch_removed() {
        let old = order("int id; union { null, int, string } code;");
        let new = order("int id; union { null, int } code;");
        let found = check_reader_writer(&new, &old);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncompatibilityKind::MissingUnionBranch);
        assert_eq!(found[0].message, "reader union lacking writer type: string");
    }

    #[test]
    fn test_recursive_types_terminate() {
        let list = schema(
            "protocol P { record Node { int value; union { null, Node } next; } }",
            "Node",
        );
        assert!(check_reader_writer(&list, &list).is_empty());
    }

    #[test]
    fn test_transitive_checks_every_revision() {
        let v1 = order("int id;");
        let v2 = order("int id; string? note = null;");
        // note is required in v3 and absent from v1
        let v3 = order("int id; string note;");

        let latest_only = CompatibilityChecker::new(CompatibilityLevel::Forward);
        assert!(latest_only.is_compatible(&v3, &[v1.clone(), v2.clone()]).is_empty());

        let transitive = CompatibilityChecker::new(CompatibilityLevel::BackwardTransitive);
        let messages = transitive.is_compatible(&v3, &[v1, v2]);
        assert!(messages.iter().any(|m| m.contains("revision 0")));
    }

    #[test]
    fn test_logical_types_ignored() {
        let old = order("long ts;");
        let new = order("timestamp_ms ts;");
        assert!(CompatibilityChecker::default().is_compatible(&new, &[old]).is_empty());
    }

    #[test]
    fn test_level_none_accepts_anything() {
        let checker = CompatibilityChecker::new(CompatibilityLevel::None);
        assert!(checker.is_compatible(&order("string id;"), &[order("int id;")]).is_empty());
    }
}
