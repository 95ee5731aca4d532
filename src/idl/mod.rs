//! Avro IDL parsing
//!
//! Parses one `.avdl` file as a compilation unit: the protocol's own record,
//! error, enum and fixed declarations plus everything it imports. Messages are
//! parsed for validity but contribute no types.

pub mod lexer;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{CompatError, Result};
use crate::schema::{parse_json_type, AvroType, Name, NamedKind, NamedType, TypeTable};
use parser::{ImportKind, Protocol};

pub use parser::{Import, Message};

/// A parsed IDL file
#[derive(Debug, Clone)]
pub struct IdlFile {
    pub path: PathBuf,
    /// Protocol name, qualified with the protocol namespace
    pub protocol: Name,
    /// Every named type the file declares or imports, references resolved
    pub types: TypeTable,
    /// Where each type enters the file: its declaration, or the import that brought it in
    pub positions: BTreeMap<String, (usize, usize)>,
}

impl IdlFile {
    /// Line and column for errors about `fullname`, `(0, 0)` when unknown
    pub fn position(&self, fullname: &str) -> (usize, usize) {
        self.positions.get(fullname).copied().unwrap_or((0, 0))
    }
}

/// Parse an IDL file from disk, following its imports
pub fn parse_file(path: &Path) -> Result<IdlFile> {
    let mut visited = HashSet::new();
    parse_with_imports(path, &mut visited)
}

/// Parse IDL source text; `path` names the file in errors and anchors imports
pub fn parse_str(source: &str, path: &Path) -> Result<IdlFile> {
    let mut visited = HashSet::new();
    visited.insert(canonical(path));
    parse_source(source, path, &mut visited)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn parse_with_imports(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<IdlFile> {
    visited.insert(canonical(path));
    let source = fs::read_to_string(path)
        .map_err(|e| CompatError::idl(path, 0, 0, format!("cannot read file: {}", e)))?;
    parse_source(&source, path, visited)
}

fn parse_source(source: &str, path: &Path, visited: &mut HashSet<PathBuf>) -> Result<IdlFile> {
    let tokens = lexer::tokenize(source)
        .map_err(|e| CompatError::idl(path, e.line, e.column, e.message))?;
    let protocol = parser::parse_protocol(tokens)
        .map_err(|e| CompatError::idl(path, e.line, e.column, e.message))?;

    let mut table = TypeTable::new();
    let mut positions = BTreeMap::new();
    for import in &protocol.imports {
        for named in load_import(path, import, visited)? {
            positions
                .entry(named.fullname())
                .or_insert((import.line, import.column));
            insert_type(&mut table, named)
                .map_err(|m| CompatError::idl(path, import.line, import.column, m))?;
        }
    }

    let mut known: BTreeSet<String> = table.keys().cloned().collect();
    for named in &protocol.types {
        let fullname = named.fullname();
        if !known.insert(fullname.clone()) && !table.contains_key(&fullname) {
            let (line, column) = declaration_position(&protocol, &fullname, 1);
            return Err(CompatError::idl(
                path,
                line,
                column,
                format!("type {} is declared more than once", fullname),
            ));
        }
    }

    let resolver = Resolver {
        known: &known,
        protocol_namespace: protocol.namespace.as_deref(),
    };
    let fail = |raw: String| {
        let (line, column) = reference_position(&protocol, &raw);
        CompatError::idl(path, line, column, format!("undefined name: {}", raw))
    };

    for message in &protocol.messages {
        let mut response = message.response.clone();
        if let Some(ty) = response.as_mut() {
            resolver.resolve(ty, None).map_err(fail)?;
        }
        for param in &message.request {
            resolver.resolve(&mut param.ty.clone(), None).map_err(fail)?;
        }
        for error in &message.errors {
            resolver
                .resolve(&mut AvroType::Reference(error.clone()), None)
                .map_err(fail)?;
        }
    }

    for mut named in protocol.types.clone() {
        let enclosing = named.name.namespace.clone();
        if let NamedKind::Record { fields, .. } = &mut named.kind {
            for field in fields.iter_mut() {
                resolver
                    .resolve(&mut field.ty, enclosing.as_deref())
                    .map_err(fail)?;
            }
        }
        let (line, column) = declaration_position(&protocol, &named.fullname(), 0);
        positions.insert(named.fullname(), (line, column));
        insert_type(&mut table, named).map_err(|m| CompatError::idl(path, line, column, m))?;
    }

    debug!(
        "parsed protocol {} from {}: {} types",
        protocol.name,
        path.display(),
        table.len()
    );

    Ok(IdlFile {
        path: path.to_path_buf(),
        protocol: Name::parse(&protocol.name, protocol.namespace.as_deref()),
        types: table,
        positions,
    })
}

fn load_import(
    importer: &Path,
    import: &Import,
    visited: &mut HashSet<PathBuf>,
) -> Result<Vec<NamedType>> {
    let target = importer
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&import.path);

    if import.kind == ImportKind::Idl {
        if visited.contains(&canonical(&target)) {
            debug!("skipping already imported {}", target.display());
            return Ok(Vec::new());
        }
        if !target.is_file() {
            return Err(CompatError::idl(
                importer,
                import.line,
                import.column,
                format!("cannot find imported file {}", import.path),
            ));
        }
        let imported = parse_with_imports(&target, visited)?;
        return Ok(imported.types.into_values().collect());
    }

    let text = fs::read_to_string(&target).map_err(|e| {
        CompatError::idl(
            importer,
            import.line,
            import.column,
            format!("cannot read imported file {}: {}", import.path, e),
        )
    })?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| CompatError::idl(&target, e.line(), e.column(), e.to_string()))?;
    let invalid = |m: String| CompatError::idl(&target, 1, 1, m);

    let mut out = Vec::new();
    if import.kind == ImportKind::Schema {
        parse_json_type(&value, None, &mut out).map_err(invalid)?;
    } else {
        let namespace = value.get("namespace").and_then(Value::as_str);
        let types = value
            .get("types")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for ty in &types {
            parse_json_type(ty, namespace, &mut out).map_err(invalid)?;
        }
    }
    Ok(out)
}

/// Add a type; an identical redefinition is fine, a different one is not
fn insert_type(table: &mut TypeTable, named: NamedType) -> std::result::Result<(), String> {
    let fullname = named.fullname();
    match table.get(&fullname) {
        Some(existing) if !existing.same_structure(&named) => {
            Err(format!("type {} is defined differently by an import", fullname))
        }
        Some(_) => Ok(()),
        None => {
            table.insert(fullname, named);
            Ok(())
        }
    }
}

struct Resolver<'a> {
    known: &'a BTreeSet<String>,
    protocol_namespace: Option<&'a str>,
}

impl Resolver<'_> {
    /// Rewrite references to full names; `Err` carries the unresolved name
    fn resolve(&self, ty: &mut AvroType, enclosing: Option<&str>) -> std::result::Result<(), String> {
        match ty {
            AvroType::Primitive { .. } => Ok(()),
            AvroType::Array { items, .. } => self.resolve(items, enclosing),
            AvroType::Map { values, .. } => self.resolve(values, enclosing),
            AvroType::Union(branches) => branches
                .iter_mut()
                .try_for_each(|branch| self.resolve(branch, enclosing)),
            AvroType::Reference(raw) => {
                let resolved = self.lookup(raw, enclosing).ok_or_else(|| raw.clone())?;
                *raw = resolved;
                Ok(())
            }
        }
    }

    fn lookup(&self, raw: &str, enclosing: Option<&str>) -> Option<String> {
        if raw.contains('.') {
            return self.known.contains(raw).then(|| raw.to_string());
        }
        [enclosing, self.protocol_namespace, None]
            .into_iter()
            .map(|ns| Name::parse(raw, ns).fullname())
            .find(|candidate| self.known.contains(candidate))
    }
}

fn reference_position(protocol: &Protocol, name: &str) -> (usize, usize) {
    protocol
        .references
        .iter()
        .find(|site| site.name == name)
        .map(|site| (site.line, site.column))
        .unwrap_or((0, 0))
}

/// Position of the `nth` declaration of `fullname` (0-based)
fn declaration_position(protocol: &Protocol, fullname: &str, nth: usize) -> (usize, usize) {
    protocol
        .declarations
        .iter()
        .filter(|site| site.name == fullname)
        .nth(nth)
        .map(|site| (site.line, site.column))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_references_resolve_across_namespaces() {
        let file = parse_str(
            r#"@namespace("com.x")
            protocol Shop {
                @namespace("com.x.money") fixed Cents(8);
                @namespace("com.x.money") record Price { Cents amount; }
                record Order { com.x.money.Price price; Order? parent = null; }
            }"#,
            Path::new("shop.avdl"),
        )
        .unwrap();

        assert_eq!(file.protocol.fullname(), "com.x.Shop");
        let keys: Vec<_> = file.types.keys().cloned().collect();
        assert_eq!(keys, vec!["com.x.Order", "com.x.money.Cents", "com.x.money.Price"]);

        let NamedKind::Record { fields, .. } = &file.types["com.x.money.Price"].kind else {
            panic!("expected record");
        };
        assert_eq!(fields[0].ty, AvroType::Reference("com.x.money.Cents".into()));
    }

    #[test]
    fn test_undefined_reference_names_file_and_position() {
        let err = parse_str(
            "protocol P {\n  record R {\n    Missing m;\n  }\n}",
            Path::new("broken.avdl"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error while parsing idl: broken.avdl:3:5: undefined name: Missing"
        );
    }

    #[test]
    fn test_imports_idl_and_schema() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("common.avdl"),
            r#"@namespace("com.x") protocol Common { enum Currency { EUR, USD } }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("money.avsc"),
            r#"{"type": "record", "name": "Money", "namespace": "com.x",
                "fields": [{"name": "units", "type": "long"}, {"name": "currency", "type": "Currency"}]}"#,
        )
        .unwrap();
        let main = dir.path().join("order.avdl");
        fs::write(
            &main,
            r#"@namespace("com.x") protocol Orders {
                import idl "common.avdl";
                import schema "money.avsc";
                record Order { Money total; }
            }"#,
        )
        .unwrap();

        let file = parse_file(&main).unwrap();
        let keys: Vec<_> = file.types.keys().cloned().collect();
        assert_eq!(keys, vec!["com.x.Currency", "com.x.Money", "com.x.Order"]);
    }

    #[test]
    fn test_import_cycle_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.avdl"),
            r#"protocol A { import idl "b.avdl"; record RA { int x; } }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.avdl"),
            r#"protocol B { import idl "a.avdl"; record RB { int y; } }"#,
        )
        .unwrap();

        let file = parse_file(&dir.path().join("a.avdl")).unwrap();
        assert_eq!(file.types.len(), 2);
    }

    #[test]
    fn test_missing_import_is_a_parse_error() {
        let err = parse_str(
            r#"protocol P { import idl "nope.avdl"; }"#,
            Path::new("/nonexistent/p.avdl"),
        )
        .unwrap_err();
        assert!(matches!(err, CompatError::IdlParse { .. }));
        assert!(err.to_string().contains("cannot find imported file nope.avdl"));
    }

    #[test]
    fn test_duplicate_declaration_is_rejected() {
        let err = parse_str(
            "protocol P { record R { int x; } record R { long x; } }",
            Path::new("dup.avdl"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error while parsing idl: dup.avdl:1:41: type R is declared more than once"
        );
    }
}
