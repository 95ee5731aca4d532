//! Schema Loader
//!
//! Parses a set of `.avdl` files and indexes every schema they define by
//! fully-qualified name. Identical definitions seen in several files (for
//! example through imports) collapse into one entry.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CompatError, Result};
use crate::idl;
use crate::schema::SchemaDefinition;

/// What to do when two different definitions share a full name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Fail with [`CompatError::DuplicateSchema`]
    #[default]
    Reject,
    /// Keep the definition from the file loaded last
    LastWins,
}

/// Schemas of one side of a comparison, keyed by full name
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: BTreeMap<String, SchemaDefinition>,
    origins: BTreeMap<String, PathBuf>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition loaded from `origin`, replacing any previous one
    pub fn insert(&mut self, definition: SchemaDefinition, origin: impl Into<PathBuf>) -> Option<SchemaDefinition> {
        let name = definition.fullname();
        self.origins.insert(name.clone(), origin.into());
        self.schemas.insert(name, definition)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// File the definition under `name` was loaded from
    pub fn origin(&self, name: &str) -> Option<&Path> {
        self.origins.get(name).map(PathBuf::as_path)
    }

    /// Full names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Definitions in sorted full-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaDefinition)> {
        self.schemas.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Parses IDL files into a [`SchemaSet`]
#[derive(Debug, Clone, Default)]
pub struct SchemaLoader {
    on_duplicate: DuplicatePolicy,
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Load every schema defined by `files`.
    ///
    /// Files are visited in sorted path order so the result does not depend on
    /// how the caller collected them. The first file that fails to parse
    /// aborts the load.
    pub fn load<I, P>(&self, files: I) -> Result<SchemaSet>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut paths: Vec<PathBuf> = files.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        paths.sort();
        paths.dedup();

        let mut parsed = Vec::new();
        for path in &paths {
            for definition in load_file(path)? {
                parsed.push((path.clone(), definition));
            }
        }

        // exact duplicates collapse; the first occurrence keeps its origin
        let mut seen = HashSet::new();
        parsed.retain(|(_, definition)| seen.insert(definition.fingerprint().clone()));

        let mut set = SchemaSet::new();
        for (path, definition) in parsed {
            let name = definition.fullname();
            if let (Some(existing), Some(first)) = (set.get(&name), set.origin(&name)) {
                debug_assert!(existing != &definition);
                match self.on_duplicate {
                    DuplicatePolicy::Reject => {
                        return Err(CompatError::DuplicateSchema {
                            name,
                            first: first.to_path_buf(),
                            second: path,
                        });
                    }
                    DuplicatePolicy::LastWins => {
                        warn!(
                            "schema {} from {} replaces a different definition from {}",
                            name,
                            path.display(),
                            first.display()
                        );
                    }
                }
            }
            set.insert(definition, path);
        }

        debug!("loaded {} schemas from {} files", set.len(), paths.len());
        Ok(set)
    }
}

/// Parse one file into its schema definitions
fn load_file(path: &Path) -> Result<Vec<SchemaDefinition>> {
    let file = idl::parse_file(path)?;
    file.types
        .values()
        .map(|named| {
            SchemaDefinition::from_named(named, &file.types).map_err(|e| match e {
                CompatError::Avro(_) | CompatError::InvalidSchema(_) => {
                    let (line, column) = file.position(&named.fullname());
                    CompatError::idl(
                        path,
                        line,
                        column,
                        format!("invalid schema {}: {}", named.fullname(), e),
                    )
                }
                other => other,
            })
        })
        .collect()
}
