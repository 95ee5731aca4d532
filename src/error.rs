//! Error types for the compatibility check

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for compatibility operations
pub type Result<T> = std::result::Result<T, CompatError>;

/// Compatibility check errors
#[derive(Error, Debug)]
pub enum CompatError {
    #[error("error while parsing idl: {}:{line}:{column}: {message}", .path.display())]
    IdlParse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("schema(s) missing from source set. diff size: {}, diff: {}{}", .missing.len(), fmt_list(.missing), Suggestions(.suggestions))]
    MissingSchemas {
        missing: Vec<String>,
        /// Closest source schema for each missing name, when one looks plausible
        suggestions: BTreeMap<String, String>,
    },

    #[error("Schema incompatibility found for the schema: {name}.\n{}{}", fmt_list(.messages), Diff(.diff))]
    Incompatible {
        name: String,
        messages: Vec<String>,
        diff: Option<String>,
    },

    #[error("Duplicate schema {name} with different definitions in {} and {}", .first.display(), .second.display())]
    DuplicateSchema {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Artifact resolution failed: {0}")]
    ArtifactResolution(String),

    #[error("Invalid artifact coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Task graph error: {0}")]
    TaskGraph(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl CompatError {
    /// Build a parse error for `path` at a source position
    pub fn idl(path: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::IdlParse {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }
}

fn fmt_list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}

struct Suggestions<'a>(&'a BTreeMap<String, String>);

impl fmt::Display for Suggestions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (missing, candidate) in self.0 {
            write!(f, "\n  {} -> did you mean {}?", missing, candidate)?;
        }
        Ok(())
    }
}

struct Diff<'a>(&'a Option<String>);

impl fmt::Display for Diff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(diff) if !diff.is_empty() => write!(f, "\n--- against\n+++ source\n{}", diff),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_schemas_message() {
        let mut suggestions = BTreeMap::new();
        suggestions.insert("com.x.Payment".to_string(), "com.x.Payments".to_string());
        let err = CompatError::MissingSchemas {
            missing: vec!["com.x.Payment".to_string()],
            suggestions,
        };
        let msg = err.to_string();
        assert!(msg.contains("diff size: 1"));
        assert!(msg.contains("[com.x.Payment]"));
        assert!(msg.contains("did you mean com.x.Payments?"));
    }

    #[test]
    fn test_idl_parse_message_names_file() {
        let err = CompatError::idl("schemas/order.avdl", 3, 7, "expected ';'");
        assert_eq!(
            err.to_string(),
            "error while parsing idl: schemas/order.avdl:3:7: expected ';'"
        );
    }
}
