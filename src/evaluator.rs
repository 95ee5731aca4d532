//! Compatibility Evaluator
//!
//! Compares a source [`SchemaSet`] against a previously published one: every
//! against schema must still exist in source, and every schema present in both
//! must be a compatible evolution. Schemas are visited in sorted name order and
//! the first incompatible one fails the check.

use std::collections::BTreeMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, info};

use crate::compatibility::CompatibilityChecker;
use crate::error::{CompatError, Result};
use crate::loader::SchemaSet;
use crate::schema::SchemaDefinition;

/// Summary of a successful check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Number of schemas compared against a previous revision
    pub checked: usize,
    /// Schemas only present in source
    pub added: Vec<String>,
    /// Schemas that passed the compatibility predicate
    pub compatible: Vec<String>,
}

impl CheckReport {
    pub fn summary(&self) -> String {
        format!(
            "{} schemas checked, {} compatible, {} new",
            self.checked,
            self.compatible.len(),
            self.added.len()
        )
    }
}

/// Runs the coverage and compatibility checks
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    checker: CompatibilityChecker,
}

impl Evaluator {
    pub fn new(checker: CompatibilityChecker) -> Self {
        Self { checker }
    }

    pub fn check(&self, source: &SchemaSet, against: &SchemaSet) -> Result<CheckReport> {
        let missing = missing_schemas(source, against);
        if !missing.is_empty() {
            let suggestions = suggest(&missing, source);
            return Err(CompatError::MissingSchemas {
                missing,
                suggestions,
            });
        }

        let mut report = CheckReport::default();
        for (name, schema) in source.iter() {
            let Some(previous) = against.get(name) else {
                info!("schema {} is new, nothing to check against", name);
                report.added.push(name.to_string());
                continue;
            };

            report.checked += 1;
            let messages = self
                .checker
                .is_compatible(schema, std::slice::from_ref(previous));
            if !messages.is_empty() {
                return Err(CompatError::Incompatible {
                    name: name.to_string(),
                    messages,
                    diff: Some(json_diff(previous, schema)),
                });
            }
            debug!(
                "schema {} is compatible ({}) with {}",
                name,
                self.checker.level(),
                previous.fingerprint().short()
            );
            report.compatible.push(name.to_string());
        }

        Ok(report)
    }
}

/// Against names with no source counterpart, sorted
pub fn missing_schemas(source: &SchemaSet, against: &SchemaSet) -> Vec<String> {
    against
        .names()
        .filter(|name| !source.contains(name))
        .map(String::from)
        .collect()
}

/// Closest source name for each missing name, when any scores at all
fn suggest(missing: &[String], source: &SchemaSet) -> BTreeMap<String, String> {
    let matcher = SkimMatcherV2::default();
    let mut suggestions = BTreeMap::new();

    for name in missing {
        let simple = name.rsplit('.').next().unwrap_or(name);
        let best = source
            .names()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, name)
                    .or_else(|| matcher.fuzzy_match(candidate, simple))
                    .filter(|score| *score > 0)
                    .map(|score| (score, candidate))
            })
            .max_by_key(|(score, _)| *score);
        if let Some((_, candidate)) = best {
            suggestions.insert(name.clone(), candidate.to_string());
        }
    }
    suggestions
}

/// Line diff of the pretty JSON of two revisions
fn json_diff(against: &SchemaDefinition, source: &SchemaDefinition) -> String {
    let old_text = against.to_pretty_json();
    let new_text = source.to_pretty_json();
    let diff = TextDiff::from_lines(&old_text, &new_text);

    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        out.push(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}
