//! File-Set Resolver
//!
//! Works out which `.avdl` files form the source set (the project's schema
//! directory) and which form the against set (IDL extracted from a previously
//! published artifact, a relocated artifact, an earlier git revision or
//! explicitly named paths).

pub mod archive;
pub mod coordinate;
pub mod git;
pub mod maven;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::checksum::Fingerprint;
use crate::config::{CompatConfig, RelocatedRole};
use crate::error::Result;
pub use coordinate::{Coordinate, VersionSelector};
use maven::MavenClient;

/// The two file collections a compatibility run compares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSets {
    pub source: Vec<PathBuf>,
    pub against: Vec<PathBuf>,
}

/// Resolves [`FileSets`] for one project
pub struct FileSetResolver<'a> {
    config: &'a CompatConfig,
    project_dir: PathBuf,
    against_paths: Vec<PathBuf>,
}

impl<'a> FileSetResolver<'a> {
    pub fn new(config: &'a CompatConfig, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
            against_paths: Vec::new(),
        }
    }

    /// Add files or directories whose IDL joins the against set
    pub fn with_against_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.against_paths.extend(paths);
        self
    }

    pub fn source_dir(&self) -> PathBuf {
        self.project_dir.join(&self.config.avro.source)
    }

    pub fn resolve(&self) -> Result<FileSets> {
        let source_dir = self.source_dir();
        let mut sets = FileSets {
            source: collect_idl(&source_dir)?,
            against: Vec::new(),
        };

        let previous = self.config.previous_artifact()?;
        let relocated = self.config.relocated_artifact()?;
        if previous.is_some() || relocated.is_some() {
            let client = MavenClient::new(self.config.maven_settings())?;
            if let Some(coordinate) = previous {
                sets.against.extend(self.artifact_files(&client, &coordinate)?);
            }
            if let Some(coordinate) = relocated {
                let files = self.artifact_files(&client, &coordinate)?;
                match self.config.avro.relocated_role {
                    RelocatedRole::Against => sets.against.extend(files),
                    RelocatedRole::Source => sets.source.extend(files),
                }
            }
        }

        if let Some(reference) = &self.config.avro.against_git_ref {
            let key = format!("{}@{}", source_dir.display(), reference);
            let dest = self
                .config
                .cache_dir()
                .join("git")
                .join(Fingerprint::from_bytes(key.as_bytes()).short());
            sets.against.extend(git::idl_files_at_ref(&source_dir, reference, &dest)?);
        }

        for path in &self.against_paths {
            sets.against.extend(collect_idl(path)?);
        }

        sets.source.sort();
        sets.source.dedup();
        sets.against.sort();
        sets.against.dedup();
        info!(
            "resolved {} source and {} against idl files",
            sets.source.len(),
            sets.against.len()
        );
        Ok(sets)
    }

    /// IDL files packaged in the artifact, or none when it was never published
    fn artifact_files(&self, client: &MavenClient, coordinate: &Coordinate) -> Result<Vec<PathBuf>> {
        let Some(archive) = client.resolve(coordinate)? else {
            return Ok(Vec::new());
        };
        let dest = self
            .config
            .cache_dir()
            .join("extracted")
            .join(Fingerprint::from_bytes(archive.to_string_lossy().as_bytes()).short());
        let files = archive::extract_idl(&archive, &dest)?;
        info!("{} provides {} idl files", coordinate, files.len());
        Ok(files)
    }
}

/// Every `.avdl` file under `path` (or `path` itself), sorted.
///
/// A path that does not exist yields nothing.
pub fn collect_idl(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        debug!("{} does not exist, no idl files", path.display());
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "avdl") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
