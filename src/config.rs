//! Configuration for the compatibility check
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (avro-compat.toml) in the project directory
//! - The user config directory
//! - An explicit `--config` file
//! - Environment variables (AVRO_COMPAT__SECTION__KEY)
//!
//! ## Example config file (avro-compat.toml):
//! ```toml
//! [project]
//! group = "org.example"
//! name = "order-schemas"
//!
//! [avro]
//! source = "src/main/avro"
//! relocated_to_artifact = "org.example:commerce-schemas:1.4.0"
//! level = "full_transitive"
//!
//! [resolution]
//! repositories = ["~/.m2/repository", "https://repo1.maven.org/maven2"]
//! dynamic_version_ttl_secs = 60
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compatibility::{CompatibilityChecker, CompatibilityLevel};
use crate::error::Result;
use crate::loader::{DuplicatePolicy, SchemaLoader};
use crate::resolver::maven::{MavenSettings, Repository};
use crate::resolver::{Coordinate, VersionSelector};

/// Config file names looked up in the project directory, in order
pub const CONFIG_FILE_NAMES: [&str; 3] = ["avro-compat.toml", ".avro-compat.toml", "config/avro-compat.toml"];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatConfig {
    /// Identity of the project whose schemas are checked
    #[serde(default)]
    pub project: ProjectConfig,

    /// Schema sources and compatibility rules
    #[serde(default)]
    pub avro: AvroConfig,

    /// Artifact resolution
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Project coordinate, used for the default previous artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub group: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Which side of the comparison a relocated artifact joins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocatedRole {
    #[default]
    Against,
    Source,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvroConfig {
    /// IDL directory, relative to the project directory
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Published artifact to compare against; empty disables.
    /// Unset means `<group>:<name>:latest.release`.
    #[serde(default)]
    pub previous_artifact: Option<String>,

    /// Artifact the schemas were relocated to or from
    #[serde(default)]
    pub relocated_to_artifact: Option<String>,

    #[serde(default)]
    pub relocated_role: RelocatedRole,

    #[serde(default)]
    pub level: CompatibilityLevel,

    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,

    /// Git revision whose IDL files join the against set
    #[serde(default)]
    pub against_git_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Maven repositories, tried in order
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,

    /// Download and extraction cache; defaults to the user cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// How long a resolved dynamic version is reused
    #[serde(default = "default_dynamic_version_ttl")]
    pub dynamic_version_ttl_secs: u64,

    /// Never contact remote repositories
    #[serde(default)]
    pub offline: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_source() -> PathBuf {
    PathBuf::from("src/main/avro")
}

fn default_repositories() -> Vec<String> {
    vec![
        "~/.m2/repository".to_string(),
        "https://repo1.maven.org/maven2".to_string(),
    ]
}

fn default_dynamic_version_ttl() -> u64 {
    60
}

fn default_timeout() -> u64 {
    30
}

impl Default for AvroConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            previous_artifact: None,
            relocated_to_artifact: None,
            relocated_role: RelocatedRole::default(),
            level: CompatibilityLevel::default(),
            on_duplicate: DuplicatePolicy::default(),
            against_git_ref: None,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            repositories: default_repositories(),
            cache_dir: None,
            dynamic_version_ttl_secs: default_dynamic_version_ttl(),
            offline: false,
            timeout_secs: default_timeout(),
        }
    }
}

impl CompatConfig {
    /// Load configuration for the current directory
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(Path::new("."), None)
    }

    /// Load configuration for `project_dir`, optionally layering an explicit file
    pub fn load_from(project_dir: &Path, config_path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::from(project_dir.join(location)).required(false));
        }

        if let Some(xdg_config) = user_config_file() {
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("AVRO_COMPAT")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("resolution.repositories")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// The previous-artifact coordinate, if comparison against one is enabled
    pub fn previous_artifact(&self) -> Result<Option<Coordinate>> {
        match self.avro.previous_artifact.as_deref().map(str::trim) {
            Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
            None => Ok(match (&self.project.group, &self.project.name) {
                (Some(group), Some(name)) => Some(Coordinate::new(
                    group.clone(),
                    name.clone(),
                    VersionSelector::LatestRelease,
                )),
                _ => None,
            }),
        }
    }

    pub fn relocated_artifact(&self) -> Result<Option<Coordinate>> {
        match self.avro.relocated_to_artifact.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some),
        }
    }

    /// Cache directory for downloads, extractions and version lookups
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.resolution.cache_dir {
            return dir.clone();
        }
        match directories::ProjectDirs::from("dev", "avro-compat", "avro-compat") {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => std::env::temp_dir().join("avro-compat"),
        }
    }

    pub fn maven_settings(&self) -> MavenSettings {
        MavenSettings {
            repositories: self
                .resolution
                .repositories
                .iter()
                .map(|r| Repository::parse(r))
                .collect(),
            cache_dir: self.cache_dir(),
            dynamic_version_ttl: Duration::from_secs(self.resolution.dynamic_version_ttl_secs),
            offline: self.resolution.offline,
            timeout: Duration::from_secs(self.resolution.timeout_secs),
        }
    }

    pub fn checker(&self) -> CompatibilityChecker {
        CompatibilityChecker::new(self.avro.level)
    }

    pub fn loader(&self) -> SchemaLoader {
        SchemaLoader::new().with_duplicate_policy(self.avro.on_duplicate)
    }

    /// Check the configuration for `project_dir`; returns warnings.
    ///
    /// Unparseable coordinates are errors.
    pub fn validate(&self, project_dir: &Path) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let previous = self.previous_artifact()?;
        let relocated = self.relocated_artifact()?;

        let source = project_dir.join(&self.avro.source);
        if !source.is_dir() {
            warnings.push(format!("source directory {} does not exist", source.display()));
        }
        if previous.is_none() && relocated.is_none() && self.avro.against_git_ref.is_none() {
            warnings.push("nothing to compare against: the check will always be skipped".to_string());
        }
        if self.avro.previous_artifact.is_none() && previous.is_none() {
            warnings.push(
                "project.group and project.name are unset, so no default previous artifact".to_string(),
            );
        }
        if (previous.is_some() || relocated.is_some()) && self.resolution.repositories.is_empty() {
            warnings.push("artifacts are configured but no repositories are".to_string());
        }
        Ok(warnings)
    }
}

/// `avro-compat.toml` in the user config directory
pub fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "avro-compat", "avro-compat")
        .map(|dirs| dirs.config_dir().join("avro-compat.toml"))
}
