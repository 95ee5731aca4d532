//! Maven repository client
//!
//! Resolves exactly one artifact (no transitive dependencies) from an ordered
//! list of Maven-layout repositories. Local directories are read in place;
//! remote artifacts are downloaded into the cache directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::coordinate::{is_snapshot, Coordinate, VersionListing, VersionSelector};
use crate::checksum::Fingerprint;
use crate::error::{CompatError, Result};

/// A Maven-layout repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repository {
    Local(PathBuf),
    Remote(String),
}

impl Repository {
    /// Parse `file://`, `http(s)://` or a plain path (`~` expands to home)
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Repository::Remote(raw.trim_end_matches('/').to_string());
        }
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        Repository::Local(expand_home(path))
    }

    fn label(&self) -> String {
        match self {
            Repository::Local(path) => path.display().to_string(),
            Repository::Remote(url) => url.clone(),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Settings for [`MavenClient`]
#[derive(Debug, Clone)]
pub struct MavenSettings {
    pub repositories: Vec<Repository>,
    pub cache_dir: PathBuf,
    pub dynamic_version_ttl: Duration,
    pub offline: bool,
    pub timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedVersion {
    version: Option<String>,
    resolved_at: DateTime<Utc>,
}

/// Single-artifact resolver over Maven repositories
pub struct MavenClient {
    settings: MavenSettings,
    http: Option<reqwest::blocking::Client>,
}

impl MavenClient {
    pub fn new(settings: MavenSettings) -> Result<Self> {
        let needs_http = !settings.offline
            && settings
                .repositories
                .iter()
                .any(|r| matches!(r, Repository::Remote(_)));
        let http = if needs_http {
            Some(
                reqwest::blocking::Client::builder()
                    .timeout(settings.timeout)
                    .user_agent(concat!("avro-compat/", env!("CARGO_PKG_VERSION")))
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self { settings, http })
    }

    /// Resolve `coordinate` to a local artifact file.
    ///
    /// `Ok(None)` means a dynamic selector found no published version at all,
    /// which is how a project without any release looks.
    pub fn resolve(&self, coordinate: &Coordinate) -> Result<Option<PathBuf>> {
        let Some(version) = self.resolve_version(coordinate)? else {
            info!("no published version of {} found", coordinate);
            return Ok(None);
        };

        let snapshot = is_snapshot(&version);
        let relative = coordinate.file_path(&version);
        let cached = self.settings.cache_dir.join("artifacts").join(&relative);
        if self.cached_artifact_is_fresh(&cached, snapshot) {
            debug!("using cached artifact {}", cached.display());
            return Ok(Some(cached));
        }

        for repository in &self.settings.repositories {
            let mut candidates = Vec::new();
            if snapshot {
                if let Some(build) = self.snapshot_build(repository, coordinate, &version)? {
                    candidates.push(coordinate.build_file_path(&version, &build));
                }
            }
            candidates.push(relative.clone());

            for candidate in &candidates {
                match repository {
                    Repository::Local(root) => {
                        let path = root.join(candidate);
                        if path.is_file() {
                            info!("resolved {} to {}", coordinate.with_version(&version), path.display());
                            return Ok(Some(path));
                        }
                    }
                    Repository::Remote(url) => {
                        if let Some(bytes) = self.download(url, candidate)? {
                            if let Some(parent) = cached.parent() {
                                fs::create_dir_all(parent)?;
                            }
                            fs::write(&cached, &bytes)?;
                            info!(
                                "downloaded {} from {} ({} bytes, sha256 {})",
                                coordinate.with_version(&version),
                                candidate,
                                bytes.len(),
                                Fingerprint::from_bytes(&bytes).short()
                            );
                            return Ok(Some(cached));
                        }
                    }
                }
            }
        }

        Err(CompatError::ArtifactResolution(format!(
            "could not find {} in any of: {}",
            coordinate.with_version(&version),
            self.repository_labels()
        )))
    }

    /// Concrete version for the coordinate's selector
    pub fn resolve_version(&self, coordinate: &Coordinate) -> Result<Option<String>> {
        if let VersionSelector::Fixed(version) = &coordinate.version {
            return Ok(Some(version.clone()));
        }

        let cache_file = self.version_cache_file(coordinate);
        if let Some(cached) = self.read_cached_version(&cache_file) {
            debug!("dynamic version of {} served from cache: {:?}", coordinate, cached);
            return Ok(cached);
        }

        let mut listing = VersionListing::default();
        for repository in &self.settings.repositories {
            if let Some(found) = self.fetch_metadata(repository, coordinate)? {
                merge_listing(&mut listing, found);
            }
        }
        let version = coordinate.version.select(&listing);
        self.write_cached_version(&cache_file, &version);
        Ok(version)
    }

    fn fetch_metadata(&self, repository: &Repository, coordinate: &Coordinate) -> Result<Option<VersionListing>> {
        let relative = coordinate.metadata_path();
        let text = match repository {
            Repository::Local(root) => {
                // a local repository may carry metadata per remote, e.g. maven-metadata-local.xml
                let dir = root.join(coordinate.artifact_dir());
                let plain = dir.join("maven-metadata.xml");
                let local = dir.join("maven-metadata-local.xml");
                match [plain, local].into_iter().find(|p| p.is_file()) {
                    Some(path) => fs::read_to_string(path)?,
                    None if dir.is_dir() => return Ok(Some(list_version_dirs(&dir)?)),
                    None => return Ok(None),
                }
            }
            Repository::Remote(url) => match self.download(url, &relative)? {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => return Ok(None),
            },
        };
        Ok(Some(parse_metadata(&text)))
    }

    /// GET `relative` from a remote repository; `Ok(None)` on 404
    fn download(&self, base: &str, relative: &str) -> Result<Option<Vec<u8>>> {
        let Some(http) = &self.http else {
            debug!("offline, skipping {}", base);
            return Ok(None);
        };
        let url = format!("{}/{}", base, relative);
        let response = http.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("{} not found", url);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CompatError::ArtifactResolution(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(Some(response.bytes()?.to_vec()))
    }

    /// Released artifacts never change once cached; snapshots are refetched
    /// after the dynamic version TTL like any other moving target
    fn cached_artifact_is_fresh(&self, cached: &Path, snapshot: bool) -> bool {
        if !cached.is_file() {
            return false;
        }
        if !snapshot {
            return true;
        }
        let age = fs::metadata(cached)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        matches!(age, Some(age) if age < self.settings.dynamic_version_ttl)
    }

    /// Timestamped build of a snapshot version, from `<version>/maven-metadata.xml`
    fn snapshot_build(
        &self,
        repository: &Repository,
        coordinate: &Coordinate,
        version: &str,
    ) -> Result<Option<String>> {
        let relative = coordinate.version_metadata_path(version);
        let text = match repository {
            Repository::Local(root) => {
                let path = root.join(&relative);
                if !path.is_file() {
                    return Ok(None);
                }
                fs::read_to_string(path)?
            }
            Repository::Remote(url) => match self.download(url, &relative)? {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => return Ok(None),
            },
        };
        let build = parse_snapshot_build(&text, version, coordinate);
        debug!("snapshot {} of {} is build {:?}", version, coordinate, build);
        Ok(build)
    }

    fn version_cache_file(&self, coordinate: &Coordinate) -> PathBuf {
        let key = format!(
            "{}|{}:{}:{}",
            self.repository_labels(),
            coordinate.group,
            coordinate.name,
            coordinate.version
        );
        self.settings
            .cache_dir
            .join("versions")
            .join(format!("{}.json", Fingerprint::from_bytes(key.as_bytes()).short()))
    }

    fn read_cached_version(&self, path: &Path) -> Option<Option<String>> {
        let text = fs::read_to_string(path).ok()?;
        let cached: CachedVersion = match serde_json::from_str(&text) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("ignoring unreadable version cache {}: {}", path.display(), e);
                return None;
            }
        };
        let age = Utc::now().signed_duration_since(cached.resolved_at);
        let ttl = chrono::Duration::from_std(self.settings.dynamic_version_ttl).ok()?;
        (age >= chrono::Duration::zero() && age < ttl).then_some(cached.version)
    }

    fn write_cached_version(&self, path: &Path, version: &Option<String>) {
        let entry = CachedVersion {
            version: version.clone(),
            resolved_at: Utc::now(),
        };
        let written = path
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                let text = serde_json::to_string(&entry).map_err(std::io::Error::from)?;
                fs::write(path, text)
            });
        if let Err(e) = written {
            warn!("could not write version cache {}: {}", path.display(), e);
        }
    }

    fn repository_labels(&self) -> String {
        self.settings
            .repositories
            .iter()
            .map(Repository::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn merge_listing(into: &mut VersionListing, from: VersionListing) {
    if into.release.is_none() {
        into.release = from.release;
    }
    if into.latest.is_none() {
        into.latest = from.latest;
    }
    for version in from.versions {
        if !into.versions.contains(&version) {
            into.versions.push(version);
        }
    }
}

/// Read `<release>`, `<latest>` and `<version>` entries of maven-metadata.xml
pub fn parse_metadata(xml: &str) -> VersionListing {
    let tag = |name: &str| -> Option<String> {
        Regex::new(&format!(r"<{0}>\s*([^<\s]+)\s*</{0}>", name))
            .ok()?
            .captures(xml)
            .map(|c| c[1].to_string())
    };
    let versions = Regex::new(r"<version>\s*([^<\s]+)\s*</version>")
        .map(|re| re.captures_iter(xml).map(|c| c[1].to_string()).collect())
        .unwrap_or_default();

    VersionListing {
        release: tag("release"),
        latest: tag("latest"),
        versions,
    }
}

/// The build a snapshot version currently points at.
///
/// Prefers the `<snapshotVersion>` entry matching the coordinate's extension
/// and classifier, falling back to `<timestamp>` and `<buildNumber>`.
pub fn parse_snapshot_build(xml: &str, version: &str, coordinate: &Coordinate) -> Option<String> {
    let field = |block: &str, name: &str| -> Option<String> {
        Regex::new(&format!(r"<{0}>\s*([^<\s]+)\s*</{0}>", name))
            .ok()?
            .captures(block)
            .map(|c| c[1].to_string())
    };

    if let Ok(entries) = Regex::new(r"(?s)<snapshotVersion>(.*?)</snapshotVersion>") {
        for entry in entries.captures_iter(xml) {
            let block = &entry[1];
            if field(block, "extension").as_deref() == Some(coordinate.extension.as_str())
                && field(block, "classifier") == coordinate.classifier
            {
                if let Some(value) = field(block, "value") {
                    return Some(value);
                }
            }
        }
    }

    let timestamp = field(xml, "timestamp")?;
    let build_number = field(xml, "buildNumber")?;
    let base = version.strip_suffix("-SNAPSHOT").unwrap_or(version);
    Some(format!("{}-{}-{}", base, timestamp, build_number))
}

/// Versions of a metadata-less local artifact directory
fn list_version_dirs(dir: &Path) -> Result<VersionListing> {
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            versions.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    versions.sort();
    Ok(VersionListing {
        versions,
        ..VersionListing::default()
    })
}
