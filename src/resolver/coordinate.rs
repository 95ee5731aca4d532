//! Artifact coordinates and version selection

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::CompatError;

/// Which version of an artifact to use
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    /// An exact version, used as written
    Fixed(String),
    /// Newest non-snapshot version
    LatestRelease,
    /// Newest version of any kind
    LatestIntegration,
    /// Newest version starting with the prefix, written `1.2.+`
    Prefix(String),
}

impl VersionSelector {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "latest.release" => VersionSelector::LatestRelease,
            "latest.integration" => VersionSelector::LatestIntegration,
            "+" => VersionSelector::Prefix(String::new()),
            other => match other.strip_suffix('+') {
                Some(prefix) => VersionSelector::Prefix(prefix.to_string()),
                None => VersionSelector::Fixed(other.to_string()),
            },
        }
    }

    pub fn is_dynamic(&self) -> bool {
        !matches!(self, VersionSelector::Fixed(_))
    }

    /// Pick a version from repository metadata
    pub fn select(&self, metadata: &VersionListing) -> Option<String> {
        match self {
            VersionSelector::Fixed(v) => Some(v.clone()),
            VersionSelector::LatestRelease => metadata.release.clone().or_else(|| {
                newest(metadata.versions.iter().filter(|v| !is_snapshot(v)))
            }),
            VersionSelector::LatestIntegration => metadata
                .latest
                .clone()
                .or_else(|| newest(metadata.versions.iter())),
            VersionSelector::Prefix(prefix) => newest(
                metadata
                    .versions
                    .iter()
                    .filter(|v| v.starts_with(prefix.as_str()) && !is_snapshot(v)),
            ),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Fixed(v) => f.write_str(v),
            VersionSelector::LatestRelease => f.write_str("latest.release"),
            VersionSelector::LatestIntegration => f.write_str("latest.integration"),
            VersionSelector::Prefix(p) => write!(f, "{}+", p),
        }
    }
}

/// Versions published for one artifact, as listed by `maven-metadata.xml`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    pub release: Option<String>,
    pub latest: Option<String>,
    pub versions: Vec<String>,
}

/// Whether `version` names a mutable `-SNAPSHOT` build
pub fn is_snapshot(version: &str) -> bool {
    version.ends_with("-SNAPSHOT")
}

fn newest<'a>(versions: impl Iterator<Item = &'a String>) -> Option<String> {
    versions.max_by(|a, b| compare_versions(a, b)).cloned()
}

/// Order Maven-style version strings.
///
/// Versions are read as semver where possible, padding short forms like
/// `1.2` to `1.2.0`. Anything unparseable sorts below parseable versions and
/// falls back to string order among itself.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (lenient_semver(a), lenient_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

fn lenient_semver(raw: &str) -> Option<Version> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    let padded = match pre {
        Some(pre) => format!("{}-{}", parts.join("."), pre),
        None => parts.join("."),
    };
    Version::parse(&padded).ok()
}

/// `group:name:version[:classifier][@extension]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub name: String,
    pub version: VersionSelector,
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: VersionSelector) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version,
            classifier: None,
            extension: "jar".to_string(),
        }
    }

    /// Directory of the artifact in a Maven repository layout
    pub fn artifact_dir(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.name)
    }

    pub fn metadata_path(&self) -> String {
        format!("{}/maven-metadata.xml", self.artifact_dir())
    }

    /// Metadata listing the timestamped builds of a snapshot version
    pub fn version_metadata_path(&self, version: &str) -> String {
        format!("{}/{}/maven-metadata.xml", self.artifact_dir(), version)
    }

    /// Repository path of the artifact file at `version`
    pub fn file_path(&self, version: &str) -> String {
        self.build_file_path(version, version)
    }

    /// Path of one build of `version`; snapshot builds are stored as
    /// `name-1.1.0-20240101.120000-3.jar` inside the `1.1.0-SNAPSHOT` directory
    pub fn build_file_path(&self, version: &str, build: &str) -> String {
        let classifier = self
            .classifier
            .as_ref()
            .map(|c| format!("-{}", c))
            .unwrap_or_default();
        format!(
            "{}/{}/{}-{}{}.{}",
            self.artifact_dir(),
            version,
            self.name,
            build,
            classifier,
            self.extension
        )
    }

    /// The same coordinate pinned to a concrete version
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            version: VersionSelector::Fixed(version.to_string()),
            ..self.clone()
        }
    }
}

impl FromStr for Coordinate {
    type Err = CompatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| CompatError::InvalidCoordinate(format!("{}: {}", s, why));

        let (body, extension) = match s.trim().split_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, ext.to_string()),
            Some(_) => return Err(invalid("empty extension")),
            None => (s.trim(), "jar".to_string()),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(invalid("expected group:name:version[:classifier][@extension]"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty component"));
        }

        Ok(Self {
            group: parts[0].to_string(),
            name: parts[1].to_string(),
            version: VersionSelector::parse(parts[2]),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        let c: Coordinate = "org.example:order-schemas:1.4.0".parse().unwrap();
        assert_eq!(c.group, "org.example");
        assert_eq!(c.version, VersionSelector::Fixed("1.4.0".into()));
        assert_eq!(c.extension, "jar");
        assert_eq!(
            c.file_path("1.4.0"),
            "org/example/order-schemas/1.4.0/order-schemas-1.4.0.jar"
        );

        let c: Coordinate = "org.example:order-schemas:latest.release:avro@zip".parse().unwrap();
        assert_eq!(c.version, VersionSelector::LatestRelease);
        assert_eq!(c.classifier.as_deref(), Some("avro"));
        assert_eq!(
            c.file_path("2.0"),
            "org/example/order-schemas/2.0/order-schemas-2.0-avro.zip"
        );
        assert_eq!(c.to_string(), "org.example:order-schemas:latest.release:avro@zip");
    }

    #[test]
    fn test_invalid_coordinates() {
        for raw in ["", "org.example", "org.example:name", "a::1", "a:b:c:d:e", "a:b:1@"] {
            assert!(
                matches!(raw.parse::<Coordinate>(), Err(CompatError::InvalidCoordinate(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_version_ordering() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.0", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.0-SNAPSHOT", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "weird"), Ordering::Greater);
    }

    #[test]
    fn test_selectors() {
        let listing = VersionListing {
            release: None,
            latest: None,
            versions: vec![
                "1.2.0".into(),
                "1.2.9".into(),
                "1.10.0".into(),
                "2.0.0-SNAPSHOT".into(),
            ],
        };
        assert_eq!(VersionSelector::parse("latest.release").select(&listing).as_deref(), Some("1.10.0"));
        assert_eq!(
            VersionSelector::parse("latest.integration").select(&listing).as_deref(),
            Some("2.0.0-SNAPSHOT")
        );
        assert_eq!(VersionSelector::parse("1.2.+").select(&listing).as_deref(), Some("1.2.9"));
        assert_eq!(VersionSelector::parse("3.+").select(&listing), None);

        let pinned = VersionListing {
            release: Some("1.2.0".into()),
            ..listing
        };
        assert_eq!(VersionSelector::LatestRelease.select(&pinned).as_deref(), Some("1.2.0"));
    }
}
