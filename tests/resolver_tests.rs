//! File-set resolution against a local Maven repository
//!
//! Artifacts are synthetic jars (zip files) holding IDL under `avro/`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use avro_compat::resolver::archive::package_idl;
use avro_compat::{
    CompatConfig, CompatError, CompatibilityTask, FileSetResolver, RelocatedRole, Task,
    TaskOutcome,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Publish `group:name:version` with the given fixtures packaged under `avro/`
fn publish(repo: &Path, group: &str, name: &str, version: &str, fixtures: &[&str]) {
    let dir = repo.join(group.replace('.', "/")).join(name).join(version);
    fs::create_dir_all(&dir).unwrap();

    let mut jar = ZipWriter::new(File::create(dir.join(format!("{}-{}.jar", name, version))).unwrap());
    jar.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default()).unwrap();
    jar.write_all(b"Manifest-Version: 1.0\n").unwrap();
    for fixture_name in fixtures {
        jar.start_file(format!("avro/{}", fixture_name), SimpleFileOptions::default())
            .unwrap();
        jar.write_all(fs::read_to_string(fixture(fixture_name)).unwrap().as_bytes())
            .unwrap();
    }
    jar.finish().unwrap();
}

struct Project {
    dir: TempDir,
    repo: TempDir,
    cache: TempDir,
}

impl Project {
    /// A project whose source directory holds the given fixtures
    fn new(sources: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src/main/avro");
        fs::create_dir_all(&source).unwrap();
        for name in sources {
            fs::copy(fixture(name), source.join(name)).unwrap();
        }
        Self {
            dir,
            repo: TempDir::new().unwrap(),
            cache: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> CompatConfig {
        let mut config = CompatConfig::default();
        config.project.group = Some("org.example".into());
        config.project.name = Some("orders".into());
        config.resolution.repositories = vec![self.repo.path().display().to_string()];
        config.resolution.cache_dir = Some(self.cache.path().to_path_buf());
        config.resolution.offline = true;
        config
    }

    fn run(&self, config: CompatConfig) -> avro_compat::Result<TaskOutcome> {
        CompatibilityTask::from_config(config, self.dir.path(), Vec::new()).run()
    }
}

#[test]
fn test_unreleased_project_is_skipped() {
    let project = Project::new(&["order_v1.avdl"]);
    let outcome = project.run(project.config()).unwrap();
    assert_eq!(outcome, TaskOutcome::Skipped);
}

#[test]
fn test_compares_against_latest_release() {
    let project = Project::new(&["order_with_qty.avdl"]);
    publish(project.repo.path(), "org.example", "orders", "1.0.0", &["order_v1.avdl", "payment.avdl"]);
    publish(project.repo.path(), "org.example", "orders", "1.1.0", &["order_v1.avdl"]);

    let sets = FileSetResolver::new(&project.config(), project.dir.path())
        .resolve()
        .unwrap();
    assert_eq!(sets.source.len(), 1);
    assert_eq!(sets.against.len(), 1);
    assert!(sets.against[0].ends_with("avro/order_v1.avdl"));

    match project.run(project.config()).unwrap() {
        TaskOutcome::Passed(report) => assert_eq!(report.compatible, vec!["com.x.Order"]),
        other => panic!("Expected Passed, got {:?}", other),
    }
}

#[test]
fn test_pinned_previous_artifact() {
    let project = Project::new(&["order_with_qty.avdl"]);
    publish(project.repo.path(), "org.example", "orders", "1.0.0", &["order_v1.avdl", "payment.avdl"]);
    publish(project.repo.path(), "org.example", "orders", "1.1.0", &["order_v1.avdl"]);

    let mut config = project.config();
    config.avro.previous_artifact = Some("org.example:orders:1.0.0".into());
    let err = project.run(config).unwrap_err();
    assert!(matches!(err, CompatError::MissingSchemas { ref missing, .. } if missing == &["com.x.Payment"]));
}

#[test]
fn test_relocated_artifact_roles() {
    let project = Project::new(&["order_v1.avdl"]);
    publish(project.repo.path(), "org.example", "payments", "2.0.0", &["payment.avdl"]);

    let mut config = project.config();
    config.avro.previous_artifact = Some(String::new());
    config.avro.relocated_to_artifact = Some("org.example:payments:2.0.0".into());

    // schemas moved away to another artifact must still exist here
    let err = project.run(config.clone()).unwrap_err();
    assert!(matches!(err, CompatError::MissingSchemas { .. }));

    // as source, the relocated schemas count as present but there is nothing to compare against
    config.avro.relocated_role = RelocatedRole::Source;
    let sets = FileSetResolver::new(&config, project.dir.path()).resolve().unwrap();
    assert_eq!(sets.source.len(), 2);
    assert!(sets.against.is_empty());
    assert_eq!(project.run(config).unwrap(), TaskOutcome::Skipped);
}

#[test]
fn test_missing_pinned_artifact_fails_resolution() {
    let project = Project::new(&["order_v1.avdl"]);
    let mut config = project.config();
    config.avro.previous_artifact = Some("org.example:orders:9.9.9".into());
    assert!(matches!(
        project.run(config),
        Err(CompatError::ArtifactResolution(_))
    ));
}

#[test]
fn test_explicit_against_paths() {
    let project = Project::new(&["order_string_id.avdl"]);
    let mut config = project.config();
    config.avro.previous_artifact = Some(String::new());

    let task = CompatibilityTask::from_config(config, project.dir.path(), vec![fixture("order_v1.avdl")]);
    assert!(matches!(task.run(), Err(CompatError::Incompatible { .. })));
}

#[test]
fn test_packaged_release_is_checked_by_the_next_build() {
    let released = Project::new(&["order_v1.avdl", "payment.avdl"]);
    let release_dir = released.repo.path().join("org/example/orders/1.0.0");
    let source_dir = FileSetResolver::new(&released.config(), released.dir.path()).source_dir();
    let entries = package_idl(&source_dir, &release_dir.join("orders-1.0.0.jar")).unwrap();
    assert_eq!(entries, vec!["avro/order_v1.avdl", "avro/payment.avdl"]);

    // next build drops Payment and evolves Order, against the jar just published
    let next = Project::new(&["order_with_qty.avdl"]);
    let mut config = next.config();
    config.resolution.repositories = vec![released.repo.path().display().to_string()];

    let sets = FileSetResolver::new(&config, next.dir.path()).resolve().unwrap();
    assert_eq!(sets.against.len(), 2);
    let err = next.run(config).unwrap_err();
    assert!(matches!(err, CompatError::MissingSchemas { ref missing, .. } if missing == &["com.x.Payment"]));
}
