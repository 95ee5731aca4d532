//! Exit behavior of the avro-compat binary

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// A project with the given fixtures in its default source directory
fn project(sources: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src/main/avro");
    fs::create_dir_all(&source).unwrap();
    for name in sources {
        fs::copy(fixture(name), source.join(name)).unwrap();
    }
    dir
}

fn avro_compat(project: &Path, args: &[&str]) -> Output {
    let home = TempDir::new().unwrap();
    Command::new(env!("CARGO_BIN_EXE_avro-compat"))
        .arg("--project-dir")
        .arg(project)
        .args(args)
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("AVRO_COMPAT__AVRO__AGAINST_GIT_REF")
        .env_remove("AVRO_COMPAT__AVRO__PREVIOUS_ARTIFACT")
        .output()
        .unwrap()
}

#[test]
fn test_check_without_against_exits_zero() {
    let dir = project(&["order_v1.avdl"]);
    let output = avro_compat(dir.path(), &["check"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("skipped"));
}

#[test]
fn test_check_passes_compatible_evolution() {
    let dir = project(&["order_with_qty.avdl"]);
    let against = fixture("order_v1.avdl");
    let output = avro_compat(dir.path(), &["check", "--against", against.to_str().unwrap()]);
    assert!(output.status.success());
}

#[test]
fn test_parse_error_exits_non_zero() {
    let dir = project(&["broken.avdl"]);
    let against = fixture("order_v1.avdl");
    let output = avro_compat(dir.path(), &["check", "--against", against.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.avdl:5:3"), "stderr: {}", stderr);
}

#[test]
fn test_incompatible_change_exits_non_zero() {
    let dir = project(&["order_string_id.avdl"]);
    let against = fixture("order_v1.avdl");
    let output = avro_compat(dir.path(), &["verify", "--against", against.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("com.x.Order"));
}
