//! IDL files of the source directory at an earlier git revision

use std::fs;
use std::path::{Path, PathBuf};

use git2::{ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use tracing::{debug, info};

use crate::error::{CompatError, Result};

/// Write the `.avdl` files under `source_dir` as of `reference` into `dest`.
///
/// `source_dir` must live inside a git work tree. A revision that does not
/// contain the directory yields no files.
pub fn idl_files_at_ref(source_dir: &Path, reference: &str, dest: &Path) -> Result<Vec<PathBuf>> {
    let repo = Repository::discover(source_dir)?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| CompatError::ArtifactResolution("bare repositories have no source directory".into()))?;

    let absolute = fs::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());
    let workdir = fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());
    let relative = absolute.strip_prefix(&workdir).map_err(|_| {
        CompatError::ArtifactResolution(format!(
            "{} is outside the git work tree {}",
            source_dir.display(),
            workdir.display()
        ))
    })?;

    let commit = repo.revparse_single(reference)?.peel_to_commit()?;
    let root = commit.tree()?;
    let subtree = if relative.as_os_str().is_empty() {
        root
    } else {
        match root.get_path(relative) {
            Ok(entry) if entry.kind() == Some(ObjectType::Tree) => repo.find_tree(entry.id())?,
            _ => {
                info!("{} does not exist at {}", relative.display(), reference);
                return Ok(Vec::new());
            }
        }
    };

    let mut blobs = Vec::new();
    subtree.walk(TreeWalkMode::PreOrder, |parent, entry| {
        let name = entry.name().unwrap_or_default();
        if entry.kind() == Some(ObjectType::Blob) && name.ends_with(".avdl") {
            blobs.push((PathBuf::from(parent).join(name), entry.id()));
        }
        TreeWalkResult::Ok
    })?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    let mut written = Vec::with_capacity(blobs.len());
    for (path, id) in blobs {
        let blob = repo.find_blob(id)?;
        let target = dest.join(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, blob.content())?;
        written.push(target);
    }
    written.sort();

    debug!(
        "materialized {} idl files from {} at {}",
        written.len(),
        relative.display(),
        commit.id()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_files_at_earlier_revision() {
        let work = TempDir::new().unwrap();
        let repo = Repository::init(work.path()).unwrap();
        let source = work.path().join("src/main/avro");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("orders.avdl"), "protocol V1 {}").unwrap();
        fs::write(source.join("README.md"), "docs").unwrap();
        commit_all(&repo, "v1");
        repo.tag_lightweight("v1", &repo.revparse_single("HEAD").unwrap(), false)
            .unwrap();

        fs::write(source.join("orders.avdl"), "protocol V2 {}").unwrap();
        commit_all(&repo, "v2");

        let dest = TempDir::new().unwrap();
        let files = idl_files_at_ref(&source, "v1", &dest.path().join("v1")).unwrap();
        assert_eq!(files, vec![dest.path().join("v1/orders.avdl")]);
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "protocol V1 {}");
    }

    #[test]
    fn test_directory_absent_at_revision() {
        let work = TempDir::new().unwrap();
        let repo = Repository::init(work.path()).unwrap();
        fs::write(work.path().join("README.md"), "docs").unwrap();
        commit_all(&repo, "initial");

        let source = work.path().join("schemas");
        fs::create_dir_all(&source).unwrap();
        let dest = TempDir::new().unwrap();
        assert!(idl_files_at_ref(&source, "HEAD", dest.path()).unwrap().is_empty());
    }
}
