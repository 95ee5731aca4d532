//! IDL packaging into and extraction from artifact archives

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::collect_idl;
use crate::error::Result;

/// Directory IDL files are stored under inside a packaged artifact
pub const IDL_ENTRY_PREFIX: &str = "avro";

/// Write every `.avdl` file under `source_dir` into a jar at `output`.
///
/// Entries keep their path relative to `source_dir` below `avro/`, so the
/// published artifact carries exactly what the next check extracts. Returns
/// the entry names, sorted.
pub fn package_idl(source_dir: &Path, output: &Path) -> Result<Vec<String>> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut jar = ZipWriter::new(File::create(output)?);
    jar.start_file("META-INF/MANIFEST.MF", options)?;
    jar.write_all(b"Manifest-Version: 1.0\r\nCreated-By: avro-compat\r\n\r\n")?;

    let mut entries = Vec::new();
    for path in collect_idl(source_dir)? {
        let relative = path.strip_prefix(source_dir).unwrap_or(&path);
        let mut name = String::from(IDL_ENTRY_PREFIX);
        for component in relative.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }
        jar.start_file(name.as_str(), options)?;
        jar.write_all(&fs::read(&path)?)?;
        entries.push(name);
    }
    jar.finish()?;

    info!("packaged {} idl files into {}", entries.len(), output.display());
    Ok(entries)
}

/// Extract every `**/*.avdl` entry of the zip at `archive` into `dest`.
///
/// `dest` is emptied first so stale files from an earlier extraction never
/// leak into the result. Entries whose names would escape `dest` are skipped.
/// Returns the extracted paths, sorted.
pub fn extract_idl(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut extracted = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() || !entry.name().ends_with(".avdl") {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            debug!("skipping unsafe archive entry {}", entry.name());
            continue;
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(target);
    }

    extracted.sort();
    debug!(
        "extracted {} idl files from {}",
        extracted.len(),
        archive.display()
    );
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_jar(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_only_idl_entries_are_extracted() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("orders-1.0.jar");
        build_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
                ("avro/orders.avdl", "protocol Orders {}"),
                ("avro/nested/payments.avdl", "protocol Payments {}"),
                ("com/x/Order.class", "\u{0}"),
                ("../escape.avdl", "protocol Escape {}"),
            ],
        );

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.avdl"), "protocol Stale {}").unwrap();

        let files = extract_idl(&jar, &dest).unwrap();
        assert_eq!(
            files,
            vec![dest.join("avro/nested/payments.avdl"), dest.join("avro/orders.avdl")]
        );
        assert!(!dest.join("stale.avdl").exists());
        assert!(!dir.path().join("escape.avdl").exists());
    }

    #[test]
    fn test_packaged_idl_extracts_unchanged() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src/main/avro");
        fs::create_dir_all(source.join("payments")).unwrap();
        fs::write(source.join("orders.avdl"), "protocol Orders {}").unwrap();
        fs::write(source.join("payments/payment.avdl"), "protocol Payments {}").unwrap();
        fs::write(source.join("README.md"), "not idl").unwrap();

        let jar = dir.path().join("target/orders-1.0.jar");
        let entries = package_idl(&source, &jar).unwrap();
        assert_eq!(entries, vec!["avro/orders.avdl", "avro/payments/payment.avdl"]);

        let dest = dir.path().join("out");
        let files = extract_idl(&jar, &dest).unwrap();
        assert_eq!(
            files,
            vec![dest.join("avro/orders.avdl"), dest.join("avro/payments/payment.avdl")]
        );
        assert_eq!(
            fs::read_to_string(dest.join("avro/payments/payment.avdl")).unwrap(),
            "protocol Payments {}"
        );
    }
}
