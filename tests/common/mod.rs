// tests/common/mod.rs

//! Shared test utilities: cabinet builders and install-root fixtures.

use cabman::{Architecture, Error, Fetcher, Platform, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Fetcher for tests that never expect a network touch
pub struct NoFetcher;

impl Fetcher for NoFetcher {
    fn recognizes(&self, _path: &str) -> bool {
        false
    }

    fn fetch(&self, url: &str, _dest: &Path) -> Result<()> {
        Err(Error::Network(format!("unexpected fetch of {url}")))
    }
}

/// A host whose OS build the test controls
pub fn platform_with_build(os_build: u64) -> Platform {
    Platform {
        os_build,
        native_arch: Architecture::Amd64,
    }
}

/// Create a sandbox with an empty install root.
///
/// Returns (TempDir, install root) - keep the TempDir alive to prevent
/// cleanup.
pub fn setup_root() -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("root");
    std::fs::create_dir(&root).unwrap();
    (temp_dir, root)
}

/// Render a `pkginfo.ini` manifest body
pub fn manifest(name: &str, version: &str, arch: &str, extra: &[(&str, &str)]) -> String {
    let mut text = format!(
        "[Package]\nName={name}\nVersion={version}\nArchitecture={arch}\n"
    );
    for (key, value) in extra {
        text.push_str(&format!("{key}={value}\n"));
    }
    text
}

/// Append a `[Replaces]` section to a manifest body
pub fn with_replaces(manifest: &str, names: &[&str]) -> String {
    let mut text = format!("{manifest}\n[Replaces]\n");
    for name in names {
        text.push_str(&format!("{name}=1\n"));
    }
    text
}

/// Build a cabinet (gzip tar with an embedded manifest) on disk
pub fn build_cabinet(
    dir: &Path,
    file_name: &str,
    manifest: &str,
    payload: &[(&str, &str)],
) -> PathBuf {
    let cab_path = dir.join(file_name);
    let file = File::create(&cab_path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut entries = vec![("pkginfo.ini", manifest)];
    entries.extend_from_slice(payload);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder
        .into_inner()
        .unwrap()
        .finish()
        .unwrap()
        .sync_all()
        .unwrap();
    cab_path
}
