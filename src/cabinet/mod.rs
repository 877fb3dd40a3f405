// src/cabinet/mod.rs

//! Cabinet container access
//!
//! A cabinet is a gzip-compressed tar archive carrying the package payload
//! plus an embedded `pkginfo.ini` manifest. Archives stream; each pass over
//! the entries reopens the file.

pub mod manifest;

pub use manifest::{read_manifest, Manifest};

use crate::error::{Error, Result};
use crate::fsutil;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Name of the manifest entry embedded in every cabinet
pub const MANIFEST_ENTRY: &str = "pkginfo.ini";

/// An on-disk cabinet
pub struct Cabinet {
    path: PathBuf,
}

impl Cabinet {
    /// Open a cabinet file
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::IoError(format!(
                "cabinet not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Path of the cabinet file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive(&self) -> Result<Archive<GzDecoder<File>>> {
        let file = File::open(&self.path)
            .map_err(|e| Error::IoError(format!("failed to open {}: {e}", self.path.display())))?;
        Ok(Archive::new(GzDecoder::new(file)))
    }

    /// Read the raw text of the embedded manifest entry
    pub(crate) fn read_manifest_bytes(&self) -> Result<Vec<u8>> {
        let mut archive = self.archive()?;
        let entries = archive
            .entries()
            .map_err(|e| Error::WriteFault(format!("failed to read cabinet entries: {e}")))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::WriteFault(format!("failed to read cabinet entry: {e}")))?;
            let entry_path = entry
                .path()
                .map_err(|e| Error::WriteFault(format!("bad entry path in cabinet: {e}")))?
                .to_string_lossy()
                .into_owned();

            if entry_path == MANIFEST_ENTRY {
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(|e| Error::WriteFault(format!("failed to extract manifest: {e}")))?;
                return Ok(buf);
            }
        }

        Err(Error::Malformed(format!(
            "cabinet {} has no {} entry",
            self.path.display(),
            MANIFEST_ENTRY
        )))
    }

    /// Extract every payload entry into `root`.
    ///
    /// The manifest entry and directory entries are skipped. For each file,
    /// `before_write` runs with the sanitized relative path before anything
    /// touches the disk; an error from the callback aborts extraction and
    /// propagates unchanged. Returns the number of files written.
    pub fn extract_payload<F>(&self, root: &Path, mut before_write: F) -> Result<u64>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut archive = self.archive()?;
        let entries = archive
            .entries()
            .map_err(|e| Error::WriteFault(format!("failed to read cabinet entries: {e}")))?;

        let mut written = 0u64;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::WriteFault(format!("failed to read cabinet entry: {e}")))?;
            let entry_path = entry
                .path()
                .map_err(|e| Error::WriteFault(format!("bad entry path in cabinet: {e}")))?
                .to_string_lossy()
                .into_owned();

            if entry_path == MANIFEST_ENTRY || entry.header().entry_type().is_dir() {
                continue;
            }

            let rel = fsutil::sanitize_rel_path(&entry_path)?;
            let rel_str = rel.to_string_lossy().into_owned();

            before_write(&rel_str)?;

            let dest = root.join(&rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::WriteFault(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
            entry.unpack(&dest).map_err(|e| {
                Error::WriteFault(format!("failed to extract {}: {e}", dest.display()))
            })?;
            debug!("extracted {}", dest.display());
            written += 1;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn build_cabinet(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let cab_path = dir.join("test.cab");
        let file = File::create(&cab_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().sync_all().unwrap();
        cab_path
    }

    #[test]
    fn test_manifest_entry_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cab = build_cabinet(
            dir.path(),
            &[
                (MANIFEST_ENTRY, "[Package]\nName=ex\n"),
                ("bin/ex", "payload"),
            ],
        );
        let cab = Cabinet::open(&cab).unwrap();
        let text = String::from_utf8(cab.read_manifest_bytes().unwrap()).unwrap();
        assert!(text.contains("Name=ex"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let cab = build_cabinet(dir.path(), &[("bin/ex", "payload")]);
        let cab = Cabinet::open(&cab).unwrap();
        assert!(matches!(cab.read_manifest_bytes(), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_extract_skips_manifest_and_runs_callback() {
        let dir = tempfile::tempdir().unwrap();
        let cab = build_cabinet(
            dir.path(),
            &[
                (MANIFEST_ENTRY, "[Package]\nName=ex\n"),
                ("bin/ex", "one"),
                ("share/ex.dat", "two"),
            ],
        );
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();

        let mut seen = Vec::new();
        let cab = Cabinet::open(&cab).unwrap();
        let written = cab
            .extract_payload(&root, |rel| {
                seen.push(rel.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(seen, vec!["bin/ex", "share/ex.dat"]);
        assert_eq!(fs::read_to_string(root.join("bin/ex")).unwrap(), "one");
        assert!(!root.join(MANIFEST_ENTRY).exists());
    }

    #[test]
    fn test_callback_error_stops_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let cab = build_cabinet(
            dir.path(),
            &[
                (MANIFEST_ENTRY, "[Package]\nName=ex\n"),
                ("bin/ex", "one"),
                ("share/ex.dat", "two"),
            ],
        );
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();

        let cab = Cabinet::open(&cab).unwrap();
        let result = cab.extract_payload(&root, |rel| {
            if rel == "share/ex.dat" {
                Err(Error::FileConflict {
                    path: rel.to_string(),
                    owner: "other".to_string(),
                })
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Err(Error::FileConflict { .. })));
        assert!(root.join("bin/ex").exists());
        assert!(!root.join("share/ex.dat").exists());
    }
}
