// src/uninstall.rs

//! Uninstall engine
//!
//! Deletes a package's files with bounded retry, prunes newly empty parent
//! directories, and removes the package's index entries. A failure on the
//! first file aborts with the state database untouched; later failures are
//! logged and the teardown continues.

use crate::db::{PackageRecord, StateDb, SECTION_INSTALLED};
use crate::error::{Error, Result};
use crate::fsutil;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// Probe whether the package's files look deletable before touching any.
///
/// Unix has no delete-intent open mode, so the probe opens each present
/// file for read. The currently running executable is permitted to appear
/// undeletable and is excluded.
fn precheck(record: &PackageRecord, root: &Path) -> Result<()> {
    let current_exe = std::env::current_exe().ok();
    for stored in &record.files {
        let abs = fsutil::stored_to_absolute(root, stored);
        if current_exe.as_deref() == Some(abs.as_path()) {
            continue;
        }
        if abs.exists()
            && let Err(e) = File::open(&abs)
        {
            return Err(Error::IoError(format!(
                "{} is not removable: {e}",
                abs.display()
            )));
        }
    }
    Ok(())
}

/// Remove an installed package from disk and from the state database
pub fn uninstall(db: &mut StateDb, root: &Path, name: &str) -> Result<()> {
    let record = PackageRecord::load(db, name)?;
    precheck(&record, root)?;

    info!("removing {} {} ({} files)", name, record.version, record.files.len());

    for (i, stored) in record.files.iter().enumerate() {
        let abs = fsutil::stored_to_absolute(root, stored);
        match fsutil::delete_with_retry(&abs) {
            Ok(()) => {
                if !fsutil::is_external_path(stored) {
                    fsutil::prune_empty_parents(&abs, root);
                }
            }
            // The first file failing leaves everything consistent; after
            // that the package is torn down regardless.
            Err(e) if i == 0 => return Err(e),
            Err(e) => warn!("continuing removal of {name}: {e}"),
        }
    }

    db.remove_section(name)?;
    db.set(SECTION_INSTALLED, name, None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KEY_ARCHITECTURE, KEY_FILE_COUNT, KEY_VERSION};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup_installed(files: &[(&str, &str)]) -> (TempDir, StateDb, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let mut db = StateDb::open(dir.path()).unwrap();

        db.set(SECTION_INSTALLED, "ex", Some("1.0")).unwrap();
        db.set("ex", KEY_VERSION, Some("1.0")).unwrap();
        db.set("ex", KEY_ARCHITECTURE, Some("noarch")).unwrap();
        db.set("ex", KEY_FILE_COUNT, Some(&files.len().to_string()))
            .unwrap();
        for (i, (rel, content)) in files.iter().enumerate() {
            db.set("ex", &format!("File{}", i + 1), Some(rel)).unwrap();
            let abs = root.join(rel);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }
        (dir, db, root)
    }

    #[test]
    fn test_uninstall_removes_files_and_record() {
        let (_dir, mut db, root) =
            setup_installed(&[("bin/ex", "x"), ("share/deep/ex.dat", "d")]);

        uninstall(&mut db, &root, "ex").unwrap();

        assert!(!root.join("bin").exists());
        assert!(!root.join("share").exists());
        assert!(root.exists());
        assert_eq!(db.installed_version("ex"), None);
        assert_eq!(db.get("ex", KEY_VERSION), None);
    }

    #[test]
    fn test_uninstall_tolerates_missing_files() {
        let (_dir, mut db, root) = setup_installed(&[("bin/ex", "x")]);
        std::fs::remove_file(root.join("bin/ex")).unwrap();

        uninstall(&mut db, &root, "ex").unwrap();
        assert_eq!(db.installed_version("ex"), None);
    }

    #[test]
    fn test_uninstall_unknown_package() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = StateDb::open(dir.path()).unwrap();
        assert!(matches!(
            uninstall(&mut db, dir.path(), "ghost"),
            Err(Error::PackageNotInstalled(_))
        ));
    }

    #[test]
    fn test_uninstall_keeps_shared_directories() {
        let (_dir, mut db, root) = setup_installed(&[("bin/ex", "x")]);
        std::fs::write(root.join("bin/other"), "kept").unwrap();

        uninstall(&mut db, &root, "ex").unwrap();

        assert!(root.join("bin/other").exists());
    }
}
