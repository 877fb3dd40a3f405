// src/transaction/backup.rs

//! Backup ledger
//!
//! Before a package is superseded or replaced, every one of its files is
//! renamed to a shadow name in the same directory and its index entries
//! are captured in memory. The ledger then either commits (shadows are
//! deleted) or rolls back (shadows are renamed into place and the index
//! entries rewritten), restoring the exact pre-batch state.

use crate::db::{
    PackageRecord, StateDb, KEY_ARCHITECTURE, KEY_FILE_COUNT, KEY_SOURCE_PATH, KEY_SYMBOL_PATH,
    KEY_UPGRADE_PATH, KEY_VERSION, SECTION_INSTALLED,
};
use crate::error::Result;
use crate::fsutil;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One backed-up file: where it lived, how the index stored it, and the
/// shadow it was renamed to (`None` when it was absent on disk)
#[derive(Debug)]
struct BackupFile {
    stored: String,
    original: PathBuf,
    shadow: Option<PathBuf>,
}

/// Captured index entries and shadowed files of one superseded package
#[derive(Debug)]
pub struct PackageBackup {
    pub name: String,
    pub version: String,
    pub architecture: String,
    upgrade_path: Option<String>,
    source_path: Option<String>,
    symbol_path: Option<String>,
    files: Vec<BackupFile>,
}

/// Back up one installed package.
///
/// Every `Filek` is renamed to a shadow beside it; a file missing on disk
/// is recorded with an empty shadow and skipped. Any other rename failure
/// undoes the renames already performed and fails the backup. On success
/// the package section and its `Installed` key are cleared, freeing the
/// name and the filenames for the new payload.
pub fn backup_package(db: &mut StateDb, root: &Path, name: &str) -> Result<PackageBackup> {
    let record = PackageRecord::load(db, name)?;
    debug!("backing up {} {}", name, record.version);

    let mut files: Vec<BackupFile> = Vec::with_capacity(record.files.len());
    for stored in &record.files {
        let original = fsutil::stored_to_absolute(root, stored);
        match fsutil::rename_to_shadow(&original) {
            Ok(shadow) => files.push(BackupFile {
                stored: stored.clone(),
                original,
                shadow,
            }),
            Err(e) => {
                for f in files.iter().rev() {
                    if let Some(shadow) = &f.shadow
                        && let Err(undo) = fs::rename(shadow, &f.original)
                    {
                        warn!("could not undo shadow {}: {undo}", shadow.display());
                    }
                }
                return Err(e);
            }
        }
    }

    db.remove_section(name)?;
    db.set(SECTION_INSTALLED, name, None)?;

    Ok(PackageBackup {
        name: name.to_string(),
        version: record.version,
        architecture: record.architecture,
        upgrade_path: record.upgrade_path,
        source_path: record.source_path,
        symbol_path: record.symbol_path,
        files,
    })
}

/// The in-memory record of backups for the current batch
#[derive(Debug, Default)]
pub struct BackupLedger {
    entries: Vec<PackageBackup>,
}

impl BackupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, backup: PackageBackup) {
        self.entries.push(backup);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch already holds a backup for this name
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Discard all shadows. Best-effort: a shadow that cannot be deleted is
    /// benign and stays behind.
    pub fn commit(&mut self) {
        for entry in self.entries.drain(..) {
            debug!("committing backup of {}", entry.name);
            for f in &entry.files {
                if let Some(shadow) = &f.shadow {
                    fsutil::discard_shadow(shadow);
                }
            }
        }
    }

    /// Restore every backed-up package, most recently backed-up first.
    ///
    /// For each package: the section is deleted (dropping any keys a failed
    /// payload wrote), shadows are renamed into place over any new files,
    /// the index entries are rewritten, and the `Installed` key re-added.
    /// Shadow renames are best-effort; an unrenamed shadow is logged and
    /// left behind. State-DB writes propagate errors.
    pub fn rollback(&mut self, db: &mut StateDb) -> Result<()> {
        while let Some(entry) = self.entries.pop() {
            debug!("rolling back {} to {}", entry.name, entry.version);

            db.remove_section(&entry.name)?;

            for f in &entry.files {
                if let Some(shadow) = &f.shadow
                    && let Err(e) = fs::rename(shadow, &f.original)
                {
                    warn!(
                        "could not restore {} from {}: {e}",
                        f.original.display(),
                        shadow.display()
                    );
                }
            }

            for (i, f) in entry.files.iter().enumerate() {
                db.set(&entry.name, &format!("File{}", i + 1), Some(&f.stored))?;
            }
            db.set(
                &entry.name,
                KEY_FILE_COUNT,
                Some(&entry.files.len().to_string()),
            )?;
            db.set(&entry.name, KEY_VERSION, Some(&entry.version))?;
            db.set(&entry.name, KEY_ARCHITECTURE, Some(&entry.architecture))?;
            db.set(&entry.name, KEY_UPGRADE_PATH, entry.upgrade_path.as_deref())?;
            db.set(&entry.name, KEY_SOURCE_PATH, entry.source_path.as_deref())?;
            db.set(&entry.name, KEY_SYMBOL_PATH, entry.symbol_path.as_deref())?;

            db.set(SECTION_INSTALLED, &entry.name, Some(&entry.version))?;
        }
        Ok(())
    }
}
