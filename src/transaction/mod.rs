// src/transaction/mod.rs

//! Pending-batch orchestrator
//!
//! A batch stages any number of candidate packages, backing up every
//! package they supersede or replace, then commits or rolls back as a
//! unit. Between `begin` and `commit` the batch owns the backup ledger,
//! every staged temporary download, and an advisory lock on the install
//! root.
//!
//! # Per-package lifecycle
//!
//! ```text
//! Staged -> Extracting -> WritingIndex -> Installed
//!    |          |              |
//!    +----------+--------------+------ failure -> RolledBack
//! ```

pub mod backup;
pub mod conflict;

pub use backup::{backup_package, BackupLedger, PackageBackup};
pub use conflict::ConflictIndex;

use crate::cabinet::{read_manifest, Cabinet, Manifest};
use crate::db::{
    StateDb, KEY_ARCHITECTURE, KEY_FILE_COUNT, KEY_SOURCE_PATH, KEY_SYMBOL_PATH, KEY_UPGRADE_PATH,
    KEY_VERSION, SECTION_INSTALLED,
};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::platform::Platform;
use crate::repository::PathResolver;
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Lock file guarding one install root
const LOCK_FILE: &str = "cabman.lock";

/// Lock acquisition attempts (with doubling backoff from 100ms)
const LOCK_RETRIES: u32 = 5;

/// Bound on the `WrongOsVersion` fallback chain
const MAX_REDIRECTS: usize = 8;

/// Version sentinel written before extraction begins; a crash leaves the
/// package marked as needing an upgrade
const VERSION_SENTINEL: &str = "0";

/// Lifecycle of one pending package within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Staged,
    Extracting,
    WritingIndex,
    Installed,
    RolledBack,
}

/// A package staged for installation
#[derive(Debug)]
pub struct PendingPackage {
    pub manifest: Manifest,
    pub state: PendingState,
    cabinet_path: PathBuf,
    /// Present when the cabinet is a staged download; dropping it deletes
    /// the file on batch teardown regardless of outcome
    temp: Option<TempPath>,
    /// Stored paths written during extraction, used to undo on abort
    written: Vec<String>,
}

impl PendingPackage {
    pub fn is_temp(&self) -> bool {
        self.temp.is_some()
    }
}

/// Result of staging one package reference
#[derive(Debug)]
pub enum PrepareOutcome {
    /// The package joined the batch
    Staged,
    /// The requested version is already installed; nothing changed
    AlreadyInstalled { name: String, version: String },
}

/// What a committed batch installed
#[derive(Debug)]
pub struct CommitSummary {
    /// (name, version) pairs in install order
    pub installed: Vec<(String, String)>,
}

/// One install/upgrade batch over a state database and install root
pub struct Batch<'a> {
    db: &'a mut StateDb,
    root: PathBuf,
    platform: Platform,
    pending: Vec<PendingPackage>,
    ledger: BackupLedger,
    lock_file: Option<File>,
}

impl<'a> Batch<'a> {
    /// Begin a batch, taking the advisory lock on the install root
    pub fn begin(db: &'a mut StateDb, root: &Path, platform: Platform) -> Result<Self> {
        let lock_path = root.join(LOCK_FILE);
        let lock_file = File::create(&lock_path)
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", lock_path.display())))?;

        let mut last_error = None;
        for attempt in 0..LOCK_RETRIES {
            match lock_file.try_lock_exclusive() {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < LOCK_RETRIES - 1 {
                        std::thread::sleep(std::time::Duration::from_millis(100 * (1 << attempt)));
                    }
                }
            }
        }
        if let Some(e) = last_error {
            return Err(Error::Locked(format!(
                "another batch holds {}: {e}",
                lock_path.display()
            )));
        }

        Ok(Self {
            db,
            root: root.to_path_buf(),
            platform,
            pending: Vec::new(),
            ledger: BackupLedger::new(),
            lock_file: Some(lock_file),
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[PendingPackage] {
        &self.pending
    }

    /// Stage one package reference.
    ///
    /// Resolves the reference, reads the manifest, short-circuits when the
    /// same version is already installed, rejects packages requiring a
    /// newer OS build (surfacing any fallback URL), backs up the same-name
    /// predecessor and every installed `Replaces` victim, and appends the
    /// pending record.
    pub fn prepare(&mut self, resolver: &PathResolver, user_path: &str) -> Result<PrepareOutcome> {
        let resolved = resolver.resolve(user_path)?;
        let cabinet = Cabinet::open(resolved.path())?;
        let manifest = read_manifest(&cabinet)?;

        if let Some(installed) = self.db.installed_version(&manifest.name)
            && installed == manifest.version
        {
            println!("{} version {} is already installed", manifest.name, manifest.version);
            return Ok(PrepareOutcome::AlreadyInstalled {
                name: manifest.name,
                version: manifest.version,
            });
        }

        if let Some(required) = manifest.minimum_os_build
            && required > self.platform.os_build
        {
            return Err(Error::WrongOsVersion {
                package: manifest.name,
                required,
                host: self.platform.os_build,
                fallback: manifest.older_build_path,
            });
        }

        if self.db.installed_version(&manifest.name).is_some()
            && !self.ledger.contains(&manifest.name)
        {
            let entry = backup_package(self.db, &self.root, &manifest.name)?;
            self.ledger.push(entry);
        }

        for victim in &manifest.replaces {
            if self.db.installed_version(victim).is_some() && !self.ledger.contains(victim) {
                info!("{} replaces installed package {}", manifest.name, victim);
                let entry = backup_package(self.db, &self.root, victim)?;
                self.ledger.push(entry);
            }
        }

        let (cabinet_path, temp) = resolved.into_parts();
        debug!("staged {} {} from {}", manifest.name, manifest.version, user_path);
        self.pending.push(PendingPackage {
            manifest,
            state: PendingState::Staged,
            cabinet_path,
            temp,
            written: Vec::new(),
        });
        Ok(PrepareOutcome::Staged)
    }

    /// Stage a package, following the older-build fallback chain.
    ///
    /// On `WrongOsVersion` with a fallback URL the prepare is retried with
    /// that URL, announcing each hop, bounded by chain length and by the
    /// set of URLs already visited.
    pub fn prepare_with_redirect(
        &mut self,
        resolver: &PathResolver,
        user_path: &str,
    ) -> Result<PrepareOutcome> {
        let mut url = user_path.to_string();
        let mut seen: HashSet<String> = HashSet::new();

        for _ in 0..MAX_REDIRECTS {
            seen.insert(url.clone());
            match self.prepare(resolver, &url) {
                Err(Error::WrongOsVersion {
                    package,
                    required,
                    host,
                    fallback: Some(next),
                }) => {
                    if seen.contains(&next) {
                        warn!("fallback chain for {package} loops back to {next}");
                        return Err(Error::WrongOsVersion {
                            package,
                            required,
                            host,
                            fallback: None,
                        });
                    }
                    println!(
                        "{package} requires OS build {required} (host is {host}); attempting {next}"
                    );
                    url = next;
                }
                other => return other,
            }
        }

        Err(Error::ParseError(format!(
            "older-build fallback chain for {user_path} exceeds {MAX_REDIRECTS} hops"
        )))
    }

    /// Install every pending package, then commit or roll back the batch
    pub fn commit(mut self) -> Result<CommitSummary> {
        self.run_commit()
    }

    /// Roll back everything this batch has done
    pub fn abort(mut self) -> Result<()> {
        for p in &mut self.pending {
            p.state = PendingState::RolledBack;
        }
        self.ledger.rollback(self.db)
    }

    fn run_commit(&mut self) -> Result<CommitSummary> {
        let conflicts = ConflictIndex::build(self.db)?;
        let root = self.root.clone();
        let total = self.pending.len();
        let mut summary = CommitSummary {
            installed: Vec::with_capacity(total),
        };

        for i in 0..total {
            let manifest = self.pending[i].manifest.clone();
            println!(
                "Installing {} version {} ({}/{})...",
                manifest.name,
                manifest.version,
                i + 1,
                total
            );

            if let Err(e) = self.install_one(i, &manifest, &conflicts, &root) {
                self.abort_batch(i, &manifest.name);
                return Err(e);
            }
            summary
                .installed
                .push((manifest.name, manifest.version));
        }

        self.ledger.commit();
        Ok(summary)
    }

    fn install_one(
        &mut self,
        i: usize,
        manifest: &Manifest,
        conflicts: &ConflictIndex,
        root: &Path,
    ) -> Result<()> {
        // Sentinel first: a crash mid-extraction is visible as "version 0
        // installed", which forces an upgrade reattempt.
        self.db
            .set(SECTION_INSTALLED, &manifest.name, Some(VERSION_SENTINEL))?;
        self.pending[i].state = PendingState::Extracting;

        let cabinet = Cabinet::open(&self.pending[i].cabinet_path)?;
        let db = &mut *self.db;
        let written = &mut self.pending[i].written;
        let mut counter = 0u64;

        cabinet.extract_payload(root, |rel| {
            if fsutil::scheduled_for_delete(Path::new(rel)) {
                return Err(Error::FileConflict {
                    path: rel.to_string(),
                    owner: "a pending boot-time deletion".to_string(),
                });
            }
            if let Some(owner) = conflicts.owner_of(rel) {
                return Err(Error::FileConflict {
                    path: rel.to_string(),
                    owner: owner.to_string(),
                });
            }
            counter += 1;
            db.set(&manifest.name, &format!("File{counter}"), Some(rel))?;
            written.push(rel.to_string());
            Ok(())
        })?;

        self.pending[i].state = PendingState::WritingIndex;
        self.db.set(&manifest.name, KEY_VERSION, Some(&manifest.version))?;
        self.db.set(
            &manifest.name,
            KEY_ARCHITECTURE,
            Some(manifest.architecture.as_str()),
        )?;
        self.db
            .set(&manifest.name, KEY_UPGRADE_PATH, manifest.upgrade_path.as_deref())?;
        self.db
            .set(&manifest.name, KEY_SOURCE_PATH, manifest.source_path.as_deref())?;
        self.db
            .set(&manifest.name, KEY_SYMBOL_PATH, manifest.symbol_path.as_deref())?;
        self.db
            .set(&manifest.name, KEY_FILE_COUNT, Some(&counter.to_string()))?;
        self.db
            .set(SECTION_INSTALLED, &manifest.name, Some(&manifest.version))?;

        self.pending[i].state = PendingState::Installed;
        info!("installed {} {}", manifest.name, manifest.version);
        Ok(())
    }

    /// Undo a failed commit: remove everything the failed package and any
    /// batch member installed before it laid down, then roll the ledger
    /// back so the state database returns to its pre-batch state.
    fn abort_batch(&mut self, failed: usize, failed_name: &str) {
        warn!("batch failed at {failed_name}; rolling back");

        self.undo_written(failed);
        self.forget(failed_name);
        self.pending[failed].state = PendingState::RolledBack;

        for j in (0..failed).rev() {
            if self.pending[j].state != PendingState::Installed {
                continue;
            }
            let name = self.pending[j].manifest.name.clone();
            self.undo_written(j);
            self.forget(&name);
            self.pending[j].state = PendingState::RolledBack;
        }

        if let Err(e) = self.ledger.rollback(self.db) {
            warn!("rollback left the state database inconsistent: {e}");
        }
    }

    fn undo_written(&mut self, i: usize) {
        for rel in std::mem::take(&mut self.pending[i].written) {
            let abs = fsutil::stored_to_absolute(&self.root, &rel);
            match fsutil::delete_with_retry(&abs) {
                Ok(()) if !fsutil::is_external_path(&rel) => {
                    fsutil::prune_empty_parents(&abs, &self.root);
                }
                Ok(()) => {}
                Err(e) => warn!("could not undo extracted file {rel}: {e}"),
            }
        }
    }

    fn forget(&mut self, name: &str) {
        if let Err(e) = self.db.set(SECTION_INSTALLED, name, None) {
            warn!("could not clear Installed entry for {name}: {e}");
        }
        if let Err(e) = self.db.remove_section(name) {
            warn!("could not clear section for {name}: {e}");
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if !self.ledger.is_empty() {
            warn!("batch dropped before commit; restoring backups");
            if let Err(e) = self.ledger.rollback(self.db) {
                warn!("rollback on drop failed: {e}");
            }
        }
        if let Some(lock) = self.lock_file.take() {
            let _ = lock.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Architecture;
    use crate::repository::client::Fetcher;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct NoFetcher;

    impl Fetcher for NoFetcher {
        fn recognizes(&self, _path: &str) -> bool {
            false
        }
        fn fetch(&self, url: &str, _dest: &Path) -> Result<()> {
            Err(Error::Network(format!("unexpected fetch of {url}")))
        }
    }

    fn build_cabinet(dir: &Path, file_name: &str, manifest: &str, payload: &[(&str, &str)]) -> PathBuf {
        let cab_path = dir.join(file_name);
        let file = File::create(&cab_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut entries = vec![(crate::cabinet::MANIFEST_ENTRY, manifest)];
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
        builder.into_inner().unwrap().finish().unwrap().sync_all().unwrap();
        cab_path
    }

    fn setup() -> (TempDir, StateDb, Platform) {
        let dir = tempfile::tempdir().unwrap();
        let db = StateDb::open(dir.path()).unwrap();
        let platform = Platform {
            os_build: 9_000,
            native_arch: Architecture::Amd64,
        };
        (dir, db, platform)
    }

    #[test]
    fn test_prepare_stages_package() {
        let (dir, mut db, platform) = setup();
        let cab = build_cabinet(
            dir.path(),
            "ex.cab",
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\n",
            &[("bin/ex", "payload")],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, dir.path(), platform).unwrap();

        let outcome = batch.prepare(&resolver, cab.to_str().unwrap()).unwrap();
        assert!(matches!(outcome, PrepareOutcome::Staged));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.pending()[0].state, PendingState::Staged);
        assert!(!batch.pending()[0].is_temp());
    }

    #[test]
    fn test_prepare_same_version_is_noop() {
        let (dir, mut db, platform) = setup();
        db.set(SECTION_INSTALLED, "ex", Some("1.0")).unwrap();
        db.set("ex", KEY_VERSION, Some("1.0")).unwrap();
        db.set("ex", KEY_ARCHITECTURE, Some("noarch")).unwrap();
        db.set("ex", KEY_FILE_COUNT, Some("0")).unwrap();

        let cab = build_cabinet(
            dir.path(),
            "ex.cab",
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\n",
            &[],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, dir.path(), platform).unwrap();

        let outcome = batch.prepare(&resolver, cab.to_str().unwrap()).unwrap();
        assert!(matches!(outcome, PrepareOutcome::AlreadyInstalled { .. }));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_prepare_rejects_newer_os_requirement() {
        let (dir, mut db, platform) = setup();
        let cab = build_cabinet(
            dir.path(),
            "ex.cab",
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\nMinimumOSBuild=10000\n",
            &[],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, dir.path(), platform).unwrap();

        let err = batch.prepare(&resolver, cab.to_str().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongOsVersion {
                required: 10_000,
                host: 9_000,
                fallback: None,
                ..
            }
        ));
    }

    #[test]
    fn test_redirect_chain_lands_on_supported_build() {
        let (dir, mut db, platform) = setup();
        let cab_b = build_cabinet(
            dir.path(),
            "ex-b.cab",
            "[Package]\nName=ex\nVersion=0.9\nArchitecture=noarch\nMinimumOSBuild=8000\n",
            &[("bin/ex", "older")],
        );
        let manifest_a = format!(
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\nMinimumOSBuild=10000\n\
             PackagePathForOlderBuilds={}\n",
            cab_b.display()
        );
        let cab_a = build_cabinet(dir.path(), "ex-a.cab", &manifest_a, &[("bin/ex", "newer")]);

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, dir.path(), platform).unwrap();

        let outcome = batch
            .prepare_with_redirect(&resolver, cab_a.to_str().unwrap())
            .unwrap();
        assert!(matches!(outcome, PrepareOutcome::Staged));
        assert_eq!(batch.pending()[0].manifest.version, "0.9");
    }

    #[test]
    fn test_redirect_cycle_fails() {
        let (dir, mut db, platform) = setup();
        let cab_path = dir.path().join("loop.cab");
        let manifest = format!(
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\nMinimumOSBuild=10000\n\
             PackagePathForOlderBuilds={}\n",
            cab_path.display()
        );
        build_cabinet(dir.path(), "loop.cab", &manifest, &[]);

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, dir.path(), platform).unwrap();

        let err = batch
            .prepare_with_redirect(&resolver, cab_path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::WrongOsVersion { fallback: None, .. }));
    }

    #[test]
    fn test_commit_installs_and_records() {
        let (dir, mut db, platform) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let cab = build_cabinet(
            dir.path(),
            "ex.cab",
            "[Package]\nName=ex\nVersion=1.0\nArchitecture=noarch\n",
            &[("bin/ex", "payload"), ("share/ex.dat", "data")],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, &root, platform).unwrap();
        batch.prepare(&resolver, cab.to_str().unwrap()).unwrap();
        let summary = batch.commit().unwrap();

        assert_eq!(summary.installed, vec![("ex".to_string(), "1.0".to_string())]);
        assert_eq!(db.installed_version("ex"), Some("1.0"));
        assert_eq!(db.get("ex", KEY_FILE_COUNT), Some("2"));
        assert_eq!(db.get("ex", "File1"), Some("bin/ex"));
        assert!(root.join("bin/ex").exists());
    }

    #[test]
    fn test_commit_conflict_rolls_back() {
        let (dir, mut db, platform) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();

        // Package "owner" already owns bin/shared.
        db.set(SECTION_INSTALLED, "owner", Some("1.0")).unwrap();
        db.set("owner", KEY_VERSION, Some("1.0")).unwrap();
        db.set("owner", KEY_ARCHITECTURE, Some("noarch")).unwrap();
        db.set("owner", KEY_FILE_COUNT, Some("1")).unwrap();
        db.set("owner", "File1", Some("bin/shared")).unwrap();
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/shared"), "owned").unwrap();

        let cab = build_cabinet(
            dir.path(),
            "intruder.cab",
            "[Package]\nName=intruder\nVersion=2.0\nArchitecture=noarch\n",
            &[("bin/new", "fresh"), ("bin/shared", "clobber")],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        let mut batch = Batch::begin(&mut db, &root, platform).unwrap();
        batch.prepare(&resolver, cab.to_str().unwrap()).unwrap();

        let err = batch.commit().unwrap_err();
        assert!(matches!(err, Error::FileConflict { ref owner, .. } if owner == "owner"));

        // Owner intact, intruder fully undone.
        assert_eq!(db.installed_version("owner"), Some("1.0"));
        assert_eq!(db.installed_version("intruder"), None);
        assert_eq!(db.get("intruder", "File1"), None);
        assert_eq!(
            std::fs::read_to_string(root.join("bin/shared")).unwrap(),
            "owned"
        );
        assert!(!root.join("bin/new").exists());
    }

    #[test]
    fn test_drop_without_commit_restores_backups() {
        let (dir, mut db, platform) = setup();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("bin")).unwrap();

        db.set(SECTION_INSTALLED, "ex", Some("1.0")).unwrap();
        db.set("ex", KEY_VERSION, Some("1.0")).unwrap();
        db.set("ex", KEY_ARCHITECTURE, Some("noarch")).unwrap();
        db.set("ex", KEY_FILE_COUNT, Some("1")).unwrap();
        db.set("ex", "File1", Some("bin/ex")).unwrap();
        std::fs::write(root.join("bin/ex"), "v1").unwrap();

        let cab = build_cabinet(
            dir.path(),
            "ex2.cab",
            "[Package]\nName=ex\nVersion=1.1\nArchitecture=noarch\n",
            &[("bin/ex", "v2")],
        );

        let fetcher = NoFetcher;
        let resolver = PathResolver::without_mirrors(&fetcher);
        {
            let mut batch = Batch::begin(&mut db, &root, platform).unwrap();
            batch.prepare(&resolver, cab.to_str().unwrap()).unwrap();
            // Dropped without commit.
        }

        assert_eq!(db.installed_version("ex"), Some("1.0"));
        assert_eq!(std::fs::read_to_string(root.join("bin/ex")).unwrap(), "v1");
    }
}
