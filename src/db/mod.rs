// src/db/mod.rs

//! State database: the durable INI file tracking installed packages
//!
//! One `packages.ini` per install root records the `[Installed]` map, one
//! section per package with its metadata and `File1…FileN` manifest, plus
//! the `[Sources]` and `[Mirrors]` configuration. Every mutation is durable
//! before the call returns; the whole document is rewritten atomically.

pub mod ini;

use crate::error::{Error, Result};
use ini::IniDocument;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the state database under the install root
pub const STATE_DB_FILE: &str = "packages.ini";

/// Section mapping package name to installed version
pub const SECTION_INSTALLED: &str = "Installed";

/// Section listing source URLs in resolution order
pub const SECTION_SOURCES: &str = "Sources";

/// Section of mirror substitution rules
pub const SECTION_MIRRORS: &str = "Mirrors";

pub const KEY_VERSION: &str = "Version";
pub const KEY_ARCHITECTURE: &str = "Architecture";
pub const KEY_FILE_COUNT: &str = "FileCount";
pub const KEY_UPGRADE_PATH: &str = "UpgradePath";
pub const KEY_SOURCE_PATH: &str = "SourcePath";
pub const KEY_SYMBOL_PATH: &str = "SymbolPath";

/// Handle to the on-disk state database
pub struct StateDb {
    path: PathBuf,
    doc: IniDocument,
}

impl StateDb {
    /// Open the state database under the given install root, creating an
    /// empty one if no file exists yet.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(STATE_DB_FILE);
        let doc = ini::load(&path)?;
        debug!("opened state db at {}", path.display());
        Ok(Self { path, doc })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a single value; `None` when section or key is absent
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.doc.get(section, key)
    }

    /// Ordered key/value pairs of a section (64 KiB raw cap enforced)
    pub fn get_section(&self, section: &str) -> Result<Vec<(String, String)>> {
        self.doc.section_entries(section)
    }

    /// Set or delete a key and persist the document
    pub fn set(&mut self, section: &str, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.doc.set(section, key, v)?,
            None => self.doc.remove_key(section, key),
        }
        self.persist()
    }

    /// Delete a whole section and persist the document
    pub fn remove_section(&mut self, section: &str) -> Result<()> {
        self.doc.remove_section(section);
        self.persist()
    }

    /// Read a decimal integer, falling back on absent or unparsable values
    pub fn read_int(&self, section: &str, key: &str, default: u64) -> u64 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn persist(&self) -> Result<()> {
        ini::store(&self.path, &self.doc)
    }

    /// Installed version of a package, if any
    pub fn installed_version(&self, name: &str) -> Option<&str> {
        self.get(SECTION_INSTALLED, name)
    }

    /// All installed package names in index order
    pub fn installed_packages(&self) -> Result<Vec<String>> {
        Ok(self
            .get_section(SECTION_INSTALLED)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }
}

/// Metadata and file manifest of one installed package
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub files: Vec<String>,
    pub upgrade_path: Option<String>,
    pub source_path: Option<String>,
    pub symbol_path: Option<String>,
}

impl PackageRecord {
    /// Load the record for an installed package.
    ///
    /// The file list walks `File1…FileCount`; a gap inside the range is a
    /// malformed record, per the contiguity invariant.
    pub fn load(db: &StateDb, name: &str) -> Result<Self> {
        if db.installed_version(name).is_none() {
            return Err(Error::PackageNotInstalled(name.to_string()));
        }

        let version = db
            .get(name, KEY_VERSION)
            .ok_or_else(|| Error::Malformed(format!("package '{name}' has no Version key")))?
            .to_string();
        let architecture = db
            .get(name, KEY_ARCHITECTURE)
            .ok_or_else(|| Error::Malformed(format!("package '{name}' has no Architecture key")))?
            .to_string();

        let file_count = db.read_int(name, KEY_FILE_COUNT, 0);
        let mut files = Vec::with_capacity(file_count as usize);
        for k in 1..=file_count {
            let key = format!("File{k}");
            let value = db.get(name, &key).ok_or_else(|| {
                Error::Malformed(format!("package '{name}' is missing {key} (FileCount={file_count})"))
            })?;
            files.push(value.to_string());
        }

        Ok(Self {
            name: name.to_string(),
            version,
            architecture,
            files,
            upgrade_path: db.get(name, KEY_UPGRADE_PATH).map(str::to_string),
            source_path: db.get(name, KEY_SOURCE_PATH).map(str::to_string),
            symbol_path: db.get(name, KEY_SYMBOL_PATH).map(str::to_string),
        })
    }
}
