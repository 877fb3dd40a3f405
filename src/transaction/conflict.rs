// src/transaction/conflict.rs

//! Conflict index
//!
//! Built fresh at the start of each commit: every file owned by a
//! surviving installed package, keyed by its stored path. Packages being
//! replaced in the batch have already moved to the backup ledger and their
//! sections are gone, so a plain walk of `[Installed]` sees exactly the
//! survivors.

use crate::db::{PackageRecord, StateDb};
use crate::error::Result;
use std::collections::HashMap;
use tracing::debug;

/// Map of stored file path to owning package name
#[derive(Debug, Default)]
pub struct ConflictIndex {
    owners: HashMap<String, String>,
}

impl ConflictIndex {
    /// Index every file of every currently installed package
    pub fn build(db: &StateDb) -> Result<Self> {
        let mut owners = HashMap::new();
        for name in db.installed_packages()? {
            let record = PackageRecord::load(db, &name)?;
            for file in record.files {
                owners.entry(file).or_insert_with(|| name.clone());
            }
        }
        debug!("conflict index holds {} files", owners.len());
        Ok(Self { owners })
    }

    /// The package that owns this path, if any
    pub fn owner_of(&self, stored: &str) -> Option<&str> {
        self.owners.get(stored).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
