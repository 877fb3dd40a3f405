// src/lib.rs

//! Cabman Package Manager
//!
//! Transactional install, upgrade, and removal of software delivered as
//! cabinet archives, tracked in a durable INI-structured state database.
//!
//! # Architecture
//!
//! - State database: one `packages.ini` per install root maps installed
//!   packages to their metadata and exact file manifests
//! - Batches: packages stage together and commit or roll back as a unit
//! - Backup ledger: superseded packages survive as shadow-renamed files
//!   plus captured index entries until the batch commits
//! - Conflict index: no two installed packages may own the same file

pub mod cabinet;
pub mod cli;
pub mod commands;
pub mod db;
mod error;
pub mod fsutil;
pub mod platform;
pub mod repository;
pub mod transaction;
pub mod uninstall;
pub mod version;

pub use cabinet::{read_manifest, Cabinet, Manifest};
pub use db::{PackageRecord, StateDb};
pub use error::{Error, Result};
pub use platform::{Architecture, Platform};
pub use repository::{Fetcher, HttpFetcher, Mirror, PathResolver, Source};
pub use transaction::{Batch, BackupLedger, CommitSummary, ConflictIndex, PendingState, PrepareOutcome};
