// src/commands/mod.rs

//! Command layer
//!
//! Each command opens the state database under the install root, drives the
//! library, and reports to stdout. Failures propagate as `anyhow` errors
//! and render on stderr through the binary's exit path.

mod companions;
mod config;
mod download;
mod install;
mod list;
mod remove;
mod upgrade;

pub use companions::{cmd_install_source, cmd_install_symbols};
pub use config::{
    cmd_mirrors_add, cmd_mirrors_list, cmd_mirrors_remove, cmd_sources_add, cmd_sources_list,
    cmd_sources_remove,
};
pub use download::cmd_download;
pub use install::cmd_install;
pub use list::{cmd_list, cmd_list_remote};
pub use remove::cmd_remove;
pub use upgrade::cmd_upgrade;

use crate::db::StateDb;
use crate::platform::Platform;
use anyhow::{Context as _, Result};
use std::fs;
use std::path::PathBuf;

/// Shared command context: install root and host platform
pub struct Context {
    pub root: PathBuf,
    pub platform: Platform,
}

impl Context {
    /// Build a context, defaulting the root to the platform data directory
    pub fn new(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => dirs::data_local_dir()
                .context("no data directory for this user; pass --root")?
                .join("cabman"),
        };
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create install root {}", root.display()))?;
        Ok(Self {
            root,
            platform: Platform::detect(),
        })
    }

    /// Open the state database under the install root
    pub fn open_db(&self) -> Result<StateDb> {
        StateDb::open(&self.root).context("failed to open the state database")
    }
}
