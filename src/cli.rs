// src/cli.rs

//! Command-line surface

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cabman")]
#[command(author, version, about = "Transactional package manager for cabinet archives", long_about = None)]
pub struct Cli {
    /// Install root directory (default: the platform data directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Upgrade channel preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Channel {
    Stable,
    Daily,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages from files, URLs, or remote names
    Install {
        /// Cabinet paths, cabinet URLs, or remote package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Specific version when installing by remote name
        #[arg(long)]
        version: Option<String>,
        /// Specific architecture when installing by remote name
        #[arg(long)]
        arch: Option<String>,
    },
    /// Remove installed packages
    Remove {
        /// Package names to remove
        #[arg(required_unless_present = "all")]
        packages: Vec<String>,
        /// Remove every installed package
        #[arg(long, conflicts_with = "packages")]
        all: bool,
    },
    /// Upgrade installed packages along their recorded upgrade paths
    Upgrade {
        /// Packages to upgrade (all installed packages when omitted)
        packages: Vec<String>,
        /// Prefer this release channel when the upgrade path carries one
        #[arg(long, value_enum)]
        prefer: Option<Channel>,
    },
    /// Install the source companion of an installed package
    Source {
        /// Installed package name
        package: String,
    },
    /// Install the symbol companion of an installed package
    Symbols {
        /// Installed package name
        package: String,
    },
    /// List installed packages
    List {
        /// Show architecture, file counts, and recorded URLs
        #[arg(short, long)]
        verbose: bool,
    },
    /// List packages available from the configured sources
    ListRemote {
        /// Query this source instead of the configured ones
        #[arg(long)]
        source: Option<String>,
    },
    /// Manage package sources
    Sources {
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Manage mirror substitution rules
    Mirrors {
        #[command(subcommand)]
        command: MirrorsCommand,
    },
    /// Download cabinets into a directory without installing
    Download {
        /// Remote package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Destination directory
        #[arg(long)]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// List configured sources in resolution order
    List,
    /// Add a source
    Add {
        url: String,
        /// Put the source ahead of the existing ones
        #[arg(long)]
        first: bool,
    },
    /// Remove a source
    Remove { url: String },
}

#[derive(Subcommand)]
pub enum MirrorsCommand {
    /// List mirror rules
    List,
    /// Add or update a mirror rule
    Add { find: String, replace: String },
    /// Remove a mirror rule
    Remove { find: String },
}
