// src/error.rs

//! Error types for cabman operations

use thiserror::Error;

/// Result type alias using the cabman error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the package engine
#[derive(Debug, Error)]
pub enum Error {
    /// The named package has no entry in the `[Installed]` section
    #[error("package '{0}' is not installed")]
    PackageNotInstalled(String),

    /// The package record carries no `UpgradePath`
    #[error("package '{0}' has no upgrade path")]
    NoUpgradePath(String),

    /// The package record carries no `SourcePath`
    #[error("package '{0}' has no source package path")]
    NoSourcePath(String),

    /// The package record carries no `SymbolPath`
    #[error("package '{0}' has no symbol package path")]
    NoSymbolPath(String),

    /// Manifest or state-DB record is missing required fields
    #[error("malformed package data: {0}")]
    Malformed(String),

    /// Cabinet extraction or temporary file creation failed
    #[error("write failure: {0}")]
    WriteFault(String),

    /// Fetcher-reported network condition
    #[error("network error: {0}")]
    Network(String),

    /// The host OS build is below the package's required build.
    ///
    /// Not a terminal error: when `fallback` is present the caller retries
    /// the prepare with that URL.
    #[error("package '{package}' requires OS build {required} (host is {host})")]
    WrongOsVersion {
        package: String,
        required: u64,
        host: u64,
        fallback: Option<String>,
    },

    /// Extraction would overwrite a file owned by another installed package
    #[error("file '{path}' conflicts with installed package '{owner}'")]
    FileConflict { path: String, owner: String },

    /// An INI value exceeds the fixed field-length limit
    #[error("value for '{key}' is {len} characters (limit {limit})")]
    ValueTooLong { key: String, len: usize, limit: usize },

    /// An INI section exceeds the fixed raw-text cap
    #[error("section '{section}' is {size} bytes (limit {limit})")]
    SectionTooLarge {
        section: String,
        size: usize,
        limit: usize,
    },

    /// No remote source provides a matching package
    #[error("no source provides package '{0}'")]
    CatalogPackageNotFound(String),

    /// A remote operation was requested with an empty `[Sources]` section
    #[error("no package sources are configured")]
    NoSourcesConfigured,

    /// Another batch holds the lock on this install root
    #[error("install root is locked: {0}")]
    Locked(String),

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Data could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}
