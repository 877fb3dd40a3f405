// src/cabinet/manifest.rs

//! Embedded package manifest (`pkginfo.ini`) reader

use super::{Cabinet, MANIFEST_ENTRY};
use crate::db::ini;
use crate::error::{Error, Result};
use crate::platform::Architecture;
use std::fs;
use tracing::debug;

const SECTION_PACKAGE: &str = "Package";
const SECTION_REPLACES: &str = "Replaces";

/// Identity and optional URLs of a package, as declared in its cabinet
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
    /// Host OS build this package requires, when restricted
    pub minimum_os_build: Option<u64>,
    /// URL to try instead on hosts below `minimum_os_build`
    pub older_build_path: Option<String>,
    pub upgrade_path: Option<String>,
    pub source_path: Option<String>,
    pub symbol_path: Option<String>,
    /// Names of packages this one supersedes
    pub replaces: Vec<String>,
}

/// Extract and parse the manifest embedded in a cabinet.
///
/// The single `pkginfo.ini` entry is extracted into a scratch directory and
/// parsed with the state-DB INI codec. Fails with `WriteFault` when the
/// entry cannot be extracted and `Malformed` when required fields are
/// missing.
pub fn read_manifest(cabinet: &Cabinet) -> Result<Manifest> {
    let bytes = cabinet.read_manifest_bytes()?;

    let scratch = tempfile::tempdir()
        .map_err(|e| Error::WriteFault(format!("failed to create scratch directory: {e}")))?;
    let scratch_path = scratch.path().join(MANIFEST_ENTRY);
    fs::write(&scratch_path, &bytes)
        .map_err(|e| Error::WriteFault(format!("failed to write manifest scratch file: {e}")))?;

    let doc = ini::load(&scratch_path)?;

    let required = |key: &str| -> Result<String> {
        doc.get(SECTION_PACKAGE, key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "manifest in {} is missing {key}",
                    cabinet.path().display()
                ))
            })
    };

    let name = required("Name")?;
    let version = required("Version")?;
    let architecture: Architecture = required("Architecture")?
        .parse()
        .expect("architecture parsing is infallible");

    let optional = |key: &str| {
        doc.get(SECTION_PACKAGE, key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let minimum_os_build = match doc.get(SECTION_PACKAGE, "MinimumOSBuild") {
        Some(v) if !v.is_empty() => Some(v.parse::<u64>().map_err(|_| {
            Error::Malformed(format!("MinimumOSBuild '{v}' is not a decimal integer"))
        })?),
        _ => None,
    };

    let replaces = doc
        .section_entries(SECTION_REPLACES)?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let manifest = Manifest {
        name,
        version,
        architecture,
        minimum_os_build,
        older_build_path: optional("PackagePathForOlderBuilds"),
        upgrade_path: optional("UpgradePath"),
        source_path: optional("SourcePath"),
        symbol_path: optional("SymbolPath"),
        replaces,
    };
    debug!(
        "manifest: {} {} ({})",
        manifest.name, manifest.version, manifest.architecture
    );
    Ok(manifest)
}
