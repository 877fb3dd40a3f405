// src/repository/catalog.rs

//! Remote package catalog
//!
//! Each source root serves a `pkglist.ini` naming the packages it provides,
//! one section per package with per-architecture cabinet paths, plus a
//! `[Sources]` section chaining further sources. Collection walks the chain
//! breadth-first, deduplicating by URL, and materializes one record per
//! (name, version, architecture).

use super::resolve::PathResolver;
use super::Source;
use crate::db::ini;
use crate::error::{Error, Result};
use crate::platform::{Architecture, Platform};
use crate::version;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};
use url::Url;

const SECTION_SOURCES: &str = "Sources";
const SECTION_PROVIDES: &str = "Provides";

/// One installable artifact advertised by a source
#[derive(Debug, Clone)]
pub struct RemotePackage {
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
    /// Absolute URL (or path) of the cabinet
    pub url: String,
    pub minimum_os_build: Option<u64>,
    pub older_build_path: Option<String>,
    /// Root of the source that advertised this package
    pub source_root: String,
}

/// The merged view over every reachable source
#[derive(Debug, Default)]
pub struct Catalog {
    pub sources: Vec<Source>,
    pub packages: Vec<RemotePackage>,
}

/// Walk the source chain and materialize every advertised package.
///
/// Sources that cannot be fetched or parsed are reported and skipped; a
/// chain that loops back on itself terminates through URL deduplication.
pub fn collect_all(resolver: &PathResolver, initial: &[Source]) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<Source> = initial.iter().cloned().collect();

    while let Some(source) = queue.pop_front() {
        if !seen.insert(source.pkglist_url.clone()) {
            continue;
        }

        let doc = match fetch_pkglist(resolver, &source) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("skipping source {}: {e}", source.root);
                eprintln!("Skipping source {}: {e}", source.root);
                continue;
            }
        };

        for (_, url) in doc.section_entries(SECTION_SOURCES)? {
            queue.push_back(Source::new(&url));
        }

        for (name, provided_version) in doc.section_entries(SECTION_PROVIDES)? {
            let version = doc
                .get(&name, "Version")
                .unwrap_or(provided_version.as_str())
                .to_string();
            collect_package(&mut catalog, &doc, &source, &name, &version)?;
        }

        catalog.sources.push(source);
    }

    debug!(
        "catalog: {} packages from {} sources",
        catalog.packages.len(),
        catalog.sources.len()
    );
    Ok(catalog)
}

fn fetch_pkglist(resolver: &PathResolver, source: &Source) -> Result<ini::IniDocument> {
    let resolved = resolver.resolve(&source.pkglist_url)?;
    ini::load(resolved.path())
}

fn collect_package(
    catalog: &mut Catalog,
    doc: &ini::IniDocument,
    source: &Source,
    name: &str,
    version: &str,
) -> Result<()> {
    for (key, value) in doc.section_entries(name)? {
        if key == "Version" || key.contains('.') {
            continue;
        }
        let architecture: Architecture = key.parse().expect("architecture parsing is infallible");

        let minimum_os_build = doc
            .get(name, &format!("{key}.minimumosbuild"))
            .and_then(|v| v.parse().ok());
        let older_build_path = doc
            .get(name, &format!("{key}.packagepathforolderbuilds"))
            .map(str::to_string);

        catalog.packages.push(RemotePackage {
            name: name.to_string(),
            version: version.to_string(),
            architecture,
            url: join_source_path(&source.root, &value),
            minimum_os_build,
            older_build_path,
            source_root: source.root.clone(),
        });
    }
    Ok(())
}

/// Join a cabinet path from a package section against its source root
fn join_source_path(root: &str, rel: &str) -> String {
    if rel.contains("://") {
        return rel.to_string();
    }
    if root.contains("://") {
        if let Ok(base) = Url::parse(&format!("{root}/"))
            && let Ok(joined) = base.join(rel)
        {
            return joined.to_string();
        }
    }
    format!("{root}/{rel}")
}

/// Select the best match for each requested name.
///
/// Without a version, the lexicographically greatest version wins; without
/// an architecture, the host preference chain decides. Ties within equal
/// preference resolve to the first record found.
pub fn find(
    catalog: &Catalog,
    names: &[String],
    version: Option<&str>,
    arch: Option<&Architecture>,
    platform: &Platform,
) -> Result<Vec<RemotePackage>> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        out.push(find_one(catalog, name, version, arch, platform)?);
    }
    Ok(out)
}

fn find_one(
    catalog: &Catalog,
    name: &str,
    version: Option<&str>,
    arch: Option<&Architecture>,
    platform: &Platform,
) -> Result<RemotePackage> {
    let mut matches: Vec<&RemotePackage> =
        catalog.packages.iter().filter(|p| p.name == name).collect();
    if matches.is_empty() {
        return Err(Error::CatalogPackageNotFound(name.to_string()));
    }

    let wanted_version = match version {
        Some(v) => v.to_string(),
        None => matches
            .iter()
            .map(|p| p.version.as_str())
            .fold(String::new(), |best, v| {
                if best.is_empty() || version::is_newer(v, &best) {
                    v.to_string()
                } else {
                    best
                }
            }),
    };
    matches.retain(|p| p.version == wanted_version);
    if matches.is_empty() {
        return Err(Error::CatalogPackageNotFound(format!(
            "{name} version {wanted_version}"
        )));
    }

    let chosen = match arch {
        Some(a) => matches.iter().find(|p| p.architecture == *a),
        None => platform
            .arch_preference()
            .iter()
            .find_map(|pref| matches.iter().find(|p| p.architecture == *pref)),
    };

    chosen.copied().cloned().ok_or_else(|| {
        Error::CatalogPackageNotFound(format!(
            "{name} {wanted_version} for this architecture"
        ))
    })
}
