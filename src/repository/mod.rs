// src/repository/mod.rs

//! Remote sources, mirrors, and artifact resolution
//!
//! A source is the root URL of a package repository (the parent of its
//! `pkglist.ini`). A mirror is a user-configured URL-prefix substitution
//! applied before any fetch.

pub mod catalog;
pub mod client;
pub mod resolve;

pub use catalog::{collect_all, find, Catalog, RemotePackage};
pub use client::{Fetcher, HttpFetcher};
pub use resolve::{PathResolver, Resolved};

use crate::db::{StateDb, SECTION_MIRRORS, SECTION_SOURCES};
use crate::error::Result;

/// File name of the catalog at every source root
pub const PKGLIST_FILE: &str = "pkglist.ini";

/// A remote package repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Root URL, parent of `pkglist.ini`
    pub root: String,
    /// Derived URL of the source's catalog
    pub pkglist_url: String,
}

impl Source {
    /// Build a source from its root URL.
    ///
    /// A URL that already names `pkglist.ini` is accepted and split back
    /// into its root.
    pub fn new(url: &str) -> Self {
        let trimmed = url.trim_end_matches('/');
        match trimmed.strip_suffix(PKGLIST_FILE) {
            Some(root) => {
                let root = root.trim_end_matches('/').to_string();
                Self {
                    pkglist_url: format!("{root}/{PKGLIST_FILE}"),
                    root,
                }
            }
            None => Self {
                root: trimmed.to_string(),
                pkglist_url: format!("{trimmed}/{PKGLIST_FILE}"),
            },
        }
    }
}

/// A URL-prefix substitution rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub find: String,
    pub replace: String,
}

/// `=` is meaningful in INI lines, so mirror patterns encode it as `%`
fn encode_mirror_part(part: &str) -> String {
    part.replace('=', "%")
}

fn decode_mirror_part(part: &str) -> String {
    part.replace('%', "=")
}

/// Configured sources in resolution order (`Source1…SourceN`)
pub fn sources(db: &StateDb) -> Result<Vec<Source>> {
    let count = db.get_section(SECTION_SOURCES)?.len() as u64;
    let mut out = Vec::with_capacity(count as usize);
    for k in 1..=count {
        if let Some(url) = db.get(SECTION_SOURCES, &format!("Source{k}")) {
            out.push(Source::new(url));
        }
    }
    Ok(out)
}

/// Add a source, prepending when `first` is set, appending otherwise
pub fn add_source(db: &mut StateDb, url: &str, first: bool) -> Result<()> {
    let mut roots: Vec<String> = sources(db)?.into_iter().map(|s| s.root).collect();
    let new = Source::new(url).root;
    if roots.contains(&new) {
        return Ok(());
    }
    if first {
        roots.insert(0, new);
    } else {
        roots.push(new);
    }
    write_sources(db, &roots)
}

/// Remove a source by root URL
pub fn remove_source(db: &mut StateDb, url: &str) -> Result<()> {
    let target = Source::new(url).root;
    let roots: Vec<String> = sources(db)?
        .into_iter()
        .map(|s| s.root)
        .filter(|r| *r != target)
        .collect();
    write_sources(db, &roots)
}

fn write_sources(db: &mut StateDb, roots: &[String]) -> Result<()> {
    db.remove_section(SECTION_SOURCES)?;
    for (i, root) in roots.iter().enumerate() {
        db.set(SECTION_SOURCES, &format!("Source{}", i + 1), Some(root))?;
    }
    Ok(())
}

/// Configured mirrors in key order, decoded
pub fn mirrors(db: &StateDb) -> Result<Vec<Mirror>> {
    Ok(db
        .get_section(SECTION_MIRRORS)?
        .into_iter()
        .map(|(find, replace)| Mirror {
            find: decode_mirror_part(&find),
            replace: decode_mirror_part(&replace),
        })
        .collect())
}

/// Add or update a mirror substitution
pub fn add_mirror(db: &mut StateDb, find: &str, replace: &str) -> Result<()> {
    db.set(
        SECTION_MIRRORS,
        &encode_mirror_part(find),
        Some(&encode_mirror_part(replace)),
    )
}

/// Remove a mirror by its find pattern
pub fn remove_mirror(db: &mut StateDb, find: &str) -> Result<()> {
    db.set(SECTION_MIRRORS, &encode_mirror_part(find), None)
}
