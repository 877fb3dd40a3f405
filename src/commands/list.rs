// src/commands/list.rs

//! Listing commands: installed packages and the remote catalog

use super::Context;
use crate::db::PackageRecord;
use crate::repository::{self, catalog, HttpFetcher, PathResolver, Source};
use anyhow::{bail, Result};

/// List installed packages
pub fn cmd_list(ctx: &Context, verbose: bool) -> Result<()> {
    let db = ctx.open_db()?;
    let names = db.installed_packages()?;
    if names.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    for name in names {
        let record = PackageRecord::load(&db, &name)?;
        if verbose {
            println!(
                "{} {} ({}, {} files)",
                record.name,
                record.version,
                record.architecture,
                record.files.len()
            );
            if let Some(url) = &record.upgrade_path {
                println!("  upgrade: {url}");
            }
            if let Some(url) = &record.source_path {
                println!("  source:  {url}");
            }
            if let Some(url) = &record.symbol_path {
                println!("  symbols: {url}");
            }
        } else {
            println!("{} {}", record.name, record.version);
        }
    }
    Ok(())
}

/// List everything the reachable sources provide
pub fn cmd_list_remote(ctx: &Context, source: Option<&str>) -> Result<()> {
    let db = ctx.open_db()?;
    let sources = match source {
        Some(url) => vec![Source::new(url)],
        None => repository::sources(&db)?,
    };
    if sources.is_empty() {
        bail!(crate::error::Error::NoSourcesConfigured);
    }

    let fetcher = HttpFetcher::new()?;
    let resolver = PathResolver::new(&db, &fetcher)?;
    let cat = catalog::collect_all(&resolver, &sources)?;

    if cat.packages.is_empty() {
        println!("No packages available.");
        return Ok(());
    }
    for pkg in &cat.packages {
        println!("{} {} ({})", pkg.name, pkg.version, pkg.architecture);
    }
    Ok(())
}
