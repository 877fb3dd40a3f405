// src/commands/companions.rs

//! Source and symbol companion installs
//!
//! Installed packages may record URLs for their source and debugging-symbol
//! companions. These commands fetch and install those companions through
//! the same batch machinery as any other package.

use super::Context;
use crate::db::PackageRecord;
use crate::error::Error;
use crate::repository::{HttpFetcher, PathResolver};
use crate::transaction::Batch;
use anyhow::{Context as _, Result};

/// Install the source companion of an installed package
pub fn cmd_install_source(ctx: &Context, package: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    let record = PackageRecord::load(&db, package)?;
    let url = record
        .source_path
        .ok_or_else(|| Error::NoSourcePath(package.to_string()))?;
    install_companion(ctx, &mut db, &url)
}

/// Install the symbol companion of an installed package
pub fn cmd_install_symbols(ctx: &Context, package: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    let record = PackageRecord::load(&db, package)?;
    let url = record
        .symbol_path
        .ok_or_else(|| Error::NoSymbolPath(package.to_string()))?;
    install_companion(ctx, &mut db, &url)
}

fn install_companion(ctx: &Context, db: &mut crate::db::StateDb, url: &str) -> Result<()> {
    let fetcher = HttpFetcher::new()?;
    let resolver = PathResolver::new(db, &fetcher)?;

    let mut batch = Batch::begin(db, &ctx.root, ctx.platform.clone())?;
    if let Err(e) = batch.prepare_with_redirect(&resolver, url) {
        batch.abort()?;
        return Err(e).with_context(|| format!("failed to stage {url}"));
    }
    if batch.is_empty() {
        return Ok(());
    }
    let summary = batch.commit().context("installation failed")?;
    println!("Installed {} package(s).", summary.installed.len());
    Ok(())
}
