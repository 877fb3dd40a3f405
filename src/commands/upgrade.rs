// src/commands/upgrade.rs

//! Upgrade installed packages along their recorded upgrade paths

use super::Context;
use crate::cli::Channel;
use crate::db::PackageRecord;
use crate::error::Error;
use crate::repository::{HttpFetcher, PathResolver};
use crate::transaction::Batch;
use anyhow::{Context as _, Result};
use tracing::info;

/// Upgrade the named packages, or everything installed when none are named.
///
/// Explicitly named packages without an `UpgradePath` are an error; in the
/// upgrade-everything case they are skipped.
pub fn cmd_upgrade(ctx: &Context, packages: &[String], prefer: Option<Channel>) -> Result<()> {
    let mut db = ctx.open_db()?;

    let explicit = !packages.is_empty();
    let names: Vec<String> = if explicit {
        packages.to_vec()
    } else {
        db.installed_packages()?
    };

    let mut targets: Vec<String> = Vec::with_capacity(names.len());
    for name in &names {
        let record = PackageRecord::load(&db, name)?;
        match record.upgrade_path {
            Some(url) => targets.push(apply_channel(&url, prefer)),
            None if explicit => return Err(Error::NoUpgradePath(name.clone()).into()),
            None => info!("{name} has no upgrade path, skipping"),
        }
    }

    if targets.is_empty() {
        println!("Nothing to upgrade.");
        return Ok(());
    }

    let fetcher = HttpFetcher::new()?;
    let resolver = PathResolver::new(&db, &fetcher)?;
    let mut batch = Batch::begin(&mut db, &ctx.root, ctx.platform.clone())?;
    for target in &targets {
        if let Err(e) = batch.prepare_with_redirect(&resolver, target) {
            batch.abort()?;
            return Err(e).with_context(|| format!("failed to stage {target}"));
        }
    }

    if batch.is_empty() {
        println!("Everything is up to date.");
        return Ok(());
    }

    let summary = batch.commit().context("upgrade failed")?;
    println!("Upgraded {} package(s).", summary.installed.len());
    Ok(())
}

/// Substitute the preferred release channel into an upgrade URL.
///
/// Only applies when the URL already carries a `/stable/` or `/daily/`
/// path segment; other URLs are used unchanged.
fn apply_channel(url: &str, prefer: Option<Channel>) -> String {
    match prefer {
        Some(Channel::Stable) => url.replace("/daily/", "/stable/"),
        Some(Channel::Daily) => url.replace("/stable/", "/daily/"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_channel() {
        let url = "http://host/daily/ex.cab";
        assert_eq!(
            apply_channel(url, Some(Channel::Stable)),
            "http://host/stable/ex.cab"
        );
        assert_eq!(apply_channel(url, Some(Channel::Daily)), url);
        assert_eq!(apply_channel(url, None), url);
        assert_eq!(
            apply_channel("http://host/ex.cab", Some(Channel::Stable)),
            "http://host/ex.cab"
        );
    }
}
