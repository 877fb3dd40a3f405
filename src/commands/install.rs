// src/commands/install.rs

//! Install packages from files, URLs, or remote names

use super::Context;
use crate::db::StateDb;
use crate::platform::Architecture;
use crate::repository::{self, catalog, Fetcher as _, HttpFetcher, PathResolver};
use crate::transaction::Batch;
use anyhow::{bail, Context as _, Result};
use std::path::Path;
use tracing::debug;

/// Install each requested package; everything forms one batch.
///
/// A reference that is a URL or an existing file installs from that path;
/// anything else is treated as a remote package name and resolved through
/// the catalog.
pub fn cmd_install(
    ctx: &Context,
    packages: &[String],
    version: Option<&str>,
    arch: Option<&str>,
) -> Result<()> {
    let mut db = ctx.open_db()?;
    let fetcher = HttpFetcher::new()?;
    let resolver = PathResolver::new(&db, &fetcher)?;

    let arch = arch.map(|a| a.parse::<Architecture>().expect("architecture parsing is infallible"));

    let mut targets: Vec<String> = Vec::with_capacity(packages.len());
    let mut remote_names: Vec<String> = Vec::new();
    for spec in packages {
        if fetcher.recognizes(spec) || Path::new(spec).exists() {
            targets.push(spec.clone());
        } else {
            remote_names.push(spec.clone());
        }
    }

    if !remote_names.is_empty() {
        debug!("resolving {} names through the catalog", remote_names.len());
        let found = resolve_remote(&db, &resolver, ctx, &remote_names, version, arch.as_ref())?;
        targets.extend(found);
    }

    let mut batch = Batch::begin(&mut db, &ctx.root, ctx.platform.clone())?;
    for target in &targets {
        if let Err(e) = batch.prepare_with_redirect(&resolver, target) {
            batch.abort()?;
            return Err(e).with_context(|| format!("failed to stage {target}"));
        }
    }

    if batch.is_empty() {
        println!("Nothing to install.");
        return Ok(());
    }

    let summary = batch.commit().context("installation failed")?;
    println!("Installed {} package(s).", summary.installed.len());
    Ok(())
}

/// Resolve remote names to cabinet URLs through the catalog
pub(super) fn resolve_remote(
    db: &StateDb,
    resolver: &PathResolver,
    ctx: &Context,
    names: &[String],
    version: Option<&str>,
    arch: Option<&Architecture>,
) -> Result<Vec<String>> {
    let sources = repository::sources(db)?;
    if sources.is_empty() {
        bail!(crate::error::Error::NoSourcesConfigured);
    }

    let cat = catalog::collect_all(resolver, &sources)?;
    let found = catalog::find(&cat, names, version, arch, &ctx.platform)?;
    Ok(found.into_iter().map(|p| p.url).collect())
}
