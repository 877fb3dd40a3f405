// src/commands/download.rs

//! Download cabinets into a directory without installing

use super::install::resolve_remote;
use super::Context;
use crate::repository::{HttpFetcher, PathResolver};
use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;

/// Resolve each remote name and fetch its cabinet into `dir`
pub fn cmd_download(ctx: &Context, packages: &[String], dir: &Path) -> Result<()> {
    let db = ctx.open_db()?;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let fetcher = HttpFetcher::new()?;
    let resolver = PathResolver::new(&db, &fetcher)?;
    let urls = resolve_remote(&db, &resolver, ctx, packages, None, None)?;

    for url in &urls {
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("package.cab");
        let dest = dir.join(file_name);

        let resolved = resolver.resolve(url)?;
        fs::copy(resolved.path(), &dest)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        println!("Downloaded {}", dest.display());
    }
    Ok(())
}
