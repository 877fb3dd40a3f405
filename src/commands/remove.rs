// src/commands/remove.rs

//! Remove installed packages

use super::Context;
use crate::uninstall::uninstall;
use anyhow::{Context as _, Result};

/// Remove the named packages, or every installed package with `all`
pub fn cmd_remove(ctx: &Context, packages: &[String], all: bool) -> Result<()> {
    let mut db = ctx.open_db()?;

    let names: Vec<String> = if all {
        db.installed_packages()?
    } else {
        packages.to_vec()
    };

    if names.is_empty() {
        println!("Nothing to remove.");
        return Ok(());
    }

    for name in &names {
        uninstall(&mut db, &ctx.root, name)
            .with_context(|| format!("failed to remove {name}"))?;
        println!("Removed {name}");
    }
    Ok(())
}
