// src/commands/config.rs

//! Source and mirror configuration commands

use super::Context;
use crate::repository;
use anyhow::Result;

pub fn cmd_sources_list(ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let sources = repository::sources(&db)?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }
    for (i, source) in sources.iter().enumerate() {
        println!("{}. {}", i + 1, source.root);
    }
    Ok(())
}

pub fn cmd_sources_add(ctx: &Context, url: &str, first: bool) -> Result<()> {
    let mut db = ctx.open_db()?;
    repository::add_source(&mut db, url, first)?;
    println!("Added source {url}");
    Ok(())
}

pub fn cmd_sources_remove(ctx: &Context, url: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    repository::remove_source(&mut db, url)?;
    println!("Removed source {url}");
    Ok(())
}

pub fn cmd_mirrors_list(ctx: &Context) -> Result<()> {
    let db = ctx.open_db()?;
    let mirrors = repository::mirrors(&db)?;
    if mirrors.is_empty() {
        println!("No mirrors configured.");
        return Ok(());
    }
    for mirror in &mirrors {
        println!("{} -> {}", mirror.find, mirror.replace);
    }
    Ok(())
}

pub fn cmd_mirrors_add(ctx: &Context, find: &str, replace: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    repository::add_mirror(&mut db, find, replace)?;
    println!("Added mirror {find} -> {replace}");
    Ok(())
}

pub fn cmd_mirrors_remove(ctx: &Context, find: &str) -> Result<()> {
    let mut db = ctx.open_db()?;
    repository::remove_mirror(&mut db, find)?;
    println!("Removed mirror {find}");
    Ok(())
}
