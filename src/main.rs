// src/main.rs

use anyhow::Result;
use cabman::cli::{Cli, Commands, MirrorsCommand, SourcesCommand};
use cabman::commands::{self, Context};
use clap::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::new(cli.root)?;

    match cli.command {
        Commands::Install {
            packages,
            version,
            arch,
        } => commands::cmd_install(&ctx, &packages, version.as_deref(), arch.as_deref()),
        Commands::Remove { packages, all } => commands::cmd_remove(&ctx, &packages, all),
        Commands::Upgrade { packages, prefer } => commands::cmd_upgrade(&ctx, &packages, prefer),
        Commands::Source { package } => commands::cmd_install_source(&ctx, &package),
        Commands::Symbols { package } => commands::cmd_install_symbols(&ctx, &package),
        Commands::List { verbose } => commands::cmd_list(&ctx, verbose),
        Commands::ListRemote { source } => commands::cmd_list_remote(&ctx, source.as_deref()),
        Commands::Sources { command } => match command {
            SourcesCommand::List => commands::cmd_sources_list(&ctx),
            SourcesCommand::Add { url, first } => commands::cmd_sources_add(&ctx, &url, first),
            SourcesCommand::Remove { url } => commands::cmd_sources_remove(&ctx, &url),
        },
        Commands::Mirrors { command } => match command {
            MirrorsCommand::List => commands::cmd_mirrors_list(&ctx),
            MirrorsCommand::Add { find, replace } => {
                commands::cmd_mirrors_add(&ctx, &find, &replace)
            }
            MirrorsCommand::Remove { find } => commands::cmd_mirrors_remove(&ctx, &find),
        },
        Commands::Download { packages, dir } => commands::cmd_download(&ctx, &packages, &dir),
    }
}
