use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use refindex::cli::commands::{CommandContext, index, init, query};
use refindex::cli::{Cli, Commands};
use refindex::{Settings, logging, paths};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load settings")?;

    logging::init_with_config(&settings.logging);

    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
    let root: PathBuf = cli
        .root
        .clone()
        .or_else(|| settings.workspace_root.clone())
        .or_else(Settings::workspace_root)
        .map(|root| paths::resolve_against(&root, &cwd))
        .unwrap_or_else(|| cwd.clone());
    let ctx = CommandContext::new(settings, root, cwd);

    match cli.command {
        Commands::Init {
            unit,
            source_roots,
            dir,
            force,
        } => init::run_init(&ctx, unit, source_roots, dir, force)?,
        Commands::Index { force } => index::run_index(&ctx, force)?,
        Commands::Definition(args) => query::run_definition(&ctx, &args)?,
        Commands::Hover(args) => query::run_hover(&ctx, &args)?,
        Commands::Refs(args) => query::run_refs(&ctx, &args)?,
        Commands::Exported => query::run_exported(&ctx)?,
        Commands::ExternalRefs => query::run_external_refs(&ctx)?,
        Commands::Config => init::run_config(&ctx)?,
    }

    Ok(())
}
