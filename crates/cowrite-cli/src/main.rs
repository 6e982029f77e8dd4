//! cowrite CLI - Collaborative documents from the terminal
//!
//! Opens, edits, snapshots, and restores shared documents against a local
//! (or remote libSQL) database.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::CommandContext;
use crate::commands::edit::run_edit;
use crate::commands::janitor::run_janitor;
use crate::commands::open::run_open;
use crate::commands::profile::run_profile;
use crate::commands::restore::run_restore;
use crate::commands::snapshot::run_snapshot;
use crate::commands::versions::run_versions;
use crate::commands::who::run_who;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cowrite=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = CommandContext::from_cli(&cli)?;

    match cli.command {
        Commands::Open {
            file_id,
            path,
            mime,
            json,
        } => run_open(&ctx, &file_id, path, mime, json).await?,
        Commands::Edit { file_id, content } => run_edit(&ctx, &file_id, &content).await?,
        Commands::Versions { file_id, json } => run_versions(&ctx, &file_id, json).await?,
        Commands::Snapshot { file_id, note } => {
            run_snapshot(&ctx, &file_id, note.as_deref()).await?;
        }
        Commands::Restore {
            file_id,
            version_number,
        } => run_restore(&ctx, &file_id, version_number).await?,
        Commands::Who { file_id, json } => run_who(&ctx, &file_id, json).await?,
        Commands::Profile {
            user_id,
            display_name,
        } => run_profile(&ctx, &user_id, &display_name).await?,
        Commands::Janitor { retention_secs } => run_janitor(&ctx, retention_secs).await?,
    }

    Ok(())
}
