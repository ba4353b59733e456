//! Plait CLI - Command-line interface for the Plait archive
//!
//! Ingest captures, browse the merged history, and drive sync from the
//! terminal.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::{
    completions, conflicts, delete, favorite, ingest, list, resolve, show, status, sync,
};
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
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plait_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Ingest { files, json } => ingest::run_ingest(&files, json, &db_path).await?,
        Commands::List {
            limit,
            platform,
            favorites,
            json,
        } => list::run_list(limit, platform.as_deref(), favorites, json, &db_path).await?,
        Commands::Show { id, json } => show::run_show(&id, json, &db_path).await?,
        Commands::Favorite { id, remove } => favorite::run_favorite(&id, remove, &db_path).await?,
        Commands::Delete { id } => delete::run_delete(&id, &db_path).await?,
        Commands::Sync => sync::run_sync(&db_path).await?,
        Commands::Conflicts { limit, json } => {
            conflicts::run_conflicts(limit, json, &db_path).await?;
        }
        Commands::Resolve { id, choice } => resolve::run_resolve(&id, choice, &db_path).await?,
        Commands::Status { json } => status::run_status(json, &db_path).await?,
        Commands::Completions { shell, output } => {
            completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
