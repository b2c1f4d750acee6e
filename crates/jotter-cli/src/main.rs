//! Jotter CLI - offline-first journal entries from the command line
//!
//! Every write lands in the local database first; `jotter sync` pushes the
//! queued changes to the configured remote store.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add, AddArgs};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::failed::run_failed;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::config::CliConfig;
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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jotter=info,jotter_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config = CliConfig::load().map_err(CliError::Config)?;

    match cli.command {
        Commands::Add {
            content,
            title,
            category,
            tags,
            folder,
        } => {
            let args = AddArgs {
                content,
                title,
                category,
                tags,
                folder,
            };
            run_add(args, &db_path, &config).await?;
        }
        Commands::Edit {
            id,
            title,
            content,
            category,
            clear_category,
            tags,
            folder,
            clear_folder,
        } => {
            let args = EditArgs {
                title,
                content,
                category,
                clear_category,
                tags,
                folder,
                clear_folder,
            };
            run_edit(&id, args, &db_path, &config).await?;
        }
        Commands::Delete { id } => run_delete(&id, &db_path, &config).await?,
        Commands::Show { id, json } => run_show(&id, json, &db_path, &config).await?,
        Commands::List { limit, json } => run_list(limit, json, &db_path, &config).await?,
        Commands::Status { json } => run_status(json, &db_path, &config).await?,
        Commands::Sync { json } => run_sync(json, &db_path, &config).await?,
        Commands::Conflicts { command } => run_conflicts(command, &db_path, &config).await?,
        Commands::Failed { command } => run_failed(command, &db_path, &config).await?,
        Commands::Config { command } => run_config(command, &config)?,
    }

    Ok(())
}
