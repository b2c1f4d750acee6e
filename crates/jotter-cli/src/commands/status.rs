use std::path::Path;

use serde::Serialize;

use crate::commands::common::open_database;
use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusView {
    pending: usize,
    conflicted: usize,
    failed: usize,
    unsynced_entries: usize,
    sync_configured: bool,
}

pub async fn run_status(as_json: bool, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let db = open_database(db_path, config).await?;
    let status = db.status().await?;
    let view = StatusView {
        pending: status.pending,
        conflicted: status.conflicted,
        failed: status.failed,
        unsynced_entries: status.unsynced_entries,
        sync_configured: config
            .remote_settings()
            .map_err(CliError::Config)?
            .is_some(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Pending writes:   {}", view.pending);
    println!("Conflicts:        {}", view.conflicted);
    println!("Failed writes:    {}", view.failed);
    println!("Unsynced entries: {}", view.unsynced_entries);
    if !view.sync_configured {
        println!("Sync is not configured; changes stay local.");
    }
    Ok(())
}
