use std::path::Path;

use jotter_core::sync::{ConflictWorkflow, Resolution};

use crate::cli::ConflictCommands;
use crate::commands::common::{
    format_conflict_lines, normalize_entry_identifier, open_database, queue_item_to_view,
    resolve_queue_item, QueueItemView,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_conflicts(
    command: ConflictCommands,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let db = open_database(db_path, config).await?;
    let workflow = ConflictWorkflow::new(db, &config.sync_config());

    match command {
        ConflictCommands::List { json } => list_conflicts(&workflow, json).await,
        ConflictCommands::Resolve {
            id, keep_local, ..
        } => {
            let resolution = if keep_local {
                Resolution::KeepLocal
            } else {
                Resolution::AcceptRemote
            };
            resolve_conflict(&workflow, &id, resolution).await
        }
    }
}

async fn list_conflicts(workflow: &ConflictWorkflow, as_json: bool) -> Result<(), CliError> {
    let conflicts = workflow.list_conflicts().await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(queue_item_to_view)
            .collect::<Vec<QueueItemView>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn resolve_conflict(
    workflow: &ConflictWorkflow,
    id: &str,
    resolution: Resolution,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let conflicts = workflow.list_conflicts().await?;
    let entry_id = resolve_queue_item(&normalized_id, &conflicts)?;

    workflow.resolve(&entry_id, resolution).await?;
    match resolution {
        Resolution::KeepLocal => println!("{entry_id}: local version will be sent on next sync"),
        Resolution::AcceptRemote => println!("{entry_id}: accepted server version"),
    }
    Ok(())
}
