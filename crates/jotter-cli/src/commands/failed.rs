use std::path::Path;

use jotter_core::sync::ConflictWorkflow;

use crate::cli::FailedCommands;
use crate::commands::common::{
    format_failed_lines, normalize_entry_identifier, open_database, queue_item_to_view,
    resolve_queue_item, QueueItemView,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_failed(
    command: FailedCommands,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let db = open_database(db_path, config).await?;
    let workflow = ConflictWorkflow::new(db, &config.sync_config());

    match command {
        FailedCommands::List { json } => {
            let failed = workflow.list_failed().await?;
            if json {
                let json_items = failed
                    .iter()
                    .map(queue_item_to_view)
                    .collect::<Vec<QueueItemView>>();
                println!("{}", serde_json::to_string_pretty(&json_items)?);
            } else if failed.is_empty() {
                println!("No failed writes.");
            } else {
                for line in format_failed_lines(&failed) {
                    println!("{line}");
                }
            }
        }
        FailedCommands::Retry { id } => {
            let entry_id = resolve_failed(&workflow, &id).await?;
            workflow.retry_failed(&entry_id).await?;
            println!("{entry_id}: queued for the next sync");
        }
        FailedCommands::Discard { id } => {
            let entry_id = resolve_failed(&workflow, &id).await?;
            workflow.discard_failed(&entry_id).await?;
            println!("{entry_id}: discarded; the entry stays local");
        }
    }
    Ok(())
}

async fn resolve_failed(
    workflow: &ConflictWorkflow,
    id: &str,
) -> Result<jotter_core::EntryId, CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let failed = workflow.list_failed().await?;
    resolve_queue_item(&normalized_id, &failed)
}
