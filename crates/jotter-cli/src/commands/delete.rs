use std::path::Path;

use crate::commands::common::{normalize_entry_identifier, open_database, resolve_entry};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let db = open_database(db_path, config).await?;
    let entry = resolve_entry(&normalized_id, &db).await?;

    db.delete_entry(&entry.id).await?;
    println!("{}", entry.id);
    Ok(())
}
