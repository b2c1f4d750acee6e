use std::path::Path;

use crate::commands::common::{
    format_timestamp, normalize_entry_identifier, open_database, render_tags, resolve_entry,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_show(
    id: &str,
    as_json: bool,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let db = open_database(db_path, config).await?;
    let entry = resolve_entry(&normalized_id, &db).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("id:       {}", entry.id);
    if !entry.title.is_empty() {
        println!("title:    {}", entry.title);
    }
    if let Some(category) = entry.category.as_deref() {
        println!("category: {category}");
    }
    if let Some(folder) = entry.folder.as_deref() {
        println!("folder:   {folder}");
    }
    let tags = render_tags(&entry);
    if !tags.is_empty() {
        println!("tags:     {tags}");
    }
    println!(
        "version:  {} ({})",
        entry.version,
        if entry.synced { "synced" } else { "not synced" }
    );
    println!("updated:  {}", format_timestamp(entry.updated_at));
    println!();
    println!("{}", entry.content);
    Ok(())
}
