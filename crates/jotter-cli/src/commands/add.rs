use std::path::Path;

use jotter_core::models::EntryDraft;

use crate::commands::common::{open_database, resolve_entry_content};
use crate::config::CliConfig;
use crate::error::CliError;

pub struct AddArgs {
    pub content: Vec<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub folder: Option<String>,
}

pub async fn run_add(args: AddArgs, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let content = resolve_entry_content(&args.content)?;
    let owner = config
        .remote_settings()
        .map_err(CliError::Config)?
        .map(|settings| settings.owner);

    let db = open_database(db_path, config).await?;
    let draft = EntryDraft {
        title: args.title.unwrap_or_default(),
        content,
        category: args.category,
        tags: args.tags,
        folder: args.folder,
        ..EntryDraft::default()
    };
    let entry = db.create_entry(draft, owner.as_ref()).await?;

    println!("{}", entry.id);
    Ok(())
}
