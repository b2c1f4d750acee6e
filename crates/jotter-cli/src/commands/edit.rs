use std::path::Path;

use jotter_core::models::EntryPatch;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_entry_identifier, open_database, resolve_entry,
};
use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Default)]
pub struct EditArgs {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub clear_category: bool,
    pub tags: Vec<String>,
    pub folder: Option<String>,
    pub clear_folder: bool,
}

impl EditArgs {
    fn into_patch(self) -> EntryPatch {
        EntryPatch {
            title: self.title,
            content: self.content,
            category: if self.clear_category {
                Some(None)
            } else {
                self.category.map(Some)
            },
            tags: if self.tags.is_empty() {
                None
            } else {
                Some(self.tags)
            },
            folder: if self.clear_folder {
                Some(None)
            } else {
                self.folder.map(Some)
            },
            metadata: None,
        }
    }
}

pub async fn run_edit(
    id: &str,
    args: EditArgs,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let db = open_database(db_path, config).await?;
    let entry = resolve_entry(&normalized_id, &db).await?;

    let mut patch = args.into_patch();
    if patch.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&entry.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        if edited_content == entry.content {
            println!("{}", entry.id);
            return Ok(());
        }
        patch.content = Some(edited_content);
    }

    let updated = db.update_entry(&entry.id, patch).await?;
    println!("{}", updated.id);
    Ok(())
}
