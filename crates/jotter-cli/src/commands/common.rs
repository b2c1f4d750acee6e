use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jotter_core::services::DatabaseService;
use jotter_core::{Entry, EntryId, QueueItem};
use serde::Serialize;

use crate::config::CliConfig;
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub category: Option<String>,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub version: i64,
    pub synced: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct QueueItemView {
    pub entry_id: String,
    pub operation: String,
    pub title: String,
    pub local_version: i64,
    pub server_version: Option<i64>,
    pub retries: u32,
    pub enqueued_at: i64,
    pub enqueued_at_iso: String,
}

pub async fn list_entries(limit: usize, db: &DatabaseService) -> Result<Vec<Entry>, CliError> {
    Ok(db.list_entries(limit, 0).await?)
}

pub async fn resolve_entry(query: &str, db: &DatabaseService) -> Result<Entry, CliError> {
    if let Ok(entry_id) = query.parse::<EntryId>() {
        if let Some(entry) = db.get_entry(&entry_id).await? {
            return Ok(entry);
        }
    }

    let matching_ids = db.list_entry_ids_by_prefix(query, 3).await?;

    match matching_ids.as_slice() {
        [] => Err(CliError::EntryNotFound(query.to_string())),
        [only] => {
            let resolved_id = only
                .parse::<EntryId>()
                .map_err(|_| CliError::EntryNotFound(query.to_string()))?;
            db.get_entry(&resolved_id)
                .await?
                .ok_or_else(|| CliError::EntryNotFound(query.to_string()))
        }
        _ => Err(ambiguous(query, matching_ids.iter().map(String::as_str))),
    }
}

/// Match an id or unique prefix against queue items (which may target deleted entries)
pub fn resolve_queue_item(query: &str, items: &[QueueItem]) -> Result<EntryId, CliError> {
    let matches = items
        .iter()
        .filter(|item| item.id.to_string().starts_with(query))
        .map(|item| item.id)
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::EntryNotFound(query.to_string())),
        [only] => Ok(*only),
        _ => {
            let ids = matches.iter().map(ToString::to_string).collect::<Vec<_>>();
            Err(ambiguous(query, ids.iter().map(String::as_str)))
        }
    }
}

fn ambiguous<'a>(query: &str, ids: impl Iterator<Item = &'a str>) -> CliError {
    let options = ids
        .take(3)
        .map(short_id)
        .collect::<Vec<_>>()
        .join(", ");

    CliError::AmbiguousEntryId(format!(
        "ID prefix '{query}' is ambiguous; matches: {options}"
    ))
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_entry_lines(entries: &[Entry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let id = short_id(&entry.id.to_string());
            let preview = entry_preview(entry, 40);
            let relative_time = format_relative_time(entry.updated_at, now_ms);
            let marker = if entry.synced { ' ' } else { '*' };
            let tags = render_tags(entry);

            if tags.is_empty() {
                format!("{id:<13} {marker} {preview:<40}  {relative_time}")
            } else {
                format!("{id:<13} {marker} {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn entry_to_list_item(entry: &Entry) -> EntryListItem {
    let now_ms = Utc::now().timestamp_millis();

    EntryListItem {
        id: entry.id.to_string(),
        title: entry.title.clone(),
        preview: entry_preview(entry, 80),
        category: entry.category.clone(),
        folder: entry.folder.clone(),
        tags: entry.tags.clone(),
        version: entry.version,
        synced: entry.synced,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
        relative_time: format_relative_time(entry.updated_at, now_ms),
    }
}

pub fn queue_item_to_view(item: &QueueItem) -> QueueItemView {
    QueueItemView {
        entry_id: item.id.to_string(),
        operation: item.operation.to_string(),
        title: entry_preview(&item.payload, 80),
        local_version: item.payload.version,
        server_version: item.server_version,
        retries: item.retries,
        enqueued_at: item.timestamp,
        enqueued_at_iso: format_timestamp(item.timestamp),
    }
}

pub fn format_conflict_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let server = item
                .server_version
                .map_or_else(|| "?".to_string(), |version| version.to_string());
            format!(
                "{}  {:<6}  {}  local=v{} server=v{server}",
                short_id(&item.id.to_string()),
                item.operation,
                entry_preview(&item.payload, 40),
                item.payload.version
            )
        })
        .collect()
}

pub fn format_failed_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "{}  {:<6}  {}  retries={}  queued {}",
                short_id(&item.id.to_string()),
                item.operation,
                entry_preview(&item.payload, 40),
                item.retries,
                format_timestamp(item.timestamp)
            )
        })
        .collect()
}

pub fn entry_preview(entry: &Entry, max_chars: usize) -> String {
    let source = entry.title_preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(entry: &Entry) -> String {
    entry
        .tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_entry_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_entry_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_entry_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("jotter-entry-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("JOTTER_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jotter")
        .join("jotter.db")
}

pub async fn open_database(path: &Path, config: &CliConfig) -> Result<DatabaseService, CliError> {
    let retry_limit = config.sync_config().retry_limit;
    Ok(DatabaseService::open_path(path)
        .await?
        .with_retry_limit(retry_limit))
}
