use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] jotter_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entry content provided")]
    EmptyContent,
    #[error("Edited entry content cannot be empty")]
    EmptyEditedContent,
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `jotter config init --remote-url <URL> --owner-id <ID>`, or set JOTTER_REMOTE_URL and JOTTER_OWNER_ID."
    )]
    SyncNotConfigured,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
