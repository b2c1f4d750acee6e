//! Shared cross-platform state types.

/// Unified sync state published to clients while the sync trigger runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Idle,
    Syncing,
    Synced,
    Error,
}
