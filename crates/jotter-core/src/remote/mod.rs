//! Contract with the authoritative remote store.
//!
//! The sync engine only ever asks the remote to apply one write and reads
//! back one of three outcomes. Anything richer (auth sessions, analysis
//! functions, realtime feeds) stays outside this crate.

mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::models::{Entry, Operation};

pub use http::HttpRemoteStore;

/// One version-checked write sent to the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWrite {
    pub operation: Operation,
    /// Snapshot of the entry to write
    pub entry: Entry,
    /// Remote version the local edit was based on (0 for never-synced entries)
    pub base_version: i64,
}

/// Server confirmation of an accepted write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    /// Version the remote now stores
    pub version: i64,
    /// Server-assigned creation time (Unix ms), when the remote sets one
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Server-assigned update time (Unix ms), when the remote sets one
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl RemoteAck {
    /// Acknowledge at `version` without server timestamps
    #[must_use]
    pub const fn at_version(version: i64) -> Self {
        Self {
            version,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Result of applying a write remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The write is durable remotely
    Accepted(RemoteAck),
    /// The remote's stored version differs from the write's base version
    VersionConflict { server_version: i64 },
    /// Network or server failure; safe to retry later
    TransientError(String),
}

/// The remote store as seen by the sync engine
pub trait RemoteStore: Send + Sync {
    /// Apply one write. Implementations must not panic on remote failures;
    /// every failure that is not a version conflict is a `TransientError`.
    fn apply(&self, write: &RemoteWrite) -> impl Future<Output = RemoteOutcome> + Send;
}
