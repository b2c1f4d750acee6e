//! Mutation queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Entry, EntryId};

/// Kind of remote write a queue item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown queue operation: {other}"
            ))),
        }
    }
}

/// One pending remote write, keyed by the entry it targets
///
/// There is at most one queue item per entry; later local edits replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Same as the target entry id
    pub id: EntryId,
    pub operation: Operation,
    /// Snapshot of the entry at enqueue time
    pub payload: Entry,
    /// Enqueue time (Unix ms), refreshed on every overwrite
    pub timestamp: i64,
    /// Store-assigned tie breaker, strictly increasing across enqueues
    pub seq: i64,
    /// Failed attempts so far
    pub retries: u32,
    /// Set when the remote rejected the write with a version mismatch
    pub has_conflict: bool,
    /// Remote version reported with the conflict
    pub server_version: Option<i64>,
}

impl QueueItem {
    /// Whether the drain may pick this item under the given retry cap
    #[must_use]
    pub const fn is_eligible(&self, retry_limit: u32) -> bool {
        !self.has_conflict && self.retries < retry_limit
    }

    /// Whether the item exhausted its retries without a conflict
    #[must_use]
    pub const fn is_failed(&self, retry_limit: u32) -> bool {
        !self.has_conflict && self.retries >= retry_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryDraft;

    fn item(retries: u32, has_conflict: bool) -> QueueItem {
        let entry = Entry::new(EntryDraft::default());
        QueueItem {
            id: entry.id,
            operation: Operation::Create,
            payload: entry,
            timestamp: 1,
            seq: 1,
            retries,
            has_conflict,
            server_version: None,
        }
    }

    #[test]
    fn operation_parses_its_own_names() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn eligibility_excludes_conflicts_and_exhausted_items() {
        assert!(item(0, false).is_eligible(3));
        assert!(item(2, false).is_eligible(3));
        assert!(!item(3, false).is_eligible(3));
        assert!(!item(0, true).is_eligible(3));
    }

    #[test]
    fn failed_means_exhausted_without_conflict() {
        assert!(item(3, false).is_failed(3));
        assert!(!item(3, true).is_failed(3));
        assert!(!item(1, false).is_failed(3));
    }
}
