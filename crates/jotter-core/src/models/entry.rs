//! Entry model

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::now_millis;

/// A unique identifier for an entry, using UUID v7 (time-sortable)
///
/// Ids are generated on the client and never reassigned, so an entry keeps
/// the same id across offline and online transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of the authenticated account that owns an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Build an owner id, rejecting blank values
    pub fn new(value: impl Into<String>) -> crate::Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(
                "owner id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A journal entry tagged with its sync state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier
    pub id: EntryId,
    /// Owning account; `None` until the first authenticated sync claims it
    pub owner_id: Option<OwnerId>,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    /// Normalized tags (lowercase, deduplicated, sorted)
    pub tags: Vec<String>,
    pub folder: Option<String>,
    /// Arbitrary client metadata
    pub metadata: Map<String, Value>,
    /// Incremented on every local mutation
    pub version: i64,
    /// Last version the remote confirmed (0 = never synced)
    pub synced_version: i64,
    /// Whether the current local state is confirmed durable on the remote
    pub synced: bool,
    /// Tombstone kept until the remote accepts the delete
    pub is_deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

/// Fields supplied when creating an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub folder: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Partial update of an entry; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub folder: Option<Option<String>>,
    pub metadata: Option<Map<String, Value>>,
}

impl EntryPatch {
    /// Whether the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.folder.is_none()
            && self.metadata.is_none()
    }
}

impl Entry {
    /// Create a new, never-synced entry from a draft
    #[must_use]
    pub fn new(draft: EntryDraft) -> Self {
        let now = now_millis();
        let tags = merged_tags(&draft.content, draft.tags);
        Self {
            id: EntryId::new(),
            owner_id: None,
            title: draft.title.trim().to_string(),
            content: draft.content,
            category: draft.category,
            tags,
            folder: draft.folder,
            metadata: draft.metadata,
            version: 1,
            synced_version: 0,
            synced: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch as a local mutation
    pub fn apply_patch(&mut self, patch: EntryPatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(folder) = patch.folder {
            self.folder = folder;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
        let content_changed = patch.content.is_some();
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(tags) = patch.tags {
            self.tags = merged_tags(&self.content, tags);
        } else if content_changed {
            let existing = std::mem::take(&mut self.tags);
            self.tags = merged_tags(&self.content, existing);
        }
        self.touch();
    }

    /// Record a local mutation: bump the version and mark unsynced
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = now_millis().max(self.updated_at);
        self.synced = false;
    }

    /// Mark this entry deleted locally
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    /// Whether the remote has ever accepted this entry
    #[must_use]
    pub const fn was_ever_synced(&self) -> bool {
        self.synced_version > 0
    }

    /// Get the title, or the first content line when the title is blank,
    /// truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.chars().take(max_len).collect()
    }
}

/// Normalize tags: trim, lowercase, drop empties and a leading `#`,
/// deduplicate and sort.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().trim_start_matches('#').to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Extract #tags from text
///
/// Valid tags match the pattern: `#[a-zA-Z][a-zA-Z0-9_-]*`
/// Tags are returned in lowercase, deduplicated and sorted.
///
/// # Examples
///
/// ```
/// use jotter_core::models::extract_tags;
///
/// let tags = extract_tags("Slept badly #sleep, long walk #Outdoors");
/// assert_eq!(tags, vec!["outdoors".to_string(), "sleep".to_string()]);
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    let re = Regex::new(r"#([a-zA-Z][a-zA-Z0-9_-]*)").expect("Invalid regex");
    normalize_tags(re.captures_iter(text).map(|cap| cap[1].to_string()))
}

fn merged_tags(content: &str, explicit: Vec<String>) -> Vec<String> {
    normalize_tags(explicit.into_iter().chain(extract_tags(content)))
}
