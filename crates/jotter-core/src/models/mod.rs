//! Data models for Jotter

mod entry;
mod queue_item;

pub use entry::{extract_tags, normalize_tags, Entry, EntryDraft, EntryId, EntryPatch, OwnerId};
pub use queue_item::{Operation, QueueItem};
