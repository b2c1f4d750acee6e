//! Shared database service wrapper used across clients.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::DEFAULT_RETRY_LIMIT;
use crate::db::{Database, LibSqlEntryRepository, LibSqlQueueRepository, QueueCounts};
use crate::models::{Entry, EntryDraft, EntryId, EntryPatch, Operation, OwnerId, QueueItem};
use crate::remote::RemoteAck;
use crate::{Error, Result};

/// Summary of local sync state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Queue items the next drain will attempt
    pub pending: usize,
    /// Queue items waiting on conflict resolution
    pub conflicted: usize,
    /// Queue items that exhausted their retries
    pub failed: usize,
    /// Entries whose local state is not confirmed remotely
    pub unsynced_entries: usize,
}

/// Thread-safe service over the local entry store and mutation queue.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    retry_limit: u32,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Use a non-default retry cap for queue eligibility (values below 1
    /// are raised to 1).
    #[must_use]
    pub const fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = if retry_limit == 0 { 1 } else { retry_limit };
        self
    }

    /// Retry cap applied to queue eligibility.
    pub const fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Create an entry locally and queue its remote create.
    pub async fn create_entry(&self, draft: EntryDraft, owner: Option<&OwnerId>) -> Result<Entry> {
        let mut entry = Entry::new(draft);
        entry.owner_id = owner.cloned();

        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).put(&entry).await?;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .enqueue(Operation::Create, &entry)
            .await?;

        tracing::debug!("Created entry {}", entry.id);
        Ok(entry)
    }

    /// Apply a patch locally and queue the resulting write.
    ///
    /// Entries the remote has never accepted keep a pending `create`.
    pub async fn update_entry(&self, id: &EntryId, patch: EntryPatch) -> Result<Entry> {
        let db = self.db.lock().await;
        let entries = LibSqlEntryRepository::new(db.connection());

        let mut entry = entries
            .get(id)
            .await?
            .filter(|entry| !entry.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if patch.is_empty() {
            return Ok(entry);
        }

        entry.apply_patch(patch);
        entries.put(&entry).await?;

        let operation = if entry.was_ever_synced() {
            Operation::Update
        } else {
            Operation::Create
        };
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .enqueue(operation, &entry)
            .await?;

        tracing::debug!("Updated entry {} to version {}", entry.id, entry.version);
        Ok(entry)
    }

    /// Delete an entry locally and queue the remote delete.
    ///
    /// An entry the remote never accepted is dropped outright along with its
    /// pending create.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<()> {
        let db = self.db.lock().await;
        let entries = LibSqlEntryRepository::new(db.connection());
        let queue = LibSqlQueueRepository::new(db.connection(), self.retry_limit);

        let mut entry = entries
            .get(id)
            .await?
            .filter(|entry| !entry.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !entry.was_ever_synced() {
            entries.delete(id).await?;
            queue.remove(id).await?;
            tracing::debug!("Dropped never-synced entry {}", id);
            return Ok(());
        }

        entry.tombstone();
        entries.put(&entry).await?;
        queue.enqueue(Operation::Delete, &entry).await?;
        tracing::debug!("Tombstoned entry {}", id);
        Ok(())
    }

    /// Fetch a live entry by id.
    pub async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        Ok(self.get_record(id).await?.filter(|entry| !entry.is_deleted))
    }

    /// List live entries newest-first.
    pub async fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<Entry>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list(limit, offset)
            .await
    }

    /// List live entry ids by prefix.
    pub async fn list_entry_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list_ids_by_prefix(prefix, limit)
            .await
    }

    // -----------------------------------------------------------------------
    // Local record store
    // -----------------------------------------------------------------------

    /// Insert or overwrite a record.
    pub async fn put_record(&self, entry: &Entry) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).put(entry).await
    }

    /// Fetch a record by id, tombstones included.
    pub async fn get_record(&self, id: &EntryId) -> Result<Option<Entry>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).get(id).await
    }

    /// List records not confirmed by the remote.
    pub async fn list_unsynced(&self) -> Result<Vec<Entry>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list_unsynced()
            .await
    }

    /// Remove a record (idempotent).
    pub async fn delete_record(&self, id: &EntryId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).delete(id).await
    }

    /// Mark a record synced, optionally adopting the server version.
    pub async fn mark_synced(&self, id: &EntryId, server_version: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .mark_synced(id, server_version)
            .await
    }

    /// Clear a record's tombstone.
    pub async fn restore_record(&self, id: &EntryId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .restore(id)
            .await
    }

    /// Give every ownerless record to `owner`.
    pub async fn claim_unowned(&self, owner: &OwnerId) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .claim_unowned(owner)
            .await
    }

    /// Commit a remote acceptance of `item`.
    ///
    /// Purges the record for accepted deletes, otherwise confirms the record
    /// if it was not edited since `item` was read. The queue item is removed
    /// only if it was not replaced in the meantime. Returns whether the
    /// record is now in sync.
    pub async fn confirm_remote_write(&self, item: &QueueItem, ack: &RemoteAck) -> Result<bool> {
        let db = self.db.lock().await;
        let entries = LibSqlEntryRepository::new(db.connection());
        let queue = LibSqlQueueRepository::new(db.connection(), self.retry_limit);

        let in_sync = match item.operation {
            Operation::Delete => {
                entries.delete(&item.id).await?;
                true
            }
            Operation::Create | Operation::Update => {
                entries
                    .confirm_write(&item.id, item.payload.version, ack)
                    .await?
            }
        };

        if !queue.remove_if_current(&item.id, item.seq).await? {
            tracing::debug!(
                "Queue item for {} was replaced while in flight; keeping newer write",
                item.id
            );
        }
        Ok(in_sync)
    }

    // -----------------------------------------------------------------------
    // Mutation queue
    // -----------------------------------------------------------------------

    /// Upsert the pending write for a record.
    pub async fn enqueue(&self, operation: Operation, entry: &Entry) -> Result<QueueItem> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .enqueue(operation, entry)
            .await
    }

    /// Oldest eligible queue item.
    pub async fn next_queue_item(&self) -> Result<Option<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .next()
            .await
    }

    /// Oldest eligible queue item not in `skip`.
    pub async fn next_queue_item_excluding(
        &self,
        skip: &HashSet<EntryId>,
    ) -> Result<Option<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .next_excluding(skip)
            .await
    }

    /// Fetch the queue item for a record.
    pub async fn queue_item(&self, id: &EntryId) -> Result<Option<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .get(id)
            .await
    }

    /// Remove the queue item for a record (idempotent).
    pub async fn remove_queue_item(&self, id: &EntryId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .remove(id)
            .await
    }

    /// Flag `item` as conflicted, unless a newer write replaced it.
    pub async fn mark_conflict(&self, item: &QueueItem, server_version: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .mark_conflict(&item.id, item.seq, server_version)
            .await
    }

    /// Count a failed attempt of `item`; `None` if it was removed or replaced.
    pub async fn increment_retries(&self, item: &QueueItem) -> Result<Option<u32>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .increment_retries(&item.id, item.seq)
            .await
    }

    /// Reset retries on an exhausted item.
    pub async fn reset_retries(&self, id: &EntryId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .reset_retries(id)
            .await
    }

    /// Queue items waiting on conflict resolution.
    pub async fn list_conflicts(&self) -> Result<Vec<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .list_conflicts()
            .await
    }

    /// Queue items that exhausted their retries.
    pub async fn list_failed(&self) -> Result<Vec<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .list_failed()
            .await
    }

    /// Every queue item, oldest first.
    pub async fn list_queue(&self) -> Result<Vec<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .list_all()
            .await
    }

    /// Counts of pending, conflicted and failed work.
    pub async fn status(&self) -> Result<SyncStatus> {
        let db = self.db.lock().await;
        let QueueCounts {
            pending,
            conflicted,
            failed,
        } = LibSqlQueueRepository::new(db.connection(), self.retry_limit)
            .counts()
            .await?;
        let unsynced_entries = LibSqlEntryRepository::new(db.connection())
            .count_unsynced()
            .await?;

        Ok(SyncStatus {
            pending,
            conflicted,
            failed,
            unsynced_entries,
        })
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(sql, ()).await?;
        Ok(())
    }
}
