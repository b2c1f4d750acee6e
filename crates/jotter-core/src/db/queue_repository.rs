//! Durable mutation queue

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Entry, EntryId, Operation, QueueItem};
use crate::util::now_millis;
use libsql::{params, Connection, Row};

const QUEUE_COLUMNS: &str =
    "record_id, operation, payload, enqueued_at, seq, retries, has_conflict, server_version";

/// Snapshot of queue sizes by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Items the next drain will attempt
    pub pending: usize,
    /// Items waiting on conflict resolution
    pub conflicted: usize,
    /// Items that hit the retry cap
    pub failed: usize,
}

/// libSQL-backed ordered log of pending remote writes
///
/// Keyed by entry id: at most one item exists per entry, and enqueuing for
/// an entry that already has an item replaces it.
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
    retry_limit: u32,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection and retry cap
    pub const fn new(conn: &'a Connection, retry_limit: u32) -> Self {
        Self { conn, retry_limit }
    }

    /// Upsert the pending write for `entry`
    ///
    /// A replaced item takes the new operation and payload, gets a fresh
    /// timestamp and sequence number, and starts over with no retries and
    /// no conflict.
    pub async fn enqueue(&self, operation: Operation, entry: &Entry) -> Result<QueueItem> {
        let payload = serde_json::to_string(entry)?;

        self.conn
            .execute(
                "INSERT INTO sync_queue (record_id, operation, payload, enqueued_at, seq,
                     retries, has_conflict, server_version)
                 VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM sync_queue), 0, 0, NULL)
                 ON CONFLICT(record_id) DO UPDATE SET
                     operation = excluded.operation,
                     payload = excluded.payload,
                     enqueued_at = excluded.enqueued_at,
                     seq = excluded.seq,
                     retries = 0,
                     has_conflict = 0,
                     server_version = NULL",
                params![entry.id.as_str(), operation.as_str(), payload, now_millis()],
            )
            .await?;

        tracing::debug!("Enqueued {} for entry {}", operation, entry.id);
        self.get(&entry.id)
            .await?
            .ok_or_else(|| Error::Database(format!("queue item vanished after enqueue: {}", entry.id)))
    }

    /// Get the queue item for an entry
    pub async fn get(&self, id: &EntryId) -> Result<Option<QueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE record_id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Oldest eligible item: not conflicted and below the retry cap
    pub async fn next(&self) -> Result<Option<QueueItem>> {
        self.next_excluding(&HashSet::new()).await
    }

    /// Oldest eligible item whose id is not in `skip`
    pub async fn next_excluding(&self, skip: &HashSet<EntryId>) -> Result<Option<QueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue
                     WHERE has_conflict = 0 AND retries < ?
                     ORDER BY enqueued_at ASC, seq ASC"
                ),
                params![i64::from(self.retry_limit)],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            let item = Self::parse_item(&row)?;
            if !skip.contains(&item.id) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Delete the item for an entry; removing a missing item is not an error
    pub async fn remove(&self, id: &EntryId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_queue WHERE record_id = ?",
                params![id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Delete the item only if it was not replaced since `seq` was read
    ///
    /// Returns whether a row was removed.
    pub async fn remove_if_current(&self, id: &EntryId, seq: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE record_id = ? AND seq = ?",
                params![id.as_str(), seq],
            )
            .await?;
        Ok(removed > 0)
    }

    /// Flag the item as conflicted with the remote's reported version
    ///
    /// Only applies while the item is still the one read at `seq`; returns
    /// whether it was flagged.
    pub async fn mark_conflict(&self, id: &EntryId, seq: i64, server_version: i64) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue SET has_conflict = 1, server_version = ?
                 WHERE record_id = ? AND seq = ?",
                params![server_version, id.as_str(), seq],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Count one more failed attempt against the item read at `seq`
    ///
    /// Returns the new count, or `None` when the item was removed or
    /// replaced by a newer write.
    pub async fn increment_retries(&self, id: &EntryId, seq: i64) -> Result<Option<u32>> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue SET retries = retries + 1 WHERE record_id = ? AND seq = ?",
                params![id.as_str(), seq],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }
        Ok(self.get(id).await?.map(|item| item.retries))
    }

    /// Make an exhausted item eligible again; returns whether it existed
    pub async fn reset_retries(&self, id: &EntryId) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue SET retries = 0 WHERE record_id = ? AND has_conflict = 0",
                params![id.as_str()],
            )
            .await?;
        Ok(updated > 0)
    }

    /// All items waiting on conflict resolution, oldest first
    pub async fn list_conflicts(&self) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue
                     WHERE has_conflict = 1
                     ORDER BY enqueued_at ASC, seq ASC"
                ),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    /// All items that exhausted their retries without a conflict
    pub async fn list_failed(&self) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue
                     WHERE has_conflict = 0 AND retries >= ?
                     ORDER BY enqueued_at ASC, seq ASC"
                ),
                params![i64::from(self.retry_limit)],
            )
            .await?;
        Self::collect(rows).await
    }

    /// Every item regardless of state, oldest first
    pub async fn list_all(&self) -> Result<Vec<QueueItem>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY enqueued_at ASC, seq ASC"),
                (),
            )
            .await?;
        Self::collect(rows).await
    }

    /// Queue sizes by state
    pub async fn counts(&self) -> Result<QueueCounts> {
        let items = self.list_all().await?;
        let mut counts = QueueCounts::default();
        for item in &items {
            if item.has_conflict {
                counts.conflicted += 1;
            } else if item.is_failed(self.retry_limit) {
                counts.failed += 1;
            } else {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }

    fn parse_item(row: &Row) -> Result<QueueItem> {
        let id: String = row.get(0)?;
        let operation: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let retries: i64 = row.get(5)?;

        Ok(QueueItem {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid queue record id: {id}")))?,
            operation: operation.parse()?,
            payload: serde_json::from_str(&payload)?,
            timestamp: row.get(3)?,
            seq: row.get(4)?,
            retries: u32::try_from(retries)
                .map_err(|_| Error::Database(format!("invalid retry count: {retries}")))?,
            has_conflict: row.get::<i32>(6)? != 0,
            server_version: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntryDraft;
    use pretty_assertions::assert_eq;

    const LIMIT: u32 = 3;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entry(title: &str) -> Entry {
        Entry::new(EntryDraft {
            title: title.to_string(),
            content: "body".to_string(),
            ..EntryDraft::default()
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_twice_keeps_one_item_with_latest_payload() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let mut entry = entry("Draft");
        let first = queue.enqueue(Operation::Update, &entry).await.unwrap();

        entry.title = "Final".to_string();
        entry.touch();
        let second = queue.enqueue(Operation::Update, &entry).await.unwrap();

        let all = queue.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload.title, "Final");
        assert_eq!(all[0].payload.version, 2);
        assert!(all[0].timestamp >= first.timestamp);
        assert_eq!(all[0].timestamp, second.timestamp);
        assert!(second.seq > first.seq);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_next_returns_oldest_first() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let b = entry("b");
        let c = entry("c");
        queue.enqueue(Operation::Create, &a).await.unwrap();
        queue.enqueue(Operation::Create, &b).await.unwrap();
        queue.enqueue(Operation::Create, &c).await.unwrap();

        assert_eq!(queue.next().await.unwrap().unwrap().id, a.id);
        queue.remove(&a.id).await.unwrap();
        assert_eq!(queue.next().await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_overwrite_moves_item_to_back() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let b = entry("b");
        queue.enqueue(Operation::Create, &a).await.unwrap();
        queue.enqueue(Operation::Create, &b).await.unwrap();
        queue.enqueue(Operation::Create, &a).await.unwrap();

        assert_eq!(queue.next().await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_next_skips_conflicts_and_exhausted_items() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let conflicted = entry("conflicted");
        let exhausted = entry("exhausted");
        let ready = entry("ready");
        let conflicted_item = queue.enqueue(Operation::Update, &conflicted).await.unwrap();
        let exhausted_item = queue.enqueue(Operation::Update, &exhausted).await.unwrap();
        queue.enqueue(Operation::Update, &ready).await.unwrap();

        assert!(queue
            .mark_conflict(&conflicted.id, conflicted_item.seq, 5)
            .await
            .unwrap());
        for _ in 0..LIMIT {
            queue
                .increment_retries(&exhausted.id, exhausted_item.seq)
                .await
                .unwrap();
        }

        assert_eq!(queue.next().await.unwrap().unwrap().id, ready.id);
        queue.remove(&ready.id).await.unwrap();
        assert!(queue.next().await.unwrap().is_none());

        // Neither was deleted
        assert_eq!(queue.list_all().await.unwrap().len(), 2);
        let conflicts = queue.list_conflicts().await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].server_version, Some(5));
        let failed = queue.list_failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, exhausted.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_next_excluding_skips_visited_ids() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let b = entry("b");
        queue.enqueue(Operation::Create, &a).await.unwrap();
        queue.enqueue(Operation::Create, &b).await.unwrap();

        let skip = HashSet::from([a.id]);
        assert_eq!(queue.next_excluding(&skip).await.unwrap().unwrap().id, b.id);

        let skip = HashSet::from([a.id, b.id]);
        assert!(queue.next_excluding(&skip).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_increment_retries_reports_new_count() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let item = queue.enqueue(Operation::Create, &a).await.unwrap();
        assert_eq!(queue.increment_retries(&a.id, item.seq).await.unwrap(), Some(1));
        assert_eq!(queue.increment_retries(&a.id, item.seq).await.unwrap(), Some(2));
        assert_eq!(
            queue.increment_retries(&EntryId::new(), item.seq).await.unwrap(),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_are_not_charged_to_replacements() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let sent = queue.enqueue(Operation::Update, &a).await.unwrap();
        let newer = queue.enqueue(Operation::Update, &a).await.unwrap();

        assert_eq!(queue.increment_retries(&a.id, sent.seq).await.unwrap(), None);
        assert!(!queue.mark_conflict(&a.id, sent.seq, 7).await.unwrap());

        let current = queue.get(&a.id).await.unwrap().unwrap();
        assert_eq!(current.seq, newer.seq);
        assert_eq!(current.retries, 0);
        assert!(!current.has_conflict);
        assert_eq!(current.server_version, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_clears_conflict_and_retries() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let first = queue.enqueue(Operation::Update, &a).await.unwrap();
        queue.increment_retries(&a.id, first.seq).await.unwrap();
        queue.mark_conflict(&a.id, first.seq, 9).await.unwrap();

        let item = queue.enqueue(Operation::Update, &a).await.unwrap();
        assert!(!item.has_conflict);
        assert_eq!(item.retries, 0);
        assert_eq!(item.server_version, None);
        assert_eq!(queue.next().await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_if_current_respects_replacement() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let a = entry("a");
        let stale = queue.enqueue(Operation::Create, &a).await.unwrap();
        queue.enqueue(Operation::Create, &a).await.unwrap();

        assert!(!queue.remove_if_current(&a.id, stale.seq).await.unwrap());
        assert!(queue.get(&a.id).await.unwrap().is_some());

        let current = queue.get(&a.id).await.unwrap().unwrap();
        assert!(queue.remove_if_current(&a.id, current.seq).await.unwrap());
        assert!(queue.get(&a.id).await.unwrap().is_none());

        // Removing again is harmless
        queue.remove(&a.id).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_retries_and_counts() {
        let db = setup().await;
        let queue = LibSqlQueueRepository::new(db.connection(), LIMIT);

        let pending = entry("pending");
        let failed = entry("failed");
        let conflicted = entry("conflicted");
        queue.enqueue(Operation::Update, &pending).await.unwrap();
        let failed_item = queue.enqueue(Operation::Update, &failed).await.unwrap();
        let conflicted_item = queue.enqueue(Operation::Update, &conflicted).await.unwrap();
        for _ in 0..LIMIT {
            queue.increment_retries(&failed.id, failed_item.seq).await.unwrap();
        }
        queue
            .mark_conflict(&conflicted.id, conflicted_item.seq, 2)
            .await
            .unwrap();

        assert_eq!(
            queue.counts().await.unwrap(),
            QueueCounts {
                pending: 1,
                conflicted: 1,
                failed: 1,
            }
        );

        assert!(queue.reset_retries(&failed.id).await.unwrap());
        assert!(!queue.reset_retries(&conflicted.id).await.unwrap());
        assert_eq!(queue.counts().await.unwrap().pending, 2);
    }
}
