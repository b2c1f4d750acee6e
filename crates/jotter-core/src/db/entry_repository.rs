//! Local entry store

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Entry, EntryId, OwnerId};
use crate::remote::RemoteAck;
use libsql::{params, Connection, Row};

const ENTRY_COLUMNS: &str = "id, owner_id, title, content, category, tags, folder, metadata, \
     version, synced_version, synced, is_deleted, created_at, updated_at";

/// libSQL-backed durable store of entries keyed by id
///
/// Every method completes its write before returning, so an acknowledged
/// write is durable.
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or overwrite an entry by id
    pub async fn put(&self, entry: &Entry) -> Result<()> {
        let tags = serde_json::to_string(&entry.tags)?;
        let metadata = serde_json::to_string(&entry.metadata)?;

        self.conn
            .execute(
                "INSERT INTO entries (id, owner_id, title, content, category, tags, folder, metadata,
                     version, synced_version, synced, is_deleted, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     owner_id = excluded.owner_id,
                     title = excluded.title,
                     content = excluded.content,
                     category = excluded.category,
                     tags = excluded.tags,
                     folder = excluded.folder,
                     metadata = excluded.metadata,
                     version = excluded.version,
                     synced_version = excluded.synced_version,
                     synced = excluded.synced,
                     is_deleted = excluded.is_deleted,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at",
                params![
                    entry.id.as_str(),
                    entry.owner_id.as_ref().map(|owner| owner.as_str().to_string()),
                    entry.title.as_str(),
                    entry.content.as_str(),
                    entry.category.clone(),
                    tags,
                    entry.folder.clone(),
                    metadata,
                    entry.version,
                    entry.synced_version,
                    i32::from(entry.synced),
                    i32::from(entry.is_deleted),
                    entry.created_at,
                    entry.updated_at
                ],
            )
            .await?;

        Ok(())
    }

    /// Get an entry by id, tombstoned entries included
    pub async fn get(&self, id: &EntryId) -> Result<Option<Entry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// List live entries, most recently updated first
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Entry>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE is_deleted = 0
                     ORDER BY updated_at DESC
                     LIMIT ? OFFSET ?"
                ),
                params![limit as i64, offset as i64],
            )
            .await?;

        Self::collect(rows).await
    }

    /// List every entry whose local state is not yet confirmed by the remote
    pub async fn list_unsynced(&self) -> Result<Vec<Entry>> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE synced = 0 ORDER BY updated_at"),
                (),
            )
            .await?;

        Self::collect(rows).await
    }

    /// Remove an entry; deleting a missing id is not an error
    pub async fn delete(&self, id: &EntryId) -> Result<()> {
        self.conn
            .execute("DELETE FROM entries WHERE id = ?", params![id.as_str()])
            .await?;
        Ok(())
    }

    /// Mark an entry synced, optionally adopting the server's version
    pub async fn mark_synced(&self, id: &EntryId, server_version: Option<i64>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE entries
                 SET synced = 1,
                     version = COALESCE(?, version),
                     synced_version = COALESCE(?, version)
                 WHERE id = ?",
                params![server_version, server_version, id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Record a remote acceptance of the write sent at `sent_version`
    ///
    /// The entry is marked synced only while its local version still equals
    /// `sent_version`. If it was edited after the write was sent, only the
    /// confirmed base version is recorded and the entry stays unsynced.
    /// The local version never decreases; `synced_version` always takes the
    /// server's value. Returns whether the entry is now synced.
    pub async fn confirm_write(
        &self,
        id: &EntryId,
        sent_version: i64,
        ack: &RemoteAck,
    ) -> Result<bool> {
        let confirmed = self
            .conn
            .execute(
                "UPDATE entries
                 SET synced = 1,
                     version = MAX(version, ?),
                     synced_version = ?,
                     created_at = COALESCE(?, created_at),
                     updated_at = COALESCE(?, updated_at)
                 WHERE id = ? AND version = ?",
                params![
                    ack.version,
                    ack.version,
                    ack.created_at,
                    ack.updated_at,
                    id.as_str(),
                    sent_version
                ],
            )
            .await?;

        if confirmed > 0 {
            return Ok(true);
        }

        self.conn
            .execute(
                "UPDATE entries SET synced_version = ? WHERE id = ?",
                params![ack.version, id.as_str()],
            )
            .await?;
        Ok(false)
    }

    /// Assign an owner to every entry created before login
    pub async fn claim_unowned(&self, owner: &OwnerId) -> Result<u64> {
        let claimed = self
            .conn
            .execute(
                "UPDATE entries SET owner_id = ? WHERE owner_id IS NULL",
                params![owner.as_str()],
            )
            .await?;
        Ok(claimed)
    }

    /// Clear a local tombstone
    pub async fn restore(&self, id: &EntryId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE entries SET is_deleted = 0 WHERE id = ?",
                params![id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Count entries not yet confirmed by the remote
    pub async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM entries WHERE synced = 0", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        usize::try_from(count).map_err(|_| Error::Database(format!("invalid count: {count}")))
    }

    /// List live entry ids starting with `prefix`
    pub async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM entries
                 WHERE id LIKE ? AND is_deleted = 0
                 ORDER BY id
                 LIMIT ?",
                params![pattern, limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Parse an entry from a database row selected with `ENTRY_COLUMNS`
    pub(crate) fn parse_entry(row: &Row) -> Result<Entry> {
        let id: String = row.get(0)?;
        let owner_id: Option<String> = row.get(1)?;
        let tags: String = row.get(5)?;
        let metadata: String = row.get(7)?;

        Ok(Entry {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid entry id in store: {id}")))?,
            owner_id: owner_id.map(OwnerId::new).transpose()?,
            title: row.get(2)?,
            content: row.get(3)?,
            category: row.get(4)?,
            tags: serde_json::from_str(&tags)?,
            folder: row.get(6)?,
            metadata: serde_json::from_str(&metadata)?,
            version: row.get(8)?,
            synced_version: row.get(9)?,
            synced: row.get::<i32>(10)? != 0,
            is_deleted: row.get::<i32>(11)? != 0,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntryDraft;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entry(title: &str) -> Entry {
        let mut metadata = serde_json::Map::new();
        metadata.insert("mood".to_string(), serde_json::json!(4));
        Entry::new(EntryDraft {
            title: title.to_string(),
            content: format!("{title} body #daily"),
            category: Some("journal".to_string()),
            tags: vec!["Life".to_string()],
            folder: Some("2026".to_string()),
            metadata,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get_roundtrip() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = entry("First");
        repo.put(&entry).await.unwrap();

        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_overwrites_existing_id() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut entry = entry("First");
        repo.put(&entry).await.unwrap();
        entry.title = "Renamed".to_string();
        entry.touch();
        repo.put(&entry).await.unwrap();

        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Renamed");
        assert_eq!(fetched.version, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        assert!(repo.get(&EntryId::new()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = entry("Gone");
        repo.put(&entry).await.unwrap();
        repo.delete(&entry.id).await.unwrap();
        repo.delete(&entry.id).await.unwrap();
        repo.delete(&EntryId::new()).await.unwrap();

        assert!(repo.get(&entry.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_unsynced_filters_synced_entries() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let pending = entry("Pending");
        let mut done = entry("Done");
        done.synced = true;
        repo.put(&pending).await.unwrap();
        repo.put(&done).await.unwrap();

        let unsynced = repo.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, pending.id);
        assert_eq!(repo.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_with_and_without_server_version() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let a = entry("A");
        let b = entry("B");
        repo.put(&a).await.unwrap();
        repo.put(&b).await.unwrap();

        repo.mark_synced(&a.id, Some(7)).await.unwrap();
        repo.mark_synced(&b.id, None).await.unwrap();

        let a = repo.get(&a.id).await.unwrap().unwrap();
        assert!(a.synced);
        assert_eq!(a.version, 7);
        assert_eq!(a.synced_version, 7);

        let b = repo.get(&b.id).await.unwrap().unwrap();
        assert!(b.synced);
        assert_eq!(b.version, 1);
        assert_eq!(b.synced_version, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_confirm_write_skips_entries_edited_in_flight() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut entry = entry("Racy");
        repo.put(&entry).await.unwrap();
        entry.touch();
        repo.put(&entry).await.unwrap();

        let ack = RemoteAck {
            version: 1,
            created_at: None,
            updated_at: None,
        };
        let synced = repo.confirm_write(&entry.id, 1, &ack).await.unwrap();
        assert!(!synced);

        let stored = repo.get(&entry.id).await.unwrap().unwrap();
        assert!(!stored.synced);
        assert_eq!(stored.version, 2);
        assert_eq!(stored.synced_version, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_confirm_write_never_lowers_local_version() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut entry = entry("Collapsed");
        entry.touch();
        entry.touch();
        repo.put(&entry).await.unwrap();
        assert_eq!(entry.version, 3);

        assert!(repo
            .confirm_write(&entry.id, 3, &RemoteAck::at_version(1))
            .await
            .unwrap());
        let stored = repo.get(&entry.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.version, 3);
        assert_eq!(stored.synced_version, 1);

        // A higher server version is still adopted
        assert!(repo
            .confirm_write(&entry.id, 3, &RemoteAck::at_version(7))
            .await
            .unwrap());
        let stored = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 7);
        assert_eq!(stored.synced_version, 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_confirm_write_adopts_server_timestamps() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = entry("Stamped");
        repo.put(&entry).await.unwrap();

        let ack = RemoteAck {
            version: 1,
            created_at: Some(1_000),
            updated_at: Some(2_000),
        };
        assert!(repo.confirm_write(&entry.id, 1, &ack).await.unwrap());

        let stored = repo.get(&entry.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.created_at, 1_000);
        assert_eq!(stored.updated_at, 2_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_unowned_only_touches_orphans() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let orphan = entry("Orphan");
        let mut owned = entry("Owned");
        owned.owner_id = Some(OwnerId::new("someone-else").unwrap());
        repo.put(&orphan).await.unwrap();
        repo.put(&owned).await.unwrap();

        let me = OwnerId::new("me").unwrap();
        assert_eq!(repo.claim_unowned(&me).await.unwrap(), 1);

        let orphan = repo.get(&orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.owner_id, Some(me));
        let owned = repo.get(&owned.id).await.unwrap().unwrap();
        assert_eq!(owned.owner_id.unwrap().as_str(), "someone-else");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_hides_tombstones() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let live = entry("Live");
        let mut dead = entry("Dead");
        dead.tombstone();
        repo.put(&live).await.unwrap();
        repo.put(&dead).await.unwrap();

        let listed = repo.list(10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, live.id);

        repo.restore(&dead.id).await.unwrap();
        assert_eq!(repo.list(10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_ids_by_prefix() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = entry("Prefixed");
        repo.put(&entry).await.unwrap();

        let id = entry.id.as_str();
        let ids = repo.list_ids_by_prefix(&id[..8], 5).await.unwrap();
        assert_eq!(ids, vec![id]);
    }
}
