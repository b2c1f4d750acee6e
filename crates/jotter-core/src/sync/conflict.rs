//! Resolving conflicted and exhausted queue items.

use crate::config::SyncConfig;
use crate::models::{EntryId, Operation, QueueItem};
use crate::services::DatabaseService;
use crate::{Error, Result};

/// How to settle a version conflict. Resolution is whole-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Retry the local record against the server's version
    KeepLocal,
    /// The server's version wins; drop the pending local write
    AcceptRemote,
}

/// Operations on queue items the drain no longer picks up on its own.
///
/// Which items count as failed depends on the retry cap, so the workflow
/// takes it from the same [`SyncConfig`] the engine drains with.
#[derive(Clone)]
pub struct ConflictWorkflow {
    db: DatabaseService,
}

impl ConflictWorkflow {
    pub fn new(db: DatabaseService, config: &SyncConfig) -> Self {
        Self {
            db: db.with_retry_limit(config.retry_limit),
        }
    }

    pub async fn list_conflicts(&self) -> Result<Vec<QueueItem>> {
        self.db.list_conflicts().await
    }

    /// Settle the conflict on `id`
    pub async fn resolve(&self, id: &EntryId, resolution: Resolution) -> Result<()> {
        let item = self
            .db
            .queue_item(id)
            .await?
            .filter(|item| item.has_conflict)
            .ok_or_else(|| Error::NotFound(format!("No conflict for entry {id}")))?;

        let mut record = self
            .db
            .get_record(id)
            .await?
            .unwrap_or_else(|| item.payload.clone());
        let server_version = item.server_version.unwrap_or(record.synced_version);

        match resolution {
            Resolution::KeepLocal => {
                record.version = record.version.max(server_version + 1);
                record.synced_version = server_version;
                record.synced = false;
                self.db.put_record(&record).await?;

                let operation = if record.is_deleted {
                    Operation::Delete
                } else {
                    Operation::Update
                };
                self.db.enqueue(operation, &record).await?;
                tracing::info!(
                    "Keeping local entry {id} at version {} over server version {server_version}",
                    record.version
                );
            }
            Resolution::AcceptRemote => {
                self.db.restore_record(id).await?;
                self.db.mark_synced(id, Some(server_version)).await?;
                self.db.remove_queue_item(id).await?;
                tracing::info!("Accepted server version {server_version} for entry {id}");
            }
        }
        Ok(())
    }

    /// Items that hit the retry cap
    pub async fn list_failed(&self) -> Result<Vec<QueueItem>> {
        self.db.list_failed().await
    }

    /// Make an exhausted item eligible again
    pub async fn retry_failed(&self, id: &EntryId) -> Result<()> {
        self.failed_item(id).await?;
        self.db.reset_retries(id).await?;
        tracing::info!("Re-queued failed write for entry {id}");
        Ok(())
    }

    /// Drop an exhausted item; the record stays unsynced
    pub async fn discard_failed(&self, id: &EntryId) -> Result<()> {
        self.failed_item(id).await?;
        self.db.remove_queue_item(id).await?;
        tracing::warn!("Discarded failed write for entry {id}");
        Ok(())
    }

    async fn failed_item(&self, id: &EntryId) -> Result<QueueItem> {
        let retry_limit = self.db.retry_limit();
        self.db
            .queue_item(id)
            .await?
            .filter(|item| item.is_failed(retry_limit))
            .ok_or_else(|| Error::NotFound(format!("No failed write for entry {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryPatch};
    use crate::sync::testing::{draft, owner, ScriptedRemote};
    use crate::sync::SyncEngine;
    use pretty_assertions::assert_eq;

    struct Fixture {
        engine: SyncEngine<ScriptedRemote>,
        remote: ScriptedRemote,
        workflow: ConflictWorkflow,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_config(SyncConfig::default()).await
        }

        async fn with_config(config: SyncConfig) -> Self {
            let remote = ScriptedRemote::accepting();
            let db = DatabaseService::open_in_memory().await.unwrap();
            let engine = SyncEngine::new(db, remote.clone(), config);
            let workflow = engine.conflicts();
            Self {
                engine,
                remote,
                workflow,
            }
        }

        fn db(&self) -> &DatabaseService {
            self.engine.database()
        }

        async fn drain(&self) {
            self.engine.drain(&owner()).await.unwrap().unwrap();
        }

        /// Synced at version 1, edited to version 2, rejected by a server at 2
        async fn conflicted_entry(&self) -> Entry {
            let entry = self.db().create_entry(draft("R1"), None).await.unwrap();
            self.drain().await;

            let patch = EntryPatch {
                content: Some("local edit".to_string()),
                ..EntryPatch::default()
            };
            let entry = self.db().update_entry(&entry.id, patch).await.unwrap();
            assert_eq!(entry.version, 2);

            self.remote.conflict_on(entry.id, 2);
            self.drain().await;
            self.remote.clear(entry.id);
            entry
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_remote_adopts_server_version() {
        let fixture = Fixture::new().await;
        let entry = fixture.conflicted_entry().await;
        assert_eq!(fixture.workflow.list_conflicts().await.unwrap().len(), 1);

        fixture
            .workflow
            .resolve(&entry.id, Resolution::AcceptRemote)
            .await
            .unwrap();

        let stored = fixture.db().get_record(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert!(stored.synced);
        assert!(fixture.db().queue_item(&entry.id).await.unwrap().is_none());
        assert!(fixture.workflow.list_conflicts().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keep_local_requeues_and_next_drain_succeeds() {
        let fixture = Fixture::new().await;
        let entry = fixture.conflicted_entry().await;

        fixture
            .workflow
            .resolve(&entry.id, Resolution::KeepLocal)
            .await
            .unwrap();

        let item = fixture.db().queue_item(&entry.id).await.unwrap().unwrap();
        assert!(!item.has_conflict);
        assert_eq!(item.operation, Operation::Update);
        assert_eq!(item.payload.version, 3);
        assert_eq!(
            fixture.db().next_queue_item().await.unwrap().map(|item| item.id),
            Some(entry.id)
        );

        fixture.drain().await;

        let last = fixture.remote.calls().pop().unwrap();
        assert_eq!(last.base_version, 2);
        assert_eq!(last.entry.content, "local edit");
        let stored = fixture.db().get_record(&entry.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.version, 3);
        assert!(fixture.db().list_queue().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keep_local_on_tombstone_requeues_delete() {
        let fixture = Fixture::new().await;
        let entry = fixture.db().create_entry(draft("gone"), None).await.unwrap();
        fixture.drain().await;
        fixture.db().delete_entry(&entry.id).await.unwrap();
        fixture.remote.conflict_on(entry.id, 4);
        fixture.drain().await;

        fixture
            .workflow
            .resolve(&entry.id, Resolution::KeepLocal)
            .await
            .unwrap();

        let item = fixture.db().queue_item(&entry.id).await.unwrap().unwrap();
        assert_eq!(item.operation, Operation::Delete);
        assert_eq!(item.payload.version, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_remote_restores_a_tombstone() {
        let fixture = Fixture::new().await;
        let entry = fixture.db().create_entry(draft("back"), None).await.unwrap();
        fixture.drain().await;
        fixture.db().delete_entry(&entry.id).await.unwrap();
        fixture.remote.conflict_on(entry.id, 3);
        fixture.drain().await;

        fixture
            .workflow
            .resolve(&entry.id, Resolution::AcceptRemote)
            .await
            .unwrap();

        let live = fixture.db().get_entry(&entry.id).await.unwrap().unwrap();
        assert_eq!(live.version, 3);
        assert!(live.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_without_a_conflict_is_not_found() {
        let fixture = Fixture::new().await;
        let entry = fixture.db().create_entry(draft("pending"), None).await.unwrap();

        let err = fixture
            .workflow
            .resolve(&entry.id, Resolution::KeepLocal)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = fixture
            .workflow
            .resolve(&EntryId::new(), Resolution::AcceptRemote)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_items_can_be_retried_or_discarded() {
        let fixture = Fixture::new().await;
        let retry = fixture.db().create_entry(draft("retry"), None).await.unwrap();
        let discard = fixture.db().create_entry(draft("discard"), None).await.unwrap();
        fixture.remote.fail_on(retry.id);
        fixture.remote.fail_on(discard.id);
        for _ in 0..SyncConfig::default().retry_limit {
            fixture.drain().await;
        }
        assert_eq!(fixture.workflow.list_failed().await.unwrap().len(), 2);
        assert!(fixture.db().next_queue_item().await.unwrap().is_none());

        fixture.remote.clear(retry.id);
        fixture.workflow.retry_failed(&retry.id).await.unwrap();
        fixture.workflow.discard_failed(&discard.id).await.unwrap();
        fixture.drain().await;

        assert!(fixture.db().get_record(&retry.id).await.unwrap().unwrap().synced);
        let kept = fixture.db().get_record(&discard.id).await.unwrap().unwrap();
        assert!(!kept.synced);
        assert!(fixture.db().list_queue().await.unwrap().is_empty());
        assert!(fixture.workflow.list_failed().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_items_follow_a_custom_retry_limit() {
        let config = SyncConfig::default().with_retry_limit(5);
        let fixture = Fixture::with_config(config).await;
        let entry = fixture.db().create_entry(draft("flaky"), None).await.unwrap();
        fixture.remote.fail_on(entry.id);

        for _ in 0..3 {
            fixture.drain().await;
        }
        assert!(fixture.workflow.list_failed().await.unwrap().is_empty());
        assert!(matches!(
            fixture.workflow.discard_failed(&entry.id).await,
            Err(Error::NotFound(_))
        ));

        for _ in 0..2 {
            fixture.drain().await;
        }
        assert_eq!(fixture.remote.calls().len(), 5);
        assert_eq!(fixture.workflow.list_failed().await.unwrap().len(), 1);

        fixture.drain().await;
        assert_eq!(fixture.remote.calls().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn workflow_adopts_the_configured_limit_over_the_service() {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let config = SyncConfig::default().with_retry_limit(5);
        let entry = db.create_entry(draft("stuck"), None).await.unwrap();
        let item = db.queue_item(&entry.id).await.unwrap().unwrap();
        for _ in 0..3 {
            db.increment_retries(&item).await.unwrap();
        }

        // The plain service caps at 3; the workflow uses the config's 5
        assert_eq!(db.list_failed().await.unwrap().len(), 1);
        let workflow = ConflictWorkflow::new(db, &config);
        assert!(workflow.list_failed().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retrying_a_healthy_item_is_not_found() {
        let fixture = Fixture::new().await;
        let entry = fixture.db().create_entry(draft("fine"), None).await.unwrap();

        let err = fixture.workflow.retry_failed(&entry.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = fixture.workflow.discard_failed(&entry.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(fixture.db().queue_item(&entry.id).await.unwrap().is_some());
    }
}
