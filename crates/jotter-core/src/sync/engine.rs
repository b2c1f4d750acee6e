//! Drain pass over the mutation queue.

use std::collections::HashSet;

use crate::config::SyncConfig;
use crate::models::{Operation, OwnerId, QueueItem};
use crate::remote::{RemoteOutcome, RemoteStore, RemoteWrite};
use crate::services::DatabaseService;
use crate::Result;

use super::conflict::ConflictWorkflow;
use super::gate::{DrainPermit, SyncGate};

/// What one drain pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Writes the remote accepted
    pub synced: usize,
    /// Writes rejected with a version conflict
    pub conflicts: usize,
    /// Transient failures that will be retried on a later pass
    pub retried: usize,
    /// Transient failures that hit the retry cap
    pub exhausted: usize,
}

impl SyncReport {
    /// Number of queue items the pass attempted
    pub const fn attempted(&self) -> usize {
        self.synced + self.conflicts + self.retried + self.exhausted
    }
}

/// Drains the mutation queue against a [`RemoteStore`]
pub struct SyncEngine<R> {
    db: DatabaseService,
    remote: R,
    config: SyncConfig,
    gate: SyncGate,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(db: DatabaseService, remote: R, config: SyncConfig) -> Self {
        Self::with_gate(db, remote, config, SyncGate::new())
    }

    /// Build an engine that shares an existing busy flag
    pub fn with_gate(db: DatabaseService, remote: R, config: SyncConfig, gate: SyncGate) -> Self {
        let db = db.with_retry_limit(config.retry_limit);
        Self {
            db,
            remote,
            config,
            gate,
        }
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Conflict and failed-item workflow sharing this engine's retry cap
    pub fn conflicts(&self) -> ConflictWorkflow {
        ConflictWorkflow::new(self.db.clone(), &self.config)
    }

    /// Whether a drain is in flight
    pub fn is_running(&self) -> bool {
        self.gate.is_busy()
    }

    /// Claim the busy flag for a drain
    pub fn try_begin(&self) -> Option<DrainPermit> {
        self.gate.try_acquire()
    }

    /// Run one drain pass, or return `None` if another drain is in flight
    pub async fn drain(&self, owner: &OwnerId) -> Result<Option<SyncReport>> {
        let Some(permit) = self.try_begin() else {
            tracing::debug!("Drain already in progress; skipping");
            return Ok(None);
        };
        self.drain_with(&permit, owner).await.map(Some)
    }

    /// Run one drain pass under an already-held permit
    ///
    /// Each eligible item is visited at most once per pass, oldest first.
    /// Per-item remote failures are recorded and the pass continues; a local
    /// storage failure aborts the pass. Each item's result is committed as
    /// soon as it is known.
    pub async fn drain_with(&self, _permit: &DrainPermit, owner: &OwnerId) -> Result<SyncReport> {
        let claimed = self.db.claim_unowned(owner).await?;
        if claimed > 0 {
            tracing::info!("Assigned {claimed} offline entries to {owner}");
        }

        let mut visited = HashSet::new();
        let mut report = SyncReport::default();

        while let Some(item) = self.db.next_queue_item_excluding(&visited).await? {
            visited.insert(item.id);
            self.process(&item, owner, &mut report).await?;
        }

        if report.attempted() > 0 {
            tracing::info!(
                "Drain finished: {} synced, {} conflicts, {} to retry, {} exhausted",
                report.synced,
                report.conflicts,
                report.retried,
                report.exhausted
            );
        } else {
            tracing::debug!("Drain finished: queue empty");
        }
        Ok(report)
    }

    async fn process(
        &self,
        item: &QueueItem,
        owner: &OwnerId,
        report: &mut SyncReport,
    ) -> Result<()> {
        let write = self.prepare_write(item, owner).await?;
        tracing::debug!(
            "Applying {} for entry {} (version {}, base {})",
            write.operation,
            item.id,
            write.entry.version,
            write.base_version
        );

        let outcome =
            match tokio::time::timeout(self.config.remote_timeout, self.remote.apply(&write)).await
            {
                Ok(outcome) => outcome,
                Err(_) => RemoteOutcome::TransientError(format!(
                    "remote call timed out after {:?}",
                    self.config.remote_timeout
                )),
            };

        match outcome {
            RemoteOutcome::Accepted(ack) => {
                let in_sync = self.db.confirm_remote_write(item, &ack).await?;
                tracing::debug!(
                    "Entry {} accepted at version {} (in sync: {in_sync})",
                    item.id,
                    ack.version
                );
                report.synced += 1;
            }
            RemoteOutcome::VersionConflict { server_version } => {
                if self.db.mark_conflict(item, server_version).await? {
                    tracing::info!(
                        "Version conflict on entry {}: local base {}, server {}",
                        item.id,
                        write.base_version,
                        server_version
                    );
                    report.conflicts += 1;
                } else {
                    tracing::debug!(
                        "Entry {} was edited while in flight; newer write stays pending",
                        item.id
                    );
                }
            }
            RemoteOutcome::TransientError(reason) => {
                let retries = self.db.increment_retries(item).await?;
                match retries {
                    None => {
                        tracing::debug!(
                            "Entry {} was edited while in flight; failure not charged: {reason}",
                            item.id
                        );
                    }
                    Some(retries) if retries >= self.config.retry_limit => {
                        tracing::warn!(
                            "Giving up on entry {} after {retries} attempts: {reason}",
                            item.id
                        );
                        report.exhausted += 1;
                    }
                    Some(retries) => {
                        tracing::warn!(
                            "Transient failure syncing entry {} (attempt {retries}/{}): {reason}",
                            item.id,
                            self.config.retry_limit
                        );
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the remote write from the queued snapshot and the current record
    ///
    /// The base version comes from the live record so an edit made while a
    /// previous write was in flight is based on what the remote confirmed.
    async fn prepare_write(&self, item: &QueueItem, owner: &OwnerId) -> Result<RemoteWrite> {
        let base_version = self
            .db
            .get_record(&item.id)
            .await?
            .map_or(item.payload.synced_version, |record| record.synced_version);

        let mut entry = item.payload.clone();
        if entry.owner_id.is_none() {
            entry.owner_id = Some(owner.clone());
        }
        entry.synced_version = base_version;

        // A pending create whose earlier version already reached the remote
        let operation = match item.operation {
            Operation::Create if base_version > 0 => Operation::Update,
            operation => operation,
        };

        Ok(RemoteWrite {
            operation,
            entry,
            base_version,
        })
    }
}
