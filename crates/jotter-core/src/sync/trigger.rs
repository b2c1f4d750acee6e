//! When to drain: auth, connectivity and explicit requests.

use tokio::sync::{broadcast, watch, Mutex};

use crate::models::OwnerId;
use crate::remote::RemoteStore;
use crate::state::SyncState;
use crate::Result;

use super::engine::{SyncEngine, SyncReport};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Why a sync request did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    Unauthenticated,
}

/// Result of asking for a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A drain pass ran to completion
    Completed(SyncReport),
    /// Another drain was in flight; this request was dropped
    AlreadyRunning,
    /// Preconditions for syncing were not met
    Skipped(SkipReason),
}

/// Notifications for clients (cache invalidation, toasts)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Entries were confirmed by the remote; cached views are stale
    EntriesChanged { count: usize },
    /// Some writes failed transiently and will be retried on a later sync
    WillRetry { count: usize },
    /// The drain aborted on a local storage failure
    Failed { message: String },
}

#[derive(Debug, Clone, Default)]
struct Session {
    owner: Option<OwnerId>,
    online: bool,
}

/// Decides when to run the [`SyncEngine`] and makes sure only one drain
/// runs at a time.
///
/// Requests made while a drain is in flight are dropped, not queued: the
/// next trigger picks up whatever they would have sent.
pub struct SyncTrigger<R> {
    engine: SyncEngine<R>,
    session: Mutex<Session>,
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: RemoteStore> SyncTrigger<R> {
    /// Create a trigger that starts offline and unauthenticated
    pub fn new(engine: SyncEngine<R>) -> Self {
        let (state, _) = watch::channel(SyncState::Offline);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine,
            session: Mutex::new(Session::default()),
            state,
            events,
        }
    }

    /// Seed the authenticated identity known at startup, without syncing
    #[must_use]
    pub fn with_identity(mut self, owner: Option<OwnerId>) -> Self {
        self.session.get_mut().owner = owner;
        self
    }

    /// Seed the connectivity known at startup, without syncing
    #[must_use]
    pub fn with_connectivity(mut self, online: bool) -> Self {
        self.session.get_mut().online = online;
        self.state.send_replace(if online {
            SyncState::Idle
        } else {
            SyncState::Offline
        });
        self
    }

    pub const fn engine(&self) -> &SyncEngine<R> {
        &self.engine
    }

    /// Current sync state
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Record an auth change; drains on a signed-out to signed-in transition
    pub async fn on_auth_changed(&self, owner: Option<OwnerId>) -> Result<Option<SyncOutcome>> {
        let signed_in = {
            let mut session = self.session.lock().await;
            let was_signed_in = session.owner.is_some();
            session.owner = owner;
            !was_signed_in && session.owner.is_some()
        };

        if signed_in {
            tracing::info!("Authenticated; starting sync");
            self.request_sync().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Record a connectivity change; drains on an offline to online transition
    pub async fn on_connectivity_changed(&self, online: bool) -> Result<Option<SyncOutcome>> {
        let came_online = {
            let mut session = self.session.lock().await;
            let was_online = session.online;
            session.online = online;
            !was_online && online
        };

        if !online {
            self.state.send_replace(SyncState::Offline);
            return Ok(None);
        }

        if came_online {
            tracing::info!("Network online; starting sync");
            self.state.send_replace(SyncState::Idle);
            self.request_sync().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Explicit "sync now"; a no-op when a drain is already running
    pub async fn request_sync(&self) -> Result<SyncOutcome> {
        let session = self.session.lock().await.clone();
        if !session.online {
            tracing::debug!("Sync requested while offline; skipping");
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        let Some(owner) = session.owner else {
            tracing::debug!("Sync requested without an authenticated identity; skipping");
            return Ok(SyncOutcome::Skipped(SkipReason::Unauthenticated));
        };

        let Some(permit) = self.engine.try_begin() else {
            tracing::debug!("Sync already running; ignoring request");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        self.state.send_replace(SyncState::Syncing);
        let result = self.engine.drain_with(&permit, &owner).await;
        drop(permit);

        match result {
            Ok(report) => {
                self.state.send_replace(SyncState::Synced);
                if report.synced > 0 {
                    self.publish(SyncEvent::EntriesChanged {
                        count: report.synced,
                    });
                }
                let unfinished = report.retried + report.exhausted;
                if unfinished > 0 {
                    self.publish(SyncEvent::WillRetry { count: unfinished });
                }
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                tracing::error!("Sync aborted: {error}");
                self.state.send_replace(SyncState::Error);
                self.publish(SyncEvent::Failed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
