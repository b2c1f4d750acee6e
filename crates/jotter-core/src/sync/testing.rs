//! Test doubles shared by the sync tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{EntryDraft, EntryId, OwnerId};
use crate::remote::{RemoteAck, RemoteOutcome, RemoteStore, RemoteWrite};

#[derive(Debug, Clone, Copy)]
enum Script {
    Accept(RemoteAck),
    Conflict(i64),
    Fail,
}

/// Remote store that accepts every write unless told otherwise per entry,
/// and records every call it receives.
#[derive(Clone, Default)]
pub struct ScriptedRemote {
    calls: Arc<Mutex<Vec<RemoteWrite>>>,
    scripts: Arc<Mutex<HashMap<EntryId, Script>>>,
    delay: Option<Duration>,
}

impl ScriptedRemote {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn accept_on(&self, id: EntryId, ack: RemoteAck) {
        self.scripts.lock().unwrap().insert(id, Script::Accept(ack));
    }

    pub fn conflict_on(&self, id: EntryId, server_version: i64) {
        self.scripts
            .lock()
            .unwrap()
            .insert(id, Script::Conflict(server_version));
    }

    pub fn fail_on(&self, id: EntryId) {
        self.scripts.lock().unwrap().insert(id, Script::Fail);
    }

    /// Go back to accepting writes for `id`
    pub fn clear(&self, id: EntryId) {
        self.scripts.lock().unwrap().remove(&id);
    }

    pub fn calls(&self) -> Vec<RemoteWrite> {
        self.calls.lock().unwrap().clone()
    }

    pub fn applied_ids(&self) -> Vec<EntryId> {
        self.calls().into_iter().map(|call| call.entry.id).collect()
    }
}

impl RemoteStore for ScriptedRemote {
    async fn apply(&self, write: &RemoteWrite) -> RemoteOutcome {
        self.calls.lock().unwrap().push(write.clone());
        let script = self.scripts.lock().unwrap().get(&write.entry.id).copied();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match script {
            Some(Script::Accept(ack)) => RemoteOutcome::Accepted(ack),
            Some(Script::Conflict(server_version)) => {
                RemoteOutcome::VersionConflict { server_version }
            }
            Some(Script::Fail) => RemoteOutcome::TransientError("scripted failure".to_string()),
            None => RemoteOutcome::Accepted(RemoteAck::at_version(write.entry.version)),
        }
    }
}

pub fn owner() -> OwnerId {
    OwnerId::new("user-1").unwrap()
}

pub fn draft(title: &str) -> EntryDraft {
    EntryDraft {
        title: title.to_string(),
        content: format!("{title} content"),
        ..EntryDraft::default()
    }
}
