//! Offline sync: draining the mutation queue against the remote store.
//!
//! - [`SyncGate`] guarantees at most one drain in flight.
//! - [`SyncEngine`] runs a drain pass.
//! - [`SyncTrigger`] decides when to drain (auth, connectivity, explicit).
//! - [`ConflictWorkflow`] resolves conflicted and failed queue items.

mod conflict;
mod engine;
mod gate;
#[cfg(test)]
mod testing;
mod trigger;

pub use conflict::{ConflictWorkflow, Resolution};
pub use engine::{SyncEngine, SyncReport};
pub use gate::{DrainPermit, SyncGate};
pub use trigger::{SkipReason, SyncEvent, SyncOutcome, SyncTrigger};
