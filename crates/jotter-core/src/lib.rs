//! jotter-core - Core library for Jotter
//!
//! This crate holds the offline persistence and synchronization engine shared
//! by every Jotter client: the local entry store, the durable mutation queue,
//! the sync engine that drains it against a remote store, the trigger policy
//! that decides when to drain, and the conflict resolution workflow.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{Entry, EntryId, Operation, OwnerId, QueueItem};
