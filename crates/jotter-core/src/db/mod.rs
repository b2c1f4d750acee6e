//! Database layer for Jotter

mod connection;
mod entry_repository;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use entry_repository::LibSqlEntryRepository;
pub use queue_repository::{LibSqlQueueRepository, QueueCounts};
