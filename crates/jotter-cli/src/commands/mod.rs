pub mod add;
pub mod common;
pub mod config;
pub mod conflicts;
pub mod delete;
pub mod edit;
pub mod failed;
pub mod list;
pub mod show;
pub mod status;
pub mod sync;
