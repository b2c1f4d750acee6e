use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jotter")]
#[command(about = "Offline-first journal entries with background sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new entry
    #[command(alias = "new")]
    Add {
        /// Entry content (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Entry title
        #[arg(short, long)]
        title: Option<String>,
        /// Category label
        #[arg(short, long)]
        category: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Folder to file the entry under
        #[arg(long)]
        folder: Option<String>,
    },
    /// Edit an existing entry
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New content (opens $EDITOR when no field flag is given)
        #[arg(long)]
        content: Option<String>,
        /// New category
        #[arg(short, long, conflicts_with = "clear_category")]
        category: Option<String>,
        /// Remove the category
        #[arg(long)]
        clear_category: bool,
        /// Replace tags (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// New folder
        #[arg(long, conflicts_with = "clear_folder")]
        folder: Option<String>,
        /// Remove the folder
        #[arg(long)]
        clear_folder: bool,
    },
    /// Delete an existing entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Show one entry
    Show {
        /// Entry ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show pending, conflicted and failed sync work
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending local changes to the remote store
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve version conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Inspect writes that ran out of retries
    Failed {
        #[command(subcommand)]
        command: FailedCommands,
    },
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicted writes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict by keeping the local entry or the server's version
    #[command(group(
        ArgGroup::new("resolution")
            .required(true)
            .args(["keep_local", "accept_remote"])
    ))]
    Resolve {
        /// Entry ID or unique ID prefix
        id: String,
        /// Retry the local entry over the server's version
        #[arg(long)]
        keep_local: bool,
        /// Accept the server's version and drop the local write
        #[arg(long)]
        accept_remote: bool,
    },
}

#[derive(Subcommand)]
pub enum FailedCommands {
    /// List writes that exhausted their retries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make a failed write eligible for the next sync
    Retry {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Drop a failed write, leaving the entry unsynced locally
    Discard {
        /// Entry ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the CLI config file
    Init {
        /// Remote store base URL (e.g. `https://api.example.com`)
        #[arg(long)]
        remote_url: Option<String>,
        /// Bearer token sent to the remote store
        #[arg(long)]
        api_token: Option<String>,
        /// Account that owns synced entries
        #[arg(long)]
        owner_id: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Attempts per queued write before it is parked as failed
        #[arg(long)]
        retry_limit: Option<u32>,
    },
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
