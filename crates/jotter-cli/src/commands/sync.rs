use std::path::Path;

use jotter_core::remote::HttpRemoteStore;
use jotter_core::sync::{SkipReason, SyncEngine, SyncEvent, SyncOutcome, SyncReport, SyncTrigger};
use serde::Serialize;

use crate::commands::common::open_database;
use crate::config::CliConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SyncView {
    status: &'static str,
    synced: usize,
    conflicts: usize,
    retried: usize,
    exhausted: usize,
}

impl SyncView {
    const fn completed(report: SyncReport) -> Self {
        Self {
            status: "completed",
            synced: report.synced,
            conflicts: report.conflicts,
            retried: report.retried,
            exhausted: report.exhausted,
        }
    }

    const fn not_run(status: &'static str) -> Self {
        Self {
            status,
            synced: 0,
            conflicts: 0,
            retried: 0,
            exhausted: 0,
        }
    }
}

pub async fn run_sync(as_json: bool, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let Some(settings) = config.remote_settings().map_err(CliError::Config)? else {
        return Err(CliError::SyncNotConfigured);
    };
    let sync_config = config.sync_config();

    let db = open_database(db_path, config).await?;
    let remote = HttpRemoteStore::new(
        settings.remote_url,
        settings.api_token,
        sync_config.remote_timeout,
    )?;
    let trigger = SyncTrigger::new(SyncEngine::new(db, remote, sync_config))
        .with_identity(Some(settings.owner))
        .with_connectivity(true);
    let mut events = trigger.subscribe_events();

    let outcome = trigger
        .request_sync()
        .await
        .map_err(|error| CliError::SyncFailed(error.to_string()))?;

    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::EntriesChanged { count } => {
                tracing::debug!("{count} entries confirmed by the remote");
            }
            SyncEvent::WillRetry { count } => {
                tracing::warn!("{count} writes failed and will be retried on the next sync");
            }
            SyncEvent::Failed { message } => tracing::error!("Sync failed: {message}"),
        }
    }

    let view = match outcome {
        SyncOutcome::Completed(report) => SyncView::completed(report),
        SyncOutcome::AlreadyRunning => SyncView::not_run("already_running"),
        SyncOutcome::Skipped(SkipReason::Offline) => SyncView::not_run("offline"),
        SyncOutcome::Skipped(SkipReason::Unauthenticated) => SyncView::not_run("unauthenticated"),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_sync_summary(&view);
    }
    Ok(())
}

fn print_sync_summary(view: &SyncView) {
    if view.status != "completed" {
        println!("Sync did not run ({})", view.status.replace('_', " "));
        return;
    }

    if view.synced + view.conflicts + view.retried + view.exhausted == 0 {
        println!("Sync completed; nothing to send");
        return;
    }

    println!("Sync completed: {} synced", view.synced);
    if view.conflicts > 0 {
        println!(
            "{} conflict(s); see `jotter conflicts list`",
            view.conflicts
        );
    }
    if view.retried > 0 {
        println!("{} write(s) failed and will be retried", view.retried);
    }
    if view.exhausted > 0 {
        println!(
            "{} write(s) ran out of retries; see `jotter failed list`",
            view.exhausted
        );
    }
}
