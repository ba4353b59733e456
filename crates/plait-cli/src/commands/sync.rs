use std::path::Path;

use chrono::Utc;
use plait_core::sync::SyncRun;

use crate::commands::common::open_archive;
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let archive = open_archive(db_path)?;
    if !archive.sync_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    match archive.sync(Utc::now().timestamp_millis()).await? {
        SyncRun::AlreadyRunning => println!("A sync pass is already running."),
        SyncRun::Completed(report) => {
            if report.is_noop() {
                println!("Already up to date.");
            } else {
                println!(
                    "Sync completed ({}): {} conversations up, {} down; {} messages up, {} down",
                    report.direction(),
                    report.conversations_uploaded,
                    report.conversations_downloaded,
                    report.messages_uploaded,
                    report.messages_downloaded
                );
            }
            if report.conflicts_found > 0 {
                println!("New conflicts parked: {}", report.conflicts_found);
            }
        }
    }
    Ok(())
}
