use std::path::Path;

use crate::commands::common::{format_timestamp, open_archive};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let archive = open_archive(db_path)?;
    let status = archive.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Conversations:    {}", status.conversations);
    println!("Messages:         {}", status.messages);
    println!("Pending upload:   {}", status.pending_upload);
    println!("Conflicts:        {}", status.conflicts);
    match status.phase {
        Some(phase) => println!("Sync phase:       {phase}"),
        None => println!("Sync remote:      not configured"),
    }
    if status.last_synced_at > 0 {
        println!("Last synced:      {}", format_timestamp(status.last_synced_at));
    }
    if let Some(report) = &status.last_report {
        println!(
            "Last pass:        up {} / down {} ({})",
            report.conversations_uploaded + report.messages_uploaded,
            report.conversations_downloaded + report.messages_downloaded,
            report.direction()
        );
    }
    if let Some(failure) = &status.last_failure {
        println!(
            "Last failure:     [{}] {} ({})",
            failure.category,
            failure.message,
            format_timestamp(failure.failed_at)
        );
    }
    Ok(())
}
