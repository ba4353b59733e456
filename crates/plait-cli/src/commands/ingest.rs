use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use plait_core::ingest::IngestReport;
use plait_core::models::Capture;
use plait_core::services::ArchiveService;
use serde::Serialize;

use crate::commands::common::open_archive;
use crate::error::CliError;

#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub inserted: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub messages_added: usize,
}

impl IngestSummary {
    fn record(&mut self, report: &IngestReport) {
        use plait_core::ingest::IngestOutcome;
        match report.outcome {
            IngestOutcome::Inserted => self.inserted += 1,
            IngestOutcome::Merged => self.merged += 1,
            IngestOutcome::Unchanged => self.unchanged += 1,
            IngestOutcome::SkippedTombstoned => self.skipped += 1,
        }
        self.messages_added += report.new_messages;
    }
}

/// Ingest every capture found in the given files. One bad capture is
/// skipped with a note on stderr; the rest of the batch still lands.
pub async fn run_ingest(files: &[PathBuf], as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let items = read_capture_items(files)?;
    let archive = open_archive(db_path)?;
    let now_ms = Utc::now().timestamp_millis();

    let mut summary = IngestSummary::default();
    for item in items {
        match ingest_one(&archive, item, now_ms).await {
            Ok(report) => summary.record(&report),
            Err(error) => {
                summary.failed += 1;
                eprintln!("Skipping capture: {error}");
            }
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} new, {} merged, {} unchanged, {} skipped, {} failed; {} new messages",
            summary.inserted,
            summary.merged,
            summary.unchanged,
            summary.skipped,
            summary.failed,
            summary.messages_added
        );
    }
    Ok(())
}

async fn ingest_one(
    archive: &ArchiveService,
    item: serde_json::Value,
    now_ms: i64,
) -> Result<IngestReport, CliError> {
    let capture: Capture = serde_json::from_value(item)?;
    Ok(archive.ingest_capture(&capture, now_ms).await?)
}

/// Read and structurally parse all inputs up front, so a broken file is
/// caught before anything is written.
fn read_capture_items(files: &[PathBuf]) -> Result<Vec<serde_json::Value>, CliError> {
    let mut payloads = Vec::new();
    if files.is_empty() {
        payloads.push(read_stdin_payload()?);
    } else {
        for file in files {
            if file.as_os_str() == "-" {
                payloads.push(read_stdin_payload()?);
            } else {
                payloads.push(std::fs::read_to_string(file)?);
            }
        }
    }

    let mut items = Vec::new();
    for payload in &payloads {
        items.extend(split_capture_items(payload)?);
    }
    Ok(items)
}

fn read_stdin_payload() -> Result<String, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::EmptyCaptureInput);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        return Err(CliError::EmptyCaptureInput);
    }
    Ok(buffer)
}

/// A payload is either one capture object or an array of them.
fn split_capture_items(payload: &str) -> Result<Vec<serde_json::Value>, CliError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    Ok(match value {
        serde_json::Value::Array(items) => items,
        object => vec![object],
    })
}
