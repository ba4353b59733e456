use std::path::Path;

use chrono::Utc;
use plait_core::models::ConflictId;
use plait_core::resolve::{ResolutionChoice, ResolutionOutcome};

use crate::cli::ResolveChoice;
use crate::commands::common::open_archive;
use crate::error::CliError;

pub async fn run_resolve(id: &str, choice: ResolveChoice, db_path: &Path) -> Result<(), CliError> {
    let conflict_id = id
        .trim()
        .parse::<ConflictId>()
        .map_err(|_| CliError::InvalidConflictId(id.trim().to_string()))?;
    let resolution = match choice {
        ResolveChoice::Local => ResolutionChoice::Local,
        ResolveChoice::Remote => ResolutionChoice::Remote,
        ResolveChoice::Merged => ResolutionChoice::Merged,
    };

    let archive = open_archive(db_path)?;
    match archive
        .resolve(&conflict_id, resolution, Utc::now().timestamp_millis())
        .await?
    {
        ResolutionOutcome::Applied => println!("Resolved {conflict_id} ({resolution})."),
        ResolutionOutcome::AlreadyResolved => println!("Conflict {conflict_id} is already resolved."),
    }
    Ok(())
}
