use std::path::Path;

use chrono::Utc;

use crate::commands::common::{normalize_identifier, open_archive, resolve_conversation};
use crate::error::CliError;

pub async fn run_favorite(id: &str, remove: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized = normalize_identifier(id)?;
    let archive = open_archive(db_path)?;
    let conversation = resolve_conversation(&normalized, &archive).await?;

    let updated = archive
        .set_favorite(&conversation.id, !remove, Utc::now().timestamp_millis())
        .await?;
    println!("{}", updated.id);
    Ok(())
}
