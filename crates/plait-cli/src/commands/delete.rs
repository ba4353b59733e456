use std::path::Path;

use chrono::Utc;

use crate::commands::common::{normalize_identifier, open_archive, resolve_conversation};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized = normalize_identifier(id)?;
    let archive = open_archive(db_path)?;
    let conversation = resolve_conversation(&normalized, &archive).await?;

    archive
        .delete(&conversation.id, Utc::now().timestamp_millis())
        .await?;
    println!("{}", conversation.id);
    Ok(())
}
