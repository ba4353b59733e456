use std::path::Path;

use plait_core::db::ConversationFilter;

use crate::commands::common::{
    conversation_to_list_item, format_conversation_lines, open_archive, ConversationListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    platform: Option<&str>,
    favorites: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let archive = open_archive(db_path)?;
    let filter = ConversationFilter {
        platform: platform.map(str::to_string),
        favorites_only: favorites,
    };
    let conversations = archive.list(&filter, limit).await?;

    if as_json {
        let items = conversations
            .iter()
            .map(conversation_to_list_item)
            .collect::<Vec<ConversationListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_conversation_lines(&conversations) {
            println!("{line}");
        }
    }

    Ok(())
}
