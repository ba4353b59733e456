use std::path::Path;

use plait_core::{Conversation, Message};
use serde::Serialize;

use crate::commands::common::{
    format_timestamp, normalize_identifier, open_archive, render_tags, resolve_conversation,
};
use crate::error::CliError;

#[derive(Serialize)]
struct ConversationDetail<'a> {
    conversation: &'a Conversation,
    messages: &'a [Message],
}

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized = normalize_identifier(id)?;
    let archive = open_archive(db_path)?;
    let conversation = resolve_conversation(&normalized, &archive).await?;
    let messages = archive.messages(&conversation.id).await?;

    if as_json {
        let detail = ConversationDetail {
            conversation: &conversation,
            messages: &messages,
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{}", conversation.title);
    println!("{}", conversation.id);
    let favorite = if conversation.is_favorite {
        "  favorite"
    } else {
        ""
    };
    println!(
        "{}  detail={}  {} messages{favorite}",
        conversation.platform, conversation.detail_status, conversation.message_count
    );
    println!(
        "created {}  updated {}",
        format_timestamp(conversation.created_at),
        format_timestamp(conversation.updated_at)
    );
    if !conversation.tags.is_empty() {
        println!("tags: {}", render_tags(&conversation.tags));
    }
    if let Some(url) = &conversation.url {
        println!("url: {url}");
    }
    if let Some(summary) = &conversation.summary {
        println!("summary: {summary}");
    }

    for message in &messages {
        println!();
        println!("[{}] {}", message.role, message.content);
    }
    if messages.is_empty() {
        println!();
        println!(
            "No messages captured yet (detail: {}).",
            conversation.detail_status
        );
    }

    Ok(())
}
