use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use plait_core::models::MergeConflict;
use plait_core::services::ArchiveService;
use plait_core::sync::{FileRemoteStore, HttpRemoteStore, RemoteStore};
use plait_core::{Conversation, ConversationId};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ConversationListItem {
    pub id: String,
    pub platform: String,
    pub title: String,
    pub preview: String,
    pub detail_status: String,
    pub message_count: i64,
    pub is_favorite: bool,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub field: Option<String>,
    pub local: serde_json::Value,
    pub remote: serde_json::Value,
    pub detected_at: i64,
    pub detected_at_iso: String,
}

/// Resolve a user-supplied conversation ID or unique ID prefix to a live
/// conversation.
pub async fn resolve_conversation(
    query: &str,
    archive: &ArchiveService,
) -> Result<Conversation, CliError> {
    if let Ok(id) = query.parse::<ConversationId>() {
        if let Some(conversation) = archive.get(&id).await? {
            if !conversation.deleted {
                return Ok(conversation);
            }
        }
    }

    let mut matches = archive.find_by_id_prefix(query).await?;
    if matches.len() > 1 {
        let options = matches
            .iter()
            .take(3)
            .map(|conversation| conversation.id.as_str().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CliError::AmbiguousConversationId(format!(
            "ID prefix '{query}' is ambiguous; matches: {options}"
        )));
    }
    matches
        .pop()
        .ok_or_else(|| CliError::ConversationNotFound(query.to_string()))
}

pub fn format_conversation_lines(conversations: &[Conversation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    conversations
        .iter()
        .map(|conversation| {
            let marker = if conversation.is_favorite { "*" } else { " " };
            let short_id = conversation.id.as_str().chars().take(24).collect::<String>();
            let title = text_preview(&conversation.title, 40);
            let detail = conversation.detail_status.as_str();
            let relative_time = format_relative_time(conversation.updated_at, now_ms);
            format!(
                "{marker} {short_id:<24}  {title:<40}  {detail:<7}  {count:>4} msgs  {relative_time}",
                count = conversation.message_count
            )
        })
        .collect()
}

pub fn conversation_to_list_item(conversation: &Conversation) -> ConversationListItem {
    let now_ms = Utc::now().timestamp_millis();
    ConversationListItem {
        id: conversation.id.as_str().to_string(),
        platform: conversation.platform.clone(),
        title: conversation.title.clone(),
        preview: conversation.preview.clone(),
        detail_status: conversation.detail_status.to_string(),
        message_count: conversation.message_count,
        is_favorite: conversation.is_favorite,
        tags: conversation.tags.iter().cloned().collect(),
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        relative_time: format_relative_time(conversation.updated_at, now_ms),
    }
}

pub fn format_conflict_lines(conflicts: &[MergeConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let field = conflict.field.as_deref().unwrap_or("(record)");
            let local = conflict_value_preview(conflict, &conflict.local_version, 30);
            let remote = conflict_value_preview(conflict, &conflict.remote_version, 30);
            format!(
                "{id}  {kind:<12}  {entity}  {field}  local=\"{local}\"  remote=\"{remote}\"",
                id = conflict.id,
                kind = conflict.entity_kind,
                entity = conflict.entity_id
            )
        })
        .collect()
}

pub fn conflict_to_item(conflict: &MergeConflict) -> ConflictListItem {
    ConflictListItem {
        id: conflict.id.as_str(),
        entity_kind: conflict.entity_kind.to_string(),
        entity_id: conflict.entity_id.clone(),
        field: conflict.field.clone(),
        local: conflict.local_version.clone(),
        remote: conflict.remote_version.clone(),
        detected_at: conflict.detected_at,
        detected_at_iso: format_timestamp(conflict.detected_at),
    }
}

/// Short rendering of the conflicted value inside a snapshot, or of the
/// whole record when the conflict has no field.
pub fn conflict_value_preview(
    conflict: &MergeConflict,
    snapshot: &serde_json::Value,
    max_chars: usize,
) -> String {
    let value = conflict
        .field
        .as_deref()
        .and_then(|field| snapshot.get(field))
        .unwrap_or(snapshot);
    match value {
        serde_json::Value::String(text) => text_preview(text, max_chars),
        other => text_preview(&other.to_string(), max_chars),
    }
}

/// First line of a text, whitespace collapsed, truncated with an ellipsis.
pub fn text_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> String {
    tags.into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyConversationId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("PLAIT_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plait")
        .join("plait.db")
}

/// Open the archive, attaching a sync remote when the environment
/// configures one.
pub fn open_archive(db_path: &Path) -> Result<ArchiveService, CliError> {
    let archive = ArchiveService::open_path(db_path)?;
    Ok(match remote_store_from_env()? {
        Some(remote) => archive.with_remote(remote),
        None => archive,
    })
}

pub fn remote_store_from_env() -> Result<Option<Box<dyn RemoteStore>>, CliError> {
    let url = env::var("PLAIT_REMOTE_URL").unwrap_or_default();
    if !url.trim().is_empty() {
        let token = env::var("PLAIT_REMOTE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let store = HttpRemoteStore::new(url, token)?;
        tracing::info!("HTTP sync remote configured");
        return Ok(Some(Box::new(store)));
    }

    let file = env::var("PLAIT_REMOTE_FILE").unwrap_or_default();
    if !file.trim().is_empty() {
        tracing::info!("File sync remote configured");
        return Ok(Some(Box::new(FileRemoteStore::new(PathBuf::from(file)))));
    }

    Ok(None)
}
