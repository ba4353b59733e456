//! Message model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::ConversationId;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(Error::Validation(format!("invalid message role: {other}"))),
        }
    }
}

/// One turn in a conversation, keyed by an `id` unique within its
/// conversation. Two rows never share an ID; colliding captures are
/// reassigned a derived ID instead of overwriting (see `merge::dedupe`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Monotonic counter bumped on conflict resolution
    pub sync_version: i64,
    /// Last local mutation time (Unix ms)
    pub modified_at: i64,
    /// Local changes pending upload. Replica-local, so it never travels
    /// in snapshots or conflict records.
    #[serde(skip)]
    pub dirty: bool,
    /// Soft delete flag for sync
    pub deleted: bool,
    /// Non-null exactly when `deleted` is set
    pub deleted_at: Option<i64>,
}

impl Message {
    /// Create a new message with fresh local bookkeeping.
    #[must_use]
    pub fn new(
        conversation_id: ConversationId,
        id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id,
            role,
            content: content.into(),
            created_at,
            sync_version: 0,
            modified_at: created_at,
            dirty: true,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Stamp a local mutation: bump `modified_at` and flag for upload.
    pub fn mark_modified(&mut self, now_ms: i64) {
        self.modified_at = now_ms;
        self.dirty = true;
    }
}
