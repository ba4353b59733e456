//! Merge conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a merge conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Which entity table a conflict belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Conversation,
    Message,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(Self::Conversation),
            "message" => Ok(Self::Message),
            other => Err(Error::Validation(format!("invalid entity kind: {other}"))),
        }
    }
}

/// A sync pass outcome that needs a human decision: both sides edited the
/// same free-text field since the last common sync point. Holds full JSON
/// snapshots of both versions so resolution can replay the merge later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub id: ConflictId,
    pub entity_kind: EntityKind,
    /// Conversation ID, or `"{conversation_id}/{message_id}"` for messages
    pub entity_id: String,
    /// The conflicting field name; `None` means whole-record
    pub field: Option<String>,
    pub local_version: serde_json::Value,
    pub remote_version: serde_json::Value,
    pub detected_at: i64,
}

impl MergeConflict {
    /// Entity key used for message conflicts.
    #[must_use]
    pub fn message_entity_id(conversation_id: &str, message_id: &str) -> String {
        format!("{conversation_id}/{message_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_id_unique() {
        let id1 = ConflictId::new();
        let id2 = ConflictId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_conflict_id_parse() {
        let id = ConflictId::new();
        let parsed: ConflictId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in [EntityKind::Conversation, EntityKind::Message] {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("attachment".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_message_entity_id() {
        assert_eq!(
            MergeConflict::message_entity_id("chatgpt_c1", "m2"),
            "chatgpt_c1/m2"
        );
    }
}
