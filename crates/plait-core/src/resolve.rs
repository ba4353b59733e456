//! Manual resolution of parked merge conflicts.
//!
//! A resolution replays the decision against the *current* row rather than
//! the snapshots alone, so edits made after the conflict was parked survive.
//! Applying the same conflict ID twice is a no-op: the second call reports
//! [`ResolutionOutcome::AlreadyResolved`] and changes nothing.

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::db::{
    ConflictRepository, ConversationRepository, MessageRepository, SqliteConflictRepository,
    SqliteConversationRepository, SqliteMessageRepository,
};
use crate::error::{Error, Result};
use crate::merge::{merge_conversations_auto, merge_messages_auto};
use crate::models::{ConflictId, Conversation, EntityKind, Message, MergeConflict};

/// Which side of a parked conflict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionChoice {
    /// Keep the value currently in the local store
    Local,
    /// Adopt the remote snapshot's value
    Remote,
    /// Re-run the automatic merge with last-writer-wins standing in for
    /// the manual strategy
    Merged,
}

impl ResolutionChoice {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Merged => "merged",
        }
    }
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "merged" => Ok(Self::Merged),
            other => Err(Error::Validation(format!(
                "invalid resolution choice: {other} (expected local, remote, or merged)"
            ))),
        }
    }
}

/// What applying a resolution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The conflict was pending and the chosen version was written
    Applied,
    /// No conflict with that ID is pending anymore
    AlreadyResolved,
}

/// Apply a resolution choice to one parked conflict.
///
/// The resolved record is marked dirty with a bumped sync version so the
/// next sync pass uploads the decision, and the conflict row is removed.
pub fn apply_resolution(
    conn: &Connection,
    id: &ConflictId,
    choice: ResolutionChoice,
    now_ms: i64,
) -> Result<ResolutionOutcome> {
    let conflicts = SqliteConflictRepository::new(conn);
    let Some(conflict) = conflicts.get(id)? else {
        return Ok(ResolutionOutcome::AlreadyResolved);
    };

    match conflict.entity_kind {
        EntityKind::Conversation => resolve_conversation(conn, &conflict, choice, now_ms)?,
        EntityKind::Message => resolve_message(conn, &conflict, choice, now_ms)?,
    }

    conflicts.delete(id)?;
    Ok(ResolutionOutcome::Applied)
}

fn resolve_conversation(
    conn: &Connection,
    conflict: &MergeConflict,
    choice: ResolutionChoice,
    now_ms: i64,
) -> Result<()> {
    let local: Conversation = serde_json::from_value(conflict.local_version.clone())?;
    let remote: Conversation = serde_json::from_value(conflict.remote_version.clone())?;
    let repo = SqliteConversationRepository::new(conn);
    let current = repo.get(&local.id)?.unwrap_or_else(|| local.clone());

    let mut resolved = match choice {
        ResolutionChoice::Local => current,
        ResolutionChoice::Remote => match &conflict.field {
            None => remote.clone(),
            Some(field) => overwrite_field(&current, field, &conflict.remote_version)?,
        },
        ResolutionChoice::Merged => {
            let merged = merge_conversations_auto(&local, &remote, 0)?;
            match &conflict.field {
                None => merged,
                Some(field) => overwrite_field(&current, field, &serde_json::to_value(&merged)?)?,
            }
        }
    };

    // Bump past both snapshots so the decision wins the next numeric-max
    // merge on either replica.
    resolved.sync_version = resolved
        .sync_version
        .max(local.sync_version)
        .max(remote.sync_version)
        + 1;
    resolved.modified_at = now_ms;
    resolved.dirty = true;
    repo.upsert(&resolved)
}

fn resolve_message(
    conn: &Connection,
    conflict: &MergeConflict,
    choice: ResolutionChoice,
    now_ms: i64,
) -> Result<()> {
    let local: Message = serde_json::from_value(conflict.local_version.clone())?;
    let remote: Message = serde_json::from_value(conflict.remote_version.clone())?;
    let repo = SqliteMessageRepository::new(conn);
    let current = repo
        .get(&local.conversation_id, &local.id)?
        .unwrap_or_else(|| local.clone());

    let mut resolved = match choice {
        ResolutionChoice::Local => current,
        ResolutionChoice::Remote => match &conflict.field {
            None => remote.clone(),
            Some(field) => overwrite_field(&current, field, &conflict.remote_version)?,
        },
        ResolutionChoice::Merged => {
            let merged = merge_messages_auto(&local, &remote, 0)?;
            match &conflict.field {
                None => merged,
                Some(field) => overwrite_field(&current, field, &serde_json::to_value(&merged)?)?,
            }
        }
    };

    resolved.sync_version = resolved
        .sync_version
        .max(local.sync_version)
        .max(remote.sync_version)
        + 1;
    resolved.modified_at = now_ms;
    resolved.dirty = true;
    repo.upsert(&resolved)
}

/// Copy one field out of a source record snapshot into a typed record.
fn overwrite_field<T>(record: &T, field: &str, source: &Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(mut map) = serde_json::to_value(record)? else {
        return Err(Error::Validation(
            "record did not serialize to an object".to_string(),
        ));
    };
    let value = source.get(field).cloned().unwrap_or(Value::Null);
    map.insert(field.to_string(), value);
    Ok(serde_json::from_value(Value::Object(map))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ConversationId, MessageRole};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_conversation(db: &Database, title: &str, modified_at: i64) -> Conversation {
        let mut conversation = Conversation::new("chatgpt", "c1", 1_000);
        conversation.title = title.to_string();
        conversation.modified_at = modified_at;
        SqliteConversationRepository::new(db.connection())
            .upsert(&conversation)
            .unwrap();
        conversation
    }

    fn park_title_conflict(
        db: &Database,
        local: &Conversation,
        remote: &Conversation,
    ) -> ConflictId {
        let conflict = MergeConflict {
            id: ConflictId::new(),
            entity_kind: EntityKind::Conversation,
            entity_id: local.id.as_str().to_string(),
            field: Some("title".to_string()),
            local_version: serde_json::to_value(local).unwrap(),
            remote_version: serde_json::to_value(remote).unwrap(),
            detected_at: 9_000,
        };
        SqliteConflictRepository::new(db.connection())
            .insert(&conflict)
            .unwrap();
        conflict.id
    }

    #[test]
    fn test_missing_conflict_is_already_resolved() {
        let db = setup();
        let outcome = apply_resolution(
            db.connection(),
            &ConflictId::new(),
            ResolutionChoice::Remote,
            10_000,
        )
        .unwrap();
        assert_eq!(outcome, ResolutionOutcome::AlreadyResolved);
    }

    #[test]
    fn test_remote_choice_overwrites_only_the_conflicted_field() {
        let db = setup();
        let local = seed_conversation(&db, "local title", 5_000);
        let mut remote = local.clone();
        remote.title = "remote title".to_string();
        remote.modified_at = 6_000;
        remote.sync_version = 4;
        let conflict_id = park_title_conflict(&db, &local, &remote);

        // The user keeps editing after the conflict was parked.
        let repo = SqliteConversationRepository::new(db.connection());
        let mut current = repo.get(&local.id).unwrap().unwrap();
        current.set_favorite(true, 7_000);
        repo.upsert(&current).unwrap();

        let outcome = apply_resolution(
            db.connection(),
            &conflict_id,
            ResolutionChoice::Remote,
            10_000,
        )
        .unwrap();
        assert_eq!(outcome, ResolutionOutcome::Applied);

        let resolved = repo.get(&local.id).unwrap().unwrap();
        assert_eq!(resolved.title, "remote title");
        assert!(resolved.is_favorite);
        assert!(resolved.dirty);
        assert_eq!(resolved.sync_version, 5);
        assert_eq!(resolved.modified_at, 10_000);
        assert_eq!(
            SqliteConflictRepository::new(db.connection()).count().unwrap(),
            0
        );
    }

    #[test]
    fn test_second_application_is_a_no_op() {
        let db = setup();
        let local = seed_conversation(&db, "local title", 5_000);
        let mut remote = local.clone();
        remote.title = "remote title".to_string();
        remote.modified_at = 6_000;
        let conflict_id = park_title_conflict(&db, &local, &remote);

        apply_resolution(
            db.connection(),
            &conflict_id,
            ResolutionChoice::Remote,
            10_000,
        )
        .unwrap();
        let repo = SqliteConversationRepository::new(db.connection());
        let after_first = repo.get(&local.id).unwrap().unwrap();

        let outcome = apply_resolution(
            db.connection(),
            &conflict_id,
            ResolutionChoice::Local,
            11_000,
        )
        .unwrap();
        assert_eq!(outcome, ResolutionOutcome::AlreadyResolved);
        assert_eq!(repo.get(&local.id).unwrap().unwrap(), after_first);
    }

    #[test]
    fn test_local_choice_keeps_current_value_but_uploads_it() {
        let db = setup();
        let local = seed_conversation(&db, "local title", 5_000);
        let mut remote = local.clone();
        remote.title = "remote title".to_string();
        remote.modified_at = 6_000;
        remote.sync_version = 2;
        let conflict_id = park_title_conflict(&db, &local, &remote);

        apply_resolution(
            db.connection(),
            &conflict_id,
            ResolutionChoice::Local,
            10_000,
        )
        .unwrap();

        let resolved = SqliteConversationRepository::new(db.connection())
            .get(&local.id)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.title, "local title");
        assert!(resolved.dirty);
        assert_eq!(resolved.sync_version, 3);
    }

    #[test]
    fn test_merged_choice_takes_the_newer_writer() {
        let db = setup();
        let local = seed_conversation(&db, "local title", 5_000);
        let mut remote = local.clone();
        remote.title = "remote title".to_string();
        remote.modified_at = 6_000;
        let conflict_id = park_title_conflict(&db, &local, &remote);

        apply_resolution(
            db.connection(),
            &conflict_id,
            ResolutionChoice::Merged,
            10_000,
        )
        .unwrap();

        let resolved = SqliteConversationRepository::new(db.connection())
            .get(&local.id)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.title, "remote title");
    }

    #[test]
    fn test_whole_record_message_resolution() {
        let db = setup();
        let conversation = seed_conversation(&db, "host", 5_000);
        let message_repo = SqliteMessageRepository::new(db.connection());

        let mut local = Message::new(
            conversation.id.clone(),
            "m1".to_string(),
            MessageRole::Assistant,
            "local content".to_string(),
            2_000,
        );
        local.modified_at = 5_000;
        message_repo.upsert(&local).unwrap();

        let mut remote = local.clone();
        remote.content = "remote content".to_string();
        remote.modified_at = 6_000;

        let conflict = MergeConflict {
            id: ConflictId::new(),
            entity_kind: EntityKind::Message,
            entity_id: MergeConflict::message_entity_id(conversation.id.as_str(), "m1"),
            field: None,
            local_version: serde_json::to_value(&local).unwrap(),
            remote_version: serde_json::to_value(&remote).unwrap(),
            detected_at: 9_000,
        };
        SqliteConflictRepository::new(db.connection())
            .insert(&conflict)
            .unwrap();

        apply_resolution(
            db.connection(),
            &conflict.id,
            ResolutionChoice::Remote,
            10_000,
        )
        .unwrap();

        let resolved = message_repo.get(&conversation.id, "m1").unwrap().unwrap();
        assert_eq!(resolved.content, "remote content");
        assert!(resolved.dirty);
        assert_eq!(resolved.modified_at, 10_000);
    }

    #[test]
    fn test_choice_parse() {
        assert_eq!(
            "local".parse::<ResolutionChoice>().unwrap(),
            ResolutionChoice::Local
        );
        assert_eq!(
            "merged".parse::<ResolutionChoice>().unwrap(),
            ResolutionChoice::Merged
        );
        assert!("ours".parse::<ResolutionChoice>().is_err());
    }
}
