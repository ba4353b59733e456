//! Message repository implementation

use crate::error::Result;
use crate::models::{ConversationId, Message, MessageRole};
use rusqlite::{params, Connection};

const COLUMNS: &str =
    "conversation_id, id, role, content, created_at, sync_version, modified_at, dirty, deleted, \
     deleted_at";

/// Trait for message storage operations
pub trait MessageRepository {
    /// Insert or replace one message row
    fn upsert(&self, message: &Message) -> Result<()>;

    /// Get a message by its composite key, tombstoned rows included
    fn get(&self, conversation_id: &ConversationId, message_id: &str) -> Result<Option<Message>>;

    /// Live messages of a conversation in platform order
    fn list_for_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;

    /// Every message of a conversation, tombstoned included
    fn all_for_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;

    /// Every message row, tombstoned included (sync merges over the full set)
    fn all(&self) -> Result<Vec<Message>>;

    /// Number of live messages across all conversations
    fn count(&self) -> Result<i64>;

    /// How many rows still need upload
    fn count_dirty(&self) -> Result<i64>;

    /// Drop the pending-upload flag after a successful upload
    fn mark_clean(&self, conversation_id: &ConversationId, message_id: &str) -> Result<()>;
}

/// `SQLite` implementation of `MessageRepository`
pub struct SqliteMessageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteMessageRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a message from a database row
    fn parse_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let conversation_id: String = row.get(0)?;
        let role: String = row.get(2)?;
        Ok(Message {
            conversation_id: ConversationId::from_raw(conversation_id),
            id: row.get(1)?,
            role: role.parse().unwrap_or(MessageRole::User),
            content: row.get(3)?,
            created_at: row.get(4)?,
            sync_version: row.get(5)?,
            modified_at: row.get(6)?,
            dirty: row.get::<_, i64>(7)? != 0,
            deleted: row.get::<_, i64>(8)? != 0,
            deleted_at: row.get(9)?,
        })
    }

    fn query_for_conversation(
        &self,
        conversation_id: &ConversationId,
        active_only: bool,
    ) -> Result<Vec<Message>> {
        let extra = if active_only { "AND deleted = 0" } else { "" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM messages
             WHERE conversation_id = ? {extra}
             ORDER BY created_at, id"
        ))?;

        let messages = stmt
            .query_map(params![conversation_id.as_str()], Self::parse_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }
}

impl MessageRepository for SqliteMessageRepository<'_> {
    fn upsert(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO messages (
                conversation_id, id, role, content, created_at, sync_version, modified_at,
                dirty, deleted, deleted_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.conversation_id.as_str(),
                message.id,
                message.role.as_str(),
                message.content,
                message.created_at,
                message.sync_version,
                message.modified_at,
                i64::from(message.dirty),
                i64::from(message.deleted),
                message.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, conversation_id: &ConversationId, message_id: &str) -> Result<Option<Message>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM messages WHERE conversation_id = ? AND id = ?"),
            params![conversation_id.as_str(), message_id],
            Self::parse_message,
        );

        match result {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_for_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.query_for_conversation(conversation_id, true)
    }

    fn all_for_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.query_for_conversation(conversation_id, false)
    }

    fn all(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM messages ORDER BY conversation_id, created_at, id"
        ))?;

        let messages = stmt
            .query_map([], Self::parse_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    fn count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE deleted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_dirty(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE dirty = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_clean(&self, conversation_id: &ConversationId, message_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE messages SET dirty = 0 WHERE conversation_id = ? AND id = ?",
            params![conversation_id.as_str(), message_id],
        )?;
        Ok(())
    }
}
