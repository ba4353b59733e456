//! Conversation repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::{Conversation, ConversationId};
use rusqlite::{params, Connection};

/// Column list shared by every SELECT, in `parse_conversation` order
const COLUMNS: &str = "id, platform, original_id, title, preview, summary, message_count, tags, \
     detail_status, detail_synced_at, created_at, updated_at, synced_at, is_favorite, \
     favorite_at, url, sync_version, modified_at, dirty, deleted, deleted_at";

/// Listing filter for the browse surfaces.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub platform: Option<String>,
    pub favorites_only: bool,
}

/// Trait for conversation storage operations
pub trait ConversationRepository {
    /// Insert or replace one conversation row
    fn upsert(&self, conversation: &Conversation) -> Result<()>;

    /// Get a conversation by ID, tombstoned rows included
    fn get(&self, id: &ConversationId) -> Result<Option<Conversation>>;

    /// List live conversations, newest platform activity first
    fn list(&self, filter: &ConversationFilter, limit: usize) -> Result<Vec<Conversation>>;

    /// Every row, tombstoned included (sync merges over the full set)
    fn all(&self) -> Result<Vec<Conversation>>;

    /// Live conversations whose ID starts with the given prefix
    fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Conversation>>;

    /// Number of live conversations
    fn count(&self) -> Result<i64>;

    /// How many rows still need upload
    fn count_dirty(&self) -> Result<i64>;

    /// Drop the pending-upload flag after a successful upload
    fn mark_clean(&self, id: &ConversationId) -> Result<()>;
}

/// `SQLite` implementation of `ConversationRepository`
pub struct SqliteConversationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConversationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a conversation from a database row
    fn parse_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
        let id: String = row.get(0)?;
        let tags_json: String = row.get(7)?;
        let detail_status: String = row.get(8)?;
        Ok(Conversation {
            id: ConversationId::from_raw(id),
            platform: row.get(1)?,
            original_id: row.get(2)?,
            title: row.get(3)?,
            preview: row.get(4)?,
            summary: row.get(5)?,
            message_count: row.get(6)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            detail_status: detail_status.parse().unwrap_or_default(),
            detail_synced_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            synced_at: row.get(12)?,
            is_favorite: row.get::<_, i64>(13)? != 0,
            favorite_at: row.get(14)?,
            url: row.get(15)?,
            sync_version: row.get(16)?,
            modified_at: row.get(17)?,
            dirty: row.get::<_, i64>(18)? != 0,
            deleted: row.get::<_, i64>(19)? != 0,
            deleted_at: row.get(20)?,
        })
    }
}

impl ConversationRepository for SqliteConversationRepository<'_> {
    fn upsert(&self, conversation: &Conversation) -> Result<()> {
        let tags_json = serde_json::to_string(&conversation.tags)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO conversations (
                id, platform, original_id, title, preview, summary, message_count, tags,
                detail_status, detail_synced_at, created_at, updated_at, synced_at,
                is_favorite, favorite_at, url, sync_version, modified_at, dirty, deleted,
                deleted_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                conversation.id.as_str(),
                conversation.platform,
                conversation.original_id,
                conversation.title,
                conversation.preview,
                conversation.summary,
                conversation.message_count,
                tags_json,
                conversation.detail_status.as_str(),
                conversation.detail_synced_at,
                conversation.created_at,
                conversation.updated_at,
                conversation.synced_at,
                i64::from(conversation.is_favorite),
                conversation.favorite_at,
                conversation.url,
                conversation.sync_version,
                conversation.modified_at,
                i64::from(conversation.dirty),
                i64::from(conversation.deleted),
                conversation.deleted_at,
            ],
        )?;

        Ok(())
    }

    fn get(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?"),
            params![id.as_str()],
            Self::parse_conversation,
        );

        match result {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, filter: &ConversationFilter, limit: usize) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE deleted = 0
               AND (?1 IS NULL OR platform = ?1)
               AND (?2 = 0 OR is_favorite = 1)
             ORDER BY updated_at DESC
             LIMIT ?3"
        ))?;

        let conversations = stmt
            .query_map(
                params![
                    filter.platform,
                    i64::from(filter.favorites_only),
                    limit as i64
                ],
                Self::parse_conversation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conversations)
    }

    fn all(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM conversations ORDER BY id"))?;

        let conversations = stmt
            .query_map([], Self::parse_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conversations)
    }

    fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Conversation>> {
        // substr comparison instead of LIKE: IDs routinely contain
        // underscores, which LIKE treats as wildcards
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE deleted = 0 AND substr(id, 1, length(?1)) = ?1
             ORDER BY id"
        ))?;

        let conversations = stmt
            .query_map(params![prefix], Self::parse_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conversations)
    }

    fn count(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE deleted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_dirty(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE dirty = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_clean(&self, id: &ConversationId) -> Result<()> {
        self.conn.execute(
            "UPDATE conversations SET dirty = 0 WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }
}
