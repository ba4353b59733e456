//! Merge conflict repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::{ConflictId, EntityKind, MergeConflict};
use rusqlite::{params, Connection};

const COLUMNS: &str =
    "id, entity_kind, entity_id, field, local_version, remote_version, detected_at";

/// Trait for parked merge conflict storage
pub trait ConflictRepository {
    /// Park one conflict for manual resolution
    fn insert(&self, conflict: &MergeConflict) -> Result<()>;

    /// Get a conflict by ID
    fn get(&self, id: &ConflictId) -> Result<Option<MergeConflict>>;

    /// Pending conflicts, oldest first
    fn list(&self, limit: usize) -> Result<Vec<MergeConflict>>;

    /// Every pending conflict (sync refreshes parked rows each pass)
    fn all(&self) -> Result<Vec<MergeConflict>>;

    /// Remove a resolved conflict. Returns false when the ID was not present.
    fn delete(&self, id: &ConflictId) -> Result<bool>;

    /// Remove every parked conflict for one entity, returning how many went away
    fn delete_for_entity(&self, entity_kind: EntityKind, entity_id: &str) -> Result<usize>;

    /// How many conflicts are waiting
    fn count(&self) -> Result<i64>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a conflict from a database row
    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<MergeConflict> {
        let id: String = row.get(0)?;
        let entity_kind: String = row.get(1)?;
        let local_json: String = row.get(4)?;
        let remote_json: String = row.get(5)?;
        Ok(MergeConflict {
            id: id.parse().unwrap_or_default(),
            entity_kind: entity_kind.parse().unwrap_or(EntityKind::Conversation),
            entity_id: row.get(2)?,
            field: row.get(3)?,
            local_version: serde_json::from_str(&local_json).unwrap_or_default(),
            remote_version: serde_json::from_str(&remote_json).unwrap_or_default(),
            detected_at: row.get(6)?,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn insert(&self, conflict: &MergeConflict) -> Result<()> {
        let local_json = serde_json::to_string(&conflict.local_version)?;
        let remote_json = serde_json::to_string(&conflict.remote_version)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO merge_conflicts (
                id, entity_kind, entity_id, field, local_version, remote_version, detected_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                conflict.id.as_str(),
                conflict.entity_kind.as_str(),
                conflict.entity_id,
                conflict.field,
                local_json,
                remote_json,
                conflict.detected_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ConflictId) -> Result<Option<MergeConflict>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM merge_conflicts WHERE id = ?"),
            params![id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<MergeConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM merge_conflicts ORDER BY detected_at, id LIMIT ?"
        ))?;

        let conflicts = stmt
            .query_map(params![limit as i64], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn all(&self) -> Result<Vec<MergeConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM merge_conflicts ORDER BY detected_at, id"
        ))?;

        let conflicts = stmt
            .query_map([], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn delete(&self, id: &ConflictId) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM merge_conflicts WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn delete_for_entity(&self, entity_kind: EntityKind, entity_id: &str) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM merge_conflicts WHERE entity_kind = ? AND entity_id = ?",
            params![entity_kind.as_str(), entity_id],
        )?;
        Ok(rows)
    }

    fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM merge_conflicts", [], |row| row.get(0))?;
        Ok(count)
    }
}
