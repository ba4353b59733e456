//! Sync bookkeeping key-value store

use crate::error::Result;
use rusqlite::{params, Connection};

/// Millisecond watermark of the last fully committed sync pass
pub const LAST_SYNCED_AT: &str = "last_synced_at";
/// JSON report of the last completed sync pass
pub const LAST_REPORT: &str = "last_report";
/// JSON record of the last sync failure, cleared on success
pub const LAST_ERROR: &str = "last_error";

/// Trait for sync bookkeeping storage
pub trait SyncMetaRepository {
    /// Get a value by key
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key if present
    fn delete(&self, key: &str) -> Result<()>;

    /// Watermark of the last committed pass, zero before any sync
    fn last_synced_at(&self) -> Result<i64> {
        Ok(self
            .get(LAST_SYNCED_AT)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// Advance the watermark
    fn set_last_synced_at(&self, timestamp_ms: i64) -> Result<()> {
        self.set(LAST_SYNCED_AT, &timestamp_ms.to_string())
    }
}

/// `SQLite` implementation of `SyncMetaRepository`
pub struct SqliteSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncMetaRepository for SqliteSyncMetaRepository<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM sync_meta WHERE key = ?",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_meta WHERE key = ?", params![key])?;
        Ok(())
    }
}
