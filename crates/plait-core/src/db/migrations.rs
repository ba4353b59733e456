//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn apply(conn: &Connection, statements: &[&str], version: i32) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", [])?;

    for statement in statements {
        if let Err(error) = conn.execute(statement, []) {
            conn.execute("ROLLBACK", []).ok();
            return Err(error.into());
        }
    }

    if let Err(error) = conn.execute("COMMIT", []) {
        conn.execute("ROLLBACK", []).ok();
        return Err(error.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: conversation archive schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Conversations table
        "CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            original_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            preview TEXT NOT NULL DEFAULT '',
            summary TEXT,
            message_count INTEGER NOT NULL DEFAULT 0,
            tags TEXT NOT NULL DEFAULT '[]',
            detail_status TEXT NOT NULL DEFAULT 'none',
            detail_synced_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            synced_at INTEGER NOT NULL DEFAULT 0,
            is_favorite INTEGER NOT NULL DEFAULT 0,
            favorite_at INTEGER,
            url TEXT,
            sync_version INTEGER NOT NULL DEFAULT 0,
            modified_at INTEGER NOT NULL DEFAULT 0,
            dirty INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            UNIQUE (platform, original_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_conversations_platform ON conversations(platform)",
        "CREATE INDEX IF NOT EXISTS idx_conversations_dirty ON conversations(dirty)",
        // Messages table
        "CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            sync_version INTEGER NOT NULL DEFAULT 0,
            modified_at INTEGER NOT NULL DEFAULT 0,
            dirty INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            PRIMARY KEY (conversation_id, id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(conversation_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_messages_dirty ON messages(dirty)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements, 1)
}

/// Migration to version 2: sync support (merge conflicts + sync bookkeeping)
fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS merge_conflicts (
            id TEXT PRIMARY KEY,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            field TEXT,
            local_version TEXT NOT NULL,
            remote_version TEXT NOT NULL,
            detected_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_merge_conflicts_entity ON merge_conflicts(entity_kind, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_merge_conflicts_detected ON merge_conflicts(detected_at)",
        "CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
            |row| row.get::<_, i32>(0).map(|flag| flag != 0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v1_creates_entity_tables() {
        let conn = setup();
        run(&conn).unwrap();

        assert!(table_exists(&conn, "conversations"));
        assert!(table_exists(&conn, "messages"));
    }

    #[test]
    fn test_migration_v2_creates_sync_tables() {
        let conn = setup();
        run(&conn).unwrap();

        assert!(table_exists(&conn, "merge_conflicts"));
        assert!(table_exists(&conn, "sync_meta"));
    }
}
