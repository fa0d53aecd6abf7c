//! Database migrations for groups, memberships and events
//!
//! Each migration is applied atomically and tracked in the
//! membership_schema_version table.

use super::super::error::StoreError;
use super::super::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Groups, memberships and events",
        up_sql: r#"
            -- Group tree (formal groups and per-thread guest groups)
            CREATE TABLE IF NOT EXISTS group_nodes (
                id BLOB PRIMARY KEY,                    -- GroupId (32 bytes)
                parent_id BLOB REFERENCES group_nodes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('formal', 'guest')),
                thread_kind TEXT CHECK(thread_kind IN ('discussion', 'poll')),
                thread_id BLOB,                         -- ThreadId of the host thread
                created_at INTEGER NOT NULL,
                CHECK (
                    (kind = 'formal' AND thread_kind IS NULL AND thread_id IS NULL)
                    OR (kind = 'guest' AND thread_kind IS NOT NULL
                        AND thread_id IS NOT NULL AND parent_id IS NOT NULL)
                ),
                UNIQUE (thread_kind, thread_id)
            );

            CREATE INDEX IF NOT EXISTS idx_groups_parent ON group_nodes(parent_id);

            -- Memberships (one per group and user)
            CREATE TABLE IF NOT EXISTS memberships (
                id BLOB PRIMARY KEY,                    -- MembershipId (32 bytes)
                group_id BLOB NOT NULL REFERENCES group_nodes(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                inviter_id TEXT,
                admin INTEGER NOT NULL DEFAULT 0,
                accepted_at INTEGER,                    -- NULL while pending
                experiences TEXT NOT NULL DEFAULT '{}', -- JSON
                created_at INTEGER NOT NULL,
                UNIQUE (group_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);

            -- Domain events; no foreign keys so they outlive their subjects
            CREATE TABLE IF NOT EXISTS events (
                id BLOB PRIMARY KEY,                    -- EventId (32 bytes)
                kind TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                subject_kind TEXT NOT NULL CHECK(subject_kind IN ('membership', 'group')),
                subject_id BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_subject ON events(subject_kind, subject_id);
        "#,
    }]
}

fn ensure_version_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS membership_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version from database
pub fn get_current_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    ensure_version_table(conn)?;

    let version: Option<i32> = conn
        .query_row(
            "SELECT version FROM membership_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), StoreError> {
    let conn = pool.get()?;
    let current_version = get_current_version(&conn)?;

    for migration in get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
    {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO membership_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}
