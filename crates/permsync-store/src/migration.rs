//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each one transforms the schema from version N to
//! N+1 and is recorded in `schema_migrations`.

use rusqlite::Connection;

use permsync_core::{Clock, SystemClock};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent. Also enables foreign keys on the connection, which SQLite
/// leaves off by default and the cascades below depend on.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, SystemClock.now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: groups, group grants, direct grants, memberships.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE permission_groups (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE group_permissions (
            group_name TEXT NOT NULL REFERENCES permission_groups(name) ON DELETE CASCADE,
            permission TEXT NOT NULL,
            expires_at INTEGER,               -- Unix ms, NULL never expires
            PRIMARY KEY (group_name, permission)
        );

        CREATE TABLE player_permissions (
            player_id TEXT NOT NULL,          -- hyphenated UUID
            permission TEXT NOT NULL,
            expires_at INTEGER,
            PRIMARY KEY (player_id, permission)
        );

        CREATE TABLE player_groups (
            player_id TEXT NOT NULL,
            group_name TEXT NOT NULL REFERENCES permission_groups(name) ON DELETE CASCADE,
            expires_at INTEGER,
            PRIMARY KEY (player_id, group_name)
        );

        -- Expiry window scans
        CREATE INDEX idx_group_permissions_expires ON group_permissions(expires_at);
        CREATE INDEX idx_player_permissions_expires ON player_permissions(expires_at);
        CREATE INDEX idx_player_groups_expires ON player_groups(expires_at);
        CREATE INDEX idx_player_groups_group ON player_groups(group_name);
        "#,
    )?;

    Ok(())
}
