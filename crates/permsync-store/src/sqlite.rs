//! SQLite implementation of the PermissionStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Params};

use permsync_core::{ApplyOutcome, GroupMembership, PermissionGrant, PermissionGroup, PlayerId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::PermissionStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(format!("spawn_blocking failed: {}", e)))?
    }
}

/// A `(owner, key, expires_at)` table.
struct RowTable {
    table: &'static str,
    owner: &'static str,
    key: &'static str,
}

const PLAYER_PERMISSIONS: RowTable = RowTable {
    table: "player_permissions",
    owner: "player_id",
    key: "permission",
};

const PLAYER_GROUPS: RowTable = RowTable {
    table: "player_groups",
    owner: "player_id",
    key: "group_name",
};

const GROUP_PERMISSIONS: RowTable = RowTable {
    table: "group_permissions",
    owner: "group_name",
    key: "permission",
};

impl RowTable {
    /// Rows of `owner` active at `now`, ordered by key.
    fn active(
        &self,
        conn: &Connection,
        owner: &str,
        now: i64,
    ) -> Result<Vec<(String, Option<i64>)>> {
        let sql = format!(
            "SELECT {key}, expires_at FROM {table}
             WHERE {owner} = ?1 AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY {key}",
            key = self.key,
            table = self.table,
            owner = self.owner,
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![owner, now], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Owners with a row whose expiry falls in `(since, until]`.
    fn owners_expired_within(
        &self,
        conn: &Connection,
        since: i64,
        until: i64,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {owner} FROM {table}
             WHERE expires_at IS NOT NULL AND expires_at > ?1 AND expires_at <= ?2",
            owner = self.owner,
            table = self.table,
        );
        query_strings(conn, &sql, params![since, until])
    }

    /// Insert or replace rows for `owner`, counting what changed.
    fn upsert<'a>(
        &self,
        conn: &Connection,
        owner: &str,
        entries: impl IntoIterator<Item = (&'a str, Option<i64>)>,
    ) -> Result<ApplyOutcome> {
        let select = format!(
            "SELECT expires_at FROM {table} WHERE {owner} = ?1 AND {key} = ?2",
            table = self.table,
            owner = self.owner,
            key = self.key,
        );
        let upsert = format!(
            "INSERT INTO {table} ({owner}, {key}, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT ({owner}, {key}) DO UPDATE SET expires_at = excluded.expires_at",
            table = self.table,
            owner = self.owner,
            key = self.key,
        );

        let mut inserted = 0;
        let mut updated = 0;
        for (key, expires_at) in entries {
            let existing: Option<Option<i64>> = conn
                .query_row(&select, params![owner, key], |row| row.get(0))
                .optional()?;
            match existing {
                None => inserted += 1,
                Some(previous) if previous != expires_at => updated += 1,
                Some(_) => continue,
            }
            conn.execute(&upsert, params![owner, key, expires_at])?;
        }
        Ok(ApplyOutcome::for_upsert(inserted, updated))
    }

    /// Delete rows of `owner` by key.
    fn delete(&self, conn: &Connection, owner: &str, keys: &[String]) -> Result<ApplyOutcome> {
        let sql = format!(
            "DELETE FROM {table} WHERE {owner} = ?1 AND {key} = ?2",
            table = self.table,
            owner = self.owner,
            key = self.key,
        );
        let mut deleted = 0;
        for key in keys {
            deleted += conn.execute(&sql, params![owner, key])?;
        }
        Ok(ApplyOutcome::for_delete(deleted))
    }
}

fn query_strings<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn parse_player(raw: String) -> Result<PlayerId> {
    raw.parse()
        .map_err(|_| StoreError::InvalidData(format!("player_id is not a UUID: {}", raw)))
}

fn parse_players(raw: Vec<String>) -> Result<BTreeSet<PlayerId>> {
    raw.into_iter().map(parse_player).collect()
}

fn group_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM permission_groups WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?)
}

fn load_group(conn: &Connection, name: String, now: i64) -> Result<PermissionGroup> {
    let permission_grants = GROUP_PERMISSIONS
        .active(conn, &name, now)?
        .into_iter()
        .map(|(permission, expires_at)| PermissionGrant {
            permission,
            expires_at,
        })
        .collect();
    Ok(PermissionGroup {
        name,
        permission_grants,
    })
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn player_direct_grants(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<Vec<PermissionGrant>> {
        self.run(move |conn| {
            Ok(PLAYER_PERMISSIONS
                .active(conn, &player.to_string(), now)?
                .into_iter()
                .map(|(permission, expires_at)| PermissionGrant {
                    permission,
                    expires_at,
                })
                .collect())
        })
        .await
    }

    async fn player_memberships(&self, player: PlayerId, now: i64) -> Result<Vec<GroupMembership>> {
        self.run(move |conn| {
            Ok(PLAYER_GROUPS
                .active(conn, &player.to_string(), now)?
                .into_iter()
                .map(|(group_name, expires_at)| GroupMembership {
                    group_name,
                    expires_at,
                })
                .collect())
        })
        .await
    }

    async fn group_grants_for_player(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<BTreeSet<String>> {
        self.run(move |conn| {
            let permissions = query_strings(
                conn,
                "SELECT DISTINCT gp.permission
                 FROM player_groups pg
                 JOIN group_permissions gp ON gp.group_name = pg.group_name
                 WHERE pg.player_id = ?1
                   AND (pg.expires_at IS NULL OR pg.expires_at > ?2)
                   AND (gp.expires_at IS NULL OR gp.expires_at > ?2)",
                params![player.to_string(), now],
            )?;
            Ok(permissions.into_iter().collect())
        })
        .await
    }

    async fn group(&self, name: &str, now: i64) -> Result<Option<PermissionGroup>> {
        let name = name.to_string();
        self.run(move |conn| {
            if !group_exists(conn, &name)? {
                return Ok(None);
            }
            load_group(conn, name, now).map(Some)
        })
        .await
    }

    async fn list_groups(&self, now: i64) -> Result<Vec<PermissionGroup>> {
        self.run(move |conn| {
            let names =
                query_strings(conn, "SELECT name FROM permission_groups ORDER BY name", [])?;
            names
                .into_iter()
                .map(|name| load_group(conn, name, now))
                .collect()
        })
        .await
    }

    async fn active_players_for_group(&self, group: &str, now: i64) -> Result<BTreeSet<PlayerId>> {
        let group = group.to_string();
        self.run(move |conn| {
            parse_players(query_strings(
                conn,
                "SELECT player_id FROM player_groups
                 WHERE group_name = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![group, now],
            )?)
        })
        .await
    }

    async fn players_with_any_rows(&self) -> Result<BTreeSet<PlayerId>> {
        self.run(|conn| {
            parse_players(query_strings(
                conn,
                "SELECT player_id FROM player_permissions
                 UNION
                 SELECT player_id FROM player_groups",
                [],
            )?)
        })
        .await
    }

    async fn players_with_active_rows(&self, now: i64) -> Result<BTreeSet<PlayerId>> {
        self.run(move |conn| {
            parse_players(query_strings(
                conn,
                "SELECT player_id FROM player_permissions
                 WHERE expires_at IS NULL OR expires_at > ?1
                 UNION
                 SELECT player_id FROM player_groups
                 WHERE expires_at IS NULL OR expires_at > ?1",
                params![now],
            )?)
        })
        .await
    }

    async fn players_with_expired_direct_grants(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        self.run(move |conn| {
            parse_players(PLAYER_PERMISSIONS.owners_expired_within(conn, since, until)?)
        })
            .await
    }

    async fn players_with_expired_memberships(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        self.run(move |conn| {
            parse_players(PLAYER_GROUPS.owners_expired_within(conn, since, until)?)
        })
            .await
    }

    async fn groups_with_expired_grants(&self, since: i64, until: i64) -> Result<BTreeSet<String>> {
        self.run(move |conn| {
            Ok(GROUP_PERMISSIONS
                .owners_expired_within(conn, since, until)?
                .into_iter()
                .collect())
        })
        .await
    }

    async fn add_player_permissions(
        &self,
        player: PlayerId,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        let grants = grants.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let outcome = PLAYER_PERMISSIONS.upsert(
                &tx,
                &player.to_string(),
                grants.iter().map(|g| (g.permission.as_str(), g.expires_at)),
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn remove_player_permissions(
        &self,
        player: PlayerId,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        let permissions = permissions.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let outcome = PLAYER_PERMISSIONS.delete(&tx, &player.to_string(), &permissions)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn add_player_groups(
        &self,
        player: PlayerId,
        memberships: &[GroupMembership],
    ) -> Result<ApplyOutcome> {
        let memberships = memberships.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for membership in &memberships {
                if !group_exists(&tx, &membership.group_name)? {
                    return Err(StoreError::GroupNotFound(membership.group_name.clone()));
                }
            }
            let outcome = PLAYER_GROUPS.upsert(
                &tx,
                &player.to_string(),
                memberships.iter().map(|m| (m.group_name.as_str(), m.expires_at)),
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn remove_player_groups(
        &self,
        player: PlayerId,
        groups: &[String],
    ) -> Result<ApplyOutcome> {
        let groups = groups.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let outcome = PLAYER_GROUPS.delete(&tx, &player.to_string(), &groups)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn add_group_permissions(
        &self,
        group: &str,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        let group = group.to_string();
        let grants = grants.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if !group_exists(&tx, &group)? {
                return Err(StoreError::GroupNotFound(group));
            }
            let outcome = GROUP_PERMISSIONS.upsert(
                &tx,
                &group,
                grants.iter().map(|g| (g.permission.as_str(), g.expires_at)),
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn remove_group_permissions(
        &self,
        group: &str,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        let group = group.to_string();
        let permissions = permissions.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let outcome = GROUP_PERMISSIONS.delete(&tx, &group, &permissions)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn create_group(&self, name: &str) -> Result<ApplyOutcome> {
        let name = name.to_string();
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO permission_groups (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
                params![name],
            )?;
            Ok(ApplyOutcome::for_upsert(inserted, 0))
        })
        .await
    }

    async fn delete_group(&self, name: &str) -> Result<ApplyOutcome> {
        let name = name.to_string();
        self.run(move |conn| {
            // grants and memberships go with it via ON DELETE CASCADE
            let deleted =
                conn.execute("DELETE FROM permission_groups WHERE name = ?1", params![name])?;
            Ok(ApplyOutcome::for_delete(deleted))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: u8) -> PlayerId {
        PlayerId::from_bytes([n; 16])
    }

    #[tokio::test]
    async fn test_add_and_read_direct_grants() {
        let store = SqliteStore::open_memory().unwrap();
        let p = player(1);

        let outcome = store
            .add_player_permissions(
                p,
                &[PermissionGrant::permanent("fly"), PermissionGrant::until("build", 100)],
            )
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);

        let grants = store.player_direct_grants(p, 50).await.unwrap();
        assert_eq!(
            grants,
            vec![PermissionGrant::until("build", 100), PermissionGrant::permanent("fly")]
        );

        // build expires at 100
        let grants = store.player_direct_grants(p, 100).await.unwrap();
        assert_eq!(grants, vec![PermissionGrant::permanent("fly")]);
    }

    #[tokio::test]
    async fn test_upsert_outcomes() {
        let store = SqliteStore::open_memory().unwrap();
        let p = player(1);
        let grants = [PermissionGrant::until("fly", 100)];

        store.add_player_permissions(p, &grants).await.unwrap();
        assert_eq!(
            store.add_player_permissions(p, &grants).await.unwrap(),
            ApplyOutcome::NoChange
        );
        assert_eq!(
            store
                .add_player_permissions(p, &[PermissionGrant::permanent("fly")])
                .await
                .unwrap(),
            ApplyOutcome::Updated
        );
        assert_eq!(
            store.player_direct_grants(p, 500).await.unwrap(),
            vec![PermissionGrant::permanent("fly")]
        );
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.create_group("admins").await.unwrap(), ApplyOutcome::Created);
        assert_eq!(store.create_group("admins").await.unwrap(), ApplyOutcome::NoChange);

        store
            .add_group_permissions("admins", &[PermissionGrant::permanent("ban")])
            .await
            .unwrap();
        store
            .add_player_groups(player(1), &[GroupMembership::permanent("admins")])
            .await
            .unwrap();

        let group = store.group("admins", 0).await.unwrap().unwrap();
        assert_eq!(group.permission_grants, vec![PermissionGrant::permanent("ban")]);
        assert_eq!(store.list_groups(0).await.unwrap().len(), 1);

        let inherited = store.group_grants_for_player(player(1), 0).await.unwrap();
        assert!(inherited.contains("ban"));

        assert_eq!(store.delete_group("admins").await.unwrap(), ApplyOutcome::Deleted);
        assert!(store.player_memberships(player(1), 0).await.unwrap().is_empty());
        assert!(store.players_with_any_rows().await.unwrap().is_empty());
        assert!(store.group("admins", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store
            .add_group_permissions("ghosts", &[PermissionGrant::permanent("boo")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::GroupNotFound(_)));

        let err = store
            .add_player_groups(player(1), &[GroupMembership::permanent("ghosts")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::GroupNotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_window_is_half_open() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .add_player_permissions(player(1), &[PermissionGrant::until("fly", 100)])
            .await
            .unwrap();

        assert!(store
            .players_with_expired_direct_grants(99, 100)
            .await
            .unwrap()
            .contains(&player(1)));
        assert!(store
            .players_with_expired_direct_grants(100, 200)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_active_player_enumeration() {
        let store = SqliteStore::open_memory().unwrap();
        store.create_group("vip").await.unwrap();
        store
            .add_player_permissions(player(1), &[PermissionGrant::until("fly", 10)])
            .await
            .unwrap();
        store
            .add_player_groups(player(2), &[GroupMembership::permanent("vip")])
            .await
            .unwrap();

        let active = store.players_with_active_rows(20).await.unwrap();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec![player(2)]);
        assert_eq!(store.players_with_any_rows().await.unwrap().len(), 2);
        assert_eq!(
            store
                .active_players_for_group("vip", 20)
                .await
                .unwrap()
                .into_iter()
                .collect::<Vec<_>>(),
            vec![player(2)]
        );
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perms.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .add_player_permissions(player(3), &[PermissionGrant::permanent("fly")])
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.player_direct_grants(player(3), 0).await.unwrap(),
            vec![PermissionGrant::permanent("fly")]
        );
    }
}
