//! In-memory implementation of the PermissionStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use permsync_core::grant::{expired_within, is_active};
use permsync_core::{ApplyOutcome, GroupMembership, PermissionGrant, PermissionGroup, PlayerId};

use crate::error::{Result, StoreError};
use crate::traits::PermissionStore;

/// Rows keyed by name, valued by expiry.
type Rows = BTreeMap<String, Option<i64>>;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Group name -> that group's grants.
    groups: BTreeMap<String, Rows>,

    /// Direct grants per player.
    player_permissions: BTreeMap<PlayerId, Rows>,

    /// Memberships per player.
    player_groups: BTreeMap<PlayerId, Rows>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert or replace rows, counting what changed.
fn upsert(
    rows: &mut Rows,
    entries: impl IntoIterator<Item = (String, Option<i64>)>,
) -> ApplyOutcome {
    let mut inserted = 0;
    let mut updated = 0;
    for (key, expires_at) in entries {
        match rows.insert(key, expires_at) {
            None => inserted += 1,
            Some(previous) if previous != expires_at => updated += 1,
            Some(_) => {}
        }
    }
    ApplyOutcome::for_upsert(inserted, updated)
}

fn delete(rows: &mut Rows, keys: &[String]) -> ApplyOutcome {
    let deleted = keys.iter().filter(|k| rows.remove(k.as_str()).is_some()).count();
    ApplyOutcome::for_delete(deleted)
}

fn active(rows: &Rows, now: i64) -> impl Iterator<Item = (&String, &Option<i64>)> {
    rows.iter().filter(move |(_, e)| is_active(**e, now))
}

fn group_value(name: &str, rows: &Rows, now: i64) -> PermissionGroup {
    PermissionGroup {
        name: name.to_string(),
        permission_grants: active(rows, now)
            .map(|(permission, expires_at)| PermissionGrant {
                permission: permission.clone(),
                expires_at: *expires_at,
            })
            .collect(),
    }
}

fn players_matching(
    tables: [&BTreeMap<PlayerId, Rows>; 2],
    pred: impl Fn(Option<i64>) -> bool,
) -> BTreeSet<PlayerId> {
    tables
        .into_iter()
        .flat_map(|table| table.iter())
        .filter(|(_, rows)| rows.values().any(|e| pred(*e)))
        .map(|(player, _)| *player)
        .collect()
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn player_direct_grants(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<Vec<PermissionGrant>> {
        let inner = self.read()?;
        Ok(inner
            .player_permissions
            .get(&player)
            .map(|rows| {
                active(rows, now)
                    .map(|(permission, expires_at)| PermissionGrant {
                        permission: permission.clone(),
                        expires_at: *expires_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn player_memberships(&self, player: PlayerId, now: i64) -> Result<Vec<GroupMembership>> {
        let inner = self.read()?;
        Ok(inner
            .player_groups
            .get(&player)
            .map(|rows| {
                active(rows, now)
                    .map(|(group_name, expires_at)| GroupMembership {
                        group_name: group_name.clone(),
                        expires_at: *expires_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn group_grants_for_player(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<BTreeSet<String>> {
        let inner = self.read()?;
        let Some(memberships) = inner.player_groups.get(&player) else {
            return Ok(BTreeSet::new());
        };
        Ok(active(memberships, now)
            .filter_map(|(group, _)| inner.groups.get(group))
            .flat_map(|grants| active(grants, now).map(|(p, _)| p.clone()))
            .collect())
    }

    async fn group(&self, name: &str, now: i64) -> Result<Option<PermissionGroup>> {
        let inner = self.read()?;
        Ok(inner.groups.get(name).map(|rows| group_value(name, rows, now)))
    }

    async fn list_groups(&self, now: i64) -> Result<Vec<PermissionGroup>> {
        let inner = self.read()?;
        Ok(inner
            .groups
            .iter()
            .map(|(name, rows)| group_value(name, rows, now))
            .collect())
    }

    async fn active_players_for_group(&self, group: &str, now: i64) -> Result<BTreeSet<PlayerId>> {
        let inner = self.read()?;
        Ok(inner
            .player_groups
            .iter()
            .filter(|(_, rows)| rows.get(group).is_some_and(|e| is_active(*e, now)))
            .map(|(player, _)| *player)
            .collect())
    }

    async fn players_with_any_rows(&self) -> Result<BTreeSet<PlayerId>> {
        let inner = self.read()?;
        Ok(players_matching(
            [&inner.player_permissions, &inner.player_groups],
            |_| true,
        ))
    }

    async fn players_with_active_rows(&self, now: i64) -> Result<BTreeSet<PlayerId>> {
        let inner = self.read()?;
        Ok(players_matching(
            [&inner.player_permissions, &inner.player_groups],
            |e| is_active(e, now),
        ))
    }

    async fn players_with_expired_direct_grants(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        let inner = self.read()?;
        Ok(inner
            .player_permissions
            .iter()
            .filter(|(_, rows)| rows.values().any(|e| expired_within(*e, since, until)))
            .map(|(player, _)| *player)
            .collect())
    }

    async fn players_with_expired_memberships(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        let inner = self.read()?;
        Ok(inner
            .player_groups
            .iter()
            .filter(|(_, rows)| rows.values().any(|e| expired_within(*e, since, until)))
            .map(|(player, _)| *player)
            .collect())
    }

    async fn groups_with_expired_grants(&self, since: i64, until: i64) -> Result<BTreeSet<String>> {
        let inner = self.read()?;
        Ok(inner
            .groups
            .iter()
            .filter(|(_, rows)| rows.values().any(|e| expired_within(*e, since, until)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn add_player_permissions(
        &self,
        player: PlayerId,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        let rows = inner.player_permissions.entry(player).or_default();
        Ok(upsert(
            rows,
            grants.iter().map(|g| (g.permission.clone(), g.expires_at)),
        ))
    }

    async fn remove_player_permissions(
        &self,
        player: PlayerId,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        let Some(rows) = inner.player_permissions.get_mut(&player) else {
            return Ok(ApplyOutcome::NoChange);
        };
        let outcome = delete(rows, permissions);
        if rows.is_empty() {
            inner.player_permissions.remove(&player);
        }
        Ok(outcome)
    }

    async fn add_player_groups(
        &self,
        player: PlayerId,
        memberships: &[GroupMembership],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        if let Some(missing) = memberships
            .iter()
            .find(|m| !inner.groups.contains_key(&m.group_name))
        {
            return Err(StoreError::GroupNotFound(missing.group_name.clone()));
        }
        let rows = inner.player_groups.entry(player).or_default();
        Ok(upsert(
            rows,
            memberships.iter().map(|m| (m.group_name.clone(), m.expires_at)),
        ))
    }

    async fn remove_player_groups(
        &self,
        player: PlayerId,
        groups: &[String],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        let Some(rows) = inner.player_groups.get_mut(&player) else {
            return Ok(ApplyOutcome::NoChange);
        };
        let outcome = delete(rows, groups);
        if rows.is_empty() {
            inner.player_groups.remove(&player);
        }
        Ok(outcome)
    }

    async fn add_group_permissions(
        &self,
        group: &str,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        let rows = inner
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
        Ok(upsert(
            rows,
            grants.iter().map(|g| (g.permission.clone(), g.expires_at)),
        ))
    }

    async fn remove_group_permissions(
        &self,
        group: &str,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        Ok(match inner.groups.get_mut(group) {
            Some(rows) => delete(rows, permissions),
            None => ApplyOutcome::NoChange,
        })
    }

    async fn create_group(&self, name: &str) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        if inner.groups.contains_key(name) {
            return Ok(ApplyOutcome::NoChange);
        }
        inner.groups.insert(name.to_string(), Rows::new());
        Ok(ApplyOutcome::Created)
    }

    async fn delete_group(&self, name: &str) -> Result<ApplyOutcome> {
        let mut inner = self.write()?;
        if inner.groups.remove(name).is_none() {
            return Ok(ApplyOutcome::NoChange);
        }
        inner.player_groups.retain(|_, rows| {
            rows.remove(name);
            !rows.is_empty()
        });
        Ok(ApplyOutcome::Deleted)
    }
}
