//! A store wrapper that lets a test step into the middle of an engine call.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use permsync::core::{ApplyOutcome, GroupMembership, PermissionGrant, PermissionGroup, PlayerId};
use permsync::store::{MemoryStore, PermissionStore, Result, StoreError};
use tokio::sync::Notify;

/// In-memory store with two test hooks.
///
/// - When armed, the next group grant write waits until [`release`] after
///   signalling that the group's members were read.
/// - [`fail_next_scan`] makes the next expired-grant window query fail.
///
/// [`release`]: GatedStore::release
/// [`fail_next_scan`]: GatedStore::fail_next_scan
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    members_read: Notify,
    released: Notify,
    fail_scan: AtomicBool,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the next group grant write until [`GatedStore::release`].
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the armed write's member read has returned.
    pub async fn members_read(&self) {
        self.members_read.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn fail_next_scan(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    async fn hold_if_armed(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.released.notified().await;
        }
    }
}

#[async_trait]
impl PermissionStore for GatedStore {
    async fn player_direct_grants(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<Vec<PermissionGrant>> {
        self.inner.player_direct_grants(player, now).await
    }

    async fn player_memberships(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<Vec<GroupMembership>> {
        self.inner.player_memberships(player, now).await
    }

    async fn group_grants_for_player(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<BTreeSet<String>> {
        self.inner.group_grants_for_player(player, now).await
    }

    async fn group(&self, name: &str, now: i64) -> Result<Option<PermissionGroup>> {
        self.inner.group(name, now).await
    }

    async fn list_groups(&self, now: i64) -> Result<Vec<PermissionGroup>> {
        self.inner.list_groups(now).await
    }

    async fn active_players_for_group(
        &self,
        group: &str,
        now: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        let players = self.inner.active_players_for_group(group, now).await?;
        if self.armed.load(Ordering::SeqCst) {
            self.members_read.notify_one();
        }
        Ok(players)
    }

    async fn players_with_any_rows(&self) -> Result<BTreeSet<PlayerId>> {
        self.inner.players_with_any_rows().await
    }

    async fn players_with_active_rows(&self, now: i64) -> Result<BTreeSet<PlayerId>> {
        self.inner.players_with_active_rows(now).await
    }

    async fn players_with_expired_direct_grants(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        if self.fail_scan.swap(false, Ordering::SeqCst) {
            return Err(StoreError::InvalidData("scan unavailable".into()));
        }
        self.inner.players_with_expired_direct_grants(since, until).await
    }

    async fn players_with_expired_memberships(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        self.inner.players_with_expired_memberships(since, until).await
    }

    async fn groups_with_expired_grants(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<String>> {
        self.inner.groups_with_expired_grants(since, until).await
    }

    async fn add_player_permissions(
        &self,
        player: PlayerId,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        self.inner.add_player_permissions(player, grants).await
    }

    async fn remove_player_permissions(
        &self,
        player: PlayerId,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        self.inner.remove_player_permissions(player, permissions).await
    }

    async fn add_player_groups(
        &self,
        player: PlayerId,
        memberships: &[GroupMembership],
    ) -> Result<ApplyOutcome> {
        self.inner.add_player_groups(player, memberships).await
    }

    async fn remove_player_groups(
        &self,
        player: PlayerId,
        groups: &[String],
    ) -> Result<ApplyOutcome> {
        self.inner.remove_player_groups(player, groups).await
    }

    async fn add_group_permissions(
        &self,
        group: &str,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome> {
        self.hold_if_armed().await;
        self.inner.add_group_permissions(group, grants).await
    }

    async fn remove_group_permissions(
        &self,
        group: &str,
        permissions: &[String],
    ) -> Result<ApplyOutcome> {
        self.hold_if_armed().await;
        self.inner.remove_group_permissions(group, permissions).await
    }

    async fn create_group(&self, name: &str) -> Result<ApplyOutcome> {
        self.inner.create_group(name).await
    }

    async fn delete_group(&self, name: &str) -> Result<ApplyOutcome> {
        self.inner.delete_group(name).await
    }
}
