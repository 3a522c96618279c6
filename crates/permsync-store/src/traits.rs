//! Store trait: the abstract interface for permission persistence.
//!
//! The engine reads and writes permission state only through this trait.
//! Implementations include SQLite (primary) and in-memory (for tests).

use std::collections::BTreeSet;

use async_trait::async_trait;
use permsync_core::{ApplyOutcome, GroupMembership, PermissionGrant, PermissionGroup, PlayerId};

use crate::error::Result;

/// The PermissionStore trait: async interface for permission persistence.
///
/// # Design Notes
///
/// - **Expiry at read time**: reads taking `now` return only rows active at
///   `now` (no expiry, or `expires_at > now`). Expired rows stay on disk and
///   are found by the window queries.
/// - **Windows**: `since` is exclusive, `until` inclusive.
/// - **Upserts**: re-adding an existing key replaces its expiry.
/// - **Outcomes**: writes report what they changed, see [`ApplyOutcome`].
///   Failed writes return `Err`, never `ApplyOutcome::Error`.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Player reads
    // ─────────────────────────────────────────────────────────────────────────

    /// A player's direct grants active at `now`.
    async fn player_direct_grants(
        &self,
        player: PlayerId,
        now: i64,
    ) -> Result<Vec<PermissionGrant>>;

    /// A player's memberships active at `now`.
    async fn player_memberships(&self, player: PlayerId, now: i64) -> Result<Vec<GroupMembership>>;

    /// Permissions a player inherits at `now`: active grants of every group
    /// they are an active member of.
    async fn group_grants_for_player(&self, player: PlayerId, now: i64) -> Result<BTreeSet<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Group reads
    // ─────────────────────────────────────────────────────────────────────────

    /// A group with its grants active at `now`, if the group exists.
    async fn group(&self, name: &str, now: i64) -> Result<Option<PermissionGroup>>;

    /// Every group with its grants active at `now`, ordered by name.
    async fn list_groups(&self, now: i64) -> Result<Vec<PermissionGroup>>;

    /// Players whose membership in `group` is active at `now`.
    async fn active_players_for_group(&self, group: &str, now: i64) -> Result<BTreeSet<PlayerId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Player enumeration (scanner and resume)
    // ─────────────────────────────────────────────────────────────────────────

    /// Players holding any direct grant or membership row, expired or not.
    async fn players_with_any_rows(&self) -> Result<BTreeSet<PlayerId>>;

    /// Players holding at least one direct grant or membership active at `now`.
    async fn players_with_active_rows(&self, now: i64) -> Result<BTreeSet<PlayerId>>;

    /// Players with a direct grant that expired in `(since, until]`.
    async fn players_with_expired_direct_grants(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>>;

    /// Players with a membership that expired in `(since, until]`.
    async fn players_with_expired_memberships(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>>;

    /// Groups with a grant that expired in `(since, until]`.
    async fn groups_with_expired_grants(&self, since: i64, until: i64) -> Result<BTreeSet<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert direct grants for a player.
    async fn add_player_permissions(
        &self,
        player: PlayerId,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome>;

    /// Delete direct grants for a player by permission.
    async fn remove_player_permissions(
        &self,
        player: PlayerId,
        permissions: &[String],
    ) -> Result<ApplyOutcome>;

    /// Upsert memberships for a player. Every group must exist.
    async fn add_player_groups(
        &self,
        player: PlayerId,
        memberships: &[GroupMembership],
    ) -> Result<ApplyOutcome>;

    /// Delete memberships for a player by group name.
    async fn remove_player_groups(
        &self,
        player: PlayerId,
        groups: &[String],
    ) -> Result<ApplyOutcome>;

    /// Upsert grants for a group. The group must exist.
    async fn add_group_permissions(
        &self,
        group: &str,
        grants: &[PermissionGrant],
    ) -> Result<ApplyOutcome>;

    /// Delete grants from a group by permission.
    async fn remove_group_permissions(
        &self,
        group: &str,
        permissions: &[String],
    ) -> Result<ApplyOutcome>;

    /// Create an empty group. `NoChange` if it already exists.
    async fn create_group(&self, name: &str) -> Result<ApplyOutcome>;

    /// Delete a group with its grants and memberships. `NoChange` if absent.
    async fn delete_group(&self, name: &str) -> Result<ApplyOutcome>;
}

/// Extension methods composed from the core trait.
pub trait PermissionStoreExt: PermissionStore {
    /// Players with a direct grant or membership that expired in `(since, until]`.
    fn players_with_expired_rows(
        &self,
        since: i64,
        until: i64,
    ) -> impl std::future::Future<Output = Result<BTreeSet<PlayerId>>> + Send;
}

impl<S: PermissionStore + ?Sized> PermissionStoreExt for S {
    async fn players_with_expired_rows(
        &self,
        since: i64,
        until: i64,
    ) -> Result<BTreeSet<PlayerId>> {
        let mut players = self.players_with_expired_direct_grants(since, until).await?;
        players.extend(self.players_with_expired_memberships(since, until).await?);
        Ok(players)
    }
}
