//! The engine: unified API for permission change propagation.
//!
//! Every state-changing admin operation runs the same cycle:
//! capture before → apply the write → capture after → emit. Player-scoped
//! writes diff one player over every dimension. Group-scoped writes diff
//! every active member of the group over effective permissions only;
//! players who join the group while the write is in flight get a full
//! refresh instead.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use permsync_core::{
    reason, reject_past_expiry, require_group_name, require_permission, sanitize_grants,
    sanitize_memberships, sanitize_names, ApplyOutcome, Clock, DeltaDimensions, GroupMembership,
    PermissionGrant, PermissionGroup, PermissionSnapshot, PlayerId, SnapshotScope, SystemClock,
};
use permsync_store::{PermissionStore, Result as StoreResult};
use permsync_stream::{Broadcaster, ChangeEmitter, Subscription};
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::locks::{PlayerGuards, PlayerLocks};
use crate::reader::SnapshotReader;
use crate::scanner::ExpiryScanner;

/// The main engine struct.
///
/// Provides a unified API for:
/// - Admin mutations of direct grants, memberships and group grants
/// - Group administration
/// - Permission queries
/// - Event stream subscriptions
/// - Building the expiry scanner
pub struct PermissionEngine<S: PermissionStore> {
    store: Arc<S>,
    reader: SnapshotReader<S>,
    emitter: ChangeEmitter,
    clock: Arc<dyn Clock>,
    locks: Option<Arc<PlayerLocks>>,
    config: EngineConfig,
}

impl<S: PermissionStore + 'static> PermissionEngine<S> {
    /// Create an engine on the system clock.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create an engine reading time from `clock`.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let store = Arc::new(store);
        let broadcaster = Broadcaster::new(config.broadcast.clone());
        let locks = config
            .serialize_player_mutations
            .then(|| Arc::new(PlayerLocks::new()));
        Self {
            reader: SnapshotReader::new(Arc::clone(&store)),
            emitter: ChangeEmitter::new(broadcaster, Arc::clone(&clock)),
            store,
            clock,
            locks,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        self.emitter.broadcaster()
    }

    pub fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build an expiry scanner sharing this engine's store, clock and stream.
    pub fn expiry_scanner(&self) -> ExpiryScanner<S> {
        ExpiryScanner::new(
            Arc::clone(&self.store),
            self.emitter.clone(),
            Arc::clone(&self.clock),
            self.config.scanner.clone(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Player-scoped mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant permissions directly to a player.
    pub async fn add_player_permissions(
        &self,
        player: PlayerId,
        grants: impl IntoIterator<Item = PermissionGrant>,
    ) -> Result<ApplyOutcome> {
        let grants = sanitize_grants(grants)?;
        reject_past_expiry(
            grants.iter().map(|g| (g.permission.as_str(), g.expires_at)),
            self.clock.now_millis(),
        )?;

        self.mutate_player(
            player,
            reason::PLAYER_PERMISSION_ADD,
            self.store.add_player_permissions(player, &grants),
        )
        .await
    }

    /// Revoke direct permissions from a player.
    pub async fn remove_player_permissions(
        &self,
        player: PlayerId,
        permissions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<ApplyOutcome> {
        let permissions = sanitize_names(permissions, "permissions")?;

        self.mutate_player(
            player,
            reason::PLAYER_PERMISSION_REMOVE,
            self.store.remove_player_permissions(player, &permissions),
        )
        .await
    }

    /// Add a player to groups.
    pub async fn add_player_groups(
        &self,
        player: PlayerId,
        memberships: impl IntoIterator<Item = GroupMembership>,
    ) -> Result<ApplyOutcome> {
        let memberships = sanitize_memberships(memberships)?;
        reject_past_expiry(
            memberships.iter().map(|m| (m.group_name.as_str(), m.expires_at)),
            self.clock.now_millis(),
        )?;

        self.mutate_player(
            player,
            reason::PLAYER_GROUP_ADD,
            self.store.add_player_groups(player, &memberships),
        )
        .await
    }

    /// Remove a player from groups.
    pub async fn remove_player_groups(
        &self,
        player: PlayerId,
        groups: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<ApplyOutcome> {
        let groups = sanitize_names(groups, "group_names")?;

        self.mutate_player(
            player,
            reason::PLAYER_GROUP_REMOVE,
            self.store.remove_player_groups(player, &groups),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group-scoped mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant permissions to a group. Active members receive effective deltas.
    pub async fn add_group_permissions(
        &self,
        group: &str,
        grants: impl IntoIterator<Item = PermissionGrant>,
    ) -> Result<ApplyOutcome> {
        let group = require_group_name(group)?;
        let grants = sanitize_grants(grants)?;
        reject_past_expiry(
            grants.iter().map(|g| (g.permission.as_str(), g.expires_at)),
            self.clock.now_millis(),
        )?;

        self.mutate_group(
            &group,
            reason::GROUP_PERMISSION_ADD,
            DeltaDimensions::EFFECTIVE_ONLY,
            self.store.add_group_permissions(&group, &grants),
        )
        .await
    }

    /// Revoke permissions from a group. Active members receive effective deltas.
    pub async fn remove_group_permissions(
        &self,
        group: &str,
        permissions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<ApplyOutcome> {
        let group = require_group_name(group)?;
        let permissions = sanitize_names(permissions, "permissions")?;

        self.mutate_group(
            &group,
            reason::GROUP_PERMISSION_REMOVE,
            DeltaDimensions::EFFECTIVE_ONLY,
            self.store.remove_group_permissions(&group, &permissions),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an empty group. No player is affected, so nothing is emitted.
    pub async fn create_group(&self, name: &str) -> Result<ApplyOutcome> {
        let name = require_group_name(name)?;
        let outcome = self.apply("group_create", self.store.create_group(&name)).await?;
        tracing::info!(group = %name, %outcome, "create group completed");
        Ok(outcome)
    }

    /// Delete a group with its grants and memberships.
    ///
    /// Former active members lose a membership and possibly permissions, so
    /// each receives a delta over every dimension.
    pub async fn delete_group(&self, name: &str) -> Result<ApplyOutcome> {
        let name = require_group_name(name)?;
        self.mutate_group(
            &name,
            reason::GROUP_DELETE,
            DeltaDimensions::ALL,
            self.store.delete_group(&name),
        )
        .await
    }

    /// A group with its active grants.
    pub async fn get_group(&self, name: &str) -> Result<Option<PermissionGroup>> {
        let name = require_group_name(name)?;
        Ok(self.store.group(&name, self.clock.now_millis()).await?)
    }

    /// Every group, optionally without grants.
    pub async fn list_groups(&self, include_permissions: bool) -> Result<Vec<PermissionGroup>> {
        let mut groups = self.store.list_groups(self.clock.now_millis()).await?;
        if !include_permissions {
            for group in &mut groups {
                group.permission_grants.clear();
            }
        }
        Ok(groups)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// A player's current permissions. Consumers call this after a
    /// full-refresh event.
    pub async fn player_permissions(
        &self,
        player: PlayerId,
        scope: SnapshotScope,
    ) -> Result<PermissionSnapshot> {
        Ok(self.reader.read(player, scope, self.clock.now_millis()).await?)
    }

    /// Check a permission against the player's active effective set.
    pub async fn check_permission(&self, player: PlayerId, permission: &str) -> Result<bool> {
        let permission = require_permission(permission)?;
        let snapshot = self
            .reader
            .read(player, SnapshotScope::new(true, false, false), self.clock.now_millis())
            .await?;
        Ok(snapshot.has_permission(&permission))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a consumer to the event stream.
    ///
    /// A non-blank `last_event_id` means the consumer may have missed events.
    /// No log is kept to replay from, so every player with active rows gets
    /// a full-refresh event instead. The subscriber is attached first and
    /// receives those refreshes.
    pub async fn subscribe(
        &self,
        server_id: &str,
        last_event_id: Option<&str>,
    ) -> Result<Subscription> {
        let subscription = self.broadcaster().subscribe(server_id.trim());

        let resume_from = last_event_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(last_event_id) = resume_from {
            let players = self.store.players_with_active_rows(self.clock.now_millis()).await?;
            for player in &players {
                self.emitter.emit_refresh(*player, reason::SUBSCRIPTION_RESUME);
            }
            tracing::info!(
                server_id,
                last_event_id,
                refreshed = players.len(),
                "subscriber resumed, active players refreshed"
            );
        } else {
            tracing::info!(server_id, "subscriber attached");
        }

        Ok(subscription)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Orchestration
    // ─────────────────────────────────────────────────────────────────────────

    async fn mutate_player(
        &self,
        player: PlayerId,
        reason: &str,
        write: impl Future<Output = StoreResult<ApplyOutcome>>,
    ) -> Result<ApplyOutcome> {
        let _guards = self.lock([player]).await;

        let before = self.capture(player).await;
        let outcome = self.apply(reason, write).await?;

        if outcome.emits_events() {
            let after = self.capture(player).await;
            self.emitter
                .emit_player_delta(player, reason, before.as_ref(), after.as_ref());
        }

        tracing::info!(%player, reason, %outcome, "player mutation completed");
        Ok(outcome)
    }

    async fn mutate_group(
        &self,
        group: &str,
        reason: &str,
        dims: DeltaDimensions,
        write: impl Future<Output = StoreResult<ApplyOutcome>>,
    ) -> Result<ApplyOutcome> {
        let members = self
            .store
            .active_players_for_group(group, self.clock.now_millis())
            .await?;
        let _guards = self.lock(members.iter().copied()).await;

        let before = self.capture_all(&members).await;
        let outcome = self.apply(reason, write).await?;

        if !outcome.emits_events() {
            tracing::info!(group, reason, %outcome, affected = 0, "group mutation completed");
            return Ok(outcome);
        }

        let mut published = 0;
        if !members.is_empty() {
            let after = self.capture_all(&members).await;
            for player in &members {
                let emission = self.emitter.emit_delta(
                    *player,
                    reason,
                    before.get(player).and_then(Option::as_ref),
                    after.get(player).and_then(Option::as_ref),
                    dims,
                );
                if emission.is_published() {
                    published += 1;
                }
            }
        }

        let late = self.refresh_late_joiners(group, reason, &members).await;

        tracing::info!(
            group,
            reason,
            %outcome,
            affected = members.len(),
            published,
            late,
            "group mutation completed"
        );
        Ok(outcome)
    }

    /// Refresh players who joined `group` after its members were read.
    ///
    /// Their own membership delta was captured before this write landed.
    /// Returns the number refreshed.
    async fn refresh_late_joiners(
        &self,
        group: &str,
        reason: &str,
        members: &BTreeSet<PlayerId>,
    ) -> usize {
        let current = match self
            .store
            .active_players_for_group(group, self.clock.now_millis())
            .await
        {
            Ok(current) => current,
            Err(err) => {
                tracing::warn!(
                    group,
                    error = %err,
                    "member re-read failed, late joiners not refreshed"
                );
                return 0;
            }
        };

        let late: Vec<PlayerId> = current.difference(members).copied().collect();
        for player in &late {
            tracing::debug!(group, %player, "member joined during group write");
            self.emitter.emit_refresh(*player, reason);
        }
        late.len()
    }

    /// Run a write. Failures are the `Error` outcome: logged, nothing
    /// emitted, surfaced to the caller.
    async fn apply(
        &self,
        operation: &str,
        write: impl Future<Output = StoreResult<ApplyOutcome>>,
    ) -> Result<ApplyOutcome> {
        match write.await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(
                    operation,
                    outcome = %ApplyOutcome::Error,
                    error = %err,
                    "write failed, no event emitted"
                );
                Err(err.into())
            }
        }
    }

    /// Capture a full snapshot. A failed read yields `None`, which the
    /// emitter turns into a full refresh.
    async fn capture(&self, player: PlayerId) -> Option<PermissionSnapshot> {
        match self.reader.read_full(player, self.clock.now_millis()).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(%player, error = %err, "snapshot capture failed");
                None
            }
        }
    }

    /// Capture snapshots for many players concurrently. Every read finishes
    /// before this returns.
    async fn capture_all(
        &self,
        players: &BTreeSet<PlayerId>,
    ) -> BTreeMap<PlayerId, Option<PermissionSnapshot>> {
        let now = self.clock.now_millis();
        let mut tasks = JoinSet::new();
        for &player in players {
            let reader = self.reader.clone();
            tasks.spawn(async move { (player, reader.read_full(player, now).await) });
        }

        let mut snapshots = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((player, Ok(snapshot))) => {
                    snapshots.insert(player, Some(snapshot));
                }
                Ok((player, Err(err))) => {
                    tracing::warn!(%player, error = %err, "snapshot capture failed");
                    snapshots.insert(player, None);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "snapshot capture task failed");
                }
            }
        }
        snapshots
    }

    async fn lock(&self, players: impl IntoIterator<Item = PlayerId>) -> PlayerGuards {
        match &self.locks {
            Some(locks) => locks.lock_all(players).await,
            None => PlayerGuards::default(),
        }
    }
}
