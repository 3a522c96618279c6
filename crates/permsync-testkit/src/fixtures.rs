//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a controllable clock, seeding
//! helpers, and a model consumer cache that applies events the way a game
//! server would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};

use permsync_core::{
    apply_entries, ChangeEvent, Clock, PermissionGrant, PermissionSnapshot, PlayerId,
};
use permsync_store::{PermissionStore, Result};
use permsync_stream::Subscription;

/// Fixed instant used as "now" by fixtures: 2026-01-14T12:00:00Z.
pub const T0: i64 = 1_768_392_000_000;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `millis` and return the new time.
    pub fn advance(&self, millis: i64) -> i64 {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(T0)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Deterministic player id for index `n`.
pub fn player(n: u8) -> PlayerId {
    let mut bytes = [0u8; 16];
    bytes[15] = n;
    // Version 4, RFC 4122 variant.
    bytes[6] = 0x40;
    bytes[8] = 0x80;
    PlayerId::from_bytes(bytes)
}

/// Create `name` with permanent grants for each permission.
pub async fn seed_group<S: PermissionStore + ?Sized>(
    store: &S,
    name: &str,
    permissions: &[&str],
) -> Result<()> {
    store.create_group(name).await?;
    if !permissions.is_empty() {
        let grants: Vec<PermissionGrant> = permissions
            .iter()
            .map(|p| PermissionGrant::permanent(*p))
            .collect();
        store.add_group_permissions(name, &grants).await?;
    }
    Ok(())
}

/// Take every event queued on `subscription`.
pub fn drain(subscription: &mut Subscription) -> Vec<ChangeEvent> {
    subscription.drain()
}

/// Events in `events` addressed to `player`.
pub fn events_for(events: &[ChangeEvent], player: PlayerId) -> Vec<&ChangeEvent> {
    events.iter().filter(|e| e.player_id == player).collect()
}

/// One player's cached state on the consumer side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedPlayer {
    pub direct: BTreeMap<String, Option<i64>>,
    pub groups: BTreeMap<String, Option<i64>>,
    pub effective: BTreeSet<String>,
}

impl CachedPlayer {
    pub fn from_snapshot(snapshot: &PermissionSnapshot) -> Self {
        Self {
            direct: snapshot
                .direct_grants
                .iter()
                .map(|g| (g.permission.clone(), g.expires_at))
                .collect(),
            groups: snapshot
                .group_memberships
                .iter()
                .map(|m| (m.group_name.clone(), m.expires_at))
                .collect(),
            effective: snapshot.effective_permissions.clone(),
        }
    }
}

/// A model of a game server's permission cache.
///
/// Delta events are applied in place. Refresh events mark the player
/// stale until the test loads a fresh snapshot.
#[derive(Debug, Default)]
pub struct ConsumerCache {
    players: BTreeMap<PlayerId, CachedPlayer>,
    stale: BTreeSet<PlayerId>,
}

impl ConsumerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a player's cached state with a fetched snapshot.
    pub fn load(&mut self, snapshot: &PermissionSnapshot) {
        self.players
            .insert(snapshot.player_id, CachedPlayer::from_snapshot(snapshot));
        self.stale.remove(&snapshot.player_id);
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &ChangeEvent) {
        if event.requires_full_refresh {
            self.stale.insert(event.player_id);
            return;
        }

        let cached = self.players.entry(event.player_id).or_default();
        apply_entries(&mut cached.direct, &event.direct_permission_deltas);
        apply_entries(&mut cached.groups, &event.group_membership_deltas);

        let mut effective: BTreeMap<String, Option<i64>> =
            cached.effective.iter().map(|p| (p.clone(), None)).collect();
        apply_entries(&mut effective, &event.effective_permission_deltas);
        cached.effective = effective.into_keys().collect();
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a ChangeEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    pub fn get(&self, player: PlayerId) -> Option<&CachedPlayer> {
        self.players.get(&player)
    }

    /// Players that received a refresh and have not been reloaded.
    pub fn stale(&self) -> &BTreeSet<PlayerId> {
        &self.stale
    }
}
