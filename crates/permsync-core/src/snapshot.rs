//! Player permission snapshots.
//!
//! A snapshot is the value a player's permissions have at one instant: their
//! active direct grants, their active group memberships, and the effective
//! permission set derived from both. Snapshots are immutable and recomputed
//! on demand; nothing about them is persisted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grant::{GroupMembership, PermissionGrant, PermissionGroup};
use crate::types::PlayerId;

/// Which dimensions of a snapshot the caller wants returned.
///
/// The flags control what is returned, not what is loaded: computing the
/// effective set always needs both direct grants and group-derived grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotScope {
    pub effective: bool,
    pub direct: bool,
    pub groups: bool,
}

impl SnapshotScope {
    /// Every dimension. Used for before/after capture around mutations.
    pub const FULL: Self = Self {
        effective: true,
        direct: true,
        groups: true,
    };

    pub const fn new(effective: bool, direct: bool, groups: bool) -> Self {
        Self {
            effective,
            direct,
            groups,
        }
    }

    /// Direct grants must be read from the store.
    pub fn loads_direct(&self) -> bool {
        self.direct || self.effective
    }
}

impl Default for SnapshotScope {
    fn default() -> Self {
        Self::FULL
    }
}

/// A player's permission state at one instant.
///
/// Invariant: `effective_permissions` is the union of the direct grant
/// permissions and the grants of every group the player is an active member
/// of, all evaluated at the same `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    pub player_id: PlayerId,
    pub group_memberships: BTreeSet<GroupMembership>,
    pub direct_grants: BTreeSet<PermissionGrant>,
    pub effective_permissions: BTreeSet<String>,
}

impl PermissionSnapshot {
    /// A snapshot for a player with no rows.
    pub fn empty(player_id: PlayerId) -> Self {
        Self {
            player_id,
            group_memberships: BTreeSet::new(),
            direct_grants: BTreeSet::new(),
            effective_permissions: BTreeSet::new(),
        }
    }

    /// Build a snapshot from rows loaded out of a store.
    ///
    /// `inherited` holds the permissions granted through the player's active
    /// memberships. Rows inactive at `now` are dropped; duplicate keys keep
    /// the last row seen.
    pub fn assemble(
        player_id: PlayerId,
        scope: SnapshotScope,
        direct: impl IntoIterator<Item = PermissionGrant>,
        memberships: impl IntoIterator<Item = GroupMembership>,
        inherited: impl IntoIterator<Item = String>,
        now: i64,
    ) -> Self {
        let direct: BTreeMap<String, Option<i64>> = direct
            .into_iter()
            .filter(|g| g.is_active(now))
            .map(|g| (g.permission, g.expires_at))
            .collect();

        let memberships: BTreeMap<String, Option<i64>> = memberships
            .into_iter()
            .filter(|m| m.is_active(now))
            .map(|m| (m.group_name, m.expires_at))
            .collect();

        let effective_permissions = if scope.effective {
            direct.keys().cloned().chain(inherited).collect()
        } else {
            BTreeSet::new()
        };

        let direct_grants = if scope.direct {
            direct
                .into_iter()
                .map(|(permission, expires_at)| PermissionGrant {
                    permission,
                    expires_at,
                })
                .collect()
        } else {
            BTreeSet::new()
        };

        let group_memberships = if scope.groups {
            memberships
                .into_iter()
                .map(|(group_name, expires_at)| GroupMembership {
                    group_name,
                    expires_at,
                })
                .collect()
        } else {
            BTreeSet::new()
        };

        Self {
            player_id,
            group_memberships,
            direct_grants,
            effective_permissions,
        }
    }

    /// Evaluate a snapshot from raw rows and full group definitions.
    pub fn evaluate(
        player_id: PlayerId,
        scope: SnapshotScope,
        direct: &[PermissionGrant],
        memberships: &[GroupMembership],
        groups: &BTreeMap<String, PermissionGroup>,
        now: i64,
    ) -> Self {
        let inherited = inherited_permissions(memberships, groups, now);
        Self::assemble(
            player_id,
            scope,
            direct.iter().cloned(),
            memberships.iter().cloned(),
            inherited,
            now,
        )
    }

    /// True if no dimension holds anything.
    pub fn is_empty(&self) -> bool {
        self.group_memberships.is_empty()
            && self.direct_grants.is_empty()
            && self.effective_permissions.is_empty()
    }

    /// Check the effective set for a permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.effective_permissions.contains(permission)
    }

    /// Permission strings of the direct grants.
    pub fn direct_permissions(&self) -> impl Iterator<Item = &str> {
        self.direct_grants.iter().map(|g| g.permission.as_str())
    }

    /// Names of the groups the player is an active member of.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.group_memberships.iter().map(|m| m.group_name.as_str())
    }
}

/// Permissions a player inherits through memberships active at `now`.
///
/// Only grants active at `now` contribute. Memberships naming an unknown
/// group contribute nothing.
pub fn inherited_permissions<'a>(
    memberships: impl IntoIterator<Item = &'a GroupMembership>,
    groups: &BTreeMap<String, PermissionGroup>,
    now: i64,
) -> BTreeSet<String> {
    memberships
        .into_iter()
        .filter(|m| m.is_active(now))
        .filter_map(|m| groups.get(&m.group_name))
        .flat_map(|group| group.active_grants(now))
        .map(|g| g.permission.clone())
        .collect()
}
