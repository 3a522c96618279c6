//! Proptest generators for property-based testing.
//!
//! Key alphabets are small on purpose so generated rows collide on keys
//! and exercise upserts, expiry changes and overlapping group grants.

use std::collections::BTreeMap;

use proptest::prelude::*;

use permsync_core::{
    GroupMembership, PermissionGrant, PermissionGroup, PermissionSnapshot, PlayerId, SnapshotScope,
};

/// "Now" used by generated row sets. Expiries are drawn around it.
pub const NOW: i64 = 1_000;

/// Generate a permission string.
pub fn permission() -> impl Strategy<Value = String> {
    "[a-d](\\.[a-c])?".prop_map(String::from)
}

/// Generate a group name.
pub fn group_name() -> impl Strategy<Value = String> {
    "g[0-3]".prop_map(String::from)
}

/// Generate an expiry: permanent, already expired, or in the future.
pub fn expiry() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        2 => Just(None),
        1 => (0i64..=NOW).prop_map(Some),
        2 => (NOW + 1..NOW * 2).prop_map(Some),
    ]
}

pub fn grant() -> impl Strategy<Value = PermissionGrant> {
    (permission(), expiry()).prop_map(|(permission, expires_at)| PermissionGrant {
        permission,
        expires_at,
    })
}

pub fn membership() -> impl Strategy<Value = GroupMembership> {
    (group_name(), expiry()).prop_map(|(group_name, expires_at)| GroupMembership {
        group_name,
        expires_at,
    })
}

/// Generate a group keyed by name.
pub fn groups() -> impl Strategy<Value = BTreeMap<String, PermissionGroup>> {
    prop::collection::btree_map(group_name(), prop::collection::vec(grant(), 0..4), 0..4).prop_map(
        |groups| {
            groups
                .into_iter()
                .map(|(name, permission_grants)| {
                    let group = PermissionGroup {
                        name: name.clone(),
                        permission_grants,
                    };
                    (name, group)
                })
                .collect()
        },
    )
}

/// Raw stored rows for one player, plus the group definitions they refer to.
#[derive(Debug, Clone)]
pub struct PlayerRows {
    pub direct: Vec<PermissionGrant>,
    pub memberships: Vec<GroupMembership>,
    pub groups: BTreeMap<String, PermissionGroup>,
}

impl PlayerRows {
    /// Full snapshot of these rows at `now`.
    pub fn snapshot(&self, player: PlayerId, now: i64) -> PermissionSnapshot {
        PermissionSnapshot::evaluate(
            player,
            SnapshotScope::FULL,
            &self.direct,
            &self.memberships,
            &self.groups,
            now,
        )
    }
}

impl Arbitrary for PlayerRows {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::collection::vec(grant(), 0..6),
            prop::collection::vec(membership(), 0..4),
            groups(),
        )
            .prop_map(|(direct, memberships, groups)| PlayerRows {
                direct,
                memberships,
                groups,
            })
            .boxed()
    }
}
