//! The delta engine: what changed between two snapshots.
//!
//! Each dimension is diffed by a stable key (permission string for grants,
//! group name for memberships):
//!
//! - key only in `before` → REMOVE
//! - key only in `after` → ADD carrying the new expiry
//! - key in both, expiry differs → REMOVE followed by ADD
//! - key in both, same expiry → nothing
//!
//! Expiry is part of an entry's identity for change tracking, so consumers
//! never see a partial update. A REMOVE/ADD pair for one key is always
//! emitted together.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::PermissionSnapshot;

/// Action of a single delta entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaAction {
    Add,
    Remove,
}

/// One changed key in one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub action: DeltaAction,
    pub key: String,
    /// Expiry carried by ADD entries. Always `None` on REMOVE.
    pub expires_at: Option<i64>,
}

impl DeltaEntry {
    pub fn add(key: impl Into<String>, expires_at: Option<i64>) -> Self {
        Self {
            action: DeltaAction::Add,
            key: key.into(),
            expires_at,
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            action: DeltaAction::Remove,
            key: key.into(),
            expires_at: None,
        }
    }

    pub fn is_add(&self) -> bool {
        self.action == DeltaAction::Add
    }
}

/// Which optional dimensions to diff. Effective permissions are always diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaDimensions {
    pub direct: bool,
    pub groups: bool,
}

impl DeltaDimensions {
    /// Direct grants, memberships and effective permissions.
    pub const ALL: Self = Self {
        direct: true,
        groups: true,
    };

    /// Effective permissions only. Used for group-scoped mutations, where a
    /// member's own rows did not change.
    pub const EFFECTIVE_ONLY: Self = Self {
        direct: false,
        groups: false,
    };
}

/// Per-dimension change lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub direct: Vec<DeltaEntry>,
    pub groups: Vec<DeltaEntry>,
    pub effective: Vec<DeltaEntry>,
}

impl Delta {
    /// No observable change in any dimension.
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.groups.is_empty() && self.effective.is_empty()
    }
}

/// Diff two keyed collections of `(key, expires_at)`.
pub fn diff_entries<'a>(
    before: impl IntoIterator<Item = (&'a str, Option<i64>)>,
    after: impl IntoIterator<Item = (&'a str, Option<i64>)>,
) -> Vec<DeltaEntry> {
    let before: BTreeMap<&str, Option<i64>> = before.into_iter().collect();
    let after: BTreeMap<&str, Option<i64>> = after.into_iter().collect();
    let mut entries = Vec::new();

    for (key, expires_at) in &before {
        match after.get(key) {
            None => entries.push(DeltaEntry::remove(*key)),
            Some(new_expiry) if new_expiry != expires_at => {
                entries.push(DeltaEntry::remove(*key));
                entries.push(DeltaEntry::add(*key, *new_expiry));
            }
            Some(_) => {}
        }
    }

    for (key, expires_at) in &after {
        if !before.contains_key(key) {
            entries.push(DeltaEntry::add(*key, *expires_at));
        }
    }

    entries
}

/// Diff two snapshots of the same player.
pub fn diff(
    before: &PermissionSnapshot,
    after: &PermissionSnapshot,
    dims: DeltaDimensions,
) -> Delta {
    let direct = if dims.direct {
        diff_entries(
            before
                .direct_grants
                .iter()
                .map(|g| (g.permission.as_str(), g.expires_at)),
            after
                .direct_grants
                .iter()
                .map(|g| (g.permission.as_str(), g.expires_at)),
        )
    } else {
        Vec::new()
    };

    let groups = if dims.groups {
        diff_entries(
            before
                .group_memberships
                .iter()
                .map(|m| (m.group_name.as_str(), m.expires_at)),
            after
                .group_memberships
                .iter()
                .map(|m| (m.group_name.as_str(), m.expires_at)),
        )
    } else {
        Vec::new()
    };

    let effective = diff_entries(
        before.effective_permissions.iter().map(|p| (p.as_str(), None)),
        after.effective_permissions.iter().map(|p| (p.as_str(), None)),
    );

    Delta {
        direct,
        groups,
        effective,
    }
}

/// Diff a pair of possibly missing snapshots.
///
/// Returns `None` when either side is missing: a delta is never computed
/// from incomplete data, the caller must fall back to a full refresh.
pub fn diff_optional(
    before: Option<&PermissionSnapshot>,
    after: Option<&PermissionSnapshot>,
    dims: DeltaDimensions,
) -> Option<Delta> {
    match (before, after) {
        (Some(before), Some(after)) => Some(diff(before, after, dims)),
        _ => None,
    }
}

/// Apply delta entries to a consumer-side keyed cache.
///
/// Entries are applied as a set: every REMOVE first, then every ADD
/// (insert-or-replace). This keeps a REMOVE/ADD pair for one key correct
/// regardless of the order the entries arrived in.
pub fn apply_entries(state: &mut BTreeMap<String, Option<i64>>, entries: &[DeltaEntry]) {
    for entry in entries.iter().filter(|e| !e.is_add()) {
        state.remove(&entry.key);
    }
    for entry in entries.iter().filter(|e| e.is_add()) {
        state.insert(entry.key.clone(), entry.expires_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::{GroupMembership, PermissionGrant};
    use crate::types::PlayerId;

    fn snapshot(
        direct: &[PermissionGrant],
        groups: &[GroupMembership],
        effective: &[&str],
    ) -> PermissionSnapshot {
        PermissionSnapshot {
            player_id: PlayerId::from_bytes([7; 16]),
            group_memberships: groups.iter().cloned().collect(),
            direct_grants: direct.iter().cloned().collect(),
            effective_permissions: effective.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_grant_produces_direct_and_effective_add() {
        let before = snapshot(&[PermissionGrant::permanent("fly")], &[], &["fly"]);
        let after = snapshot(
            &[
                PermissionGrant::permanent("fly"),
                PermissionGrant::until("build", 60_000),
            ],
            &[],
            &["build", "fly"],
        );

        let delta = diff(&before, &after, DeltaDimensions::ALL);
        assert_eq!(delta.direct, vec![DeltaEntry::add("build", Some(60_000))]);
        assert_eq!(delta.effective, vec![DeltaEntry::add("build", None)]);
        assert!(delta.groups.is_empty());
    }

    #[test]
    fn test_expiry_change_is_remove_then_add() {
        let before = snapshot(&[], &[GroupMembership::until("vip", 10)], &[]);
        let after = snapshot(&[], &[GroupMembership::until("vip", 20)], &[]);

        let delta = diff(&before, &after, DeltaDimensions::ALL);
        assert_eq!(
            delta.groups,
            vec![DeltaEntry::remove("vip"), DeltaEntry::add("vip", Some(20))]
        );
        assert!(delta.effective.is_empty());
    }

    #[test]
    fn test_removal_only_in_before() {
        let before = snapshot(&[PermissionGrant::permanent("fly")], &[], &["fly"]);
        let after = snapshot(&[], &[], &[]);

        let delta = diff(&before, &after, DeltaDimensions::ALL);
        assert_eq!(delta.direct, vec![DeltaEntry::remove("fly")]);
        assert_eq!(delta.effective, vec![DeltaEntry::remove("fly")]);
    }

    #[test]
    fn test_effective_only_dimensions_skip_rows() {
        let before = snapshot(&[PermissionGrant::permanent("fly")], &[], &["fly"]);
        let after = snapshot(&[], &[], &[]);

        let delta = diff(&before, &after, DeltaDimensions::EFFECTIVE_ONLY);
        assert!(delta.direct.is_empty());
        assert_eq!(delta.effective, vec![DeltaEntry::remove("fly")]);
    }

    #[test]
    fn test_identical_snapshots_are_silent() {
        let s = snapshot(
            &[PermissionGrant::until("fly", 5)],
            &[GroupMembership::permanent("admins")],
            &["ban", "fly"],
        );
        assert!(diff(&s, &s, DeltaDimensions::ALL).is_empty());
    }

    #[test]
    fn test_missing_snapshot_yields_no_delta() {
        let s = snapshot(&[], &[], &[]);
        assert!(diff_optional(None, Some(&s), DeltaDimensions::ALL).is_none());
        assert!(diff_optional(Some(&s), None, DeltaDimensions::ALL).is_none());
        assert!(diff_optional(Some(&s), Some(&s), DeltaDimensions::ALL).is_some());
    }

    #[test]
    fn test_apply_entries_is_order_insensitive_for_pairs() {
        let mut state: BTreeMap<String, Option<i64>> = BTreeMap::new();
        state.insert("vip".into(), Some(10));

        // ADD listed before REMOVE must still leave the new expiry.
        apply_entries(
            &mut state,
            &[DeltaEntry::add("vip", Some(20)), DeltaEntry::remove("vip")],
        );
        assert_eq!(state.get("vip"), Some(&Some(20)));
    }

    #[test]
    fn test_action_serializes_upper_case() {
        let json = serde_json::to_string(&DeltaEntry::remove("fly")).unwrap();
        assert!(json.contains("\"REMOVE\""));
    }
}
