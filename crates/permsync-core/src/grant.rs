//! Permission grants, group memberships and group definitions.
//!
//! A grant is held directly by a player or by a group; a membership links a
//! player to a group. Both are keyed by name per subject and may carry an
//! expiry. Re-granting the same key replaces the expiry.

use serde::{Deserialize, Serialize};

/// A permission held directly by a player or by a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// The permission node, e.g. `"world.build"`.
    pub permission: String,

    /// When the grant expires (Unix milliseconds). `None` never expires.
    pub expires_at: Option<i64>,
}

impl PermissionGrant {
    /// A grant that never expires.
    pub fn permanent(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            expires_at: None,
        }
    }

    /// A grant that expires at `expires_at`.
    pub fn until(permission: impl Into<String>, expires_at: i64) -> Self {
        Self {
            permission: permission.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Check if the grant is active at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        is_active(self.expires_at, now)
    }

    /// Check if the grant expired inside `(since, until]`.
    pub fn expired_within(&self, since: i64, until: i64) -> bool {
        expired_within(self.expires_at, since, until)
    }
}

/// A player's membership in a named group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupMembership {
    /// The group name.
    pub group_name: String,

    /// When the membership expires (Unix milliseconds). `None` never expires.
    pub expires_at: Option<i64>,
}

impl GroupMembership {
    /// A membership that never expires.
    pub fn permanent(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            expires_at: None,
        }
    }

    /// A membership that expires at `expires_at`.
    pub fn until(group_name: impl Into<String>, expires_at: i64) -> Self {
        Self {
            group_name: group_name.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Check if the membership is active at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        is_active(self.expires_at, now)
    }

    /// Check if the membership expired inside `(since, until]`.
    pub fn expired_within(&self, since: i64, until: i64) -> bool {
        expired_within(self.expires_at, since, until)
    }
}

/// A named group and the permissions it grants to its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    pub name: String,
    pub permission_grants: Vec<PermissionGrant>,
}

impl PermissionGroup {
    /// A group with no grants.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permission_grants: Vec::new(),
        }
    }

    /// Grants of this group that are active at `now`.
    pub fn active_grants(&self, now: i64) -> impl Iterator<Item = &PermissionGrant> {
        self.permission_grants.iter().filter(move |g| g.is_active(now))
    }
}

/// `expires_at` is active at `now` iff it is unset or strictly in the future.
pub fn is_active(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expires) => expires > now,
        None => true,
    }
}

/// `expires_at` falls in the half-open window `(since, until]`.
pub fn expired_within(expires_at: Option<i64>, since: i64, until: i64) -> bool {
    match expires_at {
        Some(expires) => since < expires && expires <= until,
        None => false,
    }
}
