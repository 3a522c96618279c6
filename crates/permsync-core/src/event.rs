//! Change events: the unit broadcast to consumers.

use serde::{Deserialize, Serialize};

use crate::delta::{Delta, DeltaEntry};
use crate::types::{EventId, PlayerId};

/// Reason strings attached to events.
///
/// Consumers only branch on `requires_full_refresh`; the reason is for logs
/// and diagnostics.
pub mod reason {
    pub const PLAYER_PERMISSION_ADD: &str = "player_permission_add";
    pub const PLAYER_PERMISSION_REMOVE: &str = "player_permission_remove";
    pub const PLAYER_GROUP_ADD: &str = "player_group_add";
    pub const PLAYER_GROUP_REMOVE: &str = "player_group_remove";
    pub const GROUP_PERMISSION_ADD: &str = "group_permission_add";
    pub const GROUP_PERMISSION_REMOVE: &str = "group_permission_remove";
    pub const GROUP_DELETE: &str = "group_delete";

    pub const EXPIRY: &str = "expiry";
    pub const STARTUP: &str = "startup";
    pub const SUBSCRIPTION_RESUME: &str = "subscription_resume";
}

/// A change to one player's permissions.
///
/// Either a delta event (`requires_full_refresh == false`, at least one
/// non-empty delta list) or a refresh signal (`requires_full_refresh ==
/// true`, every delta list empty). Refresh means "discard cached state and
/// re-fetch".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: EventId,
    pub player_id: PlayerId,
    /// When the event was emitted (Unix milliseconds).
    pub occurred_at: i64,
    pub reason: String,
    pub requires_full_refresh: bool,
    pub direct_permission_deltas: Vec<DeltaEntry>,
    pub group_membership_deltas: Vec<DeltaEntry>,
    pub effective_permission_deltas: Vec<DeltaEntry>,
}

impl ChangeEvent {
    /// A delta event carrying the entries of `delta`.
    pub fn from_delta(player_id: PlayerId, reason: &str, delta: Delta, occurred_at: i64) -> Self {
        Self {
            event_id: EventId::random(),
            player_id,
            occurred_at,
            reason: reason.to_string(),
            requires_full_refresh: false,
            direct_permission_deltas: delta.direct,
            group_membership_deltas: delta.groups,
            effective_permission_deltas: delta.effective,
        }
    }

    /// A full-refresh signal with no deltas.
    pub fn refresh(player_id: PlayerId, reason: &str, occurred_at: i64) -> Self {
        Self {
            event_id: EventId::random(),
            player_id,
            occurred_at,
            reason: reason.to_string(),
            requires_full_refresh: true,
            direct_permission_deltas: Vec::new(),
            group_membership_deltas: Vec::new(),
            effective_permission_deltas: Vec::new(),
        }
    }

    /// True if every delta list is empty.
    pub fn has_no_deltas(&self) -> bool {
        self.direct_permission_deltas.is_empty()
            && self.group_membership_deltas.is_empty()
            && self.effective_permission_deltas.is_empty()
    }

    /// Check the event shape: refreshes carry no deltas, deltas carry some.
    pub fn is_well_formed(&self) -> bool {
        self.requires_full_refresh == self.has_no_deltas()
    }
}
