//! # Permsync Core
//!
//! Pure values for permission change propagation: grants, group memberships,
//! player snapshots, change events, and the delta engine that turns a
//! before/after snapshot pair into a minimal list of ADD/REMOVE entries.
//!
//! This crate contains no storage and no networking. Time enters only
//! through the [`Clock`] trait.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - UUID of a player
//! - [`PermissionGrant`] / [`GroupMembership`] - optionally time-bounded rows
//! - [`PermissionSnapshot`] - a player's active grants, memberships and effective set
//! - [`Delta`] / [`DeltaEntry`] - what changed between two snapshots
//! - [`ChangeEvent`] - the unit broadcast to consumers
//! - [`ApplyOutcome`] - result of a state-changing admin operation
//!
//! ## Expiry
//!
//! All timestamps are Unix milliseconds. A row is active at `now` iff it has
//! no expiry or `expires_at > now`.

pub mod clock;
pub mod delta;
pub mod error;
pub mod event;
pub mod grant;
pub mod outcome;
pub mod snapshot;
pub mod types;
pub mod validation;

pub use clock::{Clock, SystemClock};
pub use delta::{
    apply_entries, diff, diff_entries, diff_optional, Delta, DeltaAction, DeltaDimensions,
    DeltaEntry,
};
pub use error::{CoreError, ValidationError};
pub use event::{reason, ChangeEvent};
pub use grant::{GroupMembership, PermissionGrant, PermissionGroup};
pub use outcome::ApplyOutcome;
pub use snapshot::{inherited_permissions, PermissionSnapshot, SnapshotScope};
pub use types::{EventId, PlayerId};
pub use validation::{
    parse_player_id, reject_past_expiry, require_group_name, require_permission,
    sanitize_grants, sanitize_memberships, sanitize_names,
};
