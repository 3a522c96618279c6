//! Change emitter: turns snapshot pairs and refresh signals into events.

use std::sync::Arc;

use permsync_core::{
    diff_optional, ChangeEvent, Clock, DeltaDimensions, EventId, PermissionSnapshot, PlayerId,
};

use crate::broadcast::Broadcaster;

/// What an emit call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// A delta event was published.
    Delta { event_id: EventId, delivered: usize },
    /// A full-refresh event was published.
    Refresh { event_id: EventId, delivered: usize },
    /// Nothing changed; no event.
    Skipped,
}

impl Emission {
    pub fn is_published(&self) -> bool {
        !matches!(self, Emission::Skipped)
    }
}

/// Builds change events and hands them to the broadcaster.
///
/// Every event gets a fresh id and the emitter clock's current time.
/// Publishing never waits for subscribers.
#[derive(Clone)]
pub struct ChangeEmitter {
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
}

impl ChangeEmitter {
    pub fn new(broadcaster: Broadcaster, clock: Arc<dyn Clock>) -> Self {
        Self { broadcaster, clock }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Emit a delta over direct grants, memberships and effective permissions.
    pub fn emit_player_delta(
        &self,
        player_id: PlayerId,
        reason: &str,
        before: Option<&PermissionSnapshot>,
        after: Option<&PermissionSnapshot>,
    ) -> Emission {
        self.emit_delta(player_id, reason, before, after, DeltaDimensions::ALL)
    }

    /// Emit a delta over effective permissions only.
    pub fn emit_effective_delta(
        &self,
        player_id: PlayerId,
        reason: &str,
        before: Option<&PermissionSnapshot>,
        after: Option<&PermissionSnapshot>,
    ) -> Emission {
        self.emit_delta(player_id, reason, before, after, DeltaDimensions::EFFECTIVE_ONLY)
    }

    /// Emit a delta for the requested dimensions.
    ///
    /// A missing snapshot degrades to [`emit_refresh`](Self::emit_refresh).
    /// An empty delta emits nothing.
    pub fn emit_delta(
        &self,
        player_id: PlayerId,
        reason: &str,
        before: Option<&PermissionSnapshot>,
        after: Option<&PermissionSnapshot>,
        dims: DeltaDimensions,
    ) -> Emission {
        let Some(delta) = diff_optional(before, after, dims) else {
            tracing::debug!(%player_id, reason, "snapshot missing, falling back to refresh");
            return self.emit_refresh(player_id, reason);
        };

        if delta.is_empty() {
            tracing::debug!(%player_id, reason, "event skipped (reason=no_deltas)");
            return Emission::Skipped;
        }

        let event = ChangeEvent::from_delta(player_id, reason, delta, self.clock.now_millis());
        let delivered = self.broadcaster.publish(&event);
        tracing::info!(
            %player_id,
            reason,
            event_id = %event.event_id,
            direct = event.direct_permission_deltas.len(),
            groups = event.group_membership_deltas.len(),
            effective = event.effective_permission_deltas.len(),
            delivered,
            "delta event published"
        );
        Emission::Delta {
            event_id: event.event_id,
            delivered,
        }
    }

    /// Emit a full-refresh signal with no deltas.
    pub fn emit_refresh(&self, player_id: PlayerId, reason: &str) -> Emission {
        let event = ChangeEvent::refresh(player_id, reason, self.clock.now_millis());
        let delivered = self.broadcaster.publish(&event);
        tracing::info!(
            %player_id,
            reason,
            event_id = %event.event_id,
            delivered,
            "refresh event published"
        );
        Emission::Refresh {
            event_id: event.event_id,
            delivered,
        }
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}
