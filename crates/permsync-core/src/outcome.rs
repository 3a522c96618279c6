//! Outcome of a state-changing admin operation.

use serde::{Deserialize, Serialize};

/// What a write actually did to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyOutcome {
    /// Nothing changed (idempotent repeat).
    NoChange,
    /// At least one new row was inserted.
    Created,
    /// Existing rows changed (expiry replaced) and none were inserted.
    Updated,
    /// At least one row was deleted.
    Deleted,
    /// The write failed.
    Error,
}

impl ApplyOutcome {
    /// Whether change events should follow this outcome.
    pub fn emits_events(self) -> bool {
        match self {
            ApplyOutcome::Created | ApplyOutcome::Updated | ApplyOutcome::Deleted => true,
            ApplyOutcome::NoChange | ApplyOutcome::Error => false,
        }
    }

    /// Outcome of an upsert batch.
    pub fn for_upsert(inserted: usize, updated: usize) -> Self {
        if inserted > 0 {
            ApplyOutcome::Created
        } else if updated > 0 {
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::NoChange
        }
    }

    /// Outcome of a delete batch.
    pub fn for_delete(deleted: usize) -> Self {
        if deleted > 0 {
            ApplyOutcome::Deleted
        } else {
            ApplyOutcome::NoChange
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::NoChange => "NO_CHANGE",
            ApplyOutcome::Created => "CREATED",
            ApplyOutcome::Updated => "UPDATED",
            ApplyOutcome::Deleted => "DELETED",
            ApplyOutcome::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
