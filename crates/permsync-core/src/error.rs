//! Error types for permsync core.

use thiserror::Error;

/// Errors parsing identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid player id: {0}")]
    InvalidPlayerId(String),

    #[error("invalid event id: {0}")]
    InvalidEventId(String),
}

/// Rejections of admin input. Raised before any storage access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("player_id must be a UUID (got {0:?})")]
    InvalidPlayerId(String),

    #[error("{0} must be provided")]
    Missing(&'static str),

    #[error("expires_at must be in the future (key {key}, expires_at {expires_at}, now {now})")]
    PastExpiry { key: String, expires_at: i64, now: i64 },
}
