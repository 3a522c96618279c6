//! Error types for the engine.

use permsync_core::ValidationError;
use permsync_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any storage access.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error. No event was emitted.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for rejected input, as opposed to an internal failure.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
