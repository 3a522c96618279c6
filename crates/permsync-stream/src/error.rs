//! Error types for the stream module.

use thiserror::Error;

/// Errors that can occur while framing events for transport.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Frame version mismatch with the peer.
    #[error("frame version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    /// CBOR encoding failed.
    #[error("encoding error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decoding error: {0}")]
    Decode(String),
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
