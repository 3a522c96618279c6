//! Strong identifier types.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// A player identifier (UUID).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Build from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Generate a random (v4) player id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlayerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| CoreError::InvalidPlayerId(s.to_string()))
    }
}

impl From<Uuid> for PlayerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A 16-byte random identifier for a change event.
///
/// Events are ephemeral; the id only lets consumers deduplicate and
/// correlate log lines.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub [u8; 16]);

impl EventId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random event id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidEventId(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidEventId(format!("expected 16 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_parse_and_display() {
        let raw = "6f1c2b9e-3d4a-4c5b-8e7f-0a1b2c3d4e5f";
        let id: PlayerId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);

        let padded: PlayerId = format!("  {raw} ").parse().unwrap();
        assert_eq!(padded, id);
    }

    #[test]
    fn test_player_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<PlayerId>().is_err());
        assert!("".parse::<PlayerId>().is_err());
    }

    #[test]
    fn test_event_id_hex_roundtrip() {
        let id = EventId::from_bytes([0x42; 16]);
        let recovered = EventId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
        assert!(EventId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(EventId::random(), EventId::random());
    }
}
