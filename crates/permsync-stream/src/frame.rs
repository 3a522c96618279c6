//! Wire frames for the outbound event stream.
//!
//! Transport adapters send each [`ChangeEvent`] as one CBOR-encoded
//! [`EventFrame`]. The version byte lets consumers reject frames they do not
//! understand instead of misreading them.

use serde::{Deserialize, Serialize};

use permsync_core::ChangeEvent;

use crate::error::{Result, StreamError};

/// Current frame version.
pub const FRAME_VERSION: u8 = 1;

/// A versioned event on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    pub version: u8,
    pub event: ChangeEvent,
}

impl EventFrame {
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            version: FRAME_VERSION,
            event,
        }
    }

    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| StreamError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR, rejecting other versions.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame: EventFrame =
            ciborium::from_reader(bytes).map_err(|e| StreamError::Decode(e.to_string()))?;
        if frame.version != FRAME_VERSION {
            return Err(StreamError::VersionMismatch {
                local: FRAME_VERSION,
                peer: frame.version,
            });
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_core::{reason, Delta, DeltaEntry, PlayerId};

    #[test]
    fn test_frame_preserves_delta_event() {
        let delta = Delta {
            direct: vec![DeltaEntry::add("build", Some(60_000))],
            groups: vec![DeltaEntry::remove("vip"), DeltaEntry::add("vip", None)],
            effective: vec![DeltaEntry::add("build", None)],
        };
        let event =
            ChangeEvent::from_delta(PlayerId::random(), reason::PLAYER_PERMISSION_ADD, delta, 42);
        let frame = EventFrame::new(event.clone());

        let decoded = EventFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn test_frame_rejects_unknown_version() {
        let mut frame =
            EventFrame::new(ChangeEvent::refresh(PlayerId::random(), reason::EXPIRY, 0));
        frame.version = FRAME_VERSION + 1;

        let err = EventFrame::decode(&frame.encode().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            StreamError::VersionMismatch { peer, .. } if peer == FRAME_VERSION + 1
        ));
    }

    #[test]
    fn test_frame_rejects_garbage() {
        assert!(matches!(
            EventFrame::decode(&[0xff, 0x00, 0x13]),
            Err(StreamError::Decode(_))
        ));
    }
}
