//! Wire protocol shared by every node in the ensemble
//!
//! Two fixed-size message families travel over the broadcast link:
//!
//! ```text
//! Discovery (44 bytes)
//! ┌──────┬──────────────┬──────┬────────────────────┬──────────────┐
//! │ type │ address (6)  │ role │ display name (32)  │ ts ms (u32)  │
//! └──────┴──────────────┴──────┴────────────────────┴──────────────┘
//!
//! Control (14 bytes)
//! ┌──────┬─────────┬──────────────────┬───────────┬──────────┐
//! │ type │ song id │ ts µs (u64)      │ sender id │ reserved │
//! └──────┴─────────┴──────────────────┴───────────┴──────────┘
//! ```
//!
//! Neither family carries a length or version field. A receiver tells them
//! apart by the exact payload length, so any schema change needs the whole
//! fleet upgraded at once.

pub mod address;
pub mod control;
pub mod discovery;
pub mod role;

pub use address::LinkAddress;
pub use control::{ControlKind, ControlMessage, CONTROL_FRAME_LEN};
pub use discovery::{DiscoveryKind, DiscoveryMessage, DISCOVERY_FRAME_LEN, MAX_NAME_LEN};
pub use role::Role;

use bincode::Options;

use crate::error::ProtocolError;

/// A decoded payload, tagged by message family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Discovery(DiscoveryMessage),
    Control(ControlMessage),
}

/// Decode a received payload, picking the family from its length alone.
pub fn decode_payload(bytes: &[u8]) -> Result<Inbound, ProtocolError> {
    match bytes.len() {
        DISCOVERY_FRAME_LEN => DiscoveryMessage::decode(bytes).map(Inbound::Discovery),
        CONTROL_FRAME_LEN => ControlMessage::decode(bytes).map(Inbound::Control),
        other => Err(ProtocolError::WrongLength(other)),
    }
}

/// Largest payload either family produces
pub const MAX_PAYLOAD_LEN: usize = if DISCOVERY_FRAME_LEN > CONTROL_FRAME_LEN {
    DISCOVERY_FRAME_LEN
} else {
    CONTROL_FRAME_LEN
};

/// Fixed-int little-endian options: every field has a constant width.
pub(crate) fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families_have_distinct_lengths() {
        assert_ne!(DISCOVERY_FRAME_LEN, CONTROL_FRAME_LEN);
        assert_eq!(MAX_PAYLOAD_LEN, DISCOVERY_FRAME_LEN);
    }

    #[test]
    fn test_decode_dispatches_by_length() {
        let control = ControlMessage::new(ControlKind::SyncStop, 2, 99, Role::Conductor);
        let bytes = control.encode().unwrap();
        assert_eq!(decode_payload(&bytes).unwrap(), Inbound::Control(control));

        let announce = DiscoveryMessage::new(
            DiscoveryKind::Announce,
            LinkAddress::new([2, 0, 0, 0, 0, 7]),
            Role::Unknown,
            "node-Unknown",
            1234,
        );
        let bytes = announce.encode().unwrap();
        assert_eq!(decode_payload(&bytes).unwrap(), Inbound::Discovery(announce));
    }

    #[test]
    fn test_foreign_lengths_rejected() {
        for len in [0usize, 1, 13, 15, 43, 45, 200] {
            let bytes = vec![0u8; len];
            assert!(matches!(
                decode_payload(&bytes),
                Err(ProtocolError::WrongLength(l)) if l == len
            ));
        }
    }
}
