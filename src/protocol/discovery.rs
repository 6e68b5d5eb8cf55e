//! Discovery message family

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::{wire_options, LinkAddress, Role};
use crate::error::ProtocolError;

/// Encoded size of a discovery message
pub const DISCOVERY_FRAME_LEN: usize = 44;

/// Longest display name carried on the wire (the last byte is a NUL)
pub const MAX_NAME_LEN: usize = 31;

const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;

/// Discovery message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiscoveryKind {
    /// Periodic self-description
    Announce = 0x10,
    /// Ask the conductor for a part
    RoleRequest = 0x11,
    /// Conductor grants a part; `role` carries the granted part
    RoleAssign = 0x12,
    /// Ask every node to report in
    RollCall = 0x13,
    /// Unicast reply to a roll call
    Present = 0x14,
    /// Liveness ping from a performer
    Ready = 0x15,
}

impl DiscoveryKind {
    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        Ok(match byte {
            0x10 => DiscoveryKind::Announce,
            0x11 => DiscoveryKind::RoleRequest,
            0x12 => DiscoveryKind::RoleAssign,
            0x13 => DiscoveryKind::RollCall,
            0x14 => DiscoveryKind::Present,
            0x15 => DiscoveryKind::Ready,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// A decoded discovery message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMessage {
    pub kind: DiscoveryKind,
    /// Address the sender claims as its own
    pub sender: LinkAddress,
    /// Sender's believed role, or the granted role for `RoleAssign`
    pub role: Role,
    pub name: String,
    /// Sender's clock in milliseconds (wraps)
    pub timestamp_ms: u32,
}

/// On-wire layout
#[derive(Serialize, Deserialize)]
struct DiscoveryFrame {
    kind: u8,
    address: [u8; 6],
    role: u8,
    name: [u8; NAME_FIELD_LEN],
    timestamp_ms: u32,
}

impl DiscoveryMessage {
    pub fn new(
        kind: DiscoveryKind,
        sender: LinkAddress,
        role: Role,
        name: &str,
        timestamp_ms: u32,
    ) -> Self {
        Self {
            kind,
            sender,
            role,
            name: truncate_name(name).to_string(),
            timestamp_ms,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut name = [0u8; NAME_FIELD_LEN];
        let truncated = truncate_name(&self.name);
        name[..truncated.len()].copy_from_slice(truncated.as_bytes());

        let frame = DiscoveryFrame {
            kind: self.kind as u8,
            address: self.sender.octets(),
            role: self.role.to_wire(),
            name,
            timestamp_ms: self.timestamp_ms,
        };

        let bytes = wire_options()
            .serialize(&frame)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        debug_assert_eq!(bytes.len(), DISCOVERY_FRAME_LEN);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != DISCOVERY_FRAME_LEN {
            return Err(ProtocolError::WrongLength(bytes.len()));
        }

        let frame: DiscoveryFrame = wire_options()
            .deserialize(bytes)
            .map_err(|_| ProtocolError::WrongLength(bytes.len()))?;

        let kind = DiscoveryKind::from_wire(frame.kind)?;
        let role = Role::from_wire(frame.role)?;
        let end = frame
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN)
            .min(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&frame.name[..end]).into_owned();

        Ok(Self {
            kind,
            sender: LinkAddress::new(frame.address),
            role,
            name,
            timestamp_ms: frame.timestamp_ms,
        })
    }
}

/// Cut a name to at most `MAX_NAME_LEN` bytes on a char boundary
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: DiscoveryKind) -> DiscoveryMessage {
        DiscoveryMessage::new(
            kind,
            LinkAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02]),
            Role::Part(2),
            "node-Part2",
            0xDEAD_BEEF,
        )
    }

    #[test]
    fn test_frame_layout() {
        let bytes = sample(DiscoveryKind::Present).encode().unwrap();
        assert_eq!(bytes.len(), DISCOVERY_FRAME_LEN);
        assert_eq!(bytes[0], 0x14);
        assert_eq!(&bytes[1..7], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02]);
        assert_eq!(bytes[7], 2);
        assert_eq!(&bytes[8..18], b"node-Part2");
        assert!(bytes[18..40].iter().all(|&b| b == 0));
        assert_eq!(&bytes[40..44], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn test_decode_matches_encode() {
        let msg = sample(DiscoveryKind::RoleAssign);
        let decoded = DiscoveryMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = sample(DiscoveryKind::Announce).encode().unwrap();
        bytes[0] = 0x42;
        assert!(matches!(
            DiscoveryMessage::decode(&bytes),
            Err(ProtocolError::UnknownMessageType(0x42))
        ));
    }

    #[test]
    fn test_invalid_role_rejected() {
        let mut bytes = sample(DiscoveryKind::Announce).encode().unwrap();
        bytes[7] = 9;
        assert!(matches!(
            DiscoveryMessage::decode(&bytes),
            Err(ProtocolError::InvalidRole(9))
        ));
    }

    #[test]
    fn test_long_names_truncated() {
        let long = "a-very-long-display-name-that-keeps-going";
        let msg = DiscoveryMessage::new(
            DiscoveryKind::Announce,
            LinkAddress::new([2, 0, 0, 0, 0, 1]),
            Role::Unknown,
            long,
            0,
        );
        assert_eq!(msg.name.len(), MAX_NAME_LEN);

        let decoded = DiscoveryMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.name, &long[..MAX_NAME_LEN]);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let name = "ééééééééééééééééé"; // 34 bytes
        let cut = truncate_name(name);
        assert!(cut.len() <= MAX_NAME_LEN);
        assert_eq!(cut.chars().count(), 15);
    }
}
