//! Control message family

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::{wire_options, Role};
use crate::error::ProtocolError;

/// Encoded size of a control message
pub const CONTROL_FRAME_LEN: usize = 14;

/// Control message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlKind {
    /// Start a song at the conductor-clock instant in `timestamp_us`
    SyncStart = 0,
    SyncStop = 1,
    SongSelect = 2,
    /// Conductor clock reading in `timestamp_us`
    Heartbeat = 3,
}

impl ControlKind {
    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        Ok(match byte {
            0 => ControlKind::SyncStart,
            1 => ControlKind::SyncStop,
            2 => ControlKind::SongSelect,
            3 => ControlKind::Heartbeat,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// A decoded control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: ControlKind,
    pub song_id: u8,
    /// Microseconds on the sender's clock
    pub timestamp_us: u64,
    /// Wire encoding of the sender's role
    pub sender_id: u8,
}

#[derive(Serialize, Deserialize)]
struct ControlFrame {
    kind: u8,
    song_id: u8,
    timestamp_us: u64,
    sender_id: u8,
    reserved: [u8; 3],
}

impl ControlMessage {
    pub fn new(kind: ControlKind, song_id: u8, timestamp_us: u64, sender: Role) -> Self {
        Self {
            kind,
            song_id,
            timestamp_us,
            sender_id: sender.to_wire(),
        }
    }

    /// Decoded sender role, if the id is valid
    pub fn sender_role(&self) -> Option<Role> {
        Role::from_wire(self.sender_id).ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let frame = ControlFrame {
            kind: self.kind as u8,
            song_id: self.song_id,
            timestamp_us: self.timestamp_us,
            sender_id: self.sender_id,
            reserved: [0; 3],
        };

        let bytes = wire_options()
            .serialize(&frame)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        debug_assert_eq!(bytes.len(), CONTROL_FRAME_LEN);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != CONTROL_FRAME_LEN {
            return Err(ProtocolError::WrongLength(bytes.len()));
        }

        let frame: ControlFrame = wire_options()
            .deserialize(bytes)
            .map_err(|_| ProtocolError::WrongLength(bytes.len()))?;

        Ok(Self {
            kind: ControlKind::from_wire(frame.kind)?,
            song_id: frame.song_id,
            timestamp_us: frame.timestamp_us,
            sender_id: frame.sender_id,
        })
    }
}
