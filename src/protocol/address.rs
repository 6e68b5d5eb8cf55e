//! Hardware-style link addresses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Six-byte link address, unique per physical node.
///
/// Equality is byte-exact; the all-ones address is reserved for broadcast.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LinkAddress([u8; 6]);

impl LinkAddress {
    /// Width of an address on the wire
    pub const LEN: usize = 6;

    /// Broadcast destination
    pub const BROADCAST: LinkAddress = LinkAddress([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Generate a random locally-administered unicast address
    pub fn random() -> Self {
        let id = uuid::Uuid::new_v4();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&id.as_bytes()[..6]);
        // locally administered, unicast
        octets[0] = (octets[0] | 0x02) & 0xFE;
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddress({})", self)
    }
}

impl FromStr for LinkAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ProtocolError::InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(ProtocolError::InvalidAddress(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ProtocolError::InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(ProtocolError::InvalidAddress(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for LinkAddress {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LinkAddress> for String {
    fn from(address: LinkAddress) -> Self {
        address.to_string()
    }
}

impl From<[u8; 6]> for LinkAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: LinkAddress = "aa:bb:cc:dd:ee:01".parse().unwrap();
        assert_eq!(addr.octets(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:01");

        let dashed: LinkAddress = "AA-BB-CC-DD-EE-01".parse().unwrap();
        assert_eq!(addr, dashed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("AA:BB:CC:DD:EE".parse::<LinkAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:01:02".parse::<LinkAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:ZZ".parse::<LinkAddress>().is_err());
        assert!("AAB:B:CC:DD:EE:01".parse::<LinkAddress>().is_err());
    }

    #[test]
    fn test_random_is_local_unicast() {
        for _ in 0..32 {
            let addr = LinkAddress::random();
            assert_eq!(addr.octets()[0] & 0x01, 0);
            assert_eq!(addr.octets()[0] & 0x02, 0x02);
            assert!(!addr.is_broadcast());
        }
    }

    #[test]
    fn test_serde_as_string() {
        let addr = LinkAddress::new([0x02, 0, 0, 0, 0, 0x10]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"02:00:00:00:00:10\"");
        let back: LinkAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
