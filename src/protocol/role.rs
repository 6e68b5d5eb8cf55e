//! Node roles and their wire encoding

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, RoleError};

/// Role held by a node in the ensemble.
///
/// Exactly one node is the conductor; each part is held by at most one
/// performer. `Unknown` is the transient state before assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Conductor,
    Part(u8),
    Unknown,
}

impl Role {
    /// Number of performer parts
    pub const PART_COUNT: u8 = 4;

    const WIRE_CONDUCTOR: u8 = 0;
    const WIRE_UNKNOWN: u8 = 0xFF;

    /// Build a performer role, validating the part number
    pub fn part(number: u8) -> Result<Self, RoleError> {
        if (1..=Self::PART_COUNT).contains(&number) {
            Ok(Role::Part(number))
        } else {
            Err(RoleError::PartOutOfRange(number))
        }
    }

    /// All performer roles in ascending order
    pub fn parts() -> impl Iterator<Item = Role> {
        (1..=Self::PART_COUNT).map(Role::Part)
    }

    pub fn is_conductor(self) -> bool {
        self == Role::Conductor
    }

    pub fn is_unknown(self) -> bool {
        self == Role::Unknown
    }

    pub fn part_number(self) -> Option<u8> {
        match self {
            Role::Part(n) if (1..=Self::PART_COUNT).contains(&n) => Some(n),
            _ => None,
        }
    }

    /// Bit for this part in a song's participation mask (`Part(n)` -> bit `n-1`)
    pub fn part_bit(self) -> Option<u8> {
        self.part_number().map(|n| 1u8 << (n - 1))
    }

    /// Integer encoding used in both message families (`Conductor = 0`).
    /// A part outside `1..=PART_COUNT` encodes as unknown.
    pub fn to_wire(self) -> u8 {
        match self {
            Role::Conductor => Self::WIRE_CONDUCTOR,
            Role::Part(_) => self.part_number().unwrap_or(Self::WIRE_UNKNOWN),
            Role::Unknown => Self::WIRE_UNKNOWN,
        }
    }

    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            Self::WIRE_CONDUCTOR => Ok(Role::Conductor),
            Self::WIRE_UNKNOWN => Ok(Role::Unknown),
            n if (1..=Self::PART_COUNT).contains(&n) => Ok(Role::Part(n)),
            other => Err(ProtocolError::InvalidRole(other)),
        }
    }

    /// Human-readable name, used for display names and logs
    pub fn name(self) -> &'static str {
        match self {
            Role::Conductor => "Conductor",
            Role::Part(1) => "Part1",
            Role::Part(2) => "Part2",
            Role::Part(3) => "Part3",
            Role::Part(4) => "Part4",
            Role::Part(_) | Role::Unknown => "Unknown",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "conductor" => Ok(Role::Conductor),
            "unknown" => Ok(Role::Unknown),
            other => {
                let digits = other
                    .strip_prefix("part")
                    .map(|rest| rest.trim_start_matches(|c| c == ' ' || c == '_' || c == '-'))
                    .ok_or_else(|| RoleError::NotAPart(s.to_string()))?;
                let number: u8 = digits
                    .parse()
                    .map_err(|_| RoleError::NotAPart(s.to_string()))?;
                Role::part(number)
            }
        }
    }
}

impl TryFrom<String> for Role {
    type Error = RoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.name().to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_encoding() {
        assert_eq!(Role::Conductor.to_wire(), 0);
        assert_eq!(Role::Part(3).to_wire(), 3);
        assert_eq!(Role::Unknown.to_wire(), 0xFF);

        for role in [Role::Conductor, Role::Unknown].into_iter().chain(Role::parts()) {
            assert_eq!(Role::from_wire(role.to_wire()).unwrap(), role);
        }

        assert!(Role::from_wire(5).is_err());
        assert!(Role::from_wire(0x80).is_err());
    }

    #[test]
    fn test_out_of_range_part_encodes_unknown() {
        for n in [0, 5, 0x7F] {
            assert_eq!(Role::Part(n).to_wire(), 0xFF);
            assert_eq!(Role::from_wire(Role::Part(n).to_wire()).unwrap(), Role::Unknown);
        }
    }

    #[test]
    fn test_part_bits() {
        assert_eq!(Role::Part(1).part_bit(), Some(0x01));
        assert_eq!(Role::Part(4).part_bit(), Some(0x08));
        assert_eq!(Role::Conductor.part_bit(), None);
        assert_eq!(Role::Unknown.part_bit(), None);
        assert_eq!(Role::Part(9).part_bit(), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("conductor".parse::<Role>().unwrap(), Role::Conductor);
        assert_eq!("Part2".parse::<Role>().unwrap(), Role::Part(2));
        assert_eq!("part 4".parse::<Role>().unwrap(), Role::Part(4));
        assert_eq!("part5".parse::<Role>(), Err(RoleError::PartOutOfRange(5)));
        assert!("violin".parse::<Role>().is_err());
    }

    #[test]
    fn test_parts_ascending() {
        let parts: Vec<Role> = Role::parts().collect();
        assert_eq!(parts, vec![Role::Part(1), Role::Part(2), Role::Part(3), Role::Part(4)]);
    }
}
