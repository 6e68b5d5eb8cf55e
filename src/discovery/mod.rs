//! Peer discovery and role assignment

pub mod engine;
pub mod peer_table;

pub use engine::{DiscoveryEngine, DiscoverySettings};
pub use peer_table::{PeerRecord, PeerStatus, PeerTable, Upsert};
