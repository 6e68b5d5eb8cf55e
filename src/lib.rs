//! # Ensemble Sync
//!
//! Serverless coordination for a small ensemble of music nodes sharing a
//! lossy one-hop broadcast link: discovery, role assignment, conductor
//! clock estimation and synchronised start.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                 NODE                                     │
//! │                                                                          │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │        Transport (network::udp / network::memory)                  │  │
//! │  │        [dest|src|payload]  broadcast + unicast                     │  │
//! │  └──────────────────────────────┬────────────────────────────────────┘  │
//! │                                 │ receive callback (never blocks)        │
//! │                                 ▼                                        │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │        Dispatcher (network::dispatch)                              │  │
//! │  │        44 bytes -> discovery queue, 14 bytes -> control queue      │  │
//! │  └───────────────┬───────────────────────────────────┬───────────────┘  │
//! │                  │ bounded                           │ bounded          │
//! │                  ▼                                   ▼                  │
//! │  ┌───────────────────────────────┐   ┌───────────────────────────────┐  │
//! │  │ Discovery worker              │   │ Control worker                │  │
//! │  │  announce / assign / roll call│   │  heartbeat -> ClockEstimator  │  │
//! │  │  PeerTable (one lock)         │   │  SyncStart -> wait -> play    │  │
//! │  └───────────────┬───────────────┘   └───────────────┬───────────────┘  │
//! │                  │        LocalRole (one lock)       │                  │
//! │                  └─────────────────┬─────────────────┘                  │
//! │                                    ▼                                    │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │        Playback collaborator (audio, LEDs, display)                │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                                                          │
//! │  Conductor only: heartbeat broadcaster, ConductorControls                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod network;
pub mod node;
pub mod playback;
pub mod protocol;
pub mod role;
pub mod songs;
pub mod sync;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Largest payload the link carries in one frame
    pub const MAX_LINK_PAYLOAD: usize = 250;

    /// Default UDP port shared by every node
    pub const DEFAULT_UDP_PORT: u16 = 4210;

    /// Peers the link driver tracks by default
    pub const DEFAULT_MAX_LINK_PEERS: usize = 20;

    /// Default display name prefix
    pub const DEFAULT_NAME_PREFIX: &str = "node";

    /// Period of the discovery announce and timeout sweep
    pub const DEFAULT_ANNOUNCE_PERIOD_MS: u64 = 2000;

    /// Silence after which a peer is reported offline
    pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 10_000;

    /// Peer table capacity (the whole ensemble)
    pub const DEFAULT_PEER_CAPACITY: usize = 5;

    /// Depth of each per-family receive queue
    pub const DEFAULT_QUEUE_DEPTH: usize = 10;

    /// Conductor heartbeat period
    pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 500;

    /// Lead time between issuing a start and the target instant
    pub const DEFAULT_LEAD_TIME_MS: u64 = 200;

    /// Delay between the first announce and the role request
    pub const DEFAULT_ROLE_REQUEST_DELAY_MS: u64 = 100;

    /// Online peers needed besides ourselves for a full ensemble
    pub const FULL_ENSEMBLE_PEERS: usize = 4;
}
