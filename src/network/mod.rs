//! Link layer: connectionless broadcast/unicast transports
//!
//! A transport moves opaque payloads between link addresses. Received
//! payloads are handed to a registered callback together with the sender's
//! address; the callback must return quickly and never block.

pub mod dispatch;
pub mod memory;
#[cfg(feature = "udp")]
pub mod udp;

pub use dispatch::{DispatchQueues, DispatchStats, Dispatcher, Envelope};
pub use memory::{MemoryMedium, MemoryTransport};
#[cfg(feature = "udp")]
pub use udp::UdpTransport;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::NetworkError;
use crate::protocol::LinkAddress;

/// Callback invoked for every received payload
pub type ReceiveHandler = Arc<dyn Fn(LinkAddress, &[u8]) + Send + Sync>;

/// Connectionless send/receive primitive
pub trait Transport: Send + Sync {
    /// This node's own link address
    fn local_address(&self) -> LinkAddress;

    /// Peers the underlying driver can track
    fn max_peers(&self) -> usize;

    fn broadcast(&self, payload: &[u8]) -> Result<(), NetworkError>;

    fn unicast(&self, dest: LinkAddress, payload: &[u8]) -> Result<(), NetworkError>;

    /// Install the receive callback. Only one may be registered.
    fn register_receiver(&self, handler: ReceiveHandler) -> Result<(), NetworkError>;

    fn stats(&self) -> TransportStatsSnapshot;
}

/// Counters shared by transport implementations
#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicU64,
    send_failures: AtomicU64,
    received: AtomicU64,
    filtered: AtomicU64,
}

impl TransportStats {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    pub sent: u64,
    pub send_failures: u64,
    pub received: u64,
    pub filtered: u64,
}

/// Reject payloads the link cannot carry in one frame
pub(crate) fn check_payload(payload: &[u8]) -> Result<(), NetworkError> {
    if payload.len() > crate::constants::MAX_LINK_PAYLOAD {
        return Err(NetworkError::PayloadTooLarge(payload.len()));
    }
    Ok(())
}
