//! In-process broadcast medium
//!
//! Every transport attached to the same [`MemoryMedium`] shares one
//! broadcast domain. Delivery is synchronous on the sender's thread, which
//! is fine because receive handlers never block. A link can be taken down
//! to simulate radio loss: frames to or from it vanish silently.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{check_payload, ReceiveHandler, Transport, TransportStats, TransportStatsSnapshot};
use crate::error::NetworkError;
use crate::protocol::LinkAddress;

/// Default driver peer limit reported by memory transports
pub const MEMORY_MAX_PEERS: usize = 20;

struct Endpoint {
    address: LinkAddress,
    handler: Mutex<Option<ReceiveHandler>>,
    link_up: AtomicBool,
    stats: TransportStats,
}

/// Shared broadcast domain
#[derive(Default)]
pub struct MemoryMedium {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
}

impl MemoryMedium {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a new node to the medium
    pub fn attach(self: &Arc<Self>, address: LinkAddress) -> MemoryTransport {
        let endpoint = Arc::new(Endpoint {
            address,
            handler: Mutex::new(None),
            link_up: AtomicBool::new(true),
            stats: TransportStats::default(),
        });
        self.endpoints.write().push(Arc::clone(&endpoint));

        MemoryTransport {
            medium: Arc::clone(self),
            endpoint,
            max_peers: MEMORY_MAX_PEERS,
        }
    }

    /// Bring a node's link up or down
    pub fn set_link_up(&self, address: LinkAddress, up: bool) {
        for endpoint in self.endpoints.read().iter() {
            if endpoint.address == address {
                endpoint.link_up.store(up, Ordering::SeqCst);
            }
        }
    }

    fn deliver(&self, from: &Endpoint, dest: Option<LinkAddress>, payload: &[u8]) {
        if !from.link_up.load(Ordering::SeqCst) {
            return;
        }

        // Collect first so no lock is held while handlers run
        let targets: Vec<Arc<Endpoint>> = self
            .endpoints
            .read()
            .iter()
            .filter(|e| e.address != from.address)
            .filter(|e| dest.map_or(true, |d| e.address == d))
            .cloned()
            .collect();

        for target in targets {
            if !target.link_up.load(Ordering::SeqCst) {
                continue;
            }
            let handler = target.handler.lock().clone();
            if let Some(handler) = handler {
                target.stats.record_received();
                handler(from.address, payload);
            }
        }
    }
}

/// One node's view of a [`MemoryMedium`]
pub struct MemoryTransport {
    medium: Arc<MemoryMedium>,
    endpoint: Arc<Endpoint>,
    max_peers: usize,
}

impl MemoryTransport {
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }
}

impl Transport for MemoryTransport {
    fn local_address(&self) -> LinkAddress {
        self.endpoint.address
    }

    fn max_peers(&self) -> usize {
        self.max_peers
    }

    fn broadcast(&self, payload: &[u8]) -> Result<(), NetworkError> {
        check_payload(payload)?;
        self.endpoint.stats.record_sent();
        self.medium.deliver(&self.endpoint, None, payload);
        Ok(())
    }

    fn unicast(&self, dest: LinkAddress, payload: &[u8]) -> Result<(), NetworkError> {
        check_payload(payload)?;
        self.endpoint.stats.record_sent();
        self.medium.deliver(&self.endpoint, Some(dest), payload);
        Ok(())
    }

    fn register_receiver(&self, handler: ReceiveHandler) -> Result<(), NetworkError> {
        let mut slot = self.endpoint.handler.lock();
        if slot.is_some() {
            return Err(NetworkError::HandlerAlreadySet);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn stats(&self) -> TransportStatsSnapshot {
        self.endpoint.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> LinkAddress {
        LinkAddress::new([0x02, 0, 0, 0, 0, n])
    }

    fn recorder() -> (ReceiveHandler, Arc<Mutex<Vec<(LinkAddress, Vec<u8>)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let handler: ReceiveHandler = Arc::new(move |from, bytes: &[u8]| {
            sink.lock().push((from, bytes.to_vec()));
        });
        (handler, log)
    }

    #[test]
    fn test_broadcast_reaches_everyone_but_sender() {
        let medium = MemoryMedium::new();
        let a = medium.attach(addr(1));
        let b = medium.attach(addr(2));
        let c = medium.attach(addr(3));

        let (ha, la) = recorder();
        let (hb, lb) = recorder();
        let (hc, lc) = recorder();
        a.register_receiver(ha).unwrap();
        b.register_receiver(hb).unwrap();
        c.register_receiver(hc).unwrap();

        a.broadcast(b"hello").unwrap();

        assert!(la.lock().is_empty());
        assert_eq!(lb.lock().as_slice(), &[(addr(1), b"hello".to_vec())]);
        assert_eq!(lc.lock().len(), 1);
    }

    #[test]
    fn test_unicast_reaches_only_destination() {
        let medium = MemoryMedium::new();
        let a = medium.attach(addr(1));
        let b = medium.attach(addr(2));
        let c = medium.attach(addr(3));

        let (hb, lb) = recorder();
        let (hc, lc) = recorder();
        b.register_receiver(hb).unwrap();
        c.register_receiver(hc).unwrap();

        a.unicast(addr(3), b"psst").unwrap();
        assert!(lb.lock().is_empty());
        assert_eq!(lc.lock().len(), 1);
    }

    #[test]
    fn test_link_down_loses_frames() {
        let medium = MemoryMedium::new();
        let a = medium.attach(addr(1));
        let b = medium.attach(addr(2));
        let (hb, lb) = recorder();
        b.register_receiver(hb).unwrap();

        medium.set_link_up(addr(2), false);
        a.broadcast(b"lost").unwrap();
        assert!(lb.lock().is_empty());

        medium.set_link_up(addr(2), true);
        a.broadcast(b"found").unwrap();
        assert_eq!(lb.lock().len(), 1);
    }

    #[test]
    fn test_single_handler() {
        let medium = MemoryMedium::new();
        let a = medium.attach(addr(1));
        let (h1, _) = recorder();
        let (h2, _) = recorder();
        a.register_receiver(h1).unwrap();
        assert!(matches!(a.register_receiver(h2), Err(NetworkError::HandlerAlreadySet)));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let medium = MemoryMedium::new();
        let a = medium.attach(addr(1));
        let big = vec![0u8; crate::constants::MAX_LINK_PAYLOAD + 1];
        assert!(matches!(a.broadcast(&big), Err(NetworkError::PayloadTooLarge(_))));
    }
}
