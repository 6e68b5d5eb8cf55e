//! Receive-path demultiplexer
//!
//! Runs inside the transport's receive callback. It only decodes the fixed
//! frame and pushes it onto the bounded queue for its family; a full queue
//! drops the message. Nothing here blocks or touches shared node state.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::ReceiveHandler;
use crate::clock::LocalClock;
use crate::protocol::{decode_payload, ControlMessage, DiscoveryMessage, Inbound, LinkAddress};

/// A received message with its link-level source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    /// Address the frame came from
    pub from: LinkAddress,
    /// Local clock when the frame arrived
    pub received_us: u64,
    pub message: T,
}

/// Dispatcher counters
#[derive(Debug, Default)]
struct Counters {
    discovery: AtomicU64,
    control: AtomicU64,
    malformed: AtomicU64,
    queue_full: AtomicU64,
}

/// Point-in-time dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub discovery_enqueued: u64,
    pub control_enqueued: u64,
    pub discarded_malformed: u64,
    pub dropped_queue_full: u64,
}

/// Receive callback target feeding the per-family queues
pub struct Dispatcher {
    discovery_tx: Sender<Envelope<DiscoveryMessage>>,
    control_tx: Sender<Envelope<ControlMessage>>,
    clock: LocalClock,
    counters: Counters,
}

/// Consumer ends handed to the workers
pub struct DispatchQueues {
    pub discovery: Receiver<Envelope<DiscoveryMessage>>,
    pub control: Receiver<Envelope<ControlMessage>>,
}

impl Dispatcher {
    pub fn new(
        discovery_depth: usize,
        control_depth: usize,
        clock: LocalClock,
    ) -> (Arc<Self>, DispatchQueues) {
        let (discovery_tx, discovery_rx) = bounded(discovery_depth);
        let (control_tx, control_rx) = bounded(control_depth);

        let dispatcher = Arc::new(Self {
            discovery_tx,
            control_tx,
            clock,
            counters: Counters::default(),
        });

        (
            dispatcher,
            DispatchQueues {
                discovery: discovery_rx,
                control: control_rx,
            },
        )
    }

    /// Callback body: classify, decode and enqueue without blocking
    pub fn on_receive(&self, from: LinkAddress, bytes: &[u8]) {
        let received_us = self.clock.now_us();

        let inbound = match decode_payload(bytes) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Discarding payload from {}: {}", from, e);
                return;
            }
        };

        let result = match inbound {
            Inbound::Discovery(message) => self
                .discovery_tx
                .try_send(Envelope { from, received_us, message })
                .map(|_| &self.counters.discovery)
                .map_err(|e| ("Discovery", e.is_full())),
            Inbound::Control(message) => self
                .control_tx
                .try_send(Envelope { from, received_us, message })
                .map(|_| &self.counters.control)
                .map_err(|e| ("Control", e.is_full())),
        };

        match result {
            Ok(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err((family, true)) => {
                self.counters.queue_full.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{} queue full, dropping message from {}", family, from);
            }
            Err((family, false)) => {
                tracing::debug!("{} queue closed, dropping message from {}", family, from);
            }
        }
    }

    /// Wrap this dispatcher as a transport receive callback
    pub fn handler(self: &Arc<Self>) -> ReceiveHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |from, bytes: &[u8]| dispatcher.on_receive(from, bytes))
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            discovery_enqueued: self.counters.discovery.load(Ordering::Relaxed),
            control_enqueued: self.counters.control.load(Ordering::Relaxed),
            discarded_malformed: self.counters.malformed.load(Ordering::Relaxed),
            dropped_queue_full: self.counters.queue_full.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ControlKind, DiscoveryKind, Role};

    fn sender() -> LinkAddress {
        LinkAddress::new([0x02, 0, 0, 0, 0, 0x21])
    }

    fn announce() -> Vec<u8> {
        DiscoveryMessage::new(DiscoveryKind::Announce, sender(), Role::Unknown, "n", 0)
            .encode()
            .unwrap()
    }

    fn heartbeat() -> Vec<u8> {
        ControlMessage::new(ControlKind::Heartbeat, 0, 10, Role::Conductor)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_routes_by_family() {
        let (dispatcher, queues) = Dispatcher::new(4, 4, LocalClock::new());

        dispatcher.on_receive(sender(), &announce());
        dispatcher.on_receive(sender(), &heartbeat());

        let discovery = queues.discovery.try_recv().unwrap();
        assert_eq!(discovery.from, sender());
        assert_eq!(discovery.message.kind, DiscoveryKind::Announce);

        let control = queues.control.try_recv().unwrap();
        assert_eq!(control.message.kind, ControlKind::Heartbeat);

        let stats = dispatcher.stats();
        assert_eq!(stats.discovery_enqueued, 1);
        assert_eq!(stats.control_enqueued, 1);
    }

    #[test]
    fn test_malformed_payloads_discarded() {
        let (dispatcher, queues) = Dispatcher::new(4, 4, LocalClock::new());

        dispatcher.on_receive(sender(), &[0u8; 3]);
        let mut bad_type = heartbeat();
        bad_type[0] = 0x7F;
        dispatcher.on_receive(sender(), &bad_type);

        assert!(queues.discovery.try_recv().is_err());
        assert!(queues.control.try_recv().is_err());
        assert_eq!(dispatcher.stats().discarded_malformed, 2);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (dispatcher, queues) = Dispatcher::new(2, 2, LocalClock::new());

        for _ in 0..5 {
            dispatcher.on_receive(sender(), &announce());
        }

        assert_eq!(queues.discovery.len(), 2);
        let stats = dispatcher.stats();
        assert_eq!(stats.discovery_enqueued, 2);
        assert_eq!(stats.dropped_queue_full, 3);
    }

    #[test]
    fn test_fifo_per_queue() {
        let (dispatcher, queues) = Dispatcher::new(8, 8, LocalClock::new());

        for song in 0..4u8 {
            let bytes = ControlMessage::new(ControlKind::SongSelect, song, 0, Role::Conductor)
                .encode()
                .unwrap();
            dispatcher.on_receive(sender(), &bytes);
        }

        let order: Vec<u8> = queues.control.try_iter().map(|e| e.message.song_id).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
