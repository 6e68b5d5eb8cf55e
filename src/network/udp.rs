//! UDP broadcast transport
//!
//! Emulates a one-hop radio link on a LAN. Every datagram starts with a
//! link header naming destination and source:
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────────────┐
//! │ dest (6)     │ src (6)      │ payload               │
//! └──────────────┴──────────────┴───────────────────────┘
//! ```
//!
//! Frames not addressed to this node (or to broadcast) are filtered, as
//! are our own broadcasts echoed back by the network. Socket addresses of
//! peers are learned from received frames, up to the driver peer limit, so
//! unicasts go straight to the peer; unknown peers get the frame through
//! the broadcast address and the receivers' filter.

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{check_payload, ReceiveHandler, Transport, TransportStats, TransportStatsSnapshot};
use crate::config::NetworkConfig;
use crate::constants::MAX_LINK_PAYLOAD;
use crate::error::NetworkError;
use crate::protocol::LinkAddress;

const HEADER_LEN: usize = 2 * LinkAddress::LEN;
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transport over a broadcast-enabled UDP socket
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    broadcast_target: SocketAddr,
    address: LinkAddress,
    max_peers: usize,
    peers: Arc<Mutex<HashMap<LinkAddress, SocketAddr>>>,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<TransportStats>,
}

impl UdpTransport {
    /// Bind the shared port with broadcast and address reuse enabled
    pub fn bind(config: &NetworkConfig, address: LinkAddress) -> Result<Self, NetworkError> {
        let bind_addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
            .parse()
            .map_err(|e| NetworkError::BindFailed(format!("bad bind address: {}", e)))?;
        let broadcast_target: SocketAddr = format!("{}:{}", config.broadcast_address, config.port)
            .parse()
            .map_err(|e| NetworkError::BindFailed(format!("bad broadcast address: {}", e)))?;

        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .bind(&SockAddr::from(bind_addr))
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

        tracing::info!("UDP link {} bound on {}", address, bind_addr);

        Ok(Self {
            socket: Arc::new(socket.into()),
            broadcast_target,
            address,
            max_peers: config.max_peers,
            peers: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            receiver: Mutex::new(None),
            stats: Arc::new(TransportStats::default()),
        })
    }

    fn send_frame(&self, dest: LinkAddress, target: SocketAddr, payload: &[u8]) -> Result<(), NetworkError> {
        check_payload(payload)?;

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
        frame.put_slice(dest.as_bytes());
        frame.put_slice(self.address.as_bytes());
        frame.put_slice(payload);

        match self.socket.send_to(&frame, target) {
            Ok(sent) if sent == frame.len() => {
                self.stats.record_sent();
                Ok(())
            }
            Ok(sent) => {
                self.stats.record_send_failure();
                Err(NetworkError::SendFailed(format!("short send: {} of {} bytes", sent, frame.len())))
            }
            Err(e) => {
                self.stats.record_send_failure();
                Err(NetworkError::SendFailed(e.to_string()))
            }
        }
    }

    /// Stop the receive thread
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receiver.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Transport for UdpTransport {
    fn local_address(&self) -> LinkAddress {
        self.address
    }

    fn max_peers(&self) -> usize {
        self.max_peers
    }

    fn broadcast(&self, payload: &[u8]) -> Result<(), NetworkError> {
        self.send_frame(LinkAddress::BROADCAST, self.broadcast_target, payload)
    }

    fn unicast(&self, dest: LinkAddress, payload: &[u8]) -> Result<(), NetworkError> {
        let target = self
            .peers
            .lock()
            .get(&dest)
            .copied()
            .unwrap_or(self.broadcast_target);
        self.send_frame(dest, target, payload)
    }

    fn register_receiver(&self, handler: ReceiveHandler) -> Result<(), NetworkError> {
        let mut slot = self.receiver.lock();
        if slot.is_some() {
            return Err(NetworkError::HandlerAlreadySet);
        }

        let socket = Arc::clone(&self.socket);
        let running = Arc::clone(&self.running);
        let peers = Arc::clone(&self.peers);
        let stats = Arc::clone(&self.stats);
        let own = self.address;
        let max_peers = self.max_peers;

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name(format!("udp-recv-{}", own))
            .spawn(move || {
                let mut buf = [0u8; HEADER_LEN + MAX_LINK_PAYLOAD];

                while running.load(Ordering::Relaxed) {
                    let (len, source) = match socket.recv_from(&mut buf) {
                        Ok(received) => received,
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!("UDP receive failed: {}", e);
                            continue;
                        }
                    };

                    if len < HEADER_LEN {
                        stats.record_filtered();
                        continue;
                    }

                    let mut dest = [0u8; 6];
                    let mut src = [0u8; 6];
                    dest.copy_from_slice(&buf[..6]);
                    src.copy_from_slice(&buf[6..HEADER_LEN]);
                    let dest = LinkAddress::new(dest);
                    let src = LinkAddress::new(src);

                    if src == own || (dest != own && !dest.is_broadcast()) {
                        stats.record_filtered();
                        continue;
                    }

                    {
                        let mut peers = peers.lock();
                        if peers.contains_key(&src) || peers.len() < max_peers {
                            peers.insert(src, source);
                        }
                    }

                    stats.record_received();
                    handler(src, &buf[HEADER_LEN..len]);
                }
            })
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        *slot = Some(handle);
        Ok(())
    }

    fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn loopback_config(port: u16) -> NetworkConfig {
        NetworkConfig {
            bind_address: "127.0.0.1".into(),
            broadcast_address: "127.0.0.1".into(),
            port,
            max_peers: 4,
        }
    }

    #[test]
    fn test_frames_carry_link_header() {
        // Single socket on loopback: our own frames come back and must be filtered,
        // while a frame forged from another address is delivered.
        let config = loopback_config(0);
        let own = LinkAddress::new([0x02, 0, 0, 0, 0, 0x01]);
        let transport = match UdpTransport::bind(&config, own) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("skipping: {}", e);
                return;
            }
        };
        let local = transport.socket.local_addr().unwrap();

        let (tx, rx) = mpsc::channel();
        transport
            .register_receiver(Arc::new(move |from, bytes: &[u8]| {
                let _ = tx.send((from, bytes.to_vec()));
            }))
            .unwrap();

        // echo of our own broadcast
        transport.send_frame(LinkAddress::BROADCAST, local, b"self").unwrap();

        // foreign node, addressed to someone else
        let other = LinkAddress::new([0x02, 0, 0, 0, 0, 0x02]);
        let third = LinkAddress::new([0x02, 0, 0, 0, 0, 0x03]);
        let mut frame = Vec::new();
        frame.extend_from_slice(third.as_bytes());
        frame.extend_from_slice(other.as_bytes());
        frame.extend_from_slice(b"not for us");
        transport.socket.send_to(&frame, local).unwrap();

        // foreign node, broadcast
        let mut frame = Vec::new();
        frame.extend_from_slice(LinkAddress::BROADCAST.as_bytes());
        frame.extend_from_slice(other.as_bytes());
        frame.extend_from_slice(b"hello");
        transport.socket.send_to(&frame, local).unwrap();

        let (from, payload) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(from, other);
        assert_eq!(payload, b"hello");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(transport.stats().filtered, 2);

        transport.stop();
    }
}
