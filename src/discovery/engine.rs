//! Discovery protocol engine
//!
//! Consumes the discovery queue on its own worker. Each received message is
//! handled immediately; once per announce period the node broadcasts an
//! `Announce` and sweeps the peer table for timeouts. Sends are fire and
//! forget: a lost frame is repaired by the next periodic announce.
//!
//! A `RoleAssign` is honoured only from an address already recorded as the
//! conductor. A performer that boots before hearing the conductor's announce
//! drops its first grant and resolves on a later announce cycle, so joining
//! can take up to two announce periods.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::peer_table::{PeerTable, Upsert};
use crate::clock::LocalClock;
use crate::config::{DiscoveryConfig, NodeConfig};
use crate::network::{Envelope, Transport};
use crate::protocol::discovery::truncate_name;
use crate::protocol::{DiscoveryKind, DiscoveryMessage, LinkAddress, Role};
use crate::role::LocalRole;

/// Longest the worker waits before rechecking its running flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Engine tunables
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub name_prefix: String,
    pub announce_period: Duration,
    pub role_request_delay: Duration,
}

impl DiscoverySettings {
    pub fn from_config(node: &NodeConfig, discovery: &DiscoveryConfig) -> Self {
        Self {
            name_prefix: node.name_prefix.clone(),
            announce_period: discovery.announce_period(),
            role_request_delay: discovery.role_request_delay(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self::from_config(&NodeConfig::default(), &DiscoveryConfig::default())
    }
}

/// Announce, role assignment and roll call for one node
pub struct DiscoveryEngine {
    address: LinkAddress,
    transport: Arc<dyn Transport>,
    peers: Arc<PeerTable>,
    role: Arc<LocalRole>,
    clock: LocalClock,
    settings: DiscoverySettings,
}

impl DiscoveryEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        peers: Arc<PeerTable>,
        role: Arc<LocalRole>,
        clock: LocalClock,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            address: transport.local_address(),
            transport,
            peers,
            role,
            clock,
            settings,
        }
    }

    pub fn address(&self) -> LinkAddress {
        self.address
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// `<prefix>-<role>`, cut to the wire name length
    pub fn display_name(&self) -> String {
        let name = format!("{}-{}", self.settings.name_prefix, self.role.get().name());
        truncate_name(&name).to_string()
    }

    fn message(&self, kind: DiscoveryKind, role: Role) -> DiscoveryMessage {
        DiscoveryMessage::new(kind, self.address, role, &self.display_name(), self.clock.now_ms())
    }

    fn send(&self, dest: Option<LinkAddress>, message: &DiscoveryMessage) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to encode {:?}: {}", message.kind, e);
                return;
            }
        };

        let result = match dest {
            Some(dest) => self.transport.unicast(dest, &bytes),
            None => self.transport.broadcast(&bytes),
        };

        if let Err(e) = result {
            tracing::warn!("Failed to send {:?}: {}", message.kind, e);
        }
    }

    fn broadcast_own(&self, kind: DiscoveryKind) {
        let message = self.message(kind, self.role.get());
        self.send(None, &message);
    }

    pub fn announce(&self) {
        self.broadcast_own(DiscoveryKind::Announce);
    }

    pub fn request_role(&self) {
        tracing::info!("Requesting role assignment");
        self.broadcast_own(DiscoveryKind::RoleRequest);
    }

    pub fn roll_call(&self) {
        tracing::info!("Roll call");
        self.broadcast_own(DiscoveryKind::RollCall);
    }

    pub fn send_ready(&self) {
        self.broadcast_own(DiscoveryKind::Ready);
    }

    /// Whether at least `required` peers are online
    pub fn all_devices_ready(&self, required: usize) -> bool {
        self.peers.online_count() >= required
    }

    /// Initial announce, then a role request if we still have no role
    pub fn start(&self) {
        tracing::info!(
            "Discovery started as {} ({}), conductor={}",
            self.display_name(),
            self.address,
            self.role.is_conductor()
        );
        self.announce();

        if self.role.get().is_unknown() {
            thread::sleep(self.settings.role_request_delay);
            self.request_role();
        }
    }

    /// Periodic work: announce and mark silent peers offline
    pub fn tick(&self, now: Instant) {
        self.announce();
        let expired = self.peers.sweep_timeouts(now);
        if expired > 0 {
            tracing::debug!("{} peer(s) went offline", expired);
        }
    }

    /// Process one received discovery message
    pub fn handle(&self, envelope: &Envelope<DiscoveryMessage>) {
        let message = &envelope.message;

        if message.sender == self.address || envelope.from == self.address {
            return;
        }

        tracing::debug!(
            "Discovery {:?} from {}, role={}",
            message.kind,
            message.sender,
            message.role
        );

        match message.kind {
            DiscoveryKind::Announce => {
                self.record(message);
                if message.role.is_unknown() {
                    self.assign_role(envelope.from);
                }
            }
            DiscoveryKind::RoleRequest => self.assign_role(envelope.from),
            DiscoveryKind::RoleAssign => self.accept_assignment(message),
            DiscoveryKind::RollCall => {
                let reply = self.message(DiscoveryKind::Present, self.role.get());
                self.send(Some(envelope.from), &reply);
            }
            DiscoveryKind::Present | DiscoveryKind::Ready => self.record(message),
        }
    }

    fn record(&self, message: &DiscoveryMessage) {
        if self.peers.upsert(message.sender, message.role, &message.name, Instant::now())
            == Upsert::Dropped
        {
            tracing::debug!("No room for {}", message.sender);
        }
    }

    /// Conductor only: grant the lowest free part to `requester`
    fn assign_role(&self, requester: LinkAddress) {
        if !self.role.is_conductor() {
            return;
        }

        match self.peers.first_free_part() {
            Some(part) => {
                tracing::info!("Assigning {} to {}", part, requester);
                let grant = self.message(DiscoveryKind::RoleAssign, part);
                self.send(Some(requester), &grant);
            }
            None => tracing::warn!("All parts taken, {} stays unassigned", requester),
        }
    }

    fn accept_assignment(&self, message: &DiscoveryMessage) {
        if !self.role.get().is_unknown() {
            return;
        }

        if self.peers.role_of(message.sender) != Some(Role::Conductor) {
            tracing::debug!("Ignoring role assignment from non-conductor {}", message.sender);
            return;
        }

        match self.role.accept_assignment(message.role) {
            Ok(()) => {
                tracing::info!("Assigned role: {}", message.role);
                self.announce();
            }
            Err(e) => tracing::warn!("Rejected role assignment from {}: {}", message.sender, e),
        }
    }

    /// Worker loop: handle messages as they come, tick once per period
    pub fn run(&self, queue: &Receiver<Envelope<DiscoveryMessage>>, running: &AtomicBool) {
        let period = self.settings.announce_period;
        let mut next_tick = Instant::now() + period;

        while running.load(Ordering::Relaxed) {
            let wait = next_tick
                .saturating_duration_since(Instant::now())
                .min(SHUTDOWN_POLL);

            match queue.recv_timeout(wait) {
                Ok(envelope) => self.handle(&envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick += period;
                if next_tick <= now {
                    next_tick = now + period;
                }
            }
        }

        tracing::debug!("Discovery worker stopped");
    }
}
