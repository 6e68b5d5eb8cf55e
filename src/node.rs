//! Node runtime
//!
//! Wires a transport to the dispatcher and starts the workers: discovery,
//! control and, on the conductor, the heartbeat broadcaster. Each worker is
//! a named thread polling a shared running flag.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::{ClockEstimator, LocalClock};
use crate::config::AppConfig;
use crate::discovery::{DiscoveryEngine, DiscoverySettings, PeerRecord, PeerStatus, PeerTable};
use crate::error::{Result, RoleError};
use crate::network::{DispatchStats, Dispatcher, Transport, TransportStatsSnapshot};
use crate::playback::Playback;
use crate::protocol::{LinkAddress, Role};
use crate::role::LocalRole;
use crate::sync::{ConductorControls, HeartbeatBroadcaster, SyncScheduler};

/// Snapshot of a running node
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub address: LinkAddress,
    pub display_name: String,
    pub role: Role,
    pub clock_offset_us: i64,
    pub heartbeats: u64,
    pub playing: bool,
    pub selected_song: Option<u8>,
    pub online_peers: usize,
    pub peers: Vec<PeerStatus>,
    pub dispatch: DispatchStats,
    pub transport: TransportStatsSnapshot,
}

/// Entry point for starting a node
pub struct Node;

impl Node {
    /// Start a node on its own fresh clock
    pub fn start(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        playback: Arc<dyn Playback>,
    ) -> Result<NodeHandle> {
        Self::start_with_clock(config, transport, playback, LocalClock::new())
    }

    pub fn start_with_clock(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        playback: Arc<dyn Playback>,
        clock: LocalClock,
    ) -> Result<NodeHandle> {
        config.validate()?;

        let address = transport.local_address();
        let store = config.node.role_store();
        let provisioned = config.node.role.resolve(address, store.as_ref());

        // only a role granted at runtime is persisted
        let role = match store {
            Some(store) if provisioned.is_unknown() && config.node.persist_role => {
                LocalRole::with_store(Role::Unknown, store)
            }
            _ => LocalRole::new(Role::Unknown),
        };
        if !provisioned.is_unknown() {
            role.pin(provisioned)?;
        }
        let role = Arc::new(role);

        let peers = Arc::new(PeerTable::new(
            config.discovery.peer_capacity,
            config.discovery.peer_timeout(),
        ));
        let estimator = Arc::new(ClockEstimator::new());

        let (dispatcher, queues) = Dispatcher::new(
            config.discovery.queue_depth,
            config.sync.queue_depth,
            clock,
        );
        transport.register_receiver(dispatcher.handler())?;

        let discovery = Arc::new(DiscoveryEngine::new(
            Arc::clone(&transport),
            Arc::clone(&peers),
            Arc::clone(&role),
            clock,
            DiscoverySettings::from_config(&config.node, &config.discovery),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&role),
            Arc::clone(&peers),
            Arc::clone(&estimator),
            clock,
            Arc::clone(&playback),
        ));

        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::new();

        {
            let discovery = Arc::clone(&discovery);
            let running = Arc::clone(&running);
            let queue = queues.discovery;
            workers.push(
                thread::Builder::new()
                    .name("discovery".into())
                    .spawn(move || {
                        discovery.start();
                        discovery.run(&queue, &running);
                    })?,
            );
        }

        {
            let scheduler = Arc::clone(&scheduler);
            let running = Arc::clone(&running);
            let queue = queues.control;
            workers.push(
                thread::Builder::new()
                    .name("control".into())
                    .spawn(move || scheduler.run(&queue, &running))?,
            );
        }

        if role.is_conductor() {
            let heartbeat =
                HeartbeatBroadcaster::new(Arc::clone(&transport), clock, config.sync.heartbeat_period());
            let running = Arc::clone(&running);
            workers.push(
                thread::Builder::new()
                    .name("heartbeat".into())
                    .spawn(move || heartbeat.run(&running))?,
            );
        }

        tracing::info!("Node {} started as {}", address, role.get());

        Ok(NodeHandle {
            address,
            role,
            peers,
            discovery,
            scheduler,
            dispatcher,
            transport,
            playback,
            clock,
            lead_time: config.sync.lead_time(),
            running,
            workers,
        })
    }
}

/// Handle to a running node; shuts the workers down on drop
pub struct NodeHandle {
    address: LinkAddress,
    role: Arc<LocalRole>,
    peers: Arc<PeerTable>,
    discovery: Arc<DiscoveryEngine>,
    scheduler: Arc<SyncScheduler>,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    playback: Arc<dyn Playback>,
    clock: LocalClock,
    lead_time: Duration,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn address(&self) -> LinkAddress {
        self.address
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    pub fn clock(&self) -> LocalClock {
        self.clock
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers.snapshot()
    }

    pub fn online_count(&self) -> usize {
        self.peers.online_count()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn transport_stats(&self) -> TransportStatsSnapshot {
        self.transport.stats()
    }

    pub fn status(&self) -> NodeStatus {
        let now = Instant::now();
        let scheduler = self.scheduler.status();
        let peers: Vec<PeerStatus> = self.peers.snapshot().iter().map(|p| p.status(now)).collect();

        NodeStatus {
            address: self.address,
            display_name: self.discovery.display_name(),
            role: self.role.get(),
            clock_offset_us: scheduler.clock_offset_us,
            heartbeats: scheduler.heartbeats,
            playing: scheduler.playing,
            selected_song: scheduler.selected_song,
            online_peers: peers.iter().filter(|p| p.online).count(),
            peers,
            dispatch: self.dispatcher.stats(),
            transport: self.transport.stats(),
        }
    }

    /// Conductor command surface; refused on any other role
    pub fn conductor(&self) -> std::result::Result<ConductorControls, RoleError> {
        ConductorControls::new(
            &self.role,
            Arc::clone(&self.transport),
            Arc::clone(&self.playback),
            self.clock,
            self.lead_time,
        )
    }

    pub fn roll_call(&self) {
        self.discovery.roll_call();
    }

    pub fn send_ready(&self) {
        self.discovery.send_ready();
    }

    /// Whether `required` peers are online
    pub fn all_devices_ready(&self, required: usize) -> bool {
        self.discovery.all_devices_ready(required)
    }

    /// Stop and join every worker
    pub fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        tracing::info!("Node {} stopped", self.address);
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
