//! Bounded table of peers observed through discovery
//!
//! Entries are created on first contact, refreshed on every message and
//! marked offline after a silence longer than the peer timeout. They are
//! never removed. When the table is full, new addresses are dropped.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::protocol::discovery::truncate_name;
use crate::protocol::{LinkAddress, Role};

/// State kept for one remote node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub address: LinkAddress,
    pub role: Role,
    pub display_name: String,
    pub online: bool,
    pub last_seen: Instant,
}

/// Serializable view of a peer for status output
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub address: LinkAddress,
    pub role: Role,
    pub display_name: String,
    pub online: bool,
    pub last_seen_ms_ago: u64,
}

impl PeerRecord {
    pub fn status(&self, now: Instant) -> PeerStatus {
        PeerStatus {
            address: self.address,
            role: self.role,
            display_name: self.display_name.clone(),
            online: self.online,
            last_seen_ms_ago: now.saturating_duration_since(self.last_seen).as_millis() as u64,
        }
    }
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// Table full; the address was not recorded
    Dropped,
}

/// Peer table guarded by a single lock held for each call
pub struct PeerTable {
    peers: Mutex<Vec<PeerRecord>>,
    capacity: usize,
    timeout: Duration,
}

impl PeerTable {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            peers: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            timeout,
        }
    }

    /// Insert or refresh a peer; marks it online
    pub fn upsert(&self, address: LinkAddress, role: Role, name: &str, now: Instant) -> Upsert {
        let mut peers = self.peers.lock();

        if let Some(peer) = peers.iter_mut().find(|p| p.address == address) {
            if peer.role != role {
                tracing::info!("Peer {} role {} -> {}", address, peer.role, role);
            }
            if !peer.online {
                tracing::info!("Peer {} back online", address);
            }
            peer.role = role;
            peer.display_name = truncate_name(name).to_string();
            peer.online = true;
            peer.last_seen = now;
            return Upsert::Updated;
        }

        if peers.len() >= self.capacity {
            tracing::warn!("Peer table full ({}), ignoring {}", self.capacity, address);
            return Upsert::Dropped;
        }

        let record = PeerRecord {
            address,
            role,
            display_name: truncate_name(name).to_string(),
            online: true,
            last_seen: now,
        };
        tracing::info!("Added new peer: {} ({}, {})", address, role, record.display_name);
        peers.push(record);
        Upsert::Inserted
    }

    /// Refresh liveness of a known peer without touching its role.
    /// Returns false if the address is not in the table.
    pub fn mark_online(&self, address: LinkAddress, now: Instant) -> bool {
        let mut peers = self.peers.lock();
        match peers.iter_mut().find(|p| p.address == address) {
            Some(peer) => {
                peer.online = true;
                peer.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Mark peers silent for longer than the timeout as offline.
    /// Returns how many went offline in this sweep.
    pub fn sweep_timeouts(&self, now: Instant) -> usize {
        let mut peers = self.peers.lock();
        let mut expired = 0;

        for peer in peers.iter_mut() {
            if peer.online && now.saturating_duration_since(peer.last_seen) > self.timeout {
                peer.online = false;
                expired += 1;
                tracing::info!("Peer {} ({}) timed out", peer.address, peer.role);
            }
        }

        expired
    }

    pub fn online_count(&self) -> usize {
        self.peers.lock().iter().filter(|p| p.online).count()
    }

    /// Copy of every record at the time of the call
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.lock().clone()
    }

    pub fn role_of(&self, address: LinkAddress) -> Option<Role> {
        self.peers
            .lock()
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.role)
    }

    /// Lowest part not held by any recorded peer, online or not
    pub fn first_free_part(&self) -> Option<Role> {
        let peers = self.peers.lock();
        Role::parts().find(|part| peers.iter().all(|p| p.role != *part))
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(n: u8) -> LinkAddress {
        LinkAddress::new([0x02, 0, 0, 0, 0, n])
    }

    #[test]
    fn test_insert_then_update() {
        let table = PeerTable::new(5, Duration::from_secs(10));
        let now = Instant::now();

        assert_eq!(table.upsert(addr(1), Role::Unknown, "a", now), Upsert::Inserted);
        assert_eq!(table.upsert(addr(1), Role::Part(2), "a-Part2", now), Upsert::Updated);

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].role, Role::Part(2));
        assert_eq!(snapshot[0].display_name, "a-Part2");
    }

    #[test]
    fn test_long_names_stored_truncated() {
        use crate::protocol::discovery::MAX_NAME_LEN;

        let table = PeerTable::new(5, Duration::from_secs(10));
        let now = Instant::now();
        let long = "n".repeat(60);

        table.upsert(addr(1), Role::Part(1), &long, now);
        assert_eq!(table.snapshot()[0].display_name, long[..MAX_NAME_LEN]);

        table.upsert(addr(1), Role::Part(1), &format!("{}-again", long), now);
        assert_eq!(table.snapshot()[0].display_name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_full_table_drops_new_peers() {
        let table = PeerTable::new(2, Duration::from_secs(10));
        let now = Instant::now();

        table.upsert(addr(1), Role::Part(1), "a", now);
        table.upsert(addr(2), Role::Part(2), "b", now);
        assert_eq!(table.upsert(addr(3), Role::Part(3), "c", now), Upsert::Dropped);
        assert_eq!(table.len(), 2);
        assert_eq!(table.role_of(addr(3)), None);

        // existing peers still refresh
        assert_eq!(table.upsert(addr(1), Role::Part(1), "a", now), Upsert::Updated);
    }

    #[test]
    fn test_timeout_and_recovery() {
        let timeout = Duration::from_secs(10);
        let table = PeerTable::new(5, timeout);
        let t0 = Instant::now();

        table.upsert(addr(1), Role::Part(1), "a", t0);
        table.upsert(addr(2), Role::Part(2), "b", t0);

        // heard again just before expiry
        table.upsert(addr(2), Role::Part(2), "b", t0 + Duration::from_secs(9));

        // exactly at the timeout is still online
        assert_eq!(table.sweep_timeouts(t0 + timeout), 0);
        assert_eq!(table.online_count(), 2);

        assert_eq!(table.sweep_timeouts(t0 + Duration::from_millis(10_001)), 1);
        assert_eq!(table.online_count(), 1);

        // entries are kept, only marked offline
        assert_eq!(table.len(), 2);

        assert!(table.mark_online(addr(1), t0 + Duration::from_secs(11)));
        assert_eq!(table.online_count(), 2);
    }

    #[test]
    fn test_mark_online_unknown_address() {
        let table = PeerTable::new(5, Duration::from_secs(10));
        assert!(!table.mark_online(addr(9), Instant::now()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_first_free_part() {
        let table = PeerTable::new(5, Duration::from_secs(10));
        let now = Instant::now();
        assert_eq!(table.first_free_part(), Some(Role::Part(1)));

        table.upsert(addr(1), Role::Part(1), "a", now);
        table.upsert(addr(3), Role::Part(3), "c", now);
        table.upsert(addr(0), Role::Conductor, "conductor", now);
        assert_eq!(table.first_free_part(), Some(Role::Part(2)));

        table.upsert(addr(2), Role::Part(2), "b", now);
        table.upsert(addr(4), Role::Part(4), "d", now);
        assert_eq!(table.first_free_part(), None);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Heard { peer: u8, role: Role },
        Sweep { after_ms: u64 },
    }

    fn event_strategy(addresses: u8) -> impl Strategy<Value = Event> {
        let role = prop_oneof![
            Just(Role::Unknown),
            Just(Role::Conductor),
            (1u8..=4).prop_map(Role::Part),
        ];
        prop_oneof![
            4 => (0..addresses, role).prop_map(|(peer, role)| Event::Heard { peer, role }),
            1 => (0u64..20_000).prop_map(|after_ms| Event::Sweep { after_ms }),
        ]
    }

    proptest! {
        #[test]
        fn prop_capacity_and_uniqueness(events in prop::collection::vec(event_strategy(8), 0..200)) {
            let table = PeerTable::new(5, Duration::from_secs(10));
            let mut now = Instant::now();

            for event in events {
                match event {
                    Event::Heard { peer, role } => {
                        table.upsert(addr(peer), role, "peer", now);
                    }
                    Event::Sweep { after_ms } => {
                        now += Duration::from_millis(after_ms);
                        table.sweep_timeouts(now);
                    }
                }

                let snapshot = table.snapshot();
                prop_assert!(snapshot.len() <= table.capacity());
                let mut seen: Vec<LinkAddress> = snapshot.iter().map(|p| p.address).collect();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), snapshot.len());
                prop_assert!(table.online_count() <= snapshot.len());
            }
        }

        #[test]
        fn prop_small_fleet_always_fits(peers in prop::collection::vec(0u8..5, 1..100)) {
            let table = PeerTable::new(5, Duration::from_secs(10));
            let now = Instant::now();
            for peer in &peers {
                prop_assert_ne!(table.upsert(addr(*peer), Role::Unknown, "p", now), Upsert::Dropped);
            }
            let mut distinct = peers.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(table.len(), distinct.len());
            prop_assert_eq!(table.online_count(), distinct.len());
        }
    }
}
