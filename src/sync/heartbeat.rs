//! Conductor heartbeat broadcaster

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::LocalClock;
use crate::network::Transport;
use crate::protocol::{ControlKind, ControlMessage, Role};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Broadcasts the conductor's clock reading once per period
pub struct HeartbeatBroadcaster {
    transport: Arc<dyn Transport>,
    clock: LocalClock,
    period: Duration,
}

impl HeartbeatBroadcaster {
    pub fn new(transport: Arc<dyn Transport>, clock: LocalClock, period: Duration) -> Self {
        Self {
            transport,
            clock,
            period,
        }
    }

    /// Send one heartbeat stamped with the current local time
    pub fn beat(&self) {
        let message = ControlMessage::new(ControlKind::Heartbeat, 0, self.clock.now_us(), Role::Conductor);
        let result = message
            .encode()
            .map_err(crate::Error::from)
            .and_then(|bytes| self.transport.broadcast(&bytes).map_err(crate::Error::from));

        if let Err(e) = result {
            tracing::warn!("Heartbeat failed: {}", e);
        }
    }

    pub fn run(&self, running: &AtomicBool) {
        tracing::info!("Heartbeat broadcaster started ({} ms)", self.period.as_millis());
        let mut next_beat = Instant::now();

        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= next_beat {
                self.beat();
                next_beat += self.period;
                if next_beat <= now {
                    next_beat = now + self.period;
                }
            }
            thread::sleep(next_beat.saturating_duration_since(Instant::now()).min(SHUTDOWN_POLL));
        }

        tracing::debug!("Heartbeat broadcaster stopped");
    }
}
