//! Control worker
//!
//! Handles control messages in arrival order. A `SyncStart` converts the
//! conductor's target instant into local time with the current offset
//! estimate and sleeps until then. The sleep is not interruptible: a
//! `SyncStop` that arrives meanwhile waits in the queue until the start has
//! fired.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::{ClockEstimator, LocalClock};
use crate::discovery::PeerTable;
use crate::network::Envelope;
use crate::playback::Playback;
use crate::protocol::{ControlKind, ControlMessage, Role};
use crate::role::{should_play, LocalRole};
use crate::songs;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Serializable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub playing: bool,
    pub selected_song: Option<u8>,
    pub clock_offset_us: i64,
    pub heartbeats: u64,
}

/// Turns control messages into clock updates and timed playback calls
pub struct SyncScheduler {
    role: Arc<LocalRole>,
    peers: Arc<PeerTable>,
    estimator: Arc<ClockEstimator>,
    clock: LocalClock,
    playback: Arc<dyn Playback>,
    playing: AtomicBool,
    selected: Mutex<Option<u8>>,
}

impl SyncScheduler {
    pub fn new(
        role: Arc<LocalRole>,
        peers: Arc<PeerTable>,
        estimator: Arc<ClockEstimator>,
        clock: LocalClock,
        playback: Arc<dyn Playback>,
    ) -> Self {
        Self {
            role,
            peers,
            estimator,
            clock,
            playback,
            playing: AtomicBool::new(false),
            selected: Mutex::new(None),
        }
    }

    /// Microseconds to wait from `now_us` until the conductor-clock
    /// instant `target_us`. Zero or negative means already late.
    pub fn plan_start(&self, target_us: u64, now_us: u64) -> i64 {
        let local_start = self.estimator.to_local_us(target_us) as i128;
        (local_start - now_us as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            playing: self.is_playing(),
            selected_song: *self.selected.lock(),
            clock_offset_us: self.estimator.offset_us(),
            heartbeats: self.estimator.sample_count(),
        }
    }

    pub fn handle(&self, envelope: &Envelope<ControlMessage>) {
        let message = &envelope.message;
        tracing::debug!(
            "Control {:?} song={} from {} (id {})",
            message.kind,
            message.song_id,
            envelope.from,
            message.sender_id
        );

        match message.kind {
            ControlKind::SyncStart => self.start(message.song_id, message.timestamp_us),
            ControlKind::SyncStop => self.stop(),
            ControlKind::SongSelect => self.select(message.song_id),
            ControlKind::Heartbeat => self.heartbeat(envelope),
        }
    }

    fn start(&self, song_id: u8, target_us: u64) {
        let song = match songs::song(song_id) {
            Some(song) => song,
            None => {
                tracing::warn!("Invalid song ID: {}", song_id);
                return;
            }
        };

        if self.playing.swap(false, Ordering::SeqCst) {
            self.playback.stop_playback();
        }

        if self.role.is_conductor() {
            tracing::info!("Conductor: visual-only start of {}", song.name);
            self.playback.set_visual_state(Some(song.kind), 1.0);
            return;
        }

        let wait_us = self.plan_start(target_us, self.clock.now_us());
        if wait_us > 0 {
            tracing::debug!("Starting {} in {} us", song.name, wait_us);
            thread::sleep(Duration::from_micros(wait_us as u64));
        } else {
            tracing::warn!("Start of {} is {} us late, playing now", song.name, -wait_us);
        }

        self.playback.set_visual_state(Some(song.kind), 1.0);

        let role = self.role.get();
        let play = should_play(role, song);
        if play {
            self.playback.start_playback(song_id, role);
            self.playing.store(true, Ordering::SeqCst);
        }
        tracing::info!("Playback decision for {}: play={} (role={})", song.name, play, role);
    }

    fn stop(&self) {
        self.playback.stop_playback();
        self.playing.store(false, Ordering::SeqCst);
        self.playback.set_visual_state(None, 0.0);
        tracing::info!("Stopped");
    }

    fn select(&self, song_id: u8) {
        match songs::song(song_id) {
            Some(song) => {
                tracing::info!("Song selected: {}", song.name);
                *self.selected.lock() = Some(song_id);
                self.playback.set_visual_state(Some(song.kind), 0.0);
            }
            None => tracing::warn!("Invalid song ID: {}", song_id),
        }
    }

    fn heartbeat(&self, envelope: &Envelope<ControlMessage>) {
        self.peers.mark_online(envelope.from, Instant::now());

        if self.role.is_conductor() {
            return;
        }
        if envelope.message.sender_role() != Some(Role::Conductor) {
            tracing::debug!("Ignoring heartbeat from non-conductor {}", envelope.from);
            return;
        }

        self.estimator
            .observe(envelope.message.timestamp_us, envelope.received_us);
    }

    /// Worker loop over the control queue
    pub fn run(&self, queue: &Receiver<Envelope<ControlMessage>>, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            match queue.recv_timeout(SHUTDOWN_POLL) {
                Ok(envelope) => self.handle(&envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("Control worker stopped");
    }
}
