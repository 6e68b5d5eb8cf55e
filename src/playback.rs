//! Playback and visual collaborators
//!
//! Synthesis, LEDs and the display sit behind this trait. Calls are
//! fire-and-forget: implementations must not block the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::Role;
use crate::songs::{self, SongKind};

/// Output side of a node
pub trait Playback: Send + Sync {
    /// Begin playing `song_id` as `role`
    fn start_playback(&self, song_id: u8, role: Role);

    /// Stop whatever is playing; a no-op when idle
    fn stop_playback(&self);

    /// Switch visuals; `None` is the idle scene
    fn set_visual_state(&self, kind: Option<SongKind>, intensity: f32);
}

/// Playback that only logs, for headless nodes
#[derive(Debug, Default)]
pub struct LoggingPlayback {
    playing: AtomicBool,
}

impl LoggingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Playback for LoggingPlayback {
    fn start_playback(&self, song_id: u8, role: Role) {
        let name = songs::song(song_id).map(|s| s.name).unwrap_or("?");
        tracing::info!("Playing: {} as {}", name, role);
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop_playback(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            tracing::info!("Playback stopped");
        }
    }

    fn set_visual_state(&self, kind: Option<SongKind>, intensity: f32) {
        match kind {
            Some(kind) => tracing::debug!("Visuals: {:?} ({:.2})", kind, intensity),
            None => tracing::debug!("Visuals: idle"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum PlaybackEvent {
        Start { song_id: u8, role: Role },
        Stop,
        Visual(Option<SongKind>),
    }

    /// Records every collaborator call with the instant it happened
    #[derive(Default)]
    pub struct RecordingPlayback {
        events: Mutex<Vec<(PlaybackEvent, Instant)>>,
    }

    impl RecordingPlayback {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<PlaybackEvent> {
            self.events.lock().iter().map(|(e, _)| *e).collect()
        }

        pub fn starts(&self) -> Vec<(u8, Role, Instant)> {
            self.events
                .lock()
                .iter()
                .filter_map(|(e, at)| match e {
                    PlaybackEvent::Start { song_id, role } => Some((*song_id, *role, *at)),
                    _ => None,
                })
                .collect()
        }

        pub fn stop_count(&self) -> usize {
            self.events().iter().filter(|e| **e == PlaybackEvent::Stop).count()
        }

        fn push(&self, event: PlaybackEvent) {
            self.events.lock().push((event, Instant::now()));
        }
    }

    impl Playback for RecordingPlayback {
        fn start_playback(&self, song_id: u8, role: Role) {
            self.push(PlaybackEvent::Start { song_id, role });
        }

        fn stop_playback(&self) {
            self.push(PlaybackEvent::Stop);
        }

        fn set_visual_state(&self, kind: Option<SongKind>, _intensity: f32) {
            self.push(PlaybackEvent::Visual(kind));
        }
    }
}
