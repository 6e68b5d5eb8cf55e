//! Commands originated by the conductor
//!
//! The conductor is a silent control surface: it broadcasts start, stop and
//! select, and only updates its own visuals. Starts are scheduled one lead
//! time ahead so performers can receive, queue and wait for the target.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::LocalClock;
use crate::error::{Error, ProtocolError, Result, RoleError};
use crate::network::Transport;
use crate::playback::Playback;
use crate::protocol::{ControlKind, ControlMessage, Role};
use crate::role::LocalRole;
use crate::songs::{self, Song};

/// Song rotations, one per conductor button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongBank {
    A,
    B,
    C,
}

impl SongBank {
    pub fn songs(self) -> &'static [u8] {
        const BANK_A: [u8; 2] = [songs::SONG_JUPITER_HYMN, songs::SONG_CARNIVAL_THEME];
        const BANK_B: [u8; 3] = [
            songs::SONG_CANON_IN_D,
            songs::SONG_CARNIVAL_VARIATION,
            songs::SONG_MEDALLION_CALLS,
        ];
        const BANK_C: [u8; 2] = [songs::SONG_BLUE_BELLS, songs::SONG_TV_TIME];

        match self {
            SongBank::A => &BANK_A,
            SongBank::B => &BANK_B,
            SongBank::C => &BANK_C,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for SongBank {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(SongBank::A),
            "b" => Ok(SongBank::B),
            "c" => Ok(SongBank::C),
            other => Err(format!("unknown bank '{}'", other)),
        }
    }
}

/// Control surface available only on the conductor
pub struct ConductorControls {
    transport: Arc<dyn Transport>,
    playback: Arc<dyn Playback>,
    clock: LocalClock,
    lead_time: Duration,
    cursors: [AtomicUsize; 3],
}

impl ConductorControls {
    /// Fails unless the local role is the conductor
    pub fn new(
        role: &LocalRole,
        transport: Arc<dyn Transport>,
        playback: Arc<dyn Playback>,
        clock: LocalClock,
        lead_time: Duration,
    ) -> std::result::Result<Self, RoleError> {
        if !role.is_conductor() {
            return Err(RoleError::NotConductor);
        }

        Ok(Self {
            transport,
            playback,
            clock,
            lead_time,
            cursors: Default::default(),
        })
    }

    fn broadcast(&self, kind: ControlKind, song_id: u8, timestamp_us: u64) -> Result<()> {
        let bytes = ControlMessage::new(kind, song_id, timestamp_us, Role::Conductor).encode()?;
        self.transport.broadcast(&bytes)?;
        Ok(())
    }

    fn lookup(song_id: u8) -> Result<&'static Song> {
        songs::song(song_id).ok_or(Error::Protocol(ProtocolError::UnknownSong(song_id)))
    }

    /// Broadcast a start one lead time from now; returns the target in
    /// conductor microseconds
    pub fn start_song(&self, song_id: u8) -> Result<u64> {
        let song = Self::lookup(song_id)?;
        let target_us = self.clock.now_us() + self.lead_time.as_micros() as u64;

        self.broadcast(ControlKind::SyncStart, song_id, target_us)?;
        self.playback.set_visual_state(Some(song.kind), 1.0);

        tracing::info!("Start {} at {} us", song.name, target_us);
        Ok(target_us)
    }

    pub fn stop(&self) -> Result<()> {
        self.broadcast(ControlKind::SyncStop, 0, self.clock.now_us())?;
        self.playback.set_visual_state(None, 0.0);
        tracing::info!("Stop sent");
        Ok(())
    }

    pub fn select_song(&self, song_id: u8) -> Result<()> {
        let song = Self::lookup(song_id)?;
        self.broadcast(ControlKind::SongSelect, song_id, self.clock.now_us())?;
        self.playback.set_visual_state(Some(song.kind), 0.0);
        tracing::info!("Selected {}", song.name);
        Ok(())
    }

    /// Start the next song of `bank`, round-robin
    pub fn next_in_bank(&self, bank: SongBank) -> Result<u8> {
        let rotation = bank.songs();
        let position = self.cursors[bank.index()].fetch_add(1, Ordering::SeqCst) % rotation.len();
        let song_id = rotation[position];
        self.start_song(song_id)?;
        Ok(song_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MemoryMedium, ReceiveHandler};
    use crate::playback::testing::{PlaybackEvent, RecordingPlayback};
    use crate::protocol::LinkAddress;
    use crate::songs::SongKind;
    use parking_lot::Mutex;

    type Inbox = Arc<Mutex<Vec<ControlMessage>>>;

    fn setup(role: Role) -> (std::result::Result<ConductorControls, RoleError>, Inbox, Arc<RecordingPlayback>, LocalClock) {
        let medium = MemoryMedium::new();
        let conductor = medium.attach(LinkAddress::new([2, 0, 0, 0, 0, 1]));
        let listener = medium.attach(LinkAddress::new([2, 0, 0, 0, 0, 2]));

        let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        let handler: ReceiveHandler = Arc::new(move |_, bytes: &[u8]| {
            if let Ok(message) = ControlMessage::decode(bytes) {
                sink.lock().push(message);
            }
        });
        listener.register_receiver(handler).unwrap();

        let playback = Arc::new(RecordingPlayback::new());
        let clock = LocalClock::new();
        let controls = ConductorControls::new(
            &LocalRole::new(role),
            Arc::new(conductor),
            playback.clone(),
            clock,
            Duration::from_millis(200),
        );
        (controls, inbox, playback, clock)
    }

    #[test]
    fn test_refused_off_conductor() {
        for role in [Role::Unknown, Role::Part(1)] {
            let (controls, _, _, _) = setup(role);
            assert_eq!(controls.err(), Some(RoleError::NotConductor));
        }
    }

    #[test]
    fn test_start_targets_lead_time_ahead() {
        let (controls, inbox, playback, clock) = setup(Role::Conductor);
        let controls = controls.unwrap();

        let before = clock.now_us();
        let target = controls.start_song(songs::SONG_BLUE_BELLS).unwrap();
        let after = clock.now_us();

        assert!(target >= before + 200_000 && target <= after + 200_000);

        let inbox = inbox.lock();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, ControlKind::SyncStart);
        assert_eq!(inbox[0].song_id, songs::SONG_BLUE_BELLS);
        assert_eq!(inbox[0].timestamp_us, target);
        assert_eq!(inbox[0].sender_role(), Some(Role::Conductor));

        // visuals only, never playback
        assert_eq!(playback.events(), vec![PlaybackEvent::Visual(Some(SongKind::Solo))]);
    }

    #[test]
    fn test_unknown_song_rejected() {
        let (controls, inbox, _, _) = setup(Role::Conductor);
        let controls = controls.unwrap();
        assert!(matches!(
            controls.start_song(99),
            Err(Error::Protocol(ProtocolError::UnknownSong(99)))
        ));
        assert!(controls.select_song(7).is_err());
        assert!(inbox.lock().is_empty());
    }

    #[test]
    fn test_stop_and_select() {
        let (controls, inbox, playback, _) = setup(Role::Conductor);
        let controls = controls.unwrap();

        controls.select_song(songs::SONG_CANON_IN_D).unwrap();
        controls.stop().unwrap();

        let kinds: Vec<_> = inbox.lock().iter().map(|m| (m.kind, m.song_id)).collect();
        assert_eq!(
            kinds,
            vec![(ControlKind::SongSelect, songs::SONG_CANON_IN_D), (ControlKind::SyncStop, 0)]
        );
        assert_eq!(playback.events().last(), Some(&PlaybackEvent::Visual(None)));
    }

    #[test]
    fn test_banks_rotate() {
        let (controls, _, _, _) = setup(Role::Conductor);
        let controls = controls.unwrap();

        let b: Vec<u8> = (0..4).map(|_| controls.next_in_bank(SongBank::B).unwrap()).collect();
        assert_eq!(
            b,
            vec![
                songs::SONG_CANON_IN_D,
                songs::SONG_CARNIVAL_VARIATION,
                songs::SONG_MEDALLION_CALLS,
                songs::SONG_CANON_IN_D
            ]
        );

        // banks keep independent cursors
        assert_eq!(controls.next_in_bank(SongBank::A).unwrap(), songs::SONG_JUPITER_HYMN);
        assert_eq!(controls.next_in_bank(SongBank::C).unwrap(), songs::SONG_BLUE_BELLS);
        assert_eq!(controls.next_in_bank(SongBank::A).unwrap(), songs::SONG_CARNIVAL_THEME);
    }

    #[test]
    fn test_bank_parse() {
        assert_eq!("a".parse::<SongBank>(), Ok(SongBank::A));
        assert_eq!(" C ".parse::<SongBank>(), Ok(SongBank::C));
        assert!("d".parse::<SongBank>().is_err());
    }
}
