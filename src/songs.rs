//! Static song catalog
//!
//! Note data and synthesis live with the playback collaborator; the
//! coordination layer only needs each piece's kind, participation mask and
//! length.

use serde::Serialize;

pub const PART_1: u8 = 0x01;
pub const PART_2: u8 = 0x02;
pub const PART_3: u8 = 0x04;
pub const PART_4: u8 = 0x08;
pub const ALL_PARTS: u8 = PART_1 | PART_2 | PART_3 | PART_4;

pub const SONG_JUPITER_HYMN: u8 = 0;
pub const SONG_CANON_IN_D: u8 = 1;
pub const SONG_CARNIVAL_THEME: u8 = 2;
pub const SONG_CARNIVAL_VARIATION: u8 = 3;
pub const SONG_BLUE_BELLS: u8 = 4;
pub const SONG_MEDALLION_CALLS: u8 = 5;
pub const SONG_TV_TIME: u8 = 6;

/// Arrangement of a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SongKind {
    Solo,
    Duet,
    /// Full ensemble: every performer plays regardless of the mask
    Quintet,
}

impl SongKind {
    pub fn is_full_ensemble(self) -> bool {
        self == SongKind::Quintet
    }
}

/// Catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Song {
    pub id: u8,
    pub name: &'static str,
    pub kind: SongKind,
    /// Bit `n-1` set when `Part(n)` plays
    pub parts_mask: u8,
    pub note_count: u16,
    pub duration_ms: u32,
}

impl Song {
    /// Number of parts participating
    pub fn part_count(&self) -> u32 {
        if self.kind.is_full_ensemble() {
            crate::protocol::Role::PART_COUNT as u32
        } else {
            (self.parts_mask & ALL_PARTS).count_ones()
        }
    }
}

pub static SONGS: [Song; 7] = [
    Song {
        id: SONG_JUPITER_HYMN,
        name: "Jupiter Hymn",
        kind: SongKind::Quintet,
        parts_mask: ALL_PARTS,
        note_count: 24,
        duration_ms: 20_000,
    },
    Song {
        id: SONG_CANON_IN_D,
        name: "Canon in D",
        kind: SongKind::Duet,
        parts_mask: PART_1 | PART_3 | PART_4,
        note_count: 22,
        duration_ms: 16_000,
    },
    Song {
        id: SONG_CARNIVAL_THEME,
        name: "Carnival Theme",
        kind: SongKind::Solo,
        parts_mask: ALL_PARTS,
        note_count: 30,
        duration_ms: 16_000,
    },
    Song {
        id: SONG_CARNIVAL_VARIATION,
        name: "Carnival Variation",
        kind: SongKind::Solo,
        parts_mask: ALL_PARTS,
        note_count: 23,
        duration_ms: 5_750,
    },
    Song {
        id: SONG_BLUE_BELLS,
        name: "Blue Bells",
        kind: SongKind::Solo,
        parts_mask: ALL_PARTS,
        note_count: 30,
        duration_ms: 16_000,
    },
    Song {
        id: SONG_MEDALLION_CALLS,
        name: "Medallion Calls",
        kind: SongKind::Solo,
        parts_mask: ALL_PARTS,
        note_count: 26,
        duration_ms: 13_000,
    },
    Song {
        id: SONG_TV_TIME,
        name: "TV Time",
        kind: SongKind::Solo,
        parts_mask: ALL_PARTS,
        note_count: 21,
        duration_ms: 6_250,
    },
];

/// Look up a song by id
pub fn song(id: u8) -> Option<&'static Song> {
    SONGS.get(id as usize)
}

pub fn song_count() -> usize {
    SONGS.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_positions() {
        for (index, song) in SONGS.iter().enumerate() {
            assert_eq!(song.id as usize, index);
        }
        assert!(song(song_count() as u8).is_none());
    }

    #[test]
    fn test_part_counts() {
        assert_eq!(song(SONG_JUPITER_HYMN).unwrap().part_count(), 4);
        assert_eq!(song(SONG_CANON_IN_D).unwrap().part_count(), 3);
        assert!(song(SONG_JUPITER_HYMN).unwrap().kind.is_full_ensemble());
        assert!(!song(SONG_CANON_IN_D).unwrap().kind.is_full_ensemble());
    }
}
