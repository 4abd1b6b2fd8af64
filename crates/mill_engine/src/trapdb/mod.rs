//! Trap database
//!
//! A compact table derived from the full sector database marking positions
//! where the natural-looking move loses: closing a mill, or blocking the
//! opponent's mill threat. Each record also carries the theoretical result
//! and its distance for the side to move, so the table is useful on its own
//! when the full database is absent.
//!
//! The whole file is loaded into memory once and lives for the process
//! lifetime.

pub mod picker;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::rules::SQUARES;
use crate::state::GameState;
use crate::MASK24;

/// Closing an own mill here loses; some other move does not.
pub const TRAP_SELF_MILL_LOSS: u8 = 1 << 0;

/// Blocking the opponent's mill here loses; some other move does not.
pub const TRAP_BLOCK_MILL_LOSS: u8 = 1 << 1;

/// File preamble magic, 8 bytes including the trailing NUL.
pub const TRAP_DB_MAGIC: [u8; 8] = *b"TRAPDB2\0";

/// File name inside the database directory.
pub const TRAP_DB_FILE: &str = "std_traps.sec2";

/// Per-position payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapRecord {
    pub mask: u8,
    /// Result for the side to move: -1 loss, 0 draw, +1 win.
    pub wdl: i8,
    /// Half-moves to the result, -1 when unknown.
    pub steps: i16,
}

/// Compact position key.
/// Layout (LSB..MSB): white bits 0..24, black bits 24..48, side-to-move
/// bit 48, stones-in-hand white 49..54, black 54..59.
pub fn position_key(white: u32, black: u32, side: u8, wf: u8, bf: u8) -> u64 {
    (white as u64 & MASK24)
        | ((black as u64 & MASK24) << 24)
        | (((side & 1) as u64) << 48)
        | (((wf & 31) as u64) << 49)
        | (((bf & 31) as u64) << 54)
}

/// The key of a game state, deriving the in-hand counters the same way the
/// builder does.
pub fn state_key(s: &GameState, max_pieces: u8) -> u64 {
    let mut white = 0u32;
    let mut black = 0u32;
    for i in 0..SQUARES {
        match s.board[i] {
            0 => white |= 1 << i,
            1 => black |= 1 << i,
            _ => {}
        }
    }
    let hand = |set: u8| -> u8 {
        if s.phase == 2 {
            0
        } else {
            max_pieces.saturating_sub(set)
        }
    };
    position_key(
        white,
        black,
        s.side_to_move,
        hand(s.set_stone_count[0]),
        hand(s.set_stone_count[1]),
    )
}

pub struct TrapDb {
    entries: HashMap<u64, TrapRecord>,
    max_pieces: u8,
}

/// Merge a record into the map: masks accumulate, the stronger result wins
/// and brings its distance along.
fn merge(entries: &mut HashMap<u64, TrapRecord>, key: u64, rec: TrapRecord) {
    entries
        .entry(key)
        .and_modify(|e| {
            e.mask |= rec.mask;
            if rec.wdl > e.wdl {
                e.wdl = rec.wdl;
                e.steps = rec.steps;
            }
        })
        .or_insert(rec);
}

/// Parse a trap file into raw `(key, record)` pairs, duplicates preserved.
pub fn read_records(path: &Path) -> std::io::Result<Vec<(u64, TrapRecord)>> {
    let bad = |msg: &str| std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string());
    let mut file = std::fs::File::open(path)?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if magic != TRAP_DB_MAGIC {
        return Err(bad("bad trap database preamble"));
    }
    let mut buf4 = [0u8; 4];
    file.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4);

    let mut records = Vec::with_capacity(count as usize);
    let mut rec = [0u8; 15];
    for _ in 0..count {
        file.read_exact(&mut rec)?;
        let white = u32::from_le_bytes(rec[0..4].try_into().unwrap());
        let black = u32::from_le_bytes(rec[4..8].try_into().unwrap());
        let key = position_key(white, black, rec[8], rec[9], rec[10]);
        records.push((
            key,
            TrapRecord {
                mask: rec[11],
                wdl: rec[12] as i8,
                steps: i16::from_le_bytes(rec[13..15].try_into().unwrap()),
            },
        ));
    }
    Ok(records)
}

/// Merge raw records into a map: masks accumulate, the stronger result
/// wins and brings its distance along.
pub fn merge_records(entries: &mut HashMap<u64, TrapRecord>, records: Vec<(u64, TrapRecord)>) {
    for (key, rec) in records {
        merge(entries, key, rec);
    }
}

impl TrapDb {
    /// Load `std_traps.sec2` from the database directory. Returns `None`
    /// when the file is absent or unreadable; a present-but-corrupt file is
    /// logged and treated as absent.
    pub fn load_from_directory(dir: &Path, max_pieces: u8) -> Option<TrapDb> {
        let path = dir.join(TRAP_DB_FILE);
        if !path.is_file() {
            return None;
        }
        let records = match read_records(&path) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unusable trap database");
                return None;
            }
        };

        let mut entries = HashMap::with_capacity(records.len());
        merge_records(&mut entries, records);
        if entries.is_empty() {
            return None;
        }
        debug!(records = entries.len(), "trap database loaded");
        Some(TrapDb {
            entries,
            max_pieces,
        })
    }

    /// Build from in-memory records (used by the batch builder).
    pub fn from_entries(entries: HashMap<u64, TrapRecord>, max_pieces: u8) -> TrapDb {
        TrapDb {
            entries,
            max_pieces,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_for_key(&self, key: u64) -> Option<TrapRecord> {
        self.entries.get(&key).copied()
    }

    /// Trap mask of a state, 0 when the position is not listed.
    pub fn mask_for(&self, s: &GameState) -> u8 {
        self.record_for_key(state_key(s, self.max_pieces))
            .map(|r| r.mask)
            .unwrap_or(0)
    }

    /// Result for the side to move, 0 (draw) when unknown.
    pub fn wdl_for(&self, s: &GameState) -> i8 {
        self.record_for_key(state_key(s, self.max_pieces))
            .map(|r| r.wdl)
            .unwrap_or(0)
    }

    /// Distance to the result, -1 when unknown.
    pub fn steps_for(&self, s: &GameState) -> i16 {
        self.record_for_key(state_key(s, self.max_pieces))
            .map(|r| r.steps)
            .unwrap_or(-1)
    }
}

/// Serialize records in the on-disk layout (shared with the builder's
/// checkpoints).
pub fn write_records<W: std::io::Write>(
    out: &mut W,
    records: &[(u64, TrapRecord)],
) -> std::io::Result<()> {
    out.write_all(&TRAP_DB_MAGIC)?;
    out.write_all(&(records.len() as u32).to_le_bytes())?;
    for &(key, rec) in records {
        let white = (key & MASK24) as u32;
        let black = ((key >> 24) & MASK24) as u32;
        let side = ((key >> 48) & 1) as u8;
        let wf = ((key >> 49) & 31) as u8;
        let bf = ((key >> 54) & 31) as u8;
        out.write_all(&white.to_le_bytes())?;
        out.write_all(&black.to_le_bytes())?;
        out.write_all(&[side, wf, bf, rec.mask, rec.wdl as u8])?;
        out.write_all(&rec.steps.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_db(dir: &Path, records: &[(u64, TrapRecord)]) {
        let mut f = std::fs::File::create(dir.join(TRAP_DB_FILE)).unwrap();
        write_records(&mut f, records).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn test_key_layout() {
        let key = position_key(0x000001, 0x800000, 1, 9, 8);
        assert_eq!(key & MASK24, 1);
        assert_eq!((key >> 24) & MASK24, 0x800000);
        assert_eq!((key >> 48) & 1, 1);
        assert_eq!((key >> 49) & 31, 9);
        assert_eq!((key >> 54) & 31, 8);
    }

    #[test]
    fn test_state_key_uses_hand_counters() {
        let mut s = GameState::new();
        s.board[0] = 0;
        s.board[5] = 1;
        s.stone_count = [1, 1];
        s.set_stone_count = [1, 1];
        s.side_to_move = 1;
        let key = state_key(&s, 9);
        assert_eq!(key, position_key(1, 1 << 5, 1, 8, 8));
        // The moving phase stores zero hands regardless of counters.
        s.phase = 2;
        assert_eq!(state_key(&s, 9), position_key(1, 1 << 5, 1, 0, 0));
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key = position_key(0b111, 0b111000, 0, 6, 6);
        let rec = TrapRecord {
            mask: TRAP_SELF_MILL_LOSS,
            wdl: 0,
            steps: 12,
        };
        write_db(dir.path(), &[(key, rec)]);
        let db = TrapDb::load_from_directory(dir.path(), 9).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.record_for_key(key), Some(rec));
        assert_eq!(db.record_for_key(key + 1), None);
    }

    #[test]
    fn test_duplicate_keys_merge() {
        let dir = tempfile::tempdir().unwrap();
        let key = position_key(0b111, 0b111000, 0, 6, 6);
        let a = TrapRecord {
            mask: TRAP_SELF_MILL_LOSS,
            wdl: 0,
            steps: 30,
        };
        let b = TrapRecord {
            mask: TRAP_BLOCK_MILL_LOSS,
            wdl: 1,
            steps: 11,
        };
        write_db(dir.path(), &[(key, a), (key, b)]);
        let db = TrapDb::load_from_directory(dir.path(), 9).unwrap();
        let merged = db.record_for_key(key).unwrap();
        assert_eq!(merged.mask, TRAP_SELF_MILL_LOSS | TRAP_BLOCK_MILL_LOSS);
        assert_eq!(merged.wdl, 1);
        assert_eq!(merged.steps, 11);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TRAP_DB_FILE), b"NOTADB!!rest").unwrap();
        assert!(TrapDb::load_from_directory(dir.path(), 9).is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TrapDb::load_from_directory(dir.path(), 9).is_none());
    }

    #[test]
    fn test_state_queries_default_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let key = position_key(1, 2, 0, 8, 8);
        write_db(
            dir.path(),
            &[(
                key,
                TrapRecord {
                    mask: TRAP_SELF_MILL_LOSS,
                    wdl: -1,
                    steps: 7,
                },
            )],
        );
        let db = TrapDb::load_from_directory(dir.path(), 9).unwrap();
        let s = GameState::new();
        assert_eq!(db.mask_for(&s), 0);
        assert_eq!(db.wdl_for(&s), 0);
        assert_eq!(db.steps_for(&s), -1);
    }
}
