//! Moves and board coordinates
//!
//! A full move is one of three shapes, optionally decorated with the stone
//! taken when it closes a mill. Squares are named in files a..g and ranks
//! 1..7; the fixed table below maps the database's 0..23 square order to
//! those names, and a second table maps it to the host program's sparse
//! square numbering.

use std::fmt;

/// Move shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveKind {
    /// Put a stone in hand onto an empty square.
    Place { to: u8 },
    /// Move a stone on the board; a jump when only 3 stones remain.
    SlideOrJump { from: u8, to: u8 },
    /// Remove an opponent stone (the pending-removal half move).
    Remove { from: u8 },
}

/// A legal move, with the removal attached when the move closes a mill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvancedMove {
    pub kind: MoveKind,
    /// The square of the opponent stone taken by this move.
    pub take: Option<u8>,
}

impl AdvancedMove {
    pub fn place(to: u8) -> AdvancedMove {
        AdvancedMove {
            kind: MoveKind::Place { to },
            take: None,
        }
    }

    pub fn slide(from: u8, to: u8) -> AdvancedMove {
        AdvancedMove {
            kind: MoveKind::SlideOrJump { from, to },
            take: None,
        }
    }

    pub fn remove(from: u8) -> AdvancedMove {
        AdvancedMove {
            kind: MoveKind::Remove { from },
            take: None,
        }
    }

    pub fn with_take(mut self, sq: u8) -> AdvancedMove {
        debug_assert!(!matches!(self.kind, MoveKind::Remove { .. }));
        self.take = Some(sq);
        self
    }

    /// Whether this move closes a mill and removes a stone in one step.
    pub fn takes(&self) -> bool {
        self.take.is_some()
    }

    /// The destination square, if the move has one.
    pub fn to(&self) -> Option<u8> {
        match self.kind {
            MoveKind::Place { to } | MoveKind::SlideOrJump { to, .. } => Some(to),
            MoveKind::Remove { .. } => None,
        }
    }

    /// External encoding: one bit per changed square.
    pub fn to_bitboard(&self) -> u32 {
        match self.kind {
            MoveKind::Remove { from } => 1 << from,
            MoveKind::Place { to } => (1 << to) | self.take.map_or(0, |t| 1 << t),
            MoveKind::SlideOrJump { from, to } => {
                (1 << from) | (1 << to) | self.take.map_or(0, |t| 1 << t)
            }
        }
    }

    /// Move token: `a4` places, `a1-a4` slides, `xg7` removes. Combined
    /// mill-closing moves render their main step; the removal is a separate
    /// query with the removal-pending flag set.
    pub fn token(&self) -> String {
        match self.kind {
            MoveKind::Place { to } => SQUARE_NAMES[to as usize].to_string(),
            MoveKind::SlideOrJump { from, to } => format!(
                "{}-{}",
                SQUARE_NAMES[from as usize], SQUARE_NAMES[to as usize]
            ),
            MoveKind::Remove { from } => format!("x{}", SQUARE_NAMES[from as usize]),
        }
    }
}

impl fmt::Display for AdvancedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())?;
        if let Some(t) = self.take {
            write!(f, "x{}", SQUARE_NAMES[t as usize])?;
        }
        Ok(())
    }
}

/// Board token of every database square.
pub const SQUARE_NAMES: [&str; 24] = [
    "a4", "a7", "d7", "g7", "g4", "g1", "d1", "a1", "b4", "b6", "d6", "f6", "f4", "f2", "d2",
    "b2", "c4", "c5", "d5", "e5", "e4", "e3", "d3", "c3",
];

/// Host-program square of every database square (the host numbers squares
/// 8..31 with holes).
pub const TO_ENGINE_SQUARE: [u8; 24] = [
    30, 31, 24, 25, 26, 27, 28, 29, 22, 23, 16, 17, 18, 19, 20, 21, 14, 15, 8, 9, 10, 11, 12, 13,
];

/// Database square of a host-program square, if it is a board square.
pub fn from_engine_square(sq: u8) -> Option<u8> {
    TO_ENGINE_SQUARE.iter().position(|&e| e == sq).map(|i| i as u8)
}

/// Parse a board token such as `d5`.
pub fn square_from_name(name: &str) -> Option<u8> {
    SQUARE_NAMES.iter().position(|&n| n == name).map(|i| i as u8)
}
