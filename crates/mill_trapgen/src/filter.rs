//! Position classification
//!
//! The expensive part of the build is evaluating successors through the
//! sector database, so positions run through a cheap pre-filter first and
//! the evaluations of successor positions are cached per worker thread.
//!
//! A position is a self-mill trap when every mill-closing move loses but
//! some other move does not, and a block-mill trap when every move that
//! cuts down the opponent's immediate mill replies loses but some other
//! move does not.

use std::collections::HashMap;

use mill_engine::state::EMPTY;
use mill_engine::{AdvancedMove, GameState, PerfectPlayer, Rules};

/// Cheap screen for positions that cannot be traps: too little material,
/// or no mill threat anywhere on the board.
pub struct PreFilter {
    line_masks: Vec<u32>,
}

impl PreFilter {
    pub fn new(rules: &Rules) -> PreFilter {
        let line_masks = rules
            .mill_lines
            .iter()
            .map(|line| line.iter().fold(0u32, |m, &sq| m | (1 << sq)))
            .collect();
        PreFilter { line_masks }
    }

    pub fn could_be_trap(&self, s: &GameState) -> bool {
        let total = s.stone_count[0] as u32 + s.stone_count[1] as u32;
        if total < 4 {
            return false;
        }
        if s.phase == 2 && total < 6 {
            return false;
        }
        self.has_mill_threat(s)
    }

    /// Any line with two stones of one color and one empty square.
    fn has_mill_threat(&self, s: &GameState) -> bool {
        let mut white = 0u32;
        let mut black = 0u32;
        let mut empty = 0u32;
        for (i, &cell) in s.board.iter().enumerate() {
            match cell {
                0 => white |= 1 << i,
                1 => black |= 1 << i,
                _ => empty |= 1 << i,
            }
        }
        self.line_masks.iter().any(|&line| {
            (empty & line).count_ones() == 1
                && ((white & line).count_ones() == 2 || (black & line).count_ones() == 2)
        })
    }
}

/// Per-thread cache of move outcomes, keyed by a cheap digest of the
/// successor position. Cleared wholesale when it outgrows 3/5 of its
/// capacity, checked every 1000 scanned positions.
pub struct EvalCache {
    cache: HashMap<u64, char>,
    capacity: usize,
}

impl EvalCache {
    pub fn new(capacity: usize) -> EvalCache {
        EvalCache {
            cache: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn maybe_clear(&mut self) {
        if self.cache.len() > self.capacity * 3 / 5 {
            self.cache.clear();
        }
    }

    fn digest(s: &GameState) -> u64 {
        let mut key = 0u64;
        for (i, &cell) in s.board.iter().enumerate() {
            if cell >= 0 {
                key |= ((cell + 1) as u64) << (i * 2);
            }
        }
        key ^= (s.side_to_move as u64) << 48;
        key ^= (s.set_stone_count[0] as u64) << 52;
        key ^= (s.set_stone_count[1] as u64) << 56;
        key
    }

    /// Outcome letter of a move for the mover; failures count as losses.
    pub fn outcome_of(
        &mut self,
        player: &PerfectPlayer<'_>,
        s: &GameState,
        m: &AdvancedMove,
    ) -> char {
        let s2 = match player.apply_move(s, m) {
            Ok(s2) => s2,
            Err(_) => return 'L',
        };
        let key = Self::digest(&s2);
        if let Some(&c) = self.cache.get(&key) {
            return c;
        }
        let c = match player.move_value(s, m) {
            Ok(v) => v.outcome_char(player.vals),
            Err(_) => 'L',
        };
        self.cache.insert(key, c);
        c
    }
}

/// Every mill-closing move loses, some other move does not.
pub fn is_self_mill_loss_trap(
    player: &PerfectPlayer<'_>,
    s: &GameState,
    moves: &[AdvancedMove],
    cache: &mut EvalCache,
) -> bool {
    let mut has_closing = false;
    for m in moves {
        if m.takes() {
            has_closing = true;
            if cache.outcome_of(player, s, m) != 'L' {
                return false;
            }
        }
    }
    if !has_closing {
        return false;
    }
    moves
        .iter()
        .any(|m| !m.takes() && cache.outcome_of(player, s, m) != 'L')
}

/// Every blocking move loses, some other move does not.
pub fn is_block_mill_loss_trap(
    player: &PerfectPlayer<'_>,
    s: &GameState,
    moves: &[AdvancedMove],
    cache: &mut EvalCache,
) -> bool {
    let mut blocking = vec![false; moves.len()];
    let mut any_block = false;
    for (i, m) in moves.iter().enumerate() {
        if !m.takes() && player.blocks_opponent_mill(s, m) {
            blocking[i] = true;
            any_block = true;
            if cache.outcome_of(player, s, m) != 'L' {
                return false;
            }
        }
    }
    if !any_block {
        return false;
    }
    moves
        .iter()
        .zip(&blocking)
        .any(|(m, &blocks)| !blocks && cache.outcome_of(player, s, m) != 'L')
}

/// Reconstruct the scanned game state from occupancy masks and the
/// sector's counters.
pub fn state_from_bits(
    white: u32,
    black: u32,
    side: u8,
    set_white: u8,
    set_black: u8,
    phase: u8,
) -> GameState {
    let mut s = GameState::new();
    for i in 0..24 {
        if white & (1 << i) != 0 {
            s.board[i] = 0;
        } else if black & (1 << i) != 0 {
            s.board[i] = 1;
        } else {
            s.board[i] = EMPTY;
        }
    }
    s.stone_count = [white.count_ones() as u8, black.count_ones() as u8];
    s.set_stone_count = [set_white, set_black];
    s.phase = phase;
    s.side_to_move = side;
    s.move_count = 10;
    s
}
