//! Database-backed move selection
//!
//! `PerfectPlayer` enumerates legal moves, evaluates the position after
//! each through the sector database, and keeps the equi-optimal set under
//! one of two picking policies. Mill-closing moves carry their removal as a
//! single combined move.

use rand::Rng;

use crate::error::{EngineError, EngineResult};
use crate::eval::GuiEval;
use crate::moves::{AdvancedMove, MoveKind};
use crate::options::{Options, PickPolicy};
use crate::rules::{Rules, SQUARES};
use crate::sector::id::SectorId;
use crate::sector::store::SectorStore;
use crate::sector::values::{SecVal, SectorValues};
use crate::state::{GameState, MoveStep, EMPTY};
use crate::MASK24;

/// Swap the color halves of a 48-bit board.
pub fn negate_board(a: u64) -> u64 {
    ((a & MASK24) << 24) | (a >> 24)
}

/// The white and black occupancy words of a state.
pub fn board_bits(s: &GameState) -> (u32, u32) {
    let mut white = 0u32;
    let mut black = 0u32;
    for i in 0..SQUARES {
        match s.board[i] {
            0 => white |= 1 << i,
            1 => black |= 1 << i,
            _ => {}
        }
    }
    (white, black)
}

/// Strategy seam for move selection backends.
pub trait Player {
    fn possibilities(&self, s: &GameState) -> Vec<AdvancedMove>;
    fn situation_value(&self, s: &GameState) -> EngineResult<GuiEval>;
    fn play(&self, s: &GameState, m: &AdvancedMove) -> EngineResult<GameState>;
    fn describe_move(&self, s: &GameState, m: &AdvancedMove) -> String;
}

pub struct PerfectPlayer<'a> {
    pub rules: &'a Rules,
    pub vals: &'a SectorValues,
    pub store: &'a SectorStore,
    pub options: &'a Options,
}

impl<'a> PerfectPlayer<'a> {
    pub fn new(
        rules: &'a Rules,
        vals: &'a SectorValues,
        store: &'a SectorStore,
        options: &'a Options,
    ) -> PerfectPlayer<'a> {
        PerfectPlayer {
            rules,
            vals,
            store,
            options,
        }
    }

    /// Future stones of the side to move.
    fn future_piece_count(&self, s: &GameState) -> i32 {
        s.future_piece_count(self.rules, s.side_to_move as usize)
    }

    fn makes_mill(&self, s: &GameState, from: Option<u8>, to: u8) -> bool {
        let mut board = s.board;
        if let Some(f) = from {
            board[f as usize] = EMPTY;
        }
        board[to as usize] = s.side_to_move as i8;
        self.rules.check_mill(to as usize, &board).is_some()
    }

    fn is_mill(&self, s: &GameState, sq: usize) -> bool {
        self.rules.check_mill(sq, &s.board).is_some()
    }

    fn set_moves(&self, s: &GameState) -> Vec<AdvancedMove> {
        (0..SQUARES as u8)
            .filter(|&i| s.board[i as usize] == EMPTY)
            .map(AdvancedMove::place)
            .collect()
    }

    fn slide_moves(&self, s: &GameState) -> Vec<AdvancedMove> {
        let stm = s.side_to_move as i8;
        let jumps = self.future_piece_count(s) == 3;
        let mut r = Vec::new();
        for i in 0..SQUARES {
            if s.board[i] != stm {
                continue;
            }
            for j in 0..SQUARES {
                if s.board[j] == EMPTY && (jumps || self.rules.board_graph[i][j]) {
                    r.push(AdvancedMove::slide(i as u8, j as u8));
                }
            }
        }
        r
    }

    /// Squares of opponent stones that may be removed: stones outside mills,
    /// or any stone when every opponent stone stands in a mill.
    fn removable_squares(&self, s: &GameState) -> Vec<u8> {
        let opp = 1 - s.side_to_move as i8;
        let all_in_mill = self.rules.all_opponent_pieces_in_mill(s);
        (0..SQUARES as u8)
            .filter(|&i| {
                s.board[i as usize] == opp && (all_in_mill || !self.is_mill(s, i as usize))
            })
            .collect()
    }

    /// Copies of a mill-closing move, one per legal removal.
    fn with_taking_moves(&self, s: &GameState, m: AdvancedMove) -> Vec<AdvancedMove> {
        self.removable_squares(s)
            .into_iter()
            .map(|sq| m.with_take(sq))
            .collect()
    }

    fn only_taking_moves(&self, s: &GameState) -> Vec<AdvancedMove> {
        self.removable_squares(s)
            .into_iter()
            .map(AdvancedMove::remove)
            .collect()
    }

    /// All legal moves, mill closures expanded over their removals.
    pub fn legal_moves(&self, s: &GameState) -> Vec<AdvancedMove> {
        if s.removal_pending {
            return self.only_taking_moves(s);
        }

        let placing = s.set_stone_count[s.side_to_move as usize] < self.rules.max_pieces;
        let base = match self.rules.variant {
            crate::rules::Variant::Standard | crate::rules::Variant::Morabaraba => {
                if placing {
                    self.set_moves(s)
                } else {
                    self.slide_moves(s)
                }
            }
            crate::rules::Variant::Lasker => {
                let mut ms = self.slide_moves(s);
                if placing {
                    ms.extend(self.set_moves(s));
                }
                ms
            }
        };

        let mut out = Vec::with_capacity(base.len());
        for m in base {
            let forms_mill = match m.kind {
                MoveKind::Place { to } => self.makes_mill(s, None, to),
                MoveKind::SlideOrJump { from, to } => self.makes_mill(s, Some(from), to),
                MoveKind::Remove { .. } => false,
            };
            if forms_mill && s.stone_count[1 - s.side_to_move as usize] > 0 {
                out.extend(self.with_taking_moves(s, m));
            } else {
                out.push(m);
            }
        }
        out
    }

    /// Apply a full move (with its removal, when attached) to a copy.
    pub fn apply_move(&self, s: &GameState, m: &AdvancedMove) -> EngineResult<GameState> {
        let mut s2 = s.clone();
        match m.kind {
            MoveKind::Place { to } => s2.make_move(self.rules, MoveStep::Place { to })?,
            MoveKind::SlideOrJump { from, to } => {
                s2.make_move(self.rules, MoveStep::Shift { from, to })?
            }
            MoveKind::Remove { from } => s2.make_move(self.rules, MoveStep::Take { from })?,
        }
        if let Some(t) = m.take {
            s2.make_move(self.rules, MoveStep::Take { from: t })?;
        }
        Ok(s2)
    }

    /// Sector id of a state, oriented so the side to move is white.
    pub fn state_sector_id(&self, s: &GameState) -> SectorId {
        let id = SectorId::new(
            s.stone_count[0],
            s.stone_count[1],
            self.rules.max_pieces - s.set_stone_count[0],
            self.rules.max_pieces - s.set_stone_count[1],
        );
        if s.side_to_move == 1 {
            id.negate()
        } else {
            id
        }
    }

    /// Sector value the state's evaluations are relative to; `None` inside
    /// a removal sub-position.
    pub fn sector_sval(&self, s: &GameState) -> EngineResult<Option<SecVal>> {
        if s.removal_pending {
            return Ok(None);
        }
        let id = self.state_sector_id(s);
        if !self.store.contains(id) {
            return Err(EngineError::SectorMissing {
                name: id.file_name(self.rules.variant),
            });
        }
        Ok(Some(self.vals.value_of(id)?))
    }

    /// Database evaluation of a position, in its own sector's frame.
    /// Removal sub-positions evaluate to the bottom sentinel (the caller
    /// picks the removal itself); a side down to two future stones is an
    /// immediate virtual loss.
    pub fn evaluate(&self, s: &GameState) -> EngineResult<GuiEval> {
        if s.removal_pending {
            return Ok(GuiEval::min_value(None, self.vals));
        }
        if self.future_piece_count(s) < 3 {
            return Ok(GuiEval::virt_loss(self.vals));
        }

        let id = self.state_sector_id(s);
        if !self.store.contains(id) {
            return Err(EngineError::SectorMissing {
                name: id.file_name(self.rules.variant),
            });
        }

        let (white, black) = board_bits(s);
        let mut board = white as u64 | ((black as u64) << 24);
        if s.side_to_move == 1 {
            board = negate_board(board);
        }

        self.store.with_sector(id, self.vals, |sec| {
            let (_, e) = sec.probe(board)?;
            Ok(GuiEval::new(e, sec.sval))
        })
    }

    /// Value of a move: the evaluation of the successor, reflected back
    /// into the mover's frame.
    pub fn move_value(&self, s: &GameState, m: &AdvancedMove) -> EngineResult<GuiEval> {
        let s2 = self.apply_move(s, m)?;
        let v = self.evaluate(&s2)?;
        Ok(v.undo_negate(self.sector_sval(s)?, self.vals))
    }

    /// The equi-optimal subset of `moves` under the configured picking
    /// policy, plus the resulting outcome for the side to move.
    pub fn best_moves_among(
        &self,
        s: &GameState,
        moves: &[AdvancedMove],
    ) -> EngineResult<(Vec<AdvancedMove>, i8)> {
        let mut valued = Vec::with_capacity(moves.len());
        for &m in moves {
            valued.push((m, self.move_value(s, &m)?));
        }

        let best: Vec<(AdvancedMove, GuiEval)> = match self.options.pick_policy {
            PickPolicy::OutcomeFirst => {
                // Rank by outcome letter only: all wins, else all
                // non-losses, else everything.
                let mut found_win = false;
                let mut found_draw = false;
                let mut r: Vec<(AdvancedMove, GuiEval)> = Vec::new();
                for (m, e) in valued {
                    let c = e.outcome_char(self.vals);
                    if c == 'W' {
                        if !found_win {
                            r.clear();
                            found_win = true;
                        }
                        r.push((m, e));
                    } else if !found_win && c != 'L' {
                        if !found_draw {
                            r.clear();
                            found_draw = true;
                        }
                        r.push((m, e));
                    } else if !found_win && !found_draw && c == 'L' {
                        r.push((m, e));
                    }
                }
                r
            }
            PickPolicy::StrictMax => {
                let mut ma = GuiEval::min_value(self.sector_sval(s)?, self.vals);
                let mut r: Vec<(AdvancedMove, GuiEval)> = Vec::new();
                for (m, e) in valued {
                    match e.compare(ma) {
                        std::cmp::Ordering::Greater => {
                            ma = e;
                            r.clear();
                            r.push((m, e));
                        }
                        std::cmp::Ordering::Equal => r.push((m, e)),
                        std::cmp::Ordering::Less => {}
                    }
                }
                r
            }
        };

        let outcome = match best.first() {
            None => 'L',
            Some((_, e)) => e.outcome_char(self.vals),
        };
        let wdl = match outcome {
            'W' => 1,
            'L' => -1,
            _ => 0,
        };
        Ok((best.into_iter().map(|(m, _)| m).collect(), wdl))
    }

    /// Optimal moves of a position under the configured policy.
    pub fn good_moves(&self, s: &GameState) -> EngineResult<(Vec<AdvancedMove>, i8)> {
        let moves = self.legal_moves(s);
        self.best_moves_among(s, &moves)
    }

    /// Pick one move from an equi-optimal set. A reference move that is in
    /// the set wins (stable across calls); otherwise ties break randomly
    /// when shuffling is enabled, else to the first.
    pub fn choose(
        &self,
        moves: &[AdvancedMove],
        ref_move: Option<&AdvancedMove>,
    ) -> Option<AdvancedMove> {
        if moves.is_empty() {
            return None;
        }
        if let Some(r) = ref_move {
            if let Some(found) = moves.iter().find(|m| same_target(m, r)) {
                return Some(*found);
            }
        }
        if self.options.shuffling_enabled {
            let mut rng = rand::rng();
            Some(moves[rng.random_range(0..moves.len())])
        } else {
            Some(moves[0])
        }
    }

    /// Whether `m` strictly decreases the number of immediate mill-closing
    /// replies available to the opponent.
    pub fn blocks_opponent_mill(&self, s: &GameState, m: &AdvancedMove) -> bool {
        if matches!(m.kind, MoveKind::Remove { .. }) {
            return false;
        }
        let after = match self.apply_move(s, m) {
            Ok(a) => a,
            Err(_) => return false,
        };

        let mut opp_before = s.clone();
        opp_before.side_to_move = 1 - s.side_to_move;
        let threats_before = self
            .legal_moves(&opp_before)
            .iter()
            .filter(|mm| mm.takes())
            .count();
        if threats_before == 0 {
            return false;
        }

        // After the move it is the opponent's turn in `after` already.
        let threats_after = self.legal_moves(&after).iter().filter(|mm| mm.takes()).count();
        threats_after < threats_before
    }
}

/// Two moves name the same board action (the removal decoration is not
/// compared).
fn same_target(a: &AdvancedMove, b: &AdvancedMove) -> bool {
    match (a.kind, b.kind) {
        (MoveKind::Place { to: t1 }, MoveKind::Place { to: t2 }) => t1 == t2,
        (
            MoveKind::SlideOrJump { from: f1, to: t1 },
            MoveKind::SlideOrJump { from: f2, to: t2 },
        ) => f1 == f2 && t1 == t2,
        (MoveKind::Remove { from: f1 }, MoveKind::Remove { from: f2 }) => f1 == f2,
        _ => false,
    }
}

impl Player for PerfectPlayer<'_> {
    fn possibilities(&self, s: &GameState) -> Vec<AdvancedMove> {
        self.legal_moves(s)
    }

    fn situation_value(&self, s: &GameState) -> EngineResult<GuiEval> {
        self.evaluate(s)
    }

    fn play(&self, s: &GameState, m: &AdvancedMove) -> EngineResult<GameState> {
        self.apply_move(s, m)
    }

    fn describe_move(&self, s: &GameState, m: &AdvancedMove) -> String {
        match self.move_value(s, m) {
            Ok(v) => format!("{m} {}", v.to_display(self.vals)),
            Err(e) => format!("{m} ?{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Variant;

    fn fixture() -> (Rules, SectorValues, Options) {
        let rules = Rules::new(Variant::Standard);
        let vals = SectorValues::parse(
            "virt_loss_val: -100\nvirt_win_val: 100\n0\n",
            "test.secval",
        )
        .unwrap();
        let dir = std::env::temp_dir();
        let options = Options::new(dir);
        (rules, vals, options)
    }

    fn player<'a>(
        rules: &'a Rules,
        vals: &'a SectorValues,
        store: &'a SectorStore,
        options: &'a Options,
    ) -> PerfectPlayer<'a> {
        PerfectPlayer::new(rules, vals, store, options)
    }

    #[test]
    fn test_empty_board_has_24_placements() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);
        let s = GameState::new();
        let moves = p.legal_moves(&s);
        assert_eq!(moves.len(), 24);
        assert!(moves.iter().all(|m| matches!(m.kind, MoveKind::Place { .. })));
    }

    #[test]
    fn test_three_stones_jump_anywhere() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        s.phase = 2;
        s.set_stone_count = [9, 9];
        for sq in [0usize, 4, 9] {
            s.board[sq] = 0;
        }
        for sq in [12usize, 16, 20] {
            s.board[sq] = 1;
        }
        s.stone_count = [3, 3];
        let moves = p.legal_moves(&s);
        // 3 stones x 18 empty squares, no mills possible from these spots in
        // one jump except via the counted expansions.
        assert!(moves.len() >= 3 * 18 - 4);
        assert!(moves
            .iter()
            .all(|m| matches!(m.kind, MoveKind::SlideOrJump { .. })));
    }

    #[test]
    fn test_mill_closure_expands_removals() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        // White to place the third stone of 1-2-3; black has stones on 8
        // (free) and 9+10+11 would be too strong, keep 8 and 9.
        s.board[1] = 0;
        s.board[2] = 0;
        s.board[8] = 1;
        s.board[9] = 1;
        s.stone_count = [2, 2];
        s.set_stone_count = [2, 3];
        s.side_to_move = 0;
        let moves = p.legal_moves(&s);
        let closing: Vec<_> = moves
            .iter()
            .filter(|m| m.to() == Some(3) && m.takes())
            .collect();
        // One combined move per removable black stone.
        assert_eq!(closing.len(), 2);
        // The bare placement on 3 must not appear.
        assert!(!moves.iter().any(|m| m.to() == Some(3) && !m.takes()));
    }

    #[test]
    fn test_removal_restricted_to_out_of_mill_stones() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        s.board[8] = 1;
        s.board[9] = 1;
        s.board[10] = 1;
        s.board[12] = 1;
        s.board[0] = 0;
        s.board[2] = 0;
        s.stone_count = [2, 4];
        s.set_stone_count = [3, 4];
        s.removal_pending = true;
        let moves = p.legal_moves(&s);
        // 9-10-11 is not complete, so no black mill; every stone removable.
        assert_eq!(moves.len(), 4);

        s.board[11] = 1;
        s.stone_count[1] = 5;
        s.set_stone_count[1] = 5;
        let moves = p.legal_moves(&s);
        // Now 9-10-11 is a mill; only 8 and 12 are removable.
        let squares: Vec<u8> = moves
            .iter()
            .map(|m| match m.kind {
                MoveKind::Remove { from } => from,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(squares, vec![8, 12]);
    }

    #[test]
    fn test_all_in_mill_everything_removable() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        for sq in [9usize, 10, 11] {
            s.board[sq] = 1;
        }
        s.board[0] = 0;
        s.board[2] = 0;
        s.stone_count = [2, 3];
        s.set_stone_count = [3, 3];
        s.removal_pending = true;
        let moves = p.legal_moves(&s);
        assert_eq!(moves.len(), 3);
    }

    #[test]
    fn test_lasker_mixes_placements_and_slides() {
        let rules = Rules::new(Variant::Lasker);
        let vals = SectorValues::parse(
            "virt_loss_val: -100\nvirt_win_val: 100\n0\n",
            "test.secval",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Lasker);
        let options = Options::new(dir.path().to_path_buf());
        let p = PerfectPlayer::new(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        s.board[0] = 0;
        s.stone_count = [1, 0];
        s.set_stone_count = [1, 1];
        let moves = p.legal_moves(&s);
        let places = moves
            .iter()
            .filter(|m| matches!(m.kind, MoveKind::Place { .. }))
            .count();
        let slides = moves
            .iter()
            .filter(|m| matches!(m.kind, MoveKind::SlideOrJump { .. }))
            .count();
        assert_eq!(places, 23);
        assert_eq!(slides, 3);
    }

    #[test]
    fn test_apply_move_with_take() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        s.board[1] = 0;
        s.board[2] = 0;
        s.board[8] = 1;
        s.board[9] = 1;
        s.stone_count = [2, 2];
        s.set_stone_count = [2, 3];
        let m = AdvancedMove::place(3).with_take(8);
        let s2 = p.apply_move(&s, &m).unwrap();
        assert_eq!(s2.board[3], 0);
        assert_eq!(s2.board[8], EMPTY);
        assert_eq!(s2.stone_count, [3, 1]);
        assert_eq!(s2.side_to_move, 1);
        assert!(!s2.removal_pending);
    }

    #[test]
    fn test_state_sector_id_negates_for_black() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let mut s = GameState::new();
        s.board[0] = 0;
        s.stone_count = [1, 0];
        s.set_stone_count = [1, 1];
        s.side_to_move = 1;
        assert_eq!(p.state_sector_id(&s), SectorId::new(0, 1, 8, 8));
        s.side_to_move = 0;
        assert_eq!(p.state_sector_id(&s), SectorId::new(1, 0, 8, 8));
    }

    #[test]
    fn test_choose_prefers_reference_move() {
        let (rules, vals, options) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::probe(dir.path(), Variant::Standard);
        let p = player(&rules, &vals, &store, &options);

        let moves = vec![
            AdvancedMove::place(1),
            AdvancedMove::place(2),
            AdvancedMove::place(3),
        ];
        let picked = p.choose(&moves, Some(&AdvancedMove::place(2))).unwrap();
        assert_eq!(picked, moves[1]);
        // A reference outside the set falls back to the first move.
        let picked = p.choose(&moves, Some(&AdvancedMove::place(9))).unwrap();
        assert_eq!(picked, moves[0]);
        assert!(p.choose(&[], None).is_none());
    }

    #[test]
    fn test_negate_board() {
        let b = 0x000001u64 | (0x800000u64 << 24);
        let n = negate_board(b);
        assert_eq!(n & MASK24, 0x800000);
        assert_eq!(n >> 24, 0x000001);
        assert_eq!(negate_board(n), b);
    }
}
