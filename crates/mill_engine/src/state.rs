//! Game state
//!
//! Board occupancy plus the placing counters, the side to move, and the
//! removal-pending flag that bridges a mill closure and the following stone
//! removal. Move application propagates rule violations as errors instead of
//! asserting.

use crate::error::{EngineError, EngineResult};
use crate::rules::{Rules, IRREVERSIBLE_MOVE_LIMIT, SQUARES};

/// Empty square marker; 0 is a white stone, 1 a black stone.
pub const EMPTY: i8 = -1;

/// One atomic board change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStep {
    Place { to: u8 },
    Shift { from: u8, to: u8 },
    Take { from: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    pub board: [i8; SQUARES],
    /// 1 while stones are being placed, 2 afterwards.
    pub phase: u8,
    /// Stones each player has placed so far.
    pub set_stone_count: [u8; 2],
    /// Stones each player has on the board.
    pub stone_count: [u8; 2],
    /// A mill was just closed; the next step must remove an opponent stone.
    pub removal_pending: bool,
    pub side_to_move: u8,
    pub move_count: u32,
    pub over: bool,
    /// 0 or 1; -1 for a draw. Meaningful only when `over`.
    pub winner: i8,
    /// The game ended because the side to move cannot move.
    pub block: bool,
    /// Successive reversible (slide) moves.
    pub last_irrev: u32,
}

impl Default for GameState {
    fn default() -> Self {
        GameState {
            board: [EMPTY; SQUARES],
            phase: 1,
            set_stone_count: [0, 0],
            stone_count: [0, 0],
            removal_pending: false,
            side_to_move: 0,
            move_count: 0,
            over: false,
            winner: 0,
            block: false,
            last_irrev: 0,
        }
    }
}

impl GameState {
    pub fn new() -> GameState {
        GameState::default()
    }

    /// Stones player `p` will have in total: on the board plus in hand.
    pub fn future_piece_count(&self, rules: &Rules, p: usize) -> i32 {
        self.stone_count[p] as i32 + rules.max_pieces as i32 - self.set_stone_count[p] as i32
    }

    fn invariants_hold(&self, rules: &Rules) -> bool {
        self.set_stone_count[0] <= rules.max_pieces
            && self.set_stone_count[1] <= rules.max_pieces
            && (self.phase == 1
                || (self.phase == 2
                    && self.set_stone_count[0] == rules.max_pieces
                    && self.set_stone_count[1] == rules.max_pieces))
    }

    fn check_step(&self, step: MoveStep) -> EngineResult<()> {
        let fail = |message: String| Err(EngineError::InvalidGameState { message });
        match step {
            MoveStep::Place { to } => {
                if self.phase != 1 {
                    return fail("placement outside the placing phase".into());
                }
                if self.board[to as usize] != EMPTY {
                    return fail(format!("placement on occupied square {to}"));
                }
            }
            MoveStep::Shift { from, to } => {
                if self.board[from as usize] != self.side_to_move as i8 {
                    return fail(format!("no own stone on square {from}"));
                }
                if self.board[to as usize] != EMPTY {
                    return fail(format!("move onto occupied square {to}"));
                }
            }
            MoveStep::Take { from } => {
                if !self.removal_pending {
                    return fail("removal without a pending mill".into());
                }
                if self.board[from as usize] != 1 - self.side_to_move as i8 {
                    return fail(format!("no opponent stone on square {from}"));
                }
            }
        }
        Ok(())
    }

    /// Apply one step, updating counters, the removal-pending flag and the
    /// side to move.
    pub fn make_move(&mut self, rules: &Rules, step: MoveStep) -> EngineResult<()> {
        debug_assert!(self.invariants_hold(rules));
        debug_assert!(!self.over || self.winner == -1);
        self.check_step(step)?;

        self.move_count += 1;
        let stm = self.side_to_move as usize;
        let opp = 1 - stm;

        let mill_square = match step {
            MoveStep::Place { to } => {
                self.board[to as usize] = stm as i8;
                self.set_stone_count[stm] += 1;
                self.stone_count[stm] += 1;
                self.last_irrev = 0;
                Some(to)
            }
            MoveStep::Shift { from, to } => {
                self.board[from as usize] = EMPTY;
                self.board[to as usize] = stm as i8;
                self.last_irrev += 1;
                if self.last_irrev >= IRREVERSIBLE_MOVE_LIMIT {
                    self.over = true;
                    self.winner = -1;
                }
                Some(to)
            }
            MoveStep::Take { from } => {
                self.board[from as usize] = EMPTY;
                self.stone_count[opp] -= 1;
                self.removal_pending = false;
                if self.future_piece_count(rules, opp) < 3 {
                    self.over = true;
                    self.winner = stm as i8;
                }
                self.last_irrev = 0;
                None
            }
        };

        let closed_mill = mill_square
            .map(|sq| rules.check_mill(sq as usize, &self.board).is_some())
            .unwrap_or(false);

        if closed_mill && self.stone_count[opp] > 0 {
            self.removal_pending = true;
        } else {
            self.side_to_move = opp as u8;
            if self.set_stone_count[0] == rules.max_pieces
                && self.set_stone_count[1] == rules.max_pieces
                && self.phase == 1
            {
                self.phase = 2;
            }
            if !rules.can_move(self) {
                self.over = true;
                self.block = true;
                self.winner = 1 - self.side_to_move as i8;
                if rules.variant == crate::rules::Variant::Morabaraba
                    && self.stone_count == [12, 12]
                {
                    // A completely full Morabaraba board is agreed drawn.
                    self.winner = -1;
                }
            }
        }

        debug_assert!(self.invariants_hold(rules));
        Ok(())
    }

    /// Validate a freely set up position and derive its game-over status.
    /// Rejects impossible piece counts, placing-phase parity violations and
    /// removal-pending positions without removable stones.
    pub fn set_over_and_check_valid_setup(&mut self, rules: &Rules) -> EngineResult<()> {
        debug_assert!(!self.over && !self.block);
        let fail = |message: &str| {
            Err(EngineError::InvalidGameState {
                message: message.to_string(),
            })
        };

        let to_place_w = rules.max_pieces as i32 - self.set_stone_count[0] as i32;
        if self.stone_count[0] as i32 + to_place_w > rules.max_pieces as i32 {
            return fail("too many white stones on the board plus in hand");
        }
        let to_place_b = rules.max_pieces as i32 - self.set_stone_count[1] as i32;
        if self.stone_count[1] as i32 + to_place_b > rules.max_pieces as i32 {
            return fail("too many black stones on the board plus in hand");
        }

        debug_assert!(!(self.phase == 1 && to_place_w == 0 && to_place_b == 0));
        debug_assert!(!(self.phase == 2 && (to_place_w > 0 || to_place_b > 0)));

        if rules.variant != crate::rules::Variant::Lasker {
            if self.phase == 1 {
                // Players alternate placements, except that a removal
                // interrupts the turn order.
                let offset = if (self.side_to_move == 0) ^ self.removal_pending {
                    0
                } else {
                    1
                };
                if to_place_w != to_place_b - offset {
                    return fail(
                        "placing-phase stone counts do not match an alternating move order",
                    );
                }
            } else {
                if self.phase != 2 {
                    return fail("phase must be 1 or 2");
                }
                if to_place_w != 0 || to_place_b != 0 {
                    return fail("stones left to place outside the placing phase");
                }
            }
        }

        if self.removal_pending && self.stone_count[1 - self.side_to_move as usize] == 0 {
            return fail("a removal cannot be pending when the opponent has no stones");
        }

        let white_lose = self.future_piece_count(rules, 0) < 3;
        let black_lose = self.future_piece_count(rules, 1) < 3;
        if white_lose || black_lose {
            self.over = true;
            self.winner = if white_lose && black_lose {
                -1
            } else if white_lose {
                1
            } else {
                0
            };
        }

        // A removal-pending side always has a move; otherwise check for a
        // block.
        if !self.removal_pending && !rules.can_move(self) {
            self.over = true;
            self.block = true;
            self.winner = 1 - self.side_to_move as i8;
            if rules.variant == crate::rules::Variant::Morabaraba && self.stone_count == [12, 12]
            {
                self.winner = -1;
            }
        }

        if self.last_irrev >= IRREVERSIBLE_MOVE_LIMIT {
            self.over = true;
            self.winner = -1;
        }

        Ok(())
    }

    /// Serialize in the clipboard format: board cells, then the counters.
    pub fn to_text(&self) -> String {
        let mut fields: Vec<String> = self.board.iter().map(|c| c.to_string()).collect();
        fields.push(self.side_to_move.to_string());
        fields.push("0".into());
        fields.push("0".into());
        fields.push(self.phase.to_string());
        fields.push(self.set_stone_count[0].to_string());
        fields.push(self.set_stone_count[1].to_string());
        fields.push(self.stone_count[0].to_string());
        fields.push(self.stone_count[1].to_string());
        fields.push(if self.removal_pending { "True" } else { "False" }.into());
        fields.push(self.move_count.to_string());
        fields.push(self.last_irrev.to_string());
        fields.join(",")
    }

    /// Parse the clipboard format and validate the position.
    pub fn from_text(text: &str, rules: &Rules) -> EngineResult<GameState> {
        let fail = |message: String| EngineError::InvalidInput { message };
        let fields: Vec<&str> = text.split(',').map(|f| f.trim()).collect();
        if fields.len() < 35 {
            return Err(fail(format!(
                "expected at least 35 comma-separated fields, got {}",
                fields.len()
            )));
        }

        let int = |i: usize| -> EngineResult<i32> {
            fields[i]
                .parse()
                .map_err(|_| fail(format!("field {i} is not an integer: {:?}", fields[i])))
        };

        let mut s = GameState::new();
        for i in 0..SQUARES {
            match int(i)? {
                0 => {
                    s.board[i] = 0;
                    s.stone_count[0] += 1;
                }
                1 => {
                    s.board[i] = 1;
                    s.stone_count[1] += 1;
                }
                -1 => s.board[i] = EMPTY,
                v => return Err(fail(format!("invalid board cell {v} at square {i}"))),
            }
        }

        s.side_to_move = int(24)? as u8;
        s.phase = int(27)? as u8;
        s.set_stone_count[0] = int(28)? as u8;
        s.set_stone_count[1] = int(29)? as u8;
        if s.stone_count[0] as i32 != int(30)? || s.stone_count[1] as i32 != int(31)? {
            return Err(fail(
                "embedded stone counts disagree with the board cells".into(),
            ));
        }
        s.removal_pending = fields[32].eq_ignore_ascii_case("true");
        s.move_count = int(33)? as u32;
        s.last_irrev = int(34)? as u32;

        s.set_over_and_check_valid_setup(rules)?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Variant;

    fn rules() -> Rules {
        Rules::new(Variant::Standard)
    }

    #[test]
    fn test_place_updates_counters() {
        let r = rules();
        let mut s = GameState::new();
        s.make_move(&r, MoveStep::Place { to: 4 }).unwrap();
        assert_eq!(s.board[4], 0);
        assert_eq!(s.stone_count, [1, 0]);
        assert_eq!(s.set_stone_count, [1, 0]);
        assert_eq!(s.side_to_move, 1);
        assert!(!s.removal_pending);
    }

    #[test]
    fn test_mill_sets_removal_pending() {
        let r = rules();
        let mut s = GameState::new();
        // White builds 1-2-3 while black places elsewhere.
        for (w, b) in [(1u8, 8u8), (2, 9)] {
            s.make_move(&r, MoveStep::Place { to: w }).unwrap();
            s.make_move(&r, MoveStep::Place { to: b }).unwrap();
        }
        s.make_move(&r, MoveStep::Place { to: 3 }).unwrap();
        assert!(s.removal_pending);
        assert_eq!(s.side_to_move, 0, "turn is held until the removal");
        s.make_move(&r, MoveStep::Take { from: 8 }).unwrap();
        assert!(!s.removal_pending);
        assert_eq!(s.side_to_move, 1);
        assert_eq!(s.stone_count, [3, 1]);
    }

    #[test]
    fn test_illegal_steps_are_errors() {
        let r = rules();
        let mut s = GameState::new();
        s.make_move(&r, MoveStep::Place { to: 4 }).unwrap();
        assert!(s.make_move(&r, MoveStep::Place { to: 4 }).is_err());
        assert!(s.make_move(&r, MoveStep::Take { from: 4 }).is_err());
        assert!(s
            .make_move(&r, MoveStep::Shift { from: 4, to: 5 })
            .is_err());
    }

    #[test]
    fn test_mill_with_no_opponent_stones_passes_turn() {
        let r = rules();
        let mut s = GameState::new();
        s.make_move(&r, MoveStep::Place { to: 1 }).unwrap();
        s.side_to_move = 0; // keep white to move for the test setup
        s.make_move(&r, MoveStep::Place { to: 2 }).unwrap();
        s.side_to_move = 0;
        s.make_move(&r, MoveStep::Place { to: 3 }).unwrap();
        assert!(!s.removal_pending, "no stone to take, no removal");
        assert_eq!(s.side_to_move, 1);
    }

    #[test]
    fn test_setup_parity_rule() {
        let r = rules();
        let mut s = GameState::new();
        // White placed one stone, black none, and white to move again:
        // violates alternation.
        s.board[0] = 0;
        s.stone_count = [1, 0];
        s.set_stone_count = [1, 0];
        s.side_to_move = 0;
        assert!(s.set_over_and_check_valid_setup(&r).is_err());
        // Black to move is the consistent completion.
        s.side_to_move = 1;
        let mut s2 = s.clone();
        assert!(s2.set_over_and_check_valid_setup(&r).is_ok());
        assert!(!s2.over);
    }

    #[test]
    fn test_setup_low_piece_count_ends_game() {
        let r = rules();
        let mut s = GameState::new();
        s.phase = 2;
        s.set_stone_count = [9, 9];
        for sq in [0usize, 2, 4] {
            s.board[sq] = 0;
        }
        s.board[8] = 1;
        s.board[9] = 1;
        s.stone_count = [3, 2];
        s.set_over_and_check_valid_setup(&r).unwrap();
        assert!(s.over);
        assert_eq!(s.winner, 0);
    }

    #[test]
    fn test_text_roundtrip() {
        let r = rules();
        let mut s = GameState::new();
        for step in [
            MoveStep::Place { to: 1 },
            MoveStep::Place { to: 8 },
            MoveStep::Place { to: 2 },
            MoveStep::Place { to: 9 },
        ] {
            s.make_move(&r, step).unwrap();
        }
        let text = s.to_text();
        let parsed = GameState::from_text(&text, &r).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn test_text_rejects_count_mismatch() {
        let r = rules();
        let s = GameState::new();
        let text = s.to_text().replace(",0,0,False", ",3,0,False");
        assert!(GameState::from_text(&text, &r).is_err());
    }
}
