//! Trap-aware move selection
//!
//! With the trap database present, move selection first filters out the
//! moves the current position's trap mask marks as losing, then looks for
//! moves that put the *opponent* into a trapped position, and only then
//! falls back to the plain database optimum.

use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::moves::AdvancedMove;
use crate::player::PerfectPlayer;
use crate::state::GameState;
use crate::trapdb::{TrapDb, TRAP_BLOCK_MILL_LOSS, TRAP_SELF_MILL_LOSS};

/// How the picked move was justified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickedValue {
    /// The move forces the opponent into a trap that loses for them.
    TrapWin,
    /// The move forces the opponent into a trap that only holds the draw.
    TrapDraw,
    /// Plain database outcome for the side to move.
    Outcome(i8),
    /// No database information was available for the choice.
    Unknown,
}

struct TrapMove {
    mv: AdvancedMove,
    steps: i16,
    is_win: bool,
}

/// Select a move with trap awareness. `db` must be loaded; `ref_move`
/// keeps selection stable across repeated calls.
pub fn best_move_trap_aware(
    player: &PerfectPlayer<'_>,
    db: &TrapDb,
    s: &GameState,
    ref_move: Option<&AdvancedMove>,
) -> EngineResult<(AdvancedMove, PickedValue)> {
    let all_moves = player.legal_moves(s);
    if all_moves.is_empty() {
        return Err(EngineError::NoLegalMoves);
    }

    let cur_mask = db.mask_for(s);
    if cur_mask != 0 {
        info!(
            self_mill = (cur_mask & TRAP_SELF_MILL_LOSS) != 0,
            block_mill = (cur_mask & TRAP_BLOCK_MILL_LOSS) != 0,
            wdl = db.wdl_for(s),
            steps = db.steps_for(s),
            "trap detected in current position"
        );
    }

    // Step 1: drop the moves the mask marks as losing.
    let safe_moves: Vec<AdvancedMove> = all_moves
        .iter()
        .copied()
        .filter(|m| {
            if cur_mask & TRAP_SELF_MILL_LOSS != 0 && m.takes() {
                return false;
            }
            if cur_mask & TRAP_BLOCK_MILL_LOSS != 0 && player.blocks_opponent_mill(s, m) {
                return false;
            }
            true
        })
        .collect();

    if safe_moves.is_empty() {
        // Forced trap: nothing safe remains, pick from everything.
        let picked = player.choose(&all_moves, ref_move).unwrap();
        return Ok((picked, PickedValue::Unknown));
    }

    // Step 2: among safe moves, find the ones that leave the opponent in a
    // trapped position.
    let mut trap_moves: Vec<TrapMove> = Vec::new();
    for &m in &safe_moves {
        let s2 = match player.apply_move(s, &m) {
            Ok(s2) => s2,
            Err(_) => continue,
        };
        if db.mask_for(&s2) == 0 {
            continue;
        }

        // Result of the trapped position, from the opponent's side.
        let trap_wdl = db.wdl_for(&s2);
        let mut steps = db.steps_for(&s2);
        let (mut is_win, mut is_draw) = match trap_wdl {
            0 => (false, true),
            _ => (true, false),
        };

        if steps == -1 && player.store.has_database() {
            // The trap table knows no distance; ask the full database.
            if let Ok(e) = player.evaluate(&s2) {
                match e.outcome_char(player.vals) {
                    'W' => {
                        is_win = true;
                        is_draw = false;
                    }
                    'L' => {
                        is_win = false;
                        is_draw = false;
                    }
                    _ => {
                        is_win = false;
                        is_draw = true;
                    }
                }
            }
        }

        if is_win || is_draw {
            trap_moves.push(TrapMove {
                mv: m,
                steps,
                is_win,
            });
        }
    }

    if !trap_moves.is_empty() {
        // Decisive traps first, faster forcing first; unknown distances
        // rank last within their class.
        trap_moves.sort_by_key(|t| {
            let steps = if t.steps == -1 { i16::MAX } else { t.steps };
            (std::cmp::Reverse(t.is_win), steps)
        });
        let value = if trap_moves[0].is_win {
            PickedValue::TrapWin
        } else {
            PickedValue::TrapDraw
        };
        let ties: Vec<AdvancedMove> = trap_moves
            .iter()
            .take_while(|t| {
                t.is_win == trap_moves[0].is_win && t.steps == trap_moves[0].steps
            })
            .map(|t| t.mv)
            .collect();
        let picked = player.choose(&ties, ref_move).unwrap();
        return Ok((picked, value));
    }

    // Step 3: no trap to set up; fall back to the database optimum over the
    // safe moves.
    if player.store.has_database() {
        let (best, wdl) = player.best_moves_among(s, &safe_moves)?;
        if let Some(picked) = player.choose(&best, ref_move) {
            return Ok((picked, PickedValue::Outcome(wdl)));
        }
    }

    let picked = player.choose(&safe_moves, ref_move).unwrap();
    Ok((picked, PickedValue::Unknown))
}
