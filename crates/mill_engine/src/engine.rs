//! Engine facade
//!
//! One `Engine` value owns everything that was process-global in earlier
//! designs: the variant tables, the sector value table, the loaded-sector
//! store and the optional trap database. It is created once, serves queries
//! until dropped, and never tears itself down between calls.

use tracing::info;

use crate::error::{self, EngineError, EngineResult};
use crate::moves::AdvancedMove;
use crate::options::Options;
use crate::player::{PerfectPlayer, Player};
use crate::rules::Rules;
use crate::sector::file::Sector;
use crate::sector::id::SectorId;
use crate::sector::store::SectorStore;
use crate::sector::values::SectorValues;
use crate::state::GameState;
use crate::symmetry;
use crate::trapdb::picker::{best_move_trap_aware, PickedValue};
use crate::trapdb::TrapDb;
use crate::eval::RawEval;
use crate::MASK24;

/// Decoded result of a direct database query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// Result for the side to move: -1 loss, 0 draw, +1 win.
    pub wdl: i8,
    /// Half-moves to the result, -1 when not meaningful.
    pub steps: i16,
}

pub struct Engine {
    rules: Rules,
    vals: SectorValues,
    store: SectorStore,
    trap_db: Option<TrapDb>,
    options: Options,
}

fn record<T>(r: EngineResult<T>) -> EngineResult<T> {
    if let Err(e) = &r {
        error::record_error(e);
    }
    r
}

impl Engine {
    /// Initialize from a database directory: load the sector value table,
    /// probe for sector files and pick up the trap database if present.
    /// Fails unless at least one sector file exists.
    pub fn new(options: Options) -> EngineResult<Engine> {
        error::clear_last_error();
        record(Self::new_inner(options))
    }

    fn new_inner(options: Options) -> EngineResult<Engine> {
        symmetry::init();
        let rules = Rules::new(options.variant);
        let vals = SectorValues::load(&options.database_path, options.variant)?;
        let store = SectorStore::probe(&options.database_path, options.variant);
        if !store.has_database() {
            return Err(EngineError::DatabaseNotFound {
                path: options.database_path.display().to_string(),
            });
        }
        let trap_db = TrapDb::load_from_directory(&options.database_path, rules.max_pieces);
        info!(
            variant = rules.variant.name(),
            traps = trap_db.as_ref().map(|t| t.len()).unwrap_or(0),
            "engine initialized"
        );
        Ok(Engine {
            rules,
            vals,
            store,
            trap_db,
            options,
        })
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn values(&self) -> &SectorValues {
        &self.vals
    }

    pub fn store(&self) -> &SectorStore {
        &self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn trap_db(&self) -> Option<&TrapDb> {
        self.trap_db.as_ref()
    }

    pub fn player(&self) -> PerfectPlayer<'_> {
        PerfectPlayer::new(&self.rules, &self.vals, &self.store, &self.options)
    }

    /// Build and validate a query state from the external arguments.
    pub fn build_state(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
    ) -> EngineResult<GameState> {
        let max = self.rules.max_pieces;
        if white_bits as u64 & !MASK24 != 0 || black_bits as u64 & !MASK24 != 0 {
            return Err(EngineError::InvalidInput {
                message: "occupancy words use more than 24 bits".into(),
            });
        }
        if white_bits & black_bits != 0 {
            return Err(EngineError::InvalidInput {
                message: "white and black occupancy overlap".into(),
            });
        }
        let check_range = |param: &'static str, value: i32, max: i32| -> EngineResult<()> {
            if value < 0 || value > max {
                return Err(EngineError::OutOfRange {
                    param,
                    value,
                    min: 0,
                    max,
                });
            }
            Ok(())
        };
        check_range("white_to_place", white_to_place as i32, max as i32)?;
        check_range("black_to_place", black_to_place as i32, max as i32)?;
        check_range("side_to_move", side_to_move as i32, 1)?;

        let mut s = GameState::new();
        for i in 0..24 {
            if white_bits & (1 << i) != 0 {
                s.board[i] = 0;
                s.stone_count[0] += 1;
            } else if black_bits & (1 << i) != 0 {
                s.board[i] = 1;
                s.stone_count[1] += 1;
            }
        }
        s.phase = if white_to_place == 0 && black_to_place == 0 {
            2
        } else {
            1
        };
        s.set_stone_count = [max - white_to_place, max - black_to_place];
        s.removal_pending = only_stone_taking;
        s.side_to_move = side_to_move;
        s.move_count = 10;

        for p in 0..2 {
            if s.future_piece_count(&self.rules, p) > max as i32 {
                return Err(EngineError::InvalidInput {
                    message: format!("side {p} has more than {max} stones on board plus in hand"),
                });
            }
        }

        s.set_over_and_check_valid_setup(&self.rules)?;
        Ok(s)
    }

    /// Direct database query. `Ok(None)` means the database has no answer
    /// for this position (terminal, removal sub-position, sector absent);
    /// malformed input and hard I/O failures are errors.
    pub fn evaluate(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
    ) -> EngineResult<Option<Evaluation>> {
        error::clear_last_error();
        record(self.evaluate_inner(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
        ))
    }

    fn evaluate_inner(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
    ) -> EngineResult<Option<Evaluation>> {
        if !self.options.use_database {
            return Ok(None);
        }
        let s = self.build_state(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
        )?;
        if s.over || s.removal_pending {
            return Ok(None);
        }
        let player = self.player();
        match player.evaluate(&s) {
            Ok(e) => Ok(Some(Evaluation {
                wdl: e.wdl(&self.vals),
                steps: e.steps(),
            })),
            Err(EngineError::SectorMissing { .. }) | Err(EngineError::DatabaseNotFound { .. }) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Select a move for the position. Trap-aware when the trap database is
    /// loaded, plain database optimum otherwise.
    pub fn select_move(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
        ref_move: Option<&AdvancedMove>,
    ) -> EngineResult<(AdvancedMove, PickedValue)> {
        error::clear_last_error();
        record(self.select_move_inner(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
            ref_move,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn select_move_inner(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
        ref_move: Option<&AdvancedMove>,
    ) -> EngineResult<(AdvancedMove, PickedValue)> {
        let s = self.build_state(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
        )?;
        if s.over {
            return Err(EngineError::InvalidInput {
                message: "game is already over".into(),
            });
        }

        let player = self.player();
        if let Some(db) = &self.trap_db {
            return best_move_trap_aware(&player, db, &s, ref_move);
        }

        let (best, wdl) = player.good_moves(&s)?;
        match player.choose(&best, ref_move) {
            Some(m) => Ok((m, PickedValue::Outcome(wdl))),
            None => Err(EngineError::NoLegalMoves),
        }
    }

    /// Best move as a textual token (`d5`, `a1-a4`, `xg7`).
    #[allow(clippy::too_many_arguments)]
    pub fn best_move(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
    ) -> EngineResult<String> {
        self.select_move(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
            None,
        )
        .map(|(m, _)| m.token())
    }

    /// Every legal move of the position with its database value, rendered
    /// for humans.
    pub fn annotated_moves(
        &self,
        white_bits: u32,
        black_bits: u32,
        white_to_place: u8,
        black_to_place: u8,
        side_to_move: u8,
        only_stone_taking: bool,
    ) -> EngineResult<Vec<String>> {
        let s = self.build_state(
            white_bits,
            black_bits,
            white_to_place,
            black_to_place,
            side_to_move,
            only_stone_taking,
        )?;
        let player = self.player();
        Ok(annotate(&player, &s))
    }

    /// Open a sector for streaming export, bypassing the query cache: the
    /// export owns its sector outright.
    pub fn open_sector(&self, id: SectorId) -> EngineResult<SectorExport> {
        error::clear_last_error();
        let sval = record(self.vals.value_of(id))?;
        let sector = record(Sector::load(
            self.store.dir(),
            id,
            self.rules.variant,
            sval,
        ))?;
        Ok(SectorExport { sector, index: 0 })
    }
}

/// List each possibility with the backend's own description of it.
fn annotate<P: Player>(p: &P, s: &GameState) -> Vec<String> {
    p.possibilities(s)
        .iter()
        .map(|m| p.describe_move(s, m))
        .collect()
}

/// One exported position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorEntry {
    pub white_bits: u32,
    pub black_bits: u32,
    pub wdl: i8,
    pub steps: i16,
}

/// Streaming reader over every stored position of one sector. Slots that
/// only redirect to a symmetric slot are skipped. Dropping the export
/// closes the sector file.
pub struct SectorExport {
    sector: Sector,
    index: usize,
}

impl SectorExport {
    /// Number of hash slots (including redirect slots).
    pub fn count(&self) -> usize {
        self.sector.hash_count()
    }

    pub fn id(&self) -> SectorId {
        self.sector.id
    }

    /// The next stored position, or `None` at the end of the sector.
    pub fn next(&mut self) -> EngineResult<Option<SectorEntry>> {
        while self.index < self.sector.hash_count() {
            let i = self.index;
            self.index += 1;

            let raw = self.sector.eval_inner(i)?;
            let entry = match raw {
                RawEval::Sym(_) => continue,
                RawEval::Value { key1, key2 } => {
                    let board = self.sector.inverse_hash(i)?;
                    SectorEntry {
                        white_bits: (board & MASK24) as u32,
                        black_bits: (board >> 24) as u32,
                        wdl: key1.signum() as i8,
                        steps: key2.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
                    }
                }
                RawEval::Count(_) => {
                    let board = self.sector.inverse_hash(i)?;
                    SectorEntry {
                        white_bits: (board & MASK24) as u32,
                        black_bits: (board >> 24) as u32,
                        wdl: 0,
                        steps: 0,
                    }
                }
            };
            return Ok(Some(entry));
        }
        Ok(None)
    }
}
