//! Perfect-play engine for Nine Men's Morris and its Lasker and Morabaraba
//! variants, backed by a pre-solved position database.
//!
//! The database is a set of per-sector binary files (a sector groups all
//! positions with the same piece counts), each a dense array of packed
//! evaluations indexed by a symmetry-collapsed hash. The engine reads those
//! files to answer win/draw/loss queries with exact distances and to pick
//! optimal moves. A derived trap database marks positions where the
//! natural move (closing or blocking a mill) is the losing one, and the
//! move picker knows how to avoid and how to set up such traps.
//!
//! Entry points:
//! - [`Engine`] — facade over the whole subsystem; create one with
//!   [`Options`] pointing at the database directory.
//! - [`Engine::evaluate`] / [`Engine::best_move`] — direct queries.
//! - [`Engine::open_sector`] — stream a sector's positions for export.

pub mod engine;
pub mod error;
pub mod eval;
pub mod moves;
pub mod options;
pub mod player;
pub mod rules;
pub mod sector;
pub mod state;
pub mod symmetry;
pub mod trapdb;

/// Mask of the 24 board-square bits in an occupancy word.
pub const MASK24: u64 = (1 << 24) - 1;

pub use engine::{Engine, Evaluation, SectorEntry, SectorExport};
pub use error::{EngineError, EngineResult};
pub use eval::{EvalElem, GuiEval, RawEval};
pub use moves::{AdvancedMove, MoveKind};
pub use options::{Options, PickPolicy};
pub use player::{PerfectPlayer, Player};
pub use rules::{Rules, Variant};
pub use sector::id::SectorId;
pub use state::{GameState, MoveStep};
pub use trapdb::picker::PickedValue;
pub use trapdb::{TrapDb, TrapRecord};
