//! Engine configuration

use std::path::PathBuf;

use crate::rules::Variant;

/// How ties between move values are resolved into the "best" set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PickPolicy {
    /// Rank moves by outcome letter only (win / draw / loss); all moves of
    /// the best class are kept.
    #[default]
    OutcomeFirst,
    /// Keep only the moves with the strictly maximal packed value, which
    /// also distinguishes distances and draw tiers.
    StrictMax,
}

/// Configuration recognized by the engine facade.
#[derive(Clone, Debug)]
pub struct Options {
    /// Directory holding the sector files, the value table and the trap
    /// database.
    pub database_path: PathBuf,
    /// Whether queries consult the database at all.
    pub use_database: bool,
    pub variant: Variant,
    pub pick_policy: PickPolicy,
    /// Break ties between equi-optimal moves randomly.
    pub shuffling_enabled: bool,
}

impl Options {
    pub fn new(database_path: PathBuf) -> Options {
        Options {
            database_path,
            use_database: true,
            variant: Variant::Standard,
            pick_policy: PickPolicy::default(),
            shuffling_enabled: false,
        }
    }
}
