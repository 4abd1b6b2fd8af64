//! Sector identity
//!
//! A sector is the set of positions sharing the same piece counts: `w`/`b`
//! stones on the board and `wf`/`bf` stones still in hand, with white to
//! move. The same physical position with black to move belongs to the
//! negated id (colors and hands swapped).

use std::fmt;

use crate::rules::Variant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorId {
    pub w: u8,
    pub b: u8,
    pub wf: u8,
    pub bf: u8,
}

impl SectorId {
    pub fn new(w: u8, b: u8, wf: u8, bf: u8) -> SectorId {
        SectorId { w, b, wf, bf }
    }

    /// The same sector seen from the other side.
    pub fn negate(self) -> SectorId {
        SectorId {
            w: self.b,
            b: self.w,
            wf: self.bf,
            bf: self.wf,
        }
    }

    /// A sector equal to its own negation is its own mirror.
    pub fn is_twin(self) -> bool {
        self == self.negate()
    }

    /// On-disk file name of the sector.
    pub fn file_name(self, variant: Variant) -> String {
        format!(
            "{}_{}_{}_{}_{}.sec2",
            variant.name(),
            self.w,
            self.b,
            self.wf,
            self.bf
        )
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}_{}", self.w, self.b, self.wf, self.bf)
    }
}
