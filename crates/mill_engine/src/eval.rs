//! Evaluation decoding
//!
//! A sector record unpacks into two signed fields `(key1, key2)`. `key1` is
//! an offset into the sector-value scale (0 marks a raw counter rather than
//! a game value), `key2` a distance in half-moves. The raw on-disk stream
//! has a third case, a symmetry redirect, which never escapes the sector
//! reader.
//!
//! Values compare in the frame of their sector: losses are better the later
//! they come, wins the sooner, counters are all equal. Correcting a value
//! into a neighboring frame shifts `key1` and flips the distance sign when
//! the value changes sign ("magic, don't touch").

use std::cmp::Ordering;

use crate::sector::values::{SecVal, SectorValues};

fn sign(x: i64) -> i32 {
    match x.cmp(&0) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// A decoded record: a game value when `key1 != 0`, a counter otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalElem {
    pub key1: SecVal,
    pub key2: i32,
}

impl EvalElem {
    pub fn new(key1: SecVal, key2: i32) -> EvalElem {
        EvalElem { key1, key2 }
    }

    /// Shift the value into another frame.
    pub fn corr(self, corr: i32) -> EvalElem {
        let new_key1 = (self.key1 as i32 + corr) as i16;
        EvalElem {
            key1: new_key1,
            key2: sign(new_key1 as i64 * self.key1 as i64) * self.key2,
        }
    }
}

impl PartialOrd for EvalElem {
    fn partial_cmp(&self, other: &EvalElem) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvalElem {
    fn cmp(&self, other: &EvalElem) -> Ordering {
        match self.key1.cmp(&other.key1) {
            Ordering::Equal if self.key1 < 0 => self.key2.cmp(&other.key2),
            Ordering::Equal if self.key1 > 0 => other.key2.cmp(&self.key2),
            ord => ord,
        }
    }
}

/// A raw record as stored on disk, including the symmetry redirect case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawEval {
    Value { key1: SecVal, key2: i32 },
    Count(i32),
    /// Follow the redirect: rehash after applying this symmetry operation.
    Sym(usize),
}

impl RawEval {
    pub fn decode(key1: SecVal, key2: i32) -> RawEval {
        if key1 != 0 {
            RawEval::Value { key1, key2 }
        } else if key2 >= 0 {
            RawEval::Count(key2)
        } else {
            RawEval::Sym((-(key2 + 1)) as usize)
        }
    }

    /// Strip the redirect case; callers must have resolved it.
    pub fn into_elem(self) -> EvalElem {
        match self {
            RawEval::Value { key1, key2 } => EvalElem { key1, key2 },
            RawEval::Count(c) => EvalElem { key1: 0, key2: c },
            RawEval::Sym(_) => unreachable!("symmetry redirect leaked past the sector reader"),
        }
    }
}

/// An evaluation as handed to move selection: the record fields plus the
/// value of the sector they are relative to. `sval == None` marks the
/// virtual values and removal sub-positions, which live outside any sector.
#[derive(Clone, Copy, Debug)]
pub struct GuiEval {
    key1: SecVal,
    key2: i32,
    sval: Option<SecVal>,
}

impl GuiEval {
    pub fn new(e: EvalElem, sval: SecVal) -> GuiEval {
        GuiEval {
            key1: e.key1,
            key2: e.key2,
            sval: Some(sval),
        }
    }

    /// The "no move found yet" sentinel, smaller than every real value.
    pub fn min_value(sval: Option<SecVal>, vals: &SectorValues) -> GuiEval {
        GuiEval {
            key1: vals.abs_min() - sval.unwrap_or_else(|| vals.virt_unique()),
            key2: 0,
            sval,
        }
    }

    /// Immediate loss by piece count.
    pub fn virt_loss(vals: &SectorValues) -> GuiEval {
        debug_assert!(vals.virt_loss != 0);
        GuiEval {
            key1: vals.virt_loss - vals.virt_unique(),
            key2: 0,
            sval: None,
        }
    }

    /// Reflect a value of the position after a move back into the frame of
    /// the position before it: correct into the target sector, negate, and
    /// extend the distance by the move just made (not counted for removal
    /// sub-positions).
    pub fn undo_negate(self, target_sval: Option<SecVal>, vals: &SectorValues) -> GuiEval {
        let virt = vals.virt_unique();
        let mut a = EvalElem::new(self.key1, self.key2).corr(
            target_sval.unwrap_or(virt) as i32 + self.sval.unwrap_or(virt) as i32,
        );
        a.key1 = -a.key1;
        if target_sval.is_some() {
            a.key2 += 1;
        }
        GuiEval {
            key1: a.key1,
            key2: a.key2,
            sval: target_sval,
        }
    }

    /// The value on the absolute sector-value scale.
    pub fn abs_key1(self, vals: &SectorValues) -> SecVal {
        self.key1 + self.sval.unwrap_or_else(|| vals.virt_unique())
    }

    pub fn compare(self, other: GuiEval) -> Ordering {
        debug_assert_eq!(self.sval, other.sval);
        match self.key1.cmp(&other.key1) {
            Ordering::Equal if self.key1 < 0 => self.key2.cmp(&other.key2),
            Ordering::Equal if self.key1 > 0 => other.key2.cmp(&self.key2),
            ord => ord,
        }
    }

    /// Render as e.g. `"W, (228, 75)"`. The leading character classifies
    /// the outcome and drives the outcome-first picking policy.
    pub fn to_display(self, vals: &SectorValues) -> String {
        let name = vals.name_of(self.abs_key1(vals));
        if self.key1 == 0 {
            format!("{name}, ({}, C)", self.key1)
        } else {
            format!("{name}, ({}, {})", self.key1, self.key2)
        }
    }

    /// First character of the display form: `W`, `L`, `N` for the zero
    /// value, otherwise the leading digit or sign of the sector value.
    pub fn outcome_char(self, vals: &SectorValues) -> char {
        vals.name_of(self.abs_key1(vals))
            .chars()
            .next()
            .unwrap_or('N')
    }

    /// Win/draw/loss from the viewpoint of the side the value belongs to.
    pub fn wdl(self, vals: &SectorValues) -> i8 {
        match self.outcome_char(vals) {
            'W' => 1,
            'L' => -1,
            _ => 0,
        }
    }

    /// Distance to the result in half-moves, `-1` when not meaningful.
    pub fn steps(self) -> i16 {
        if self.key1 != 0 && self.key2 > 0 {
            self.key2.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        } else {
            -1
        }
    }

    pub fn raw(self) -> (SecVal, i32) {
        (self.key1, self.key2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals() -> SectorValues {
        let text = "virt_loss_val: -100\nvirt_win_val: 100\n1\n0 0 9 9  0\n";
        SectorValues::parse(text, "test.secval").unwrap()
    }

    #[test]
    fn test_ordering_losses_then_wins() {
        // Losses: later is better, but every loss is below every win.
        let slow_loss = EvalElem::new(-1, 40);
        let fast_loss = EvalElem::new(-1, 4);
        let slow_win = EvalElem::new(1, 40);
        let fast_win = EvalElem::new(1, 4);
        assert!(fast_loss < slow_loss);
        assert!(slow_loss < slow_win);
        assert!(slow_win < fast_win);
    }

    #[test]
    fn test_counts_compare_equal() {
        let a = EvalElem::new(0, 17);
        let b = EvalElem::new(0, 99);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_corr_flips_distance_with_sign() {
        let e = EvalElem::new(-3, 10);
        let shifted = e.corr(5);
        assert_eq!(shifted.key1, 2);
        assert_eq!(shifted.key2, -10);
        let same_sign = e.corr(1);
        assert_eq!(same_sign.key1, -2);
        assert_eq!(same_sign.key2, 10);
    }

    #[test]
    fn test_raw_decode_cases() {
        assert_eq!(
            RawEval::decode(5, 7),
            RawEval::Value { key1: 5, key2: 7 }
        );
        assert_eq!(RawEval::decode(0, 7), RawEval::Count(7));
        assert_eq!(RawEval::decode(0, -4), RawEval::Sym(3));
    }

    #[test]
    fn test_min_value_below_everything() {
        let v = vals();
        let min = GuiEval::min_value(Some(0), &v);
        let loss = GuiEval::new(EvalElem::new(-100, 0), 0);
        assert_eq!(min.compare(loss), Ordering::Less);
    }

    #[test]
    fn test_virt_loss_outcome() {
        let v = vals();
        let e = GuiEval::virt_loss(&v);
        assert_eq!(e.outcome_char(&v), 'L');
        assert_eq!(e.wdl(&v), -1);
    }

    #[test]
    fn test_undo_negate_roundtrip_shape() {
        let v = vals();
        // A win in the successor sector (sval 0) seen from the mover's
        // sector (sval 0) becomes a loss for the opponent, one move longer.
        let win = GuiEval::new(EvalElem::new(100, 8), 0);
        let back = win.undo_negate(Some(0), &v);
        assert_eq!(back.outcome_char(&v), 'L');
        let (k1, k2) = back.raw();
        assert_eq!(k1, -100);
        assert_eq!(k2, 9);
    }

    #[test]
    fn test_steps() {
        let v = GuiEval::new(EvalElem::new(100, 12), 0);
        assert_eq!(v.steps(), 12);
        let count = GuiEval::new(EvalElem::new(0, 12), 0);
        assert_eq!(count.steps(), -1);
    }

    #[test]
    fn test_display_format() {
        let v = vals();
        let win = GuiEval::new(EvalElem::new(100, 8), 0);
        assert_eq!(win.to_display(&v), "W, (100, 8)");
    }
}
