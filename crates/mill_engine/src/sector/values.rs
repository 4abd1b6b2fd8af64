//! Sector value file
//!
//! The database ships a small text file `<variant>.secval` assigning every
//! sector a signed "sector value": a lossless surrogate for the set of
//! outcomes reachable in that sector. Two sentinels outside the table encode
//! the virtual win ("opponent is down to two stones") and virtual loss ("we
//! are down to two stones"); the value below the virtual loss stands in for
//! removal sub-positions so that distance counting is not reset there.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::rules::Variant;
use crate::sector::id::SectorId;

/// Signed sector value, as stored in the evaluation records.
pub type SecVal = i16;

pub struct SectorValues {
    pub virt_loss: SecVal,
    pub virt_win: SecVal,
    values: HashMap<SectorId, SecVal>,
    names: HashMap<SecVal, SectorId>,
}

impl SectorValues {
    /// Load `<dir>/<variant>.secval`.
    pub fn load(dir: &Path, variant: Variant) -> EngineResult<SectorValues> {
        let file_name = format!("{}.secval", variant.name());
        let path = dir.join(&file_name);
        let text = std::fs::read_to_string(&path).map_err(|source| EngineError::Io {
            name: file_name.clone(),
            source,
        })?;
        Self::parse(&text, &file_name)
    }

    pub(crate) fn parse(text: &str, file_name: &str) -> EngineResult<SectorValues> {
        let malformed = |message: &str| EngineError::MalformedSecVal {
            name: file_name.to_string(),
            message: message.to_string(),
        };

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let virt_loss = parse_labeled(lines.next(), "virt_loss_val")
            .ok_or_else(|| malformed("missing virt_loss_val line"))?;
        let virt_win = parse_labeled(lines.next(), "virt_win_val")
            .ok_or_else(|| malformed("missing virt_win_val line"))?;
        if virt_win != -virt_loss {
            return Err(malformed("virtual win and loss sentinels are not opposites"));
        }

        let count: usize = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| malformed("missing entry count"))?;

        let mut values = HashMap::with_capacity(count);
        let mut names = HashMap::new();
        for _ in 0..count {
            let line = lines.next().ok_or_else(|| malformed("truncated table"))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(malformed("table line does not have 5 fields"));
            }
            let nums: Vec<i32> = fields
                .iter()
                .map(|f| f.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed("non-numeric table field"))?;
            let id = SectorId::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8);
            let v = nums[4] as SecVal;
            values.insert(id, v);
            if v != 0 {
                // Non-zero values name their sector uniquely.
                if names.insert(v, id).is_some() {
                    return Err(malformed("duplicate non-zero sector value"));
                }
            }
        }

        Ok(SectorValues {
            virt_loss,
            virt_win,
            values,
            names,
        })
    }

    /// The value assigned to a sector. Every reachable sector has one.
    pub fn value_of(&self, id: SectorId) -> EngineResult<SecVal> {
        self.values
            .get(&id)
            .copied()
            .ok_or_else(|| EngineError::InvalidInput {
                message: format!("sector {id} has no entry in the value table"),
            })
    }

    /// Stand-in value for removal sub-positions; one below the virtual loss.
    pub fn virt_unique(&self) -> SecVal {
        self.virt_loss - 1
    }

    /// Smallest representable absolute value, used by the "no move found
    /// yet" sentinel.
    pub fn abs_min(&self) -> SecVal {
        self.virt_loss - 2
    }

    /// Human-readable name of an absolute sector value.
    pub fn name_of(&self, v: SecVal) -> String {
        if v == 0 {
            "NTESC".to_string()
        } else if v == self.virt_loss {
            "L".to_string()
        } else if v == self.virt_win {
            "W".to_string()
        } else {
            match self.names.get(&v) {
                Some(id) => format!("{v} ({id})"),
                None => format!("{v}"),
            }
        }
    }
}

fn parse_labeled(line: Option<&str>, label: &str) -> Option<SecVal> {
    let line = line?;
    let rest = line.trim().strip_prefix(label)?.strip_prefix(':')?;
    rest.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "virt_loss_val: -100\n\
                          virt_win_val: 100\n\
                          3\n\
                          0 0 9 9  0\n\
                          3 3 0 0  0\n\
                          9 4 0 0  57\n";

    #[test]
    fn test_parse_sample() {
        let sv = SectorValues::parse(SAMPLE, "std.secval").unwrap();
        assert_eq!(sv.virt_loss, -100);
        assert_eq!(sv.virt_win, 100);
        assert_eq!(sv.value_of(SectorId::new(0, 0, 9, 9)).unwrap(), 0);
        assert_eq!(sv.value_of(SectorId::new(9, 4, 0, 0)).unwrap(), 57);
        assert!(sv.value_of(SectorId::new(1, 1, 8, 8)).is_err());
    }

    #[test]
    fn test_sentinels() {
        let sv = SectorValues::parse(SAMPLE, "std.secval").unwrap();
        assert_eq!(sv.virt_unique(), -101);
        assert_eq!(sv.abs_min(), -102);
    }

    #[test]
    fn test_names() {
        let sv = SectorValues::parse(SAMPLE, "std.secval").unwrap();
        assert_eq!(sv.name_of(0), "NTESC");
        assert_eq!(sv.name_of(-100), "L");
        assert_eq!(sv.name_of(100), "W");
        assert_eq!(sv.name_of(57), "57 (9_4_0_0)");
    }

    #[test]
    fn test_mismatched_sentinels_rejected() {
        let bad = "virt_loss_val: -100\nvirt_win_val: 99\n0\n";
        assert!(SectorValues::parse(bad, "std.secval").is_err());
    }
}
