//! Sector file access
//!
//! Read-only access to one `.sec2` file: a 64-byte header, then one packed
//! 3-byte record per hash slot, then an appended exception map for the few
//! entries whose distance field overflows the packed width.
//!
//! A loaded sector owns its file handle, its hash tables and its exception
//! map; dropping it releases all three.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::eval::{EvalElem, RawEval};
use crate::rules::Variant;
use crate::sector::hash::SectorHash;
use crate::sector::id::SectorId;
use crate::sector::values::SecVal;
use crate::symmetry::sym48;

/// Fixed header size in bytes.
pub const HEADER_SIZE: u64 = 64;

/// Bytes per packed evaluation record.
pub const RECORD_SIZE: usize = 3;

/// Supported on-disk format version.
pub const FORMAT_VERSION: u32 = 2;

/// The database variant this build reads: sector values come from the value
/// table, not from stone differences.
const STONE_DIFF_FLAG: u8 = 0;

#[derive(Debug)]
pub struct Sector {
    pub id: SectorId,
    pub sval: SecVal,
    file_name: String,
    file: File,
    field2_offset: u32,
    field1_size: u32,
    field2_size: u32,
    hash: SectorHash,
    em_set: HashMap<i32, i32>,
}

fn sign_extend(x: u32, bits: u32) -> i32 {
    debug_assert!(bits > 0 && bits < 32);
    if x & (1 << (bits - 1)) != 0 {
        (x | (u32::MAX << bits)) as i32
    } else {
        x as i32
    }
}

impl Sector {
    /// Open and fully load the sector: validate the header, build the hash
    /// tables and read the exception map.
    pub fn load(dir: &Path, id: SectorId, variant: Variant, sval: SecVal) -> EngineResult<Sector> {
        let file_name = id.file_name(variant);
        let path = dir.join(&file_name);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SectorMissing { name: file_name });
            }
            Err(source) => {
                return Err(EngineError::Io {
                    name: file_name,
                    source,
                });
            }
        };

        let io_err = |file_name: &str, source| EngineError::Io {
            name: file_name.to_string(),
            source,
        };

        let mut header = [0u8; 13];
        file.read_exact(&mut header)
            .map_err(|e| io_err(&file_name, e))?;
        let version = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let eval_struct_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let field2_offset = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let stone_diff_flag = header[12];

        let header_check = |field, actual: i64, expected: i64| {
            if actual != expected {
                Err(EngineError::CorruptHeader {
                    name: file_name.clone(),
                    field,
                    actual,
                    expected,
                })
            } else {
                Ok(())
            }
        };
        header_check("version", version as i64, FORMAT_VERSION as i64)?;
        header_check("eval_struct_size", eval_struct_size as i64, RECORD_SIZE as i64)?;
        header_check("stone_diff_flag", stone_diff_flag as i64, STONE_DIFF_FLAG as i64)?;
        let record_bits = RECORD_SIZE as u32 * 8;
        if field2_offset == 0 || field2_offset >= record_bits {
            return Err(EngineError::CorruptHeader {
                name: file_name,
                field: "field2_offset",
                actual: field2_offset as i64,
                expected: -1,
            });
        }

        debug!(sector = %file_name, "loading sector");
        let hash = SectorHash::new(id.w as usize, id.b as usize);

        // The exception map sits after the packed records.
        let em_start = HEADER_SIZE + (hash.hash_count * RECORD_SIZE) as u64;
        file.seek(SeekFrom::Start(em_start))
            .map_err(|e| io_err(&file_name, e))?;
        let mut buf4 = [0u8; 4];
        file.read_exact(&mut buf4)
            .map_err(|e| io_err(&file_name, e))?;
        let em_count = u32::from_le_bytes(buf4);
        let mut em_set = HashMap::with_capacity(em_count as usize);
        let mut pair = [0u8; 8];
        for _ in 0..em_count {
            file.read_exact(&mut pair)
                .map_err(|e| io_err(&file_name, e))?;
            let key = i32::from_le_bytes(pair[0..4].try_into().unwrap());
            let value = i32::from_le_bytes(pair[4..8].try_into().unwrap());
            em_set.insert(key, value);
        }
        debug!(
            sector = %file_name,
            slots = hash.hash_count,
            exceptions = em_count,
            "sector loaded"
        );

        Ok(Sector {
            id,
            sval,
            file_name,
            file,
            field2_offset,
            field1_size: field2_offset,
            field2_size: record_bits - field2_offset,
            hash,
            em_set,
        })
    }

    pub fn hash_count(&self) -> usize {
        self.hash.hash_count
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sector_hash(&self) -> &SectorHash {
        &self.hash
    }

    /// The distance-field bit pattern that redirects into the exception map.
    fn spec_field2(&self) -> i32 {
        -(1 << (self.field2_size - 1))
    }

    fn extract_value(&mut self, i: usize) -> EngineResult<(SecVal, i32)> {
        let mut record = [0u8; RECORD_SIZE];
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE + (i * RECORD_SIZE) as u64))
            .and_then(|_| self.file.read_exact(&mut record))
            .map_err(|source| EngineError::Io {
                name: self.file_name.clone(),
                source,
            })?;
        let a = record[0] as u32 | (record[1] as u32) << 8 | (record[2] as u32) << 16;
        let key1 = sign_extend(a & ((1 << self.field1_size) - 1), self.field1_size) as SecVal;
        let key2 = sign_extend(a >> self.field2_offset, self.field2_size);
        Ok((key1, key2))
    }

    /// The raw record at an index, exception map applied, symmetry
    /// redirects still visible.
    pub fn eval_inner(&mut self, i: usize) -> EngineResult<RawEval> {
        if i >= self.hash.hash_count {
            return Err(EngineError::IndexOutOfRange {
                name: self.file_name.clone(),
                index: i,
                count: self.hash.hash_count,
            });
        }
        let (key1, key2) = self.extract_value(i)?;
        if key2 == self.spec_field2() {
            let value = *self
                .em_set
                .get(&(i as i32))
                .ok_or_else(|| EngineError::MissingException {
                    name: self.file_name.clone(),
                    index: i,
                })?;
            Ok(RawEval::decode(key1, value))
        } else {
            Ok(RawEval::decode(key1, key2))
        }
    }

    /// Index and decoded record of a board belonging to this sector. The
    /// board must be oriented with the side to move as white. Follows at
    /// most one symmetry redirect.
    pub fn probe(&mut self, board: u64) -> EngineResult<(usize, EvalElem)> {
        let (w, b) = self.hash.piece_counts();
        debug_assert_eq!((board & crate::MASK24).count_ones() as usize, w);
        debug_assert_eq!((board >> 24).count_ones() as usize, b);
        let canonical = self.hash.canonicalize(board);
        let h1 = self.hash.index_of_canonical(canonical);
        match self.eval_inner(h1)? {
            RawEval::Sym(op) => {
                let redirected = sym48(op, canonical);
                let h2 = self.hash.index_of_canonical(redirected);
                match self.eval_inner(h2)? {
                    RawEval::Sym(_) => Err(EngineError::SymmetryRedirectLoop {
                        name: self.file_name.clone(),
                        index: h2,
                    }),
                    e => Ok((h2, e.into_elem())),
                }
            }
            e => Ok((h1, e.into_elem())),
        }
    }

    /// The canonical board stored at an index.
    pub fn inverse_hash(&self, i: usize) -> EngineResult<u64> {
        if i >= self.hash.hash_count {
            return Err(EngineError::IndexOutOfRange {
                name: self.file_name.clone(),
                index: i,
                count: self.hash.hash_count,
            });
        }
        Ok(self.hash.inverse(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const F2_OFFSET: u32 = 12;

    fn pack(key1: i16, key2_bits: u32) -> [u8; 3] {
        let a = (key1 as u32 & 0xfff) | (key2_bits << F2_OFFSET);
        [a as u8, (a >> 8) as u8, (a >> 16) as u8]
    }

    fn write_sector(
        dir: &Path,
        id: SectorId,
        records: &[[u8; 3]],
        em: &[(i32, i32)],
    ) -> std::path::PathBuf {
        let path = dir.join(id.file_name(Variant::Standard));
        let mut f = File::create(&path).unwrap();
        let mut header = Vec::new();
        header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        header.extend_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
        header.extend_from_slice(&F2_OFFSET.to_le_bytes());
        header.push(0u8);
        header.resize(HEADER_SIZE as usize, 0);
        f.write_all(&header).unwrap();
        for r in records {
            f.write_all(r).unwrap();
        }
        f.write_all(&(em.len() as u32).to_le_bytes()).unwrap();
        for &(k, v) in em {
            f.write_all(&k.to_le_bytes()).unwrap();
            f.write_all(&v.to_le_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn test_load_and_probe_single_slot_sector() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(0, 0, 9, 9);
        // key1 = 2, key2 = 5
        write_sector(dir.path(), id, &[pack(2, 5)], &[]);
        let mut sec = Sector::load(dir.path(), id, Variant::Standard, 0).unwrap();
        assert_eq!(sec.hash_count(), 1);
        let (idx, e) = sec.probe(0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(e, EvalElem::new(2, 5));
    }

    #[test]
    fn test_exception_map_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(0, 0, 9, 9);
        // The distance field holds the sentinel bit pattern, so the real
        // value comes from the exception map.
        let sentinel_bits = 1 << (24 - F2_OFFSET - 1);
        write_sector(dir.path(), id, &[pack(3, sentinel_bits)], &[(0, 4000)]);
        let mut sec = Sector::load(dir.path(), id, Variant::Standard, 0).unwrap();
        let (_, e) = sec.probe(0).unwrap();
        assert_eq!(e, EvalElem::new(3, 4000));
    }

    #[test]
    fn test_missing_exception_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(0, 0, 9, 9);
        let sentinel_bits = 1 << (24 - F2_OFFSET - 1);
        write_sector(dir.path(), id, &[pack(3, sentinel_bits)], &[]);
        let mut sec = Sector::load(dir.path(), id, Variant::Standard, 0).unwrap();
        assert!(matches!(
            sec.probe(0),
            Err(EngineError::MissingException { .. })
        ));
    }

    #[test]
    fn test_header_validation() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(0, 0, 9, 9);
        let path = write_sector(dir.path(), id, &[pack(1, 1)], &[]);
        // Corrupt the version field.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 9;
        std::fs::write(&path, &bytes).unwrap();
        match Sector::load(dir.path(), id, Variant::Standard, 0) {
            Err(EngineError::CorruptHeader { field, .. }) => assert_eq!(field, "version"),
            other => panic!("expected corrupt header, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(1, 1, 8, 8);
        assert!(matches!(
            Sector::load(dir.path(), id, Variant::Standard, 0),
            Err(EngineError::SectorMissing { .. })
        ));
    }

    #[test]
    fn test_out_of_range_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = SectorId::new(0, 0, 9, 9);
        write_sector(dir.path(), id, &[pack(1, 1)], &[]);
        let mut sec = Sector::load(dir.path(), id, Variant::Standard, 0).unwrap();
        assert!(matches!(
            sec.eval_inner(1),
            Err(EngineError::IndexOutOfRange { .. })
        ));
        assert!(sec.inverse_hash(1).is_err());
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend(0xfff, 12), -1);
        assert_eq!(sign_extend(0x800, 12), -2048);
        assert_eq!(sign_extend(0x7ff, 12), 2047);
        assert_eq!(sign_extend(5, 12), 5);
    }
}
