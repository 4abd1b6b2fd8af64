//! Loaded-sector store
//!
//! The database directory is probed once at startup for present sector
//! files. Loaded sectors (hash tables, file handle, exception map) are kept
//! in an LRU of capacity 8; the hash tables dominate memory, so eviction
//! drops the whole sector. One process-wide lock serializes every access,
//! which also makes the store safe to share between reader threads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::rules::Variant;
use crate::sector::file::Sector;
use crate::sector::id::SectorId;
use crate::sector::values::SectorValues;

/// Loaded sectors kept alive at once.
pub const CACHE_CAPACITY: usize = 8;

pub struct SectorStore {
    dir: PathBuf,
    variant: Variant,
    available: BTreeSet<SectorId>,
    cache: Mutex<Vec<Sector>>,
}

impl SectorStore {
    /// Probe `dir` for sector files of this variant.
    pub fn probe(dir: &Path, variant: Variant) -> SectorStore {
        let max = variant.max_pieces();
        let mut available = BTreeSet::new();
        for w in 0..=max {
            for b in 0..=max {
                for wf in 0..=max {
                    for bf in 0..=max {
                        let id = SectorId::new(w, b, wf, bf);
                        if dir.join(id.file_name(variant)).is_file() {
                            available.insert(id);
                        }
                    }
                }
            }
        }
        debug!(sectors = available.len(), dir = %dir.display(), "database probed");
        SectorStore {
            dir: dir.to_path_buf(),
            variant,
            available,
            cache: Mutex::new(Vec::new()),
        }
    }

    pub fn has_database(&self) -> bool {
        !self.available.is_empty()
    }

    pub fn contains(&self, id: SectorId) -> bool {
        self.available.contains(&id)
    }

    pub fn available(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.available.iter().copied()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `f` on the loaded sector, loading and caching it first if
    /// needed. The store lock is held for the whole call; queries are
    /// serialized by design.
    pub fn with_sector<R>(
        &self,
        id: SectorId,
        vals: &SectorValues,
        f: impl FnOnce(&mut Sector) -> EngineResult<R>,
    ) -> EngineResult<R> {
        if !self.available.contains(&id) {
            return Err(EngineError::SectorMissing {
                name: id.file_name(self.variant),
            });
        }

        let mut cache = self.cache.lock();
        let pos = cache.iter().position(|s| s.id == id);
        let sector = match pos {
            Some(p) => {
                // Most recently used entries live at the back.
                let s = cache.remove(p);
                cache.push(s);
                cache.last_mut().unwrap()
            }
            None => {
                let sval = vals.value_of(id)?;
                let s = Sector::load(&self.dir, id, self.variant, sval)?;
                if cache.len() == CACHE_CAPACITY {
                    let evicted = cache.remove(0);
                    debug!(sector = evicted.file_name(), "evicting least recently used sector");
                }
                cache.push(s);
                cache.last_mut().unwrap()
            }
        };

        match f(sector) {
            Ok(r) => Ok(r),
            Err(e) => {
                // A failed read leaves the sector in an unknown state; drop
                // it from the cache rather than serving it again.
                if matches!(e, EngineError::Io { .. }) {
                    let p = cache.iter().position(|s| s.id == id).unwrap();
                    cache.remove(p);
                }
                Err(e)
            }
        }
    }

    /// Number of sectors currently loaded.
    pub fn loaded_count(&self) -> usize {
        self.cache.lock().len()
    }
}
