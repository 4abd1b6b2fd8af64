//! Parallel trap-database build
//!
//! A pool of workers drains a queue of sectors. Each worker loads its
//! sector outright (the shared query cache is left to the evaluation
//! path), walks every stored position for both sides to move, classifies
//! it, and merges its thread-local results into the global collector.
//! Completed sectors are recorded for resume and the collector is
//! checkpointed to disk at least every 15 seconds of progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use mill_engine::sector::file::Sector;
use mill_engine::sector::graph::SectorGraph;
use mill_engine::trapdb::{
    self, position_key, TrapRecord, TRAP_BLOCK_MILL_LOSS, TRAP_SELF_MILL_LOSS,
};
use mill_engine::{Engine, MASK24, Options, PerfectPlayer, SectorId};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointWriter, ResumeTracker};
use crate::config::BuildConfig;
use crate::filter::{
    is_block_mill_loss_trap, is_self_mill_loss_trap, state_from_bits, EvalCache, PreFilter,
};

/// A worker that reports nothing for this long gets flagged.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(300);

/// Sectors below this size are not worth an intra-sector split.
const INTRA_SPLIT_FLOOR: usize = 10_000;

/// Cache-hygiene check interval, in scanned positions.
const CACHE_SWEEP_INTERVAL: usize = 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub sectors: usize,
    pub positions: u64,
    pub self_mill_traps: u64,
    pub block_mill_traps: u64,
    pub records: usize,
}

#[derive(Default)]
struct LocalScan {
    traps: HashMap<u64, TrapRecord>,
    self_mill: u64,
    block_mill: u64,
    positions: u64,
}

impl LocalScan {
    fn absorb(&mut self, other: LocalScan) {
        trapdb::merge_records(&mut self.traps, other.traps.into_iter().collect());
        self.self_mill += other.self_mill;
        self.block_mill += other.block_mill;
        self.positions += other.positions;
    }
}

struct Collector {
    traps: Mutex<HashMap<u64, TrapRecord>>,
    self_mill: AtomicU64,
    block_mill: AtomicU64,
    positions: AtomicU64,
}

impl Collector {
    fn new(initial: HashMap<u64, TrapRecord>) -> Collector {
        Collector {
            traps: Mutex::new(initial),
            self_mill: AtomicU64::new(0),
            block_mill: AtomicU64::new(0),
            positions: AtomicU64::new(0),
        }
    }

    fn merge(&self, local: LocalScan) {
        self.self_mill.fetch_add(local.self_mill, Ordering::Relaxed);
        self.block_mill.fetch_add(local.block_mill, Ordering::Relaxed);
        self.positions.fetch_add(local.positions, Ordering::Relaxed);
        let mut traps = self.traps.lock();
        trapdb::merge_records(&mut traps, local.traps.into_iter().collect());
    }

    fn snapshot(&self) -> HashMap<u64, TrapRecord> {
        self.traps.lock().clone()
    }
}

/// Per-sector progress reporting with a remaining-time estimate weighted
/// by on-disk sector size.
struct Progress {
    total: usize,
    completed: AtomicUsize,
    total_bytes: u64,
    processed_bytes: AtomicU64,
    sizes: HashMap<SectorId, u64>,
    start: Instant,
}

impl Progress {
    fn new(cfg: &BuildConfig, sectors: &[SectorId]) -> Progress {
        let mut sizes = HashMap::new();
        let mut total_bytes = 0;
        for &id in sectors {
            let len = std::fs::metadata(cfg.db_path.join(id.file_name(cfg.variant)))
                .map(|m| m.len())
                .unwrap_or(0);
            sizes.insert(id, len);
            total_bytes += len;
        }
        Progress {
            total: sectors.len(),
            completed: AtomicUsize::new(0),
            total_bytes,
            processed_bytes: AtomicU64::new(0),
            sizes,
            start: Instant::now(),
        }
    }

    fn report(&self, id: SectorId, scan: &LocalScan) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.processed_bytes.fetch_add(
            self.sizes.get(&id).copied().unwrap_or(0),
            Ordering::Relaxed,
        ) + self.sizes.get(&id).copied().unwrap_or(0);

        let elapsed = self.start.elapsed();
        let remaining = if bytes > 0 {
            let per_byte = elapsed.as_secs_f64() / bytes as f64;
            Duration::from_secs_f64(per_byte * (self.total_bytes - bytes.min(self.total_bytes)) as f64)
        } else {
            Duration::ZERO
        };
        info!(
            sector = %id,
            done,
            total = self.total,
            traps = scan.self_mill + scan.block_mill,
            scanned = scan.positions,
            elapsed = %humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
            remaining = %humantime::format_duration(Duration::from_secs(remaining.as_secs())),
            "sector completed"
        );
    }
}

/// Walk one index range of a sector, classifying both sides to move.
fn scan_range(
    player: &PerfectPlayer<'_>,
    sector: &Sector,
    prefilter: &PreFilter,
    cache_capacity: usize,
    range: std::ops::Range<usize>,
) -> LocalScan {
    let max = player.rules.max_pieces;
    let id = sector.id;
    let mut cache = EvalCache::new(cache_capacity);
    let mut local = LocalScan::default();

    for (scanned, i) in range.enumerate() {
        if scanned > 0 && scanned % CACHE_SWEEP_INTERVAL == 0 {
            cache.maybe_clear();
        }

        let raw = match sector.inverse_hash(i) {
            Ok(r) => r,
            Err(e) => {
                warn!(sector = %id, index = i, error = %e, "skipping unreadable slot");
                continue;
            }
        };
        let white = (raw & MASK24) as u32;
        let black = ((raw >> 24) & MASK24) as u32;

        for stm in 0..2u8 {
            let s = state_from_bits(
                white,
                black,
                stm,
                max - id.wf,
                max - id.bf,
                if id.wf == 0 && id.bf == 0 { 2 } else { 1 },
            );
            local.positions += 1;

            if !prefilter.could_be_trap(&s) {
                continue;
            }
            let moves = player.legal_moves(&s);
            if moves.is_empty() {
                continue;
            }

            let mut mask = 0u8;
            if is_self_mill_loss_trap(player, &s, &moves, &mut cache) {
                mask |= TRAP_SELF_MILL_LOSS;
                local.self_mill += 1;
            }
            if is_block_mill_loss_trap(player, &s, &moves, &mut cache) {
                mask |= TRAP_BLOCK_MILL_LOSS;
                local.block_mill += 1;
            }
            if mask == 0 {
                continue;
            }

            let (wdl, steps) = match player.evaluate(&s) {
                Ok(e) => (e.wdl(player.vals), e.steps()),
                Err(_) => (0, -1),
            };
            let key = position_key(white, black, stm, id.wf, id.bf);
            trapdb::merge_records(
                &mut local.traps,
                vec![(key, TrapRecord { mask, wdl, steps })],
            );
        }
    }
    local
}

fn process_sector(
    engine: &Engine,
    cfg: &BuildConfig,
    prefilter: &PreFilter,
    id: SectorId,
) -> anyhow::Result<LocalScan> {
    let sval = engine.values().value_of(id)?;
    let sector = Sector::load(engine.store().dir(), id, cfg.variant, sval)
        .with_context(|| format!("loading sector {id}"))?;
    let n = sector.hash_count();
    let player = engine.player();

    if cfg.intra_threads <= 1 || n < INTRA_SPLIT_FLOOR {
        return Ok(scan_range(&player, &sector, prefilter, cfg.cache_capacity, 0..n));
    }

    // Intra-sector split: contiguous ranges, one sub-scan each.
    let chunk = n.div_ceil(cfg.intra_threads);
    let mut merged = LocalScan::default();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for t in 0..cfg.intra_threads {
            let start = t * chunk;
            let end = ((t + 1) * chunk).min(n);
            if start >= end {
                break;
            }
            let player = engine.player();
            let sector = &sector;
            handles.push(scope.spawn(move || {
                scan_range(&player, sector, prefilter, cfg.cache_capacity, start..end)
            }));
        }
        for h in handles {
            match h.join() {
                Ok(scan) => merged.absorb(scan),
                Err(_) => error!(sector = %id, "intra-sector worker panicked"),
            }
        }
    });
    Ok(merged)
}

/// Run the full build: sweep every reachable sector present on disk and
/// write the merged trap records to the output file.
pub fn run(cfg: &BuildConfig) -> anyhow::Result<BuildStats> {
    install_panic_logger();

    let mut options = Options::new(cfg.db_path.clone());
    options.variant = cfg.variant;
    let engine = Engine::new(options).context("initializing the engine")?;

    let graph = SectorGraph::build(cfg.variant);
    let sectors: Vec<SectorId> = graph
        .list
        .iter()
        .copied()
        .filter(|&id| engine.store().contains(id))
        .collect();
    if sectors.is_empty() {
        anyhow::bail!(
            "no reachable sector files in {}",
            cfg.db_path.display()
        );
    }
    let present = engine.store().available().count();
    if present > sectors.len() {
        info!(
            extra = present - sectors.len(),
            "ignoring sector files outside the reachable graph"
        );
    }

    info!(
        sectors = sectors.len(),
        workers = cfg.workers,
        intra = cfg.intra_threads,
        "starting trap sweep (expect ~100 MB of lookup tables per worker)"
    );

    let resume = ResumeTracker::new(&cfg.out_file);
    resume.load();

    // Preload records from an interrupted run.
    let initial = match trapdb::read_records(&cfg.out_file) {
        Ok(records) => {
            info!(records = records.len(), "resume: merged existing output file");
            let mut map = HashMap::new();
            trapdb::merge_records(&mut map, records);
            map
        }
        Err(_) => HashMap::new(),
    };

    let collector = Collector::new(initial);
    let checkpoint = CheckpointWriter::new(cfg.out_file.clone());
    let progress = Progress::new(cfg, &sectors);
    let prefilter = PreFilter::new(engine.rules());

    let (job_tx, job_rx) = unbounded::<SectorId>();
    let (done_tx, done_rx) = unbounded::<SectorId>();
    for &id in &sectors {
        job_tx.send(id).unwrap();
    }
    drop(job_tx);

    let start = Instant::now();
    std::thread::scope(|scope| {
        for _ in 0..cfg.workers.max(1) {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let engine = &engine;
            let collector = &collector;
            let checkpoint = &checkpoint;
            let progress = &progress;
            let resume = &resume;
            let prefilter = &prefilter;
            scope.spawn(move || {
                for id in job_rx.iter() {
                    let name = id.file_name(cfg.variant);
                    if resume.is_completed(&name) {
                        progress.report(id, &LocalScan::default());
                        let _ = done_tx.send(id);
                        continue;
                    }
                    match process_sector(engine, cfg, prefilter, id) {
                        Ok(scan) => {
                            progress.report(id, &scan);
                            collector.merge(scan);
                            resume.mark_completed(&name);
                            if checkpoint.due() {
                                if let Err(e) = checkpoint.write_snapshot(&collector.snapshot()) {
                                    warn!(error = %e, "checkpoint failed");
                                }
                            }
                        }
                        Err(e) => error!(sector = %id, error = %e, "sector failed"),
                    }
                    let _ = done_tx.send(id);
                }
            });
        }
        drop(done_tx);

        // Watchdog: flag stalls, stop when every worker is done.
        let mut completed = 0usize;
        loop {
            match done_rx.recv_timeout(WATCHDOG_TIMEOUT) {
                Ok(_) => completed += 1,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        completed,
                        total = sectors.len(),
                        "no sector completed within the watchdog interval"
                    );
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if completed < sectors.len() {
            warn!(completed, total = sectors.len(), "not every sector was processed");
        }
    });

    // Final forced checkpoint.
    let snapshot = collector.snapshot();
    checkpoint
        .write_snapshot(&snapshot)
        .context("writing the final trap database")?;

    let stats = BuildStats {
        sectors: sectors.len(),
        positions: collector.positions.load(Ordering::Relaxed),
        self_mill_traps: collector.self_mill.load(Ordering::Relaxed),
        block_mill_traps: collector.block_mill.load(Ordering::Relaxed),
        records: snapshot.len(),
    };
    info!(
        positions = stats.positions,
        self_mill = stats.self_mill_traps,
        block_mill = stats.block_mill_traps,
        records = stats.records,
        elapsed = %humantime::format_duration(Duration::from_secs(start.elapsed().as_secs())),
        "trap sweep finished"
    );
    Ok(stats)
}

/// Log fatal panics in one line before unwinding tears the worker down;
/// the last checkpoint stays the crash-consistent boundary.
fn install_panic_logger() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(panic = %info, "fatal error in trap builder");
        default(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mill_engine::Variant;

    #[test]
    fn test_local_scan_absorb_merges() {
        let key = position_key(1, 2, 0, 8, 8);
        let mut a = LocalScan::default();
        a.traps.insert(
            key,
            TrapRecord {
                mask: TRAP_SELF_MILL_LOSS,
                wdl: 0,
                steps: 9,
            },
        );
        a.self_mill = 1;
        a.positions = 10;

        let mut b = LocalScan::default();
        b.traps.insert(
            key,
            TrapRecord {
                mask: TRAP_BLOCK_MILL_LOSS,
                wdl: 1,
                steps: 3,
            },
        );
        b.block_mill = 1;
        b.positions = 12;

        a.absorb(b);
        assert_eq!(a.positions, 22);
        let rec = a.traps[&key];
        assert_eq!(rec.mask, TRAP_SELF_MILL_LOSS | TRAP_BLOCK_MILL_LOSS);
        assert_eq!(rec.wdl, 1);
        assert_eq!(rec.steps, 3);
    }

    #[test]
    fn test_run_fails_without_database() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("std.secval"),
            "virt_loss_val: -100\nvirt_win_val: 100\n0\n",
        )
        .unwrap();
        let cfg = BuildConfig::resolve(
            dir.path().to_path_buf(),
            None,
            Variant::Standard,
            Some(1),
            None,
            None,
        );
        assert!(run(&cfg).is_err());
    }
}
