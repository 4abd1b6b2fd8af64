//! Builder configuration
//!
//! Thread counts and cache sizes resolve in precedence order: command-line
//! flag, then environment variable, then a conservative default. Each
//! worker keeps ~100 MB of lookup tables alive, so the default worker
//! count stays well below the hardware thread count.

use std::path::PathBuf;

use mill_engine::Variant;

/// Inter-sector worker count override.
pub const ENV_WORKERS: &str = "SANMILL_TRAP_THREADS";

/// Intra-sector split override.
pub const ENV_INTRA: &str = "SANMILL_INTRA_SECTOR_THREADS";

/// Per-thread evaluation cache capacity override.
pub const ENV_CACHE: &str = "SANMILL_TRAP_CACHE_SIZE";

#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub db_path: PathBuf,
    pub out_file: PathBuf,
    pub variant: Variant,
    pub workers: usize,
    pub intra_threads: usize,
    pub cache_capacity: usize,
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

/// `min(8, hardware_threads / 2)`, at least 1.
pub fn default_workers() -> usize {
    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (hw / 2).clamp(1, 8)
}

impl BuildConfig {
    pub fn resolve(
        db_path: PathBuf,
        out_file: Option<PathBuf>,
        variant: Variant,
        workers_flag: Option<usize>,
        intra_flag: Option<usize>,
        cache_flag: Option<usize>,
    ) -> BuildConfig {
        let out_file = out_file.unwrap_or_else(|| db_path.join(mill_engine::trapdb::TRAP_DB_FILE));
        let workers = workers_flag
            .or_else(|| env_usize(ENV_WORKERS))
            .filter(|&w| w > 0)
            .unwrap_or_else(default_workers);
        let intra_threads = intra_flag
            .or_else(|| env_usize(ENV_INTRA))
            .filter(|&t| t > 0)
            .unwrap_or(1);
        let cache_capacity = cache_flag
            .or_else(|| env_usize(ENV_CACHE))
            .filter(|&c| c > 0)
            .unwrap_or(5000);
        BuildConfig {
            db_path,
            out_file,
            variant,
            workers,
            intra_threads,
            cache_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_default() {
        let cfg = BuildConfig::resolve(
            PathBuf::from("/db"),
            None,
            Variant::Standard,
            Some(3),
            None,
            Some(100),
        );
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.intra_threads, 1);
        assert_eq!(cfg.cache_capacity, 100);
        assert_eq!(cfg.out_file, PathBuf::from("/db/std_traps.sec2"));
    }

    #[test]
    fn test_default_workers_bounded() {
        let w = default_workers();
        assert!((1..=8).contains(&w));
    }
}
