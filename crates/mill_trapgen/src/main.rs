//! Trap-database builder CLI
//!
//! Sweeps every reachable sector of a solved position database and writes
//! the trap table consumed by the engine. Interruptible: progress is
//! checkpointed at least every 15 seconds and completed sectors are skipped
//! on the next run.

mod builder;
mod checkpoint;
mod config;
mod filter;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mill_engine::Variant;
use tracing_subscriber::EnvFilter;

use crate::config::BuildConfig;

#[derive(Parser, Debug)]
#[command(
    name = "mill_trapgen",
    about = "Build the trap database from a solved mill position database"
)]
struct Args {
    /// Directory with the sector files and the sector value table
    db_path: PathBuf,

    /// Output file (defaults to std_traps.sec2 inside the database directory)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Game variant: std, lask or mora
    #[arg(long, default_value = "std")]
    variant: String,

    /// Worker threads (overrides SANMILL_TRAP_THREADS)
    #[arg(long)]
    threads: Option<usize>,

    /// Sub-threads per sector (overrides SANMILL_INTRA_SECTOR_THREADS)
    #[arg(long)]
    intra_threads: Option<usize>,

    /// Per-thread evaluation cache capacity (overrides SANMILL_TRAP_CACHE_SIZE)
    #[arg(long)]
    cache_size: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let variant = Variant::from_name(&args.variant)
        .with_context(|| format!("unknown variant {:?}", args.variant))?;

    let cfg = BuildConfig::resolve(
        args.db_path,
        args.out,
        variant,
        args.threads,
        args.intra_threads,
        args.cache_size,
    );

    let stats = builder::run(&cfg)?;
    println!(
        "{} trap records from {} positions across {} sectors -> {}",
        stats.records,
        stats.positions,
        stats.sectors,
        cfg.out_file.display()
    );
    Ok(())
}
