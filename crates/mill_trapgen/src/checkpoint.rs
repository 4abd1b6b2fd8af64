//! Checkpointing and resume
//!
//! Partial results are persisted as complete snapshots: the collector map
//! is serialized to `<out>.tmp` and atomically renamed over the output
//! file. The rename is the commit boundary; interrupting the builder at
//! any point leaves the last complete snapshot on disk.
//!
//! Sector-level progress goes to a sidecar `<out>.progress` text file, one
//! completed sector file name per line, so a restarted build skips work
//! already merged into the output.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use mill_engine::trapdb::{self, TrapRecord};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Minimum spacing between periodic snapshots.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(15);

pub struct CheckpointWriter {
    out_path: PathBuf,
    state: Mutex<Instant>,
}

impl CheckpointWriter {
    pub fn new(out_path: PathBuf) -> CheckpointWriter {
        CheckpointWriter {
            out_path,
            state: Mutex::new(Instant::now()),
        }
    }

    pub fn due(&self) -> bool {
        self.state.lock().elapsed() >= CHECKPOINT_INTERVAL
    }

    /// Serialize a snapshot and commit it with an atomic rename. Empty
    /// snapshots are never written; an interrupted build must not truncate
    /// a previous result.
    pub fn write_snapshot(&self, snapshot: &HashMap<u64, TrapRecord>) -> std::io::Result<bool> {
        if snapshot.is_empty() {
            return Ok(false);
        }
        let mut state = self.state.lock();

        let mut tmp = self.out_path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
        let mut records: Vec<(u64, TrapRecord)> =
            snapshot.iter().map(|(&k, &v)| (k, v)).collect();
        records.sort_by_key(|&(k, _)| k);

        let file = std::fs::File::create(&tmp_path)?;
        let mut out = BufWriter::new(file);
        trapdb::write_records(&mut out, &records)?;
        out.flush()?;
        out.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        std::fs::rename(&tmp_path, &self.out_path)?;

        *state = Instant::now();
        info!(records = records.len(), path = %self.out_path.display(), "checkpoint saved");
        Ok(true)
    }
}

pub struct ResumeTracker {
    progress_path: PathBuf,
    completed: Mutex<HashSet<String>>,
}

impl ResumeTracker {
    pub fn new(out_file: &std::path::Path) -> ResumeTracker {
        let mut progress_path = out_file.as_os_str().to_owned();
        progress_path.push(".progress");
        ResumeTracker {
            progress_path: PathBuf::from(progress_path),
            completed: Mutex::new(HashSet::new()),
        }
    }

    /// Load the progress file if one exists.
    pub fn load(&self) {
        let Ok(text) = std::fs::read_to_string(&self.progress_path) else {
            return;
        };
        let mut completed = self.completed.lock();
        for line in text.lines() {
            if !line.trim().is_empty() {
                completed.insert(line.trim().to_string());
            }
        }
        info!(
            sectors = completed.len(),
            "resume: sectors already completed in a previous run"
        );
    }

    pub fn is_completed(&self, sector_name: &str) -> bool {
        self.completed.lock().contains(sector_name)
    }

    /// Record a completed sector; appending to the file is best effort.
    pub fn mark_completed(&self, sector_name: &str) {
        {
            let mut completed = self.completed.lock();
            if !completed.insert(sector_name.to_string()) {
                return;
            }
        }
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.progress_path)
            .and_then(|mut f| writeln!(f, "{sector_name}"));
        if let Err(e) = appended {
            warn!(error = %e, "could not append to the progress file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mill_engine::trapdb::{position_key, read_records};

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("traps.sec2");
        let writer = CheckpointWriter::new(out.clone());

        let mut snapshot = HashMap::new();
        snapshot.insert(
            position_key(0b11, 0b100, 0, 7, 7),
            TrapRecord {
                mask: 1,
                wdl: -1,
                steps: 5,
            },
        );
        assert!(writer.write_snapshot(&snapshot).unwrap());

        let records = read_records(&out).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.steps, 5);
        // The temp file is gone after the commit.
        assert!(!dir.path().join("traps.sec2.tmp").exists());
    }

    #[test]
    fn test_empty_snapshot_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("traps.sec2");
        let writer = CheckpointWriter::new(out.clone());
        assert!(!writer.write_snapshot(&HashMap::new()).unwrap());
        assert!(!out.exists());
    }

    #[test]
    fn test_resume_tracker_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("traps.sec2");
        let tracker = ResumeTracker::new(&out);
        assert!(!tracker.is_completed("std_3_3_0_0.sec2"));
        tracker.mark_completed("std_3_3_0_0.sec2");
        assert!(tracker.is_completed("std_3_3_0_0.sec2"));

        // A fresh tracker reads the same file back.
        let again = ResumeTracker::new(&out);
        again.load();
        assert!(again.is_completed("std_3_3_0_0.sec2"));
    }
}
