//! Per-tree and per-cycle counters

use std::ops::AddAssign;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File counters for one tree mirror pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Files copied because they were missing or stale
    pub copied: usize,
    /// Files left alone because their content matched
    pub unchanged: usize,
    /// Files whose comparison or copy failed
    pub failed: usize,
    /// Destination directories created
    pub directories_created: usize,
    /// Bytes written to destinations
    pub bytes_copied: u64,
}

impl FileStats {
    pub fn processed(&self) -> usize {
        self.copied + self.unchanged + self.failed
    }
}

impl AddAssign for FileStats {
    fn add_assign(&mut self, other: Self) {
        self.copied += other.copied;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.directories_created += other.directories_created;
        self.bytes_copied += other.bytes_copied;
    }
}

/// Summary of one backup cycle over all directory pairs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Pairs the runner attempted
    pub pairs_attempted: usize,
    /// Pairs abandoned because of a tree-level failure
    pub pairs_failed: usize,
    /// Totals across all pairs that completed
    pub files: FileStats,
    /// Wall time of the cycle
    pub duration: Duration,
}

impl CycleSummary {
    pub fn is_successful(&self) -> bool {
        self.pairs_failed == 0 && self.files.failed == 0
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "Backup cycle finished in {:.2?}: {} pairs ({} failed), {} copied, {} unchanged, {} failed files",
            self.duration,
            self.pairs_attempted,
            self.pairs_failed,
            self.files.copied,
            self.files.unchanged,
            self.files.failed,
        )
    }
}
