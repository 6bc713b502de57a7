//! Backup Sync Library
//!
//! One-way, checksum-driven directory mirroring for a polling backup service:
//! - Whole-file digests (MD5, SHA-256, Blake3) to detect changed content
//! - Recursive tree mirroring that skips `.stfolder` control directories
//! - Per-file and per-pair failure isolation with an append-only error log
//! - Daily compression of log files and relocation of the archives

pub mod comparator;
pub mod cycle;
pub mod error;
pub mod error_log;
pub mod metrics;
pub mod mirror;
pub mod preservation;
pub mod relocation;
pub mod rotation;

// Re-export main types and functions
pub use comparator::{ComparisonResult, Digest, DigestAlgorithm, FileComparator, FileComparison};
pub use cycle::{pair_directories, CycleRunner, DirectoryPair};
pub use error::{Result, SyncError};
pub use error_log::ErrorLog;
pub use metrics::{CycleSummary, FileStats};
pub use mirror::{TreeMirror, EXCLUDED_DIR_NAME};
pub use preservation::{AttributePreserver, FileAttributes};
pub use relocation::{ArchiveRelocator, RelocationReport};
pub use rotation::{LogRotator, RotationOutcome, ARCHIVE_SUFFIX, DEFAULT_ROTATION_AGE};

/// Run one backup cycle over every pair
pub async fn run_cycle(
    pairs: &[DirectoryPair],
    comparator: FileComparator,
    error_log: ErrorLog,
) -> CycleSummary {
    CycleRunner::new(TreeMirror::new(comparator, error_log))
        .run(pairs)
        .await
}

// Test modules
#[cfg(test)]
mod test_support;
