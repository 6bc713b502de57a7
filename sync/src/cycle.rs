//! Backup cycle over all configured directory pairs

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::metrics::CycleSummary;
use crate::mirror::TreeMirror;

/// A source tree and the destination tree it is mirrored into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPair {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl DirectoryPair {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Pair sources with destinations by position.
///
/// Entries past the end of the shorter list are dropped, with a warning.
pub fn pair_directories<S, D>(sources: &[S], destinations: &[D]) -> Vec<DirectoryPair>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    if sources.len() != destinations.len() {
        warn!(
            "Source and destination lists differ in length ({} vs {}); only the first {} pairs will be backed up",
            sources.len(),
            destinations.len(),
            sources.len().min(destinations.len())
        );
    }

    sources
        .iter()
        .zip(destinations)
        .map(|(source, destination)| DirectoryPair::new(source.as_ref(), destination.as_ref()))
        .collect()
}

/// Runs one tree mirror pass per directory pair
#[derive(Debug, Clone)]
pub struct CycleRunner {
    mirror: TreeMirror,
}

impl CycleRunner {
    pub fn new(mirror: TreeMirror) -> Self {
        Self { mirror }
    }

    /// Mirror every pair in order.
    ///
    /// A pair that fails at tree level is logged and skipped; the remaining
    /// pairs still run.
    pub async fn run(&self, pairs: &[DirectoryPair]) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        for pair in pairs {
            summary.pairs_attempted += 1;
            info!(
                "Backing up {} -> {}",
                pair.source.display(),
                pair.destination.display()
            );

            match self.mirror.mirror(&pair.source, &pair.destination).await {
                Ok(stats) => {
                    info!(
                        "Finished {} -> {}: {} copied, {} unchanged, {} failed",
                        pair.source.display(),
                        pair.destination.display(),
                        stats.copied,
                        stats.unchanged,
                        stats.failed
                    );
                    summary.files += stats;
                }
                Err(e) => {
                    summary.pairs_failed += 1;
                    self.mirror
                        .error_log()
                        .record(&format!(
                            "Error during backup process from {} to {}: {}",
                            pair.source.display(),
                            pair.destination.display(),
                            e
                        ))
                        .await;
                }
            }
        }

        summary.duration = started.elapsed();
        summary
    }
}
