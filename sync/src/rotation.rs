//! Daily compression and truncation of the engine's own log files

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDate};
use filetime::FileTime;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Logs untouched for longer than this are rotated
pub const DEFAULT_ROTATION_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Suffix shared by every rotated archive
pub const ARCHIVE_SUFFIX: &str = ".log.gz";

/// Archive name for `log_path` rotated on `date`: `<log_path>.<YYYY-MM-DD>.log.gz`
pub fn archive_path_for(log_path: &Path, date: NaiveDate) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{}{}", date.format("%Y-%m-%d"), ARCHIVE_SUFFIX));
    PathBuf::from(name)
}

/// What a rotation attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The log file does not exist
    Missing,
    /// The log file has nothing to archive
    Empty,
    /// The log was modified within the threshold
    Fresh,
    /// An archive for today already exists; the log was left alone
    AlreadyArchived(PathBuf),
    /// The log was compressed into this archive and truncated
    Archived(PathBuf),
}

/// Compresses stale logs into dated archives and truncates them in place
#[derive(Debug, Clone)]
pub struct LogRotator {
    threshold: Duration,
}

impl Default for LogRotator {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_AGE)
    }
}

impl LogRotator {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Rotate `log_path` if its last modification is older than the threshold.
    ///
    /// The live file keeps its identity: it is truncated, never removed, so a
    /// writer holding it open in append mode just starts over.
    pub async fn rotate<P: AsRef<Path>>(&self, log_path: P) -> Result<RotationOutcome> {
        let log_path = log_path.as_ref();

        let metadata = match fs::metadata(log_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RotationOutcome::Missing),
            Err(e) => {
                return Err(SyncError::rotation_error(
                    log_path,
                    format!("Failed to read metadata: {}", e),
                ))
            }
        };

        let modified = metadata.modified().map_err(|e| {
            SyncError::rotation_error(log_path, format!("Modification time unavailable: {}", e))
        })?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age <= self.threshold {
            debug!("Log {} is {:?} old, not rotating", log_path.display(), age);
            return Ok(RotationOutcome::Fresh);
        }

        if metadata.len() == 0 {
            return Ok(RotationOutcome::Empty);
        }

        let archive_path = archive_path_for(log_path, Local::now().date_naive());
        let source = log_path.to_path_buf();
        let target = archive_path.clone();

        let created = tokio::task::spawn_blocking(move || compress_and_truncate(&source, &target))
            .await
            .map_err(|e| SyncError::rotation_error(log_path, format!("Rotation task failed: {}", e)))?
            .map_err(|e| SyncError::rotation_error(log_path, e.to_string()))?;

        if created {
            info!(
                "Rotated log {} into {}",
                log_path.display(),
                archive_path.display()
            );
            Ok(RotationOutcome::Archived(archive_path))
        } else {
            warn!(
                "Archive {} already exists, leaving {} untouched",
                archive_path.display(),
                log_path.display()
            );
            Ok(RotationOutcome::AlreadyArchived(archive_path))
        }
    }
}

/// Returns `false` without touching anything when the archive already exists
fn compress_and_truncate(log_path: &Path, archive_path: &Path) -> io::Result<bool> {
    let output = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(archive_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };

    if let Err(e) = write_archive(log_path, output) {
        // a half-written archive would block today's retry
        let _ = std::fs::remove_file(archive_path);
        return Err(e);
    }

    std::fs::OpenOptions::new()
        .write(true)
        .open(log_path)?
        .set_len(0)?;
    filetime::set_file_mtime(log_path, FileTime::now())?;

    Ok(true)
}

fn write_archive(log_path: &Path, output: std::fs::File) -> io::Result<()> {
    let mut input = std::fs::File::open(log_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()
}
