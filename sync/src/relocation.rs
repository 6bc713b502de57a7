//! Moves rotated log archives into the configured archive directory

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::rotation::ARCHIVE_SUFFIX;

/// Highest `-N` counter tried when an archive name is already taken
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// What one relocation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// Archives now in the archive directory
    pub moved: Vec<PathBuf>,
    /// Archives that could not be moved and were left in place
    pub failed: Vec<PathBuf>,
}

/// Finds archives by file name pattern and moves them
#[derive(Debug, Clone)]
pub struct ArchiveRelocator {
    matcher: GlobMatcher,
}

impl ArchiveRelocator {
    /// Relocator matching `*.log.gz`
    pub fn new() -> Result<Self> {
        Self::with_pattern(&format!("*{}", ARCHIVE_SUFFIX))
    }

    /// Relocator matching a custom file name glob
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::ArchivePattern(format!("Failed to compile glob '{}': {}", pattern, e))
        })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    /// Move every matching file in `search_dir` into the first of `archive_dirs`.
    ///
    /// Fails without touching anything when no archive directory is configured
    /// or it does not exist. A file that cannot be moved is logged, left where
    /// it is and reported in [`RelocationReport::failed`]. An archive whose
    /// name is already taken in the archive directory is stored under a
    /// `-N` suffixed name; nothing there is ever replaced.
    pub async fn relocate<P: AsRef<Path>>(
        &self,
        search_dir: P,
        archive_dirs: &[PathBuf],
    ) -> Result<RelocationReport> {
        let search_dir = search_dir.as_ref();
        let target_dir = resolve_target(archive_dirs).await?;

        let mut report = RelocationReport::default();
        let mut entries = fs::read_dir(search_dir).await.map_err(|e| {
            SyncError::relocation_error(search_dir, format!("Failed to list directory: {}", e))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            SyncError::relocation_error(search_dir, format!("Failed to read directory entry: {}", e))
        })? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !self.matcher.is_match(entry.file_name()) {
                continue;
            }

            let source = entry.path();
            let destination = match free_destination(target_dir, &entry.file_name()).await {
                Ok(destination) => destination,
                Err(e) => {
                    warn!("Failed to move {}: {}", source.display(), e);
                    report.failed.push(source);
                    continue;
                }
            };
            match move_file(&source, &destination).await {
                Ok(()) => {
                    info!("Moved archive {} to {}", source.display(), destination.display());
                    report.moved.push(destination);
                }
                Err(e) => {
                    warn!("Failed to move {}: {}", source.display(), e);
                    report.failed.push(source);
                }
            }
        }

        Ok(report)
    }
}

async fn resolve_target(archive_dirs: &[PathBuf]) -> Result<&Path> {
    let target = match archive_dirs.first() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.as_path(),
        _ => {
            return Err(SyncError::relocation_error(
                PathBuf::new(),
                "No log directories specified",
            ))
        }
    };

    if archive_dirs.len() > 1 {
        debug!(
            "{} archive directories configured, using {}",
            archive_dirs.len(),
            target.display()
        );
    }

    match fs::metadata(target).await {
        Ok(metadata) if metadata.is_dir() => Ok(target),
        _ => Err(SyncError::relocation_error(
            target,
            "Log directory does not exist",
        )),
    }
}

/// First name in `target_dir` not already taken: `<file_name>`, then
/// `<stem>-1.log.gz`, `<stem>-2.log.gz`, ...
async fn free_destination(target_dir: &Path, file_name: &OsStr) -> Result<PathBuf> {
    let candidate = target_dir.join(file_name);
    if !is_taken(&candidate).await {
        return Ok(candidate);
    }

    let name = file_name.to_string_lossy();
    let (stem, suffix) = match name.strip_suffix(ARCHIVE_SUFFIX) {
        Some(stem) => (stem, ARCHIVE_SUFFIX),
        None => (&name[..], ""),
    };

    for counter in 1..=MAX_NAME_ATTEMPTS {
        let candidate = target_dir.join(format!("{}-{}{}", stem, counter, suffix));
        if !is_taken(&candidate).await {
            debug!(
                "{} already archived, using {}",
                name,
                candidate.display()
            );
            return Ok(candidate);
        }
    }

    Err(SyncError::relocation_error(
        target_dir.join(file_name),
        "No free archive name left",
    ))
}

async fn is_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Rename, falling back to copy-then-remove across filesystems.
///
/// The archive never ends up in both places: if the original cannot be
/// removed after copying, the copy is removed instead.
async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if fs::rename(source, destination).await.is_ok() {
        return Ok(());
    }

    copy_new(source, destination).await.map_err(|e| {
        SyncError::relocation_error(
            source,
            format!("Failed to copy to '{}': {}", destination.display(), e),
        )
    })?;

    if let Err(e) = fs::remove_file(source).await {
        let _ = fs::remove_file(destination).await;
        return Err(SyncError::relocation_error(
            source,
            format!("Failed to remove original after copy: {}", e),
        ));
    }

    Ok(())
}

/// Copy into a file that must not exist yet. A partial copy is removed; an
/// existing file is never touched.
async fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut input = fs::File::open(source).await?;
    let mut output = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await?;

    let copied = async {
        tokio::io::copy(&mut input, &mut output).await?;
        output.sync_all().await
    }
    .await;

    if copied.is_err() {
        let _ = fs::remove_file(destination).await;
    }
    copied
}
