//! One-way tree mirroring driven by content digests

use std::path::Path;

use tokio::fs;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::comparator::FileComparator;
use crate::error::{Result, SyncError};
use crate::error_log::ErrorLog;
use crate::metrics::FileStats;
use crate::preservation::{AttributePreserver, FileAttributes};

/// Directory name holding sync-tool control metadata; never mirrored
pub const EXCLUDED_DIR_NAME: &str = ".stfolder";

/// Mirrors one source tree into one destination tree
#[derive(Debug, Clone)]
pub struct TreeMirror {
    comparator: FileComparator,
    error_log: ErrorLog,
}

impl TreeMirror {
    pub fn new(comparator: FileComparator, error_log: ErrorLog) -> Self {
        Self {
            comparator,
            error_log,
        }
    }

    pub fn comparator(&self) -> &FileComparator {
        &self.comparator
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Mirror `source` into `destination`.
    ///
    /// Per-file failures go to the error log and are counted in the returned
    /// stats. An error is returned only for tree-level failures: an unusable
    /// source or destination root, or a destination directory that cannot be
    /// created.
    pub async fn mirror<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        source: P1,
        destination: P2,
    ) -> Result<FileStats> {
        let source = source.as_ref();
        let destination = destination.as_ref();
        let mut stats = FileStats::default();

        check_source_root(source).await?;
        if ensure_directory(destination).await? {
            stats.directories_created += 1;
        }

        let walker = WalkDir::new(source)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SyncError::scan_error(source, format!("Walk error: {}", e)));
                }
                Err(e) => {
                    let location = e.path().unwrap_or(source).display().to_string();
                    self.error_log
                        .record(&format!("Failed to read directory entry: {} | Error: {}", location, e))
                        .await;
                    stats.failed += 1;
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let relative_path = entry.path().strip_prefix(source).map_err(|e| {
                SyncError::path_error(entry.path(), format!("Failed to create relative path: {}", e))
            })?;
            let target = destination.join(relative_path);

            if entry.file_type().is_dir() {
                if ensure_directory(&target).await? {
                    stats.directories_created += 1;
                }
                continue;
            }

            if entry.file_type().is_symlink() && points_to_directory(entry.path()).await {
                debug!("Not following directory link: {}", entry.path().display());
                continue;
            }

            self.mirror_file(entry.path(), &target, &mut stats).await;
        }

        Ok(stats)
    }

    async fn mirror_file(&self, source: &Path, destination: &Path, stats: &mut FileStats) {
        let comparison = match self.comparator.check(source, destination).await {
            Ok(comparison) => comparison,
            Err(e) => {
                self.error_log
                    .record(&format!(
                        "Failed to compare file: {} -> {} | Error: {}",
                        source.display(),
                        destination.display(),
                        e
                    ))
                    .await;
                stats.failed += 1;
                return;
            }
        };

        if !comparison.needs_copy() {
            info!("File unchanged, skipping backup: {}", source.display());
            stats.unchanged += 1;
            return;
        }

        match copy_file(source, destination).await {
            Ok((bytes, attributes)) => {
                info!(
                    "Backed up file: {} -> {} | Checksum: {} | Permissions: {}",
                    source.display(),
                    destination.display(),
                    comparison.source_digest,
                    attributes.permissions_octal()
                );
                stats.copied += 1;
                stats.bytes_copied += bytes;
            }
            Err(e) => {
                self.error_log
                    .record(&format!(
                        "Failed to back up file: {} -> {} | Error: {}",
                        source.display(),
                        destination.display(),
                        e
                    ))
                    .await;
                stats.failed += 1;
            }
        }
    }
}

/// Copy content, then carry over mtime and permission bits
async fn copy_file(source: &Path, destination: &Path) -> Result<(u64, FileAttributes)> {
    remove_dangling_link(destination).await?;

    let bytes = fs::copy(source, destination)
        .await
        .map_err(|e| SyncError::copy_error(source, destination, format!("Failed to copy file: {}", e)))?;

    let attributes = AttributePreserver::copy_attributes(source, destination).await?;
    Ok((bytes, attributes))
}

/// A destination link whose target is gone is replaced by a real copy
async fn remove_dangling_link(destination: &Path) -> Result<()> {
    let is_link = fs::symlink_metadata(destination)
        .await
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link || fs::metadata(destination).await.is_ok() {
        return Ok(());
    }

    debug!("Replacing dangling link: {}", destination.display());
    fs::remove_file(destination).await.map_err(|e| {
        SyncError::copy_error(destination, destination, format!("Failed to remove dangling link: {}", e))
    })
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == EXCLUDED_DIR_NAME
}

async fn points_to_directory(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn check_source_root(source: &Path) -> Result<()> {
    let metadata = fs::metadata(source).await.map_err(|e| {
        SyncError::path_error(source, format!("Source directory is not accessible: {}", e))
    })?;

    if !metadata.is_dir() {
        return Err(SyncError::path_error(source, "Source path is not a directory"));
    }

    fs::read_dir(source).await.map_err(|e| {
        SyncError::scan_error(source, format!("Source directory is not readable: {}", e))
    })?;

    Ok(())
}

/// Create `path` if it is absent. Returns whether it was created.
async fn ensure_directory(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(SyncError::path_error(path, "Destination exists and is not a directory")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(path)
                .await
                .map_err(|e| SyncError::create_dir_error(path, e.to_string()))?;
            debug!("Created directory: {}", path.display());
            Ok(true)
        }
        Err(e) => Err(SyncError::path_error(
            path,
            format!("Destination directory is not accessible: {}", e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::DigestAlgorithm;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use tokio::fs;

    fn mirror_in(temp_dir: &TempDir) -> TreeMirror {
        TreeMirror::new(
            FileComparator::new(DigestAlgorithm::Md5),
            ErrorLog::new(temp_dir.path().join("error.log")),
        )
    }

    #[tokio::test]
    async fn test_nested_tree_is_mirrored() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");

        fs::create_dir_all(source.join("a").join("b")).await.unwrap();
        fs::create_dir_all(source.join("empty")).await.unwrap();
        fs::write(source.join("top.txt"), b"top").await.unwrap();
        fs::write(source.join("a").join("b").join("deep.txt"), b"deep").await.unwrap();

        let stats = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 2);
        assert_eq!(stats.failed, 0);
        assert!(dest.join("empty").is_dir());
        assert_eq!(fs::read(dest.join("top.txt")).await.unwrap(), b"top");
        assert_eq!(
            fs::read(dest.join("a").join("b").join("deep.txt")).await.unwrap(),
            b"deep"
        );
    }

    #[tokio::test]
    async fn test_second_pass_copies_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&source).await.unwrap();
        fs::write(source.join("one.txt"), b"1").await.unwrap();
        fs::write(source.join("two.txt"), b"2").await.unwrap();

        let mirror = mirror_in(&temp_dir);
        mirror.mirror(&source, &dest).await.unwrap();
        let stats = mirror.mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 0);
        assert_eq!(stats.unchanged, 2);
    }

    #[tokio::test]
    async fn test_stale_destination_is_overwritten_with_source_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&source).await.unwrap();
        fs::create_dir_all(&dest).await.unwrap();
        fs::write(source.join("c.txt"), b"new content").await.unwrap();
        fs::write(dest.join("c.txt"), b"old").await.unwrap();

        let past = SystemTime::now() - Duration::from_secs(7200);
        filetime::set_file_mtime(
            source.join("c.txt"),
            filetime::FileTime::from_system_time(past),
        )
        .unwrap();

        let stats = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 1);
        assert_eq!(fs::read(dest.join("c.txt")).await.unwrap(), b"new content");
        let source_mtime = fs::metadata(source.join("c.txt")).await.unwrap().modified().unwrap();
        let dest_mtime = fs::metadata(dest.join("c.txt")).await.unwrap().modified().unwrap();
        assert_eq!(source_mtime, dest_mtime);
    }

    #[tokio::test]
    async fn test_nested_stfolder_is_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        let control = source.join("photos").join(EXCLUDED_DIR_NAME);
        fs::create_dir_all(control.join("inner")).await.unwrap();
        fs::write(control.join("inner").join("marker"), b"m").await.unwrap();
        fs::write(source.join("photos").join("cat.jpg"), b"cat").await.unwrap();

        let stats = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 1);
        assert!(dest.join("photos").join("cat.jpg").exists());
        assert!(!dest.join("photos").join(EXCLUDED_DIR_NAME).exists());
    }

    #[tokio::test]
    async fn test_stfolder_named_file_is_copied() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&source).await.unwrap();
        fs::write(source.join(EXCLUDED_DIR_NAME), b"plain file").await.unwrap();

        let stats = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 1);
        assert!(dest.join(EXCLUDED_DIR_NAME).is_file());
    }

    #[tokio::test]
    async fn test_missing_source_root_is_tree_level() {
        let temp_dir = TempDir::new().unwrap();
        let err = mirror_in(&temp_dir)
            .mirror(temp_dir.path().join("nope"), temp_dir.path().join("dest"))
            .await
            .unwrap_err();

        assert!(err.is_tree_level());
        assert!(!temp_dir.path().join("dest").exists());
    }

    #[tokio::test]
    async fn test_destination_root_that_is_a_file_is_tree_level() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&source).await.unwrap();
        fs::write(source.join("x.txt"), b"x").await.unwrap();
        fs::write(&dest, b"i am a file").await.unwrap();

        let err = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap_err();
        assert!(err.is_tree_level());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_destination_link_is_repaired() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&source).await.unwrap();
        fs::create_dir_all(&dest).await.unwrap();
        fs::write(source.join("a.txt"), b"fresh").await.unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("gone.txt"), dest.join("a.txt")).unwrap();

        let mirror = mirror_in(&temp_dir);
        let stats = mirror.mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.copied, 1);
        assert_eq!(stats.failed, 0);
        let metadata = fs::symlink_metadata(dest.join("a.txt")).await.unwrap();
        assert!(metadata.file_type().is_file());
        assert_eq!(fs::read(dest.join("a.txt")).await.unwrap(), b"fresh");

        let again = mirror.mirror(&source, &dest).await.unwrap();
        assert_eq!(again.unchanged, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_symlink_is_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let dest = temp_dir.path().join("dest");
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&source).await.unwrap();
        fs::create_dir_all(&outside).await.unwrap();
        fs::write(outside.join("secret.txt"), b"s").await.unwrap();
        std::os::unix::fs::symlink(&outside, source.join("link")).unwrap();

        let stats = mirror_in(&temp_dir).mirror(&source, &dest).await.unwrap();

        assert_eq!(stats.processed(), 0);
        assert!(!dest.join("link").exists());
    }
}
