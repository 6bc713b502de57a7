//! Modification time and permission preservation for copied files

use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use tokio::fs;

use crate::error::{Result, SyncError};

/// Attributes carried from a source file onto its copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    /// Last modification time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: Option<SystemTime>,
    /// File permissions (Unix-style mode bits)
    pub permissions: u32,
}

impl FileAttributes {
    /// Permission bits as three octal digits, e.g. `644`
    pub fn permissions_octal(&self) -> String {
        format_permissions(self.permissions)
    }
}

/// Copies modification time and permission bits between files
pub struct AttributePreserver;

impl AttributePreserver {
    /// Extract attributes from a file
    pub async fn extract_attributes(path: &Path) -> Result<FileAttributes> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            SyncError::attribute_error(path, format!("Failed to read metadata: {}", e))
        })?;

        let modified = metadata.modified().map_err(|e| {
            SyncError::attribute_error(path, format!("Modification time unavailable: {}", e))
        })?;

        Ok(FileAttributes {
            modified,
            accessed: metadata.accessed().ok(),
            permissions: get_permissions(&metadata),
        })
    }

    /// Apply attributes to a file
    ///
    /// Permissions are applied before timestamps so that setting a read-only
    /// mode cannot leave the mtime untouched.
    pub async fn apply_attributes(path: &Path, attributes: &FileAttributes) -> Result<()> {
        set_permissions(path, attributes.permissions).await?;

        let mtime = FileTime::from_system_time(attributes.modified);
        let atime = attributes
            .accessed
            .map(FileTime::from_system_time)
            .unwrap_or(mtime);

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || filetime::set_file_times(&target, atime, mtime))
            .await
            .map_err(|e| SyncError::attribute_error(path, format!("Timestamp task failed: {}", e)))?
            .map_err(|e| SyncError::attribute_error(path, format!("Failed to set file times: {}", e)))
    }

    /// Copy attributes from source to destination, returning what was applied
    pub async fn copy_attributes(source: &Path, destination: &Path) -> Result<FileAttributes> {
        let attributes = Self::extract_attributes(source).await?;
        Self::apply_attributes(destination, &attributes).await?;
        Ok(attributes)
    }
}

/// Format a mode as its last three octal digits
pub fn format_permissions(mode: u32) -> String {
    format!("{:03o}", mode & 0o777)
}

/// Set file permissions
async fn set_permissions(path: &Path, permissions: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(permissions);
        fs::set_permissions(path, perms)
            .await
            .map_err(|e| SyncError::attribute_error(path, format!("Failed to set permissions: {}", e)))
    }

    #[cfg(windows)]
    {
        // Only the read-only attribute exists on Windows
        let readonly = (permissions & 0o200) == 0;
        let mut perms = fs::metadata(path)
            .await
            .map_err(|e| SyncError::attribute_error(path, format!("Failed to read metadata: {}", e)))?
            .permissions();
        perms.set_readonly(readonly);
        fs::set_permissions(path, perms)
            .await
            .map_err(|e| SyncError::attribute_error(path, format!("Failed to set permissions: {}", e)))
    }
}

/// Get file permissions in a cross-platform way
#[cfg(unix)]
pub(crate) fn get_permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(windows)]
pub(crate) fn get_permissions(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}
