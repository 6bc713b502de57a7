//! Error types for the backup sync library

use std::path::PathBuf;

use crate::comparator::DigestAlgorithm;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type shared by the comparator, tree mirror and log lifecycle code
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Two digests produced by different algorithms were compared
    #[error("Cannot compare a {left} digest with a {right} digest")]
    DigestMismatch {
        left: DigestAlgorithm,
        right: DigestAlgorithm,
    },

    /// Unknown digest algorithm name
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Attribute preservation errors
    #[error("Attribute preservation error for '{path}': {message}")]
    AttributePreservation { path: PathBuf, message: String },

    /// Directory walk errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Destination directory could not be created
    #[error("Failed to create directory '{path}': {message}")]
    DirectoryCreate { path: PathBuf, message: String },

    /// File copying errors
    #[error("File copy error: {message}")]
    FileCopy { message: String },

    /// Log rotation errors
    #[error("Log rotation error for '{path}': {message}")]
    Rotation { path: PathBuf, message: String },

    /// Archive relocation errors
    #[error("Archive relocation error for '{path}': {message}")]
    Relocation { path: PathBuf, message: String },

    /// Archive name pattern errors
    #[error("Archive pattern error: {0}")]
    ArchivePattern(String),
}

impl SyncError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new attribute preservation error
    pub fn attribute_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AttributePreservation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory creation error
    pub fn create_dir_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "File copy error from '{}' to '{}': {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::FileCopy {
            message: full_message,
        }
    }

    /// Create a new rotation error
    pub fn rotation_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Rotation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new relocation error
    pub fn relocation_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Relocation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error should abandon a whole directory pair rather than a single file
    pub fn is_tree_level(&self) -> bool {
        matches!(
            self,
            Self::Path { .. } | Self::DirectoryScan { .. } | Self::DirectoryCreate { .. }
        )
    }
}
