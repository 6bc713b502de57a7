//! Content digests and destination staleness checks

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{Result, SyncError};

/// Hash algorithms available for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5, enough to notice any content change
    #[default]
    Md5,
    /// SHA-256
    Sha256,
    /// Blake3 (faster)
    Blake3,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(SyncError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A whole-file fingerprint, tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    pub fn new(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether both digests describe the same content.
    ///
    /// Digests of different algorithms are never comparable.
    pub fn same_content(&self, other: &Digest) -> Result<bool> {
        if self.algorithm != other.algorithm {
            return Err(SyncError::DigestMismatch {
                left: self.algorithm,
                right: other.algorithm,
            });
        }
        Ok(self.hex == other.hex)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Streaming hasher state for one file
enum Hasher {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(context) => context.consume(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> Digest {
        match self {
            Self::Md5(context) => Digest::new(DigestAlgorithm::Md5, format!("{:x}", context.compute())),
            Self::Sha256(hasher) => {
                Digest::new(DigestAlgorithm::Sha256, format!("{:x}", hasher.finalize()))
            }
            Self::Blake3(hasher) => {
                Digest::new(DigestAlgorithm::Blake3, hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Outcome of checking one destination file against its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonResult {
    /// Destination does not exist yet
    DestinationMissing,
    /// Destination exists with different content
    DifferentContent,
    /// Destination content matches the source
    Identical,
}

/// Comparison result plus the source digest computed along the way
#[derive(Debug, Clone)]
pub struct FileComparison {
    pub result: ComparisonResult,
    pub source_digest: Digest,
}

impl FileComparison {
    pub fn needs_copy(&self) -> bool {
        self.result != ComparisonResult::Identical
    }
}

/// Digest-based file comparator
#[derive(Debug, Clone)]
pub struct FileComparator {
    algorithm: DigestAlgorithm,
    /// Read chunk size
    buffer_size: usize,
}

impl Default for FileComparator {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default())
    }
}

impl FileComparator {
    /// Create a new file comparator
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }

    /// Create a new file comparator with custom buffer size
    pub fn with_buffer_size(algorithm: DigestAlgorithm, buffer_size: usize) -> Self {
        Self {
            algorithm,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Compute the digest of a file, reading it in fixed-size chunks
    pub async fn digest<P: AsRef<Path>>(&self, path: P) -> Result<Digest> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::hash_error(path, format!("Failed to open file: {}", e)))?;

        let mut hasher = Hasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| SyncError::hash_error(path, format!("Failed to read file: {}", e)))?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize())
    }

    /// Whether `destination` is missing or holds different content than `source`
    pub async fn has_changed<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        source: P1,
        destination: P2,
    ) -> Result<bool> {
        let destination = destination.as_ref();
        if !destination_exists(destination).await? {
            return Ok(true);
        }

        let source_digest = self.digest(source).await?;
        let dest_digest = self.digest(destination).await?;
        Ok(!source_digest.same_content(&dest_digest)?)
    }

    /// Like [`has_changed`](Self::has_changed) but always hashes the source and hands the digest back
    pub async fn check<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        source: P1,
        destination: P2,
    ) -> Result<FileComparison> {
        let destination = destination.as_ref();
        let source_digest = self.digest(source).await?;

        let result = if !destination_exists(destination).await? {
            ComparisonResult::DestinationMissing
        } else if source_digest.same_content(&self.digest(destination).await?)? {
            ComparisonResult::Identical
        } else {
            ComparisonResult::DifferentContent
        };

        Ok(FileComparison {
            result,
            source_digest,
        })
    }
}

/// Follows links, so a dangling link counts as missing
async fn destination_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::hash_error(
            path,
            format!("Failed to read metadata: {}", e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;
    use tokio::fs;

    #[test_case(DigestAlgorithm::Md5, "5d41402abc4b2a76b9719d911017c592" ; "md5")]
    #[test_case(DigestAlgorithm::Sha256, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824" ; "sha256")]
    #[tokio::test]
    async fn test_known_digests(algorithm: DigestAlgorithm, expected: &str) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        fs::write(&path, b"hello").await.unwrap();

        let digest = FileComparator::new(algorithm).digest(&path).await.unwrap();
        assert_eq!(digest.algorithm(), algorithm);
        assert_eq!(digest.hex(), expected);
    }

    #[tokio::test]
    async fn test_small_buffer_matches_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).await.unwrap();

        let chunked = FileComparator::with_buffer_size(DigestAlgorithm::Blake3, 7)
            .digest(&path)
            .await
            .unwrap();
        let whole = FileComparator::new(DigestAlgorithm::Blake3).digest(&path).await.unwrap();
        assert_eq!(chunked, whole);
    }

    #[tokio::test]
    async fn test_missing_destination_is_changed() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.txt");
        fs::write(&source, b"X").await.unwrap();

        let comparator = FileComparator::default();
        assert!(comparator
            .has_changed(&source, temp_dir.path().join("absent.txt"))
            .await
            .unwrap());

        let check = comparator
            .check(&source, temp_dir.path().join("absent.txt"))
            .await
            .unwrap();
        assert_eq!(check.result, ComparisonResult::DestinationMissing);
        assert!(check.needs_copy());
    }

    #[tokio::test]
    async fn test_identical_and_different_content() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.txt");
        let dest = temp_dir.path().join("dest.txt");
        fs::write(&source, b"same").await.unwrap();
        fs::write(&dest, b"same").await.unwrap();

        let comparator = FileComparator::default();
        assert!(!comparator.has_changed(&source, &dest).await.unwrap());
        assert_eq!(
            comparator.check(&source, &dest).await.unwrap().result,
            ComparisonResult::Identical
        );

        fs::write(&dest, b"different").await.unwrap();
        assert!(comparator.has_changed(&source, &dest).await.unwrap());
        assert_eq!(
            comparator.check(&source, &dest).await.unwrap().result,
            ComparisonResult::DifferentContent
        );
    }

    #[tokio::test]
    async fn test_unreadable_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest.txt");
        fs::write(&dest, b"content").await.unwrap();

        let err = FileComparator::default()
            .has_changed(temp_dir.path().join("vanished.txt"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Hash { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_destination_link_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.txt");
        let dest = temp_dir.path().join("dest.txt");
        fs::write(&source, b"content").await.unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("gone.txt"), &dest).unwrap();

        let comparator = FileComparator::default();
        assert_eq!(
            comparator.check(&source, &dest).await.unwrap().result,
            ComparisonResult::DestinationMissing
        );
        assert!(comparator.has_changed(&source, &dest).await.unwrap());
    }

    #[test]
    fn test_cross_algorithm_comparison_is_rejected() {
        let md5 = Digest::new(DigestAlgorithm::Md5, "abc");
        let blake3 = Digest::new(DigestAlgorithm::Blake3, "abc");
        assert!(matches!(
            md5.same_content(&blake3),
            Err(SyncError::DigestMismatch { .. })
        ));
        assert!(md5.same_content(&md5.clone()).unwrap());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("MD5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!("blake3".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Blake3);
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }
}
