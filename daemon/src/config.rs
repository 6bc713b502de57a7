use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use backup_sync::{pair_directories, DigestAlgorithm, DirectoryPair};

/// Configuration file read from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "backup_config.json";

/// Shortest sleep between iterations
pub const MIN_SLEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Value of `run_enabled` that turns the backup pass on
const RUN_ENABLED_FLAG: &str = "Y";

/// Engine configuration, re-read from disk at the start of every iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// `"Y"` runs the backup pass; anything else skips it
    pub run_enabled: String,
    #[serde(deserialize_with = "dir_list")]
    pub source_dirs: Vec<PathBuf>,
    #[serde(deserialize_with = "dir_list")]
    pub dest_dirs: Vec<PathBuf>,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_error_log_file")]
    pub error_log_file: PathBuf,
    /// Archive destinations; only the first is used
    #[serde(default, deserialize_with = "dir_list")]
    pub log_dirs: Vec<PathBuf>,
    /// Seconds to sleep between iterations
    pub sleep_time: u64,
    /// Owned by the desktop front end; kept so `config show` round-trips it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at_startup: Option<serde_json::Value>,
    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,
    #[serde(default = "default_rotation_hours")]
    pub rotation_hours: u64,
    #[serde(default)]
    pub touch_config: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            run_enabled: RUN_ENABLED_FLAG.to_string(),
            source_dirs: vec![PathBuf::from("./source")],
            dest_dirs: vec![PathBuf::from("./backup")],
            log_file: default_log_file(),
            error_log_file: default_error_log_file(),
            log_dirs: vec![PathBuf::from("./log_archive")],
            sleep_time: default_sleep_time(),
            run_at_startup: None,
            digest_algorithm: DigestAlgorithm::default(),
            rotation_hours: default_rotation_hours(),
            touch_config: false,
        }
    }
}

impl BackupConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: BackupConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Checks that are worth reporting before the loop starts.
    ///
    /// The loop itself never refuses a loaded configuration: a missing source
    /// tree is a per-pair failure at backup time, not a configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.source_dirs.len() != self.dest_dirs.len() {
            anyhow::bail!(
                "source_dirs has {} entries but dest_dirs has {}",
                self.source_dirs.len(),
                self.dest_dirs.len()
            );
        }

        if self.log_file.as_os_str().is_empty() {
            anyhow::bail!("log_file cannot be empty");
        }
        if self.error_log_file.as_os_str().is_empty() {
            anyhow::bail!("error_log_file cannot be empty");
        }
        if self.rotation_hours == 0 {
            anyhow::bail!("rotation_hours must be at least 1");
        }

        for source in &self.source_dirs {
            if !source.is_dir() {
                anyhow::bail!("Source directory does not exist: {}", source.display());
            }
        }

        if let Some(archive_dir) = self.log_dirs.first() {
            if !archive_dir.is_dir() {
                anyhow::bail!("Log directory does not exist: {}", archive_dir.display());
            }
        }

        Ok(())
    }

    pub fn run_enabled(&self) -> bool {
        self.run_enabled == RUN_ENABLED_FLAG
    }

    pub fn pairs(&self) -> Vec<DirectoryPair> {
        pair_directories(&self.source_dirs, &self.dest_dirs)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_time).max(MIN_SLEEP_INTERVAL)
    }

    /// Rotation age, never shorter than one hour
    pub fn rotation_threshold(&self) -> Duration {
        Duration::from_secs(self.rotation_hours.max(1).saturating_mul(60 * 60))
    }

    /// Directories searched for rotated archives: the working directory and
    /// the directories holding both log files, without duplicates
    pub fn archive_search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from(".")];
        for log in [&self.log_file, &self.error_log_file] {
            let parent = match log.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        dirs
    }
}

/// Accepts either a JSON list of paths or a single `;`-separated string,
/// which is how the desktop editor stores `log_dirs`
fn dir_list<'de, D>(deserializer: D) -> Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DirList {
        Joined(String),
        Many(Vec<PathBuf>),
    }

    Ok(match DirList::deserialize(deserializer)? {
        DirList::Joined(joined) => joined
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(PathBuf::from)
            .collect(),
        DirList::Many(dirs) => dirs,
    })
}

// Default value functions
fn default_log_file() -> PathBuf { PathBuf::from("backup.log") }
fn default_error_log_file() -> PathBuf { PathBuf::from("error.log") }
fn default_sleep_time() -> u64 { 60 }
fn default_rotation_hours() -> u64 { 24 }
