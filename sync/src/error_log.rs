//! Append-only error log written alongside the running log

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

/// Timestamp layout used for every error log line
pub const ERROR_LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes one `YYYY-MM-DD HH:MM:SS <message>` line per failure
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a failure in both the running log and the error log file.
    ///
    /// Failing to write the error log is reported on the running log only.
    pub async fn record(&self, message: &str) {
        error!("{}", message);

        let line = format!("{} {}\n", Local::now().format(ERROR_LOG_TIME_FORMAT), message);
        if let Err(e) = self.append(&line).await {
            warn!(
                "Failed to write error log '{}': {}",
                self.path.display(),
                e
            );
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
