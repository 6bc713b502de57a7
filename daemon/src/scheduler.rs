use anyhow::Result;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use backup_sync::{
    run_cycle, ArchiveRelocator, CycleSummary, ErrorLog, FileComparator, LogRotator,
    RotationOutcome,
};

use crate::config::BackupConfig;

/// Sleep after a configuration failure when no configuration has loaded yet
pub const CONFIG_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// What one scheduler iteration did
#[derive(Debug)]
pub struct Iteration {
    /// Set when a backup cycle ran
    pub summary: Option<CycleSummary>,
    /// How long to sleep before the next iteration
    pub next_sleep: Duration,
    /// Rotation and relocation task launched alongside the backup pass
    pub housekeeping: Option<JoinHandle<()>>,
}

/// Polling loop: reload configuration, back up, archive logs, sleep
#[derive(Debug)]
pub struct BackupScheduler {
    config_path: PathBuf,
    last_interval: Option<Duration>,
}

impl BackupScheduler {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            last_interval: None,
        }
    }

    /// Run iterations until Ctrl+C.
    ///
    /// No error ends the loop; the interrupt is only acted on while sleeping,
    /// so a running cycle always finishes.
    pub async fn run(&mut self) -> Result<()> {
        info!("Backup scheduler started with {}", self.config_path.display());

        loop {
            let iteration = self.run_iteration().await;
            debug!("Sleeping for {:?}", iteration.next_sleep);

            tokio::select! {
                _ = tokio::time::sleep(iteration.next_sleep) => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested, stopping backup scheduler");
                    return Ok(());
                }
            }
        }
    }

    /// One pass of the loop body, without the sleep
    pub async fn run_iteration(&mut self) -> Iteration {
        let config = match BackupConfig::load(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!("Error loading configuration: {:#}", e);
                return Iteration {
                    summary: None,
                    next_sleep: self.last_interval.unwrap_or(CONFIG_RETRY_INTERVAL),
                    housekeeping: None,
                };
            }
        };

        let next_sleep = config.sleep_interval();
        self.last_interval = Some(next_sleep);

        let housekeeping = tokio::spawn(archive_logs(config.clone()));

        let summary = if config.run_enabled() {
            let summary = run_cycle(
                &config.pairs(),
                FileComparator::new(config.digest_algorithm),
                ErrorLog::new(config.error_log_file.clone()),
            )
            .await;
            info!("{}", summary.summary());

            if config.touch_config {
                touch(&self.config_path).await;
            }
            Some(summary)
        } else {
            info!("Run disabled, skipping backup cycle");
            None
        };

        Iteration {
            summary,
            next_sleep,
            housekeeping: Some(housekeeping),
        }
    }
}

/// Rotate both logs, then move any archives into the archive directory
async fn archive_logs(config: BackupConfig) {
    let rotator = LogRotator::new(config.rotation_threshold());
    for log in [&config.log_file, &config.error_log_file] {
        match rotator.rotate(log).await {
            Ok(RotationOutcome::Archived(archive)) => {
                info!("Archived {} to {}", log.display(), archive.display());
            }
            Ok(outcome) => debug!("Rotation of {}: {:?}", log.display(), outcome),
            Err(e) => error!("Log rotation failed: {}", e),
        }
    }

    let relocator = match ArchiveRelocator::new() {
        Ok(relocator) => relocator,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    for search_dir in config.archive_search_dirs() {
        if !search_dir.is_dir() {
            continue;
        }
        match relocator.relocate(&search_dir, &config.log_dirs).await {
            Ok(report) => {
                if !report.failed.is_empty() {
                    warn!(
                        "{} archives left in {} for a later attempt",
                        report.failed.len(),
                        search_dir.display()
                    );
                }
            }
            Err(e) => {
                // the archive directory is shared by every search dir
                error!("{}", e);
                break;
            }
        }
    }
}

/// Refresh the configuration file's mtime so the front end can see the engine is alive
async fn touch(config_path: &Path) {
    let path = config_path.to_path_buf();
    let result =
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path, FileTime::now())).await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to touch {}: {}", config_path.display(), e),
        Err(e) => warn!("Touch task failed for {}: {}", config_path.display(), e),
    }
}
