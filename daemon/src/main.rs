use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod scheduler;
mod telemetry;

use config::{BackupConfig, DEFAULT_CONFIG_FILE};
use scheduler::BackupScheduler;

/// Used for the running log when the configuration cannot be read at start-up
const FALLBACK_LOG_FILE: &str = "backup.log";

#[derive(Parser)]
#[command(name = "backup-daemon")]
#[command(about = "Polling directory backup service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup loop until interrupted
    Run,
    /// Run a single iteration and exit
    Once,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Validate configuration file
    Validate,
    /// Show current configuration
    Show,
    /// Generate default configuration
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let _guard = telemetry::init(&startup_log_file(&cli.config).await, &cli.log_level)?;
            BackupScheduler::new(&cli.config).run().await
        }
        Commands::Once => {
            let _guard = telemetry::init(&startup_log_file(&cli.config).await, &cli.log_level)?;
            run_once(&cli.config).await
        }
        Commands::Config { action } => match action {
            ConfigActions::Validate => validate_config(&cli.config).await,
            ConfigActions::Show => show_config(&cli.config).await,
            ConfigActions::Generate { output } => generate_config(output.as_ref()).await,
        },
    }
}

/// The running log is opened once; later edits to `log_file` apply after a restart
async fn startup_log_file(config_path: &Path) -> PathBuf {
    match BackupConfig::load(config_path).await {
        Ok(config) => config.log_file,
        Err(e) => {
            eprintln!(
                "Could not read {} ({:#}); logging to {}",
                config_path.display(),
                e,
                FALLBACK_LOG_FILE
            );
            PathBuf::from(FALLBACK_LOG_FILE)
        }
    }
}

async fn run_once(config_path: &Path) -> Result<()> {
    let mut scheduler = BackupScheduler::new(config_path);
    let iteration = scheduler.run_iteration().await;

    if let Some(handle) = iteration.housekeeping {
        handle.await?;
    }
    match iteration.summary {
        Some(summary) => info!("Single iteration finished: {}", summary.summary()),
        None => info!("Single iteration finished without a backup cycle"),
    }
    Ok(())
}

async fn validate_config(config_path: &Path) -> Result<()> {
    match BackupConfig::load(config_path).await.and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("Backup enabled: {}", config.run_enabled());
            println!("Directory pairs configured: {}", config.pairs().len());
            println!("Sleep interval: {:?}", config.sleep_interval());
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

async fn show_config(config_path: &Path) -> Result<()> {
    match BackupConfig::load(config_path).await {
        Ok(config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => {
            println!("Failed to load configuration: {:#}", e);
            Err(e)
        }
    }
}

async fn generate_config(output_path: Option<&PathBuf>) -> Result<()> {
    let config = BackupConfig::default();

    if let Some(path) = output_path {
        config.save(path).await?;
        println!("Configuration generated at {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }

    Ok(())
}
