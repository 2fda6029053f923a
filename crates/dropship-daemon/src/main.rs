//! dropship-daemon: watches a drop folder and ingests encrypted archives
//!
//! Each new file is uploaded raw, decrypted, repaired, extracted and the
//! extracted files are published to the output bucket.

use anyhow::{Context, Result};
use clap::Parser;
use dropship_core::CancellationToken;
use dropship_daemon::{default_config_path, load_config, Overrides, ServiceConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dropship-daemon")]
#[command(about = "Drop-folder ingestion service - decrypt, repair, extract and publish archives")]
#[command(version)]
struct Args {
    /// Config file path (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Key handed to the decryption engine
    #[arg(long, env = "DECRYPTION_KEY", hide_env_values = true)]
    decryption_key: Option<String>,

    /// TOML file with the object store credentials
    #[arg(long, env = "STORAGE_CREDENTIALS_FILE")]
    credentials_file: Option<PathBuf>,

    /// Directory to watch for incoming files
    #[arg(long, env = "WATCH_FOLDER")]
    watch_folder: Option<PathBuf>,

    /// Path to the decryption engine jar
    #[arg(long, env = "DECRYPTER_JAR_PATH")]
    decrypter_jar: Option<PathBuf>,

    /// Destination bucket
    #[arg(long, env = "OUTPUT_BUCKET")]
    bucket: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            decryption_key: self.decryption_key.clone(),
            credentials_file: self.credentials_file.clone(),
            watch_folder: self.watch_folder.clone(),
            decrypter_jar: self.decrypter_jar.clone(),
            bucket: self.bucket.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.log_file.as_deref())?;

    let config_path = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            path.clone()
        }
        None => default_config_path()?,
    };
    let file_config = load_config(&config_path)?;
    let config = ServiceConfig::resolve(file_config, args.overrides())?;

    tracing::info!("dropship-daemon starting (pid: {})", std::process::id());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = rt.block_on(async_main(&config));
    if let Err(err) = &result {
        tracing::error!("dropship-daemon failed: {:#}", err);
    }
    result
}

/// Install the tracing subscriber: `RUST_LOG` filter, default `info`
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn async_main(config: &ServiceConfig) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let cancel = CancellationToken::new();
    let service = dropship_daemon::serve(config, cancel.clone());
    tokio::pin!(service);

    tokio::select! {
        result = &mut service => {
            // The watcher only stops on its own when it fails
            result?;
            return Ok(());
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    cancel.cancel();
    service.await?;

    tracing::info!("dropship-daemon stopped");
    Ok(())
}
