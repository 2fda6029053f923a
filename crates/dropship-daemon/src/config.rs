//! Configuration loading for dropship-daemon.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use dropship_core::config::{DEFAULT_EXTRACTED_FOLDER, DEFAULT_RAW_FOLDER};
use dropship_core::{DecryptionKey, PipelineConfig, S3Config};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settle time before a new file is handed to the pipeline (500ms)
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// Default region for the S3 client
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default directory for decrypted archives
pub const DEFAULT_WORK_DIR: &str = "/tmp";

/// Contents of the optional TOML config file
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub watch_folder: Option<PathBuf>,
    pub decrypter_jar: Option<PathBuf>,
    pub bucket: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub decryption_key: Option<String>,
    pub java: Option<PathBuf>,
    pub repair_program: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub raw_folder: Option<String>,
    pub extracted_folder: Option<String>,
    pub settle_ms: Option<u64>,
    pub scan_on_start: Option<bool>,
    pub keep_failed_archives: Option<bool>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
}

/// Values taken from the command line or the environment. These win over
/// the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub decryption_key: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub watch_folder: Option<PathBuf>,
    pub decrypter_jar: Option<PathBuf>,
    pub bucket: Option<String>,
}

/// Fully resolved startup configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub watch_folder: PathBuf,
    pub settle: Duration,
    pub scan_on_start: bool,
    pub java: PathBuf,
    pub decrypter_jar: PathBuf,
    pub repair_program: PathBuf,
    pub work_dir: PathBuf,
    pub pipeline: PipelineConfig,
    pub storage: S3Config,
}

impl ServiceConfig {
    /// Merge `config` with `overrides` and validate the result.
    ///
    /// Every missing required value is reported in a single error.
    pub fn resolve(config: Config, overrides: Overrides) -> Result<Self> {
        let decryption_key = non_empty(overrides.decryption_key.or(config.decryption_key));
        let credentials_file = overrides.credentials_file.or(config.credentials_file);
        let watch_folder = overrides.watch_folder.or(config.watch_folder);
        let decrypter_jar = overrides.decrypter_jar.or(config.decrypter_jar);
        let bucket = non_empty(overrides.bucket.or(config.bucket));

        let mut missing = Vec::new();
        if decryption_key.is_none() {
            missing.push("DECRYPTION_KEY");
        }
        if credentials_file.is_none() {
            missing.push("STORAGE_CREDENTIALS_FILE");
        }
        if watch_folder.is_none() {
            missing.push("WATCH_FOLDER");
        }
        if decrypter_jar.is_none() {
            missing.push("DECRYPTER_JAR_PATH");
        }
        if bucket.is_none() {
            missing.push("OUTPUT_BUCKET");
        }

        let (
            Some(decryption_key),
            Some(credentials_file),
            Some(watch_folder),
            Some(decrypter_jar),
            Some(bucket),
        ) = (decryption_key, credentials_file, watch_folder, decrypter_jar, bucket)
        else {
            bail!("Missing required configuration: {}", missing.join(", "));
        };

        if !watch_folder.is_dir() {
            bail!(
                "Watch folder {} does not exist or is not a directory",
                watch_folder.display()
            );
        }

        let mut pipeline = PipelineConfig::new(bucket, DecryptionKey::new(decryption_key));
        pipeline.raw_folder = config
            .raw_folder
            .unwrap_or_else(|| DEFAULT_RAW_FOLDER.to_string());
        pipeline.extracted_folder = config
            .extracted_folder
            .unwrap_or_else(|| DEFAULT_EXTRACTED_FOLDER.to_string());
        pipeline.keep_failed_archives = config.keep_failed_archives.unwrap_or(false);

        let storage = config.storage.unwrap_or_default();
        let storage = S3Config {
            region: storage
                .region
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: storage.endpoint.filter(|e| !e.is_empty()),
            prefix: storage.prefix.unwrap_or_default(),
            credentials_file,
        };

        Ok(Self {
            watch_folder,
            settle: Duration::from_millis(config.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
            scan_on_start: config.scan_on_start.unwrap_or(false),
            java: config.java.unwrap_or_else(|| PathBuf::from("java")),
            decrypter_jar,
            repair_program: config
                .repair_program
                .unwrap_or_else(|| PathBuf::from("zip")),
            work_dir: config
                .work_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            pipeline,
            storage,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "dropship").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load the config file at `path`; a missing file yields the defaults
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}
