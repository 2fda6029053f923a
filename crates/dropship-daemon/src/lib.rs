//! dropship-daemon: Library for the drop-folder ingestion service
//!
//! This crate provides:
//! - Startup configuration (TOML file plus environment/CLI overrides)
//! - A settled, non-recursive directory watcher implementing [`EventSource`]
//! - Wiring of the production adapters into a [`Pipeline`]

pub mod config;
pub mod watcher;

pub use config::{default_config_path, load_config, Config, Overrides, ServiceConfig};
pub use watcher::DirectoryWatcher;

use anyhow::{Context, Result};
use dropship_core::{
    run, CancellationToken, EventSource, JarDecrypter, Pipeline, Publisher, S3ObjectStore,
    ZipExtractor, ZipFixRepairer,
};
use std::sync::Arc;
use tracing::info;

/// Build the production pipeline: Java decrypter, `zip -FF` repair, ZIP
/// extraction and the S3 publisher.
///
/// Creates the work directory if needed. Fails if the storage credentials
/// cannot be loaded.
pub fn build_pipeline(config: &ServiceConfig) -> Result<Pipeline> {
    std::fs::create_dir_all(&config.work_dir).with_context(|| {
        format!(
            "Failed to create work directory {}",
            config.work_dir.display()
        )
    })?;

    let store = S3ObjectStore::new(&config.storage).context("Failed to build storage client")?;
    let decrypter =
        JarDecrypter::new(&config.decrypter_jar, &config.work_dir).with_java(&config.java);
    let repairer = ZipFixRepairer::new(&config.repair_program);

    Ok(Pipeline::new(
        config.pipeline.clone(),
        Arc::new(decrypter),
        Arc::new(repairer),
        Arc::new(ZipExtractor),
        Publisher::new(Arc::new(store), config.pipeline.bucket.clone()),
    ))
}

/// Watch the configured folder and process arrivals until `cancel` fires.
///
/// Returns an error if startup fails or the watcher breaks.
pub async fn serve(config: &ServiceConfig, cancel: CancellationToken) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let mut watcher = DirectoryWatcher::new(&config.watch_folder, config.settle)?;
    if config.scan_on_start {
        watcher.queue_existing()?;
    }

    info!(
        "Watching {} (bucket {}, settle {:?})",
        watcher.root().display(),
        config.pipeline.bucket,
        config.settle
    );
    drain(&mut watcher, &pipeline, &cancel).await
}

/// Run the pipeline over any event source, mapping its failure to a
/// startup-style error.
pub async fn drain<S>(source: &mut S, pipeline: &Pipeline, cancel: &CancellationToken) -> Result<()>
where
    S: EventSource + ?Sized,
{
    run(source, pipeline, cancel)
        .await
        .context("Event source failed")
}
