//! dropship-core: ingestion pipeline for encrypted archive drops
//!
//! This crate provides:
//! - Adapters around the external decryption engine and `zip -FF` repair
//! - ZIP extraction into a per-archive folder
//! - Publishing to an S3-compatible object store
//! - The per-file pipeline with its failure-isolation and cleanup rules
//! - A sequential drain loop over any [`EventSource`]

pub mod artifact;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod repair;
pub mod source;

mod tool;

pub use config::PipelineConfig;
pub use decrypt::{Decrypt, JarDecrypter};
pub use error::{EventSourceError, ExtractError, PublishError, StageError, ToolError};
pub use extract::{Extract, ZipExtractor};
pub use model::{DecryptionKey, FileArrivalEvent, Stage, UploadTarget};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use publish::{ObjectStore, Publisher, S3Config, S3ObjectStore};
pub use repair::{Repair, ZipFixRepairer};
pub use source::{run, ChannelSource, EventSource};
pub use tokio_util::sync::CancellationToken;
