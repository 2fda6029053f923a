//! Error types for the ingestion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Failure of an external tool invocation (decrypter, repair utility)
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to feed stdin of {tool}: {source}")]
    Stdin {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{tool} exited successfully but did not write {}", path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("input path has no file name: {}", .0.display())]
    InvalidInput(PathBuf),
}

/// Archive extraction errors
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("failed to create destination {}: {source}", path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract entry '{name}': {source}")]
    Entry {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read entry #{index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("entry '{0}' escapes the destination folder")]
    UnsafePath(String),

    #[error("extraction task aborted: {0}")]
    Join(String),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Object store upload errors
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("object store client error: {0}")]
    Client(String),

    #[error("failed to open {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("upload of {bucket}/{key} failed: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("path has no file name: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("not a regular file, cannot upload: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("failed to list {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A pipeline stage failure, tagged with the stage that produced it
#[derive(Error, Debug)]
pub enum StageError {
    #[error("raw publish failed: {0}")]
    RawPublish(#[source] PublishError),

    #[error("decryption failed: {0}")]
    Decrypt(#[source] ToolError),

    #[error("archive repair failed: {0}")]
    Repair(#[source] ToolError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("publishing extracted files failed: {0}")]
    Publish(#[source] PublishError),
}

/// Terminal failure of an event source
#[derive(Error, Debug)]
pub enum EventSourceError {
    #[error("event channel closed")]
    Closed,

    #[error("watcher error: {0}")]
    Backend(String),
}
