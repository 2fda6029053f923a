//! Data model shared by the pipeline stages

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// Notification that a new file appeared in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArrivalEvent {
    pub path: PathBuf,
    pub arrived_at: DateTime<Utc>,
}

impl FileArrivalEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            arrived_at: Utc::now(),
        }
    }

    /// File name used to derive artifact names and object keys
    pub fn file_name(&self) -> Option<&str> {
        file_name(&self.path)
    }
}

/// Secret passed to the decryption engine. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey(String);

impl DecryptionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(<redacted>)")
    }
}

/// Destination of a single upload: `<bucket>/<folder>/<basename(file)>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub folder: String,
    pub file: PathBuf,
}

impl UploadTarget {
    pub fn new(bucket: impl Into<String>, folder: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            folder: folder.into(),
            file: file.into(),
        }
    }

    /// Object key inside the bucket, or `None` when the file has no name
    pub fn key(&self) -> Option<String> {
        let name = file_name(&self.file)?;
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{folder}/{name}"))
        }
    }
}

/// Per-file pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Arrived,
    RawPublishAttempted,
    Decrypting,
    Decrypted,
    Repairing,
    Repaired,
    Extracting,
    Extracted,
    Publishing,
    Done,
    Abandoned,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Arrived => "arrived",
            Stage::RawPublishAttempted => "raw-publish-attempted",
            Stage::Decrypting => "decrypting",
            Stage::Decrypted => "decrypted",
            Stage::Repairing => "repairing",
            Stage::Repaired => "repaired",
            Stage::Extracting => "extracting",
            Stage::Extracted => "extracted",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
            Stage::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_target_key() {
        let target = UploadTarget::new("bucket", "raw", "/drop/shipment-42.bin");
        assert_eq!(target.key().as_deref(), Some("raw/shipment-42.bin"));
    }

    #[test]
    fn test_upload_target_key_trims_slashes() {
        let target = UploadTarget::new("bucket", "/decrypted_xml/", "/tmp/x/readings.xml");
        assert_eq!(target.key().as_deref(), Some("decrypted_xml/readings.xml"));

        let target = UploadTarget::new("bucket", "", "/tmp/readings.xml");
        assert_eq!(target.key().as_deref(), Some("readings.xml"));
    }

    #[test]
    fn test_upload_target_key_without_file_name() {
        let target = UploadTarget::new("bucket", "raw", "/");
        assert!(target.key().is_none());
    }

    #[test]
    fn test_decryption_key_debug_is_redacted() {
        let key = DecryptionKey::new("s3cr3t");
        let debug = format!("{key:?}");
        assert!(!debug.contains("s3cr3t"));
        assert_eq!(key.expose(), "s3cr3t");
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Abandoned.is_terminal());
        assert!(!Stage::Publishing.is_terminal());
        assert_eq!(Stage::RawPublishAttempted.to_string(), "raw-publish-attempted");
    }

    #[test]
    fn test_event_file_name() {
        let event = FileArrivalEvent::new("/drop/garbage.bin");
        assert_eq!(event.file_name(), Some("garbage.bin"));
    }
}
