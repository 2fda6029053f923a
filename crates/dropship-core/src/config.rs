//! Immutable pipeline configuration

use crate::model::DecryptionKey;

/// Default logical folder for untouched incoming files
pub const DEFAULT_RAW_FOLDER: &str = "raw";

/// Default logical folder for extracted files
pub const DEFAULT_EXTRACTED_FOLDER: &str = "decrypted_xml";

/// Process-wide settings handed to [`crate::Pipeline::new`]. Read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination bucket for every upload
    pub bucket: String,

    pub decryption_key: DecryptionKey,

    /// Logical folder for the best-effort upload of the incoming file
    pub raw_folder: String,

    /// Logical folder for extracted files
    pub extracted_folder: String,

    /// Keep the repaired archive when extraction fails instead of deleting it
    pub keep_failed_archives: bool,
}

impl PipelineConfig {
    pub fn new(bucket: impl Into<String>, decryption_key: DecryptionKey) -> Self {
        Self {
            bucket: bucket.into(),
            decryption_key,
            raw_folder: DEFAULT_RAW_FOLDER.to_string(),
            extracted_folder: DEFAULT_EXTRACTED_FOLDER.to_string(),
            keep_failed_archives: false,
        }
    }
}
