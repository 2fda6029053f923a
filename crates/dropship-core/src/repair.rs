//! Archive repair adapter
//!
//! The decrypter output carries an invalid end-of-central-directory record.
//! `zip -FF` rebuilds it, after asking whether the input is a single-disk
//! archive; the answer is supplied on stdin.

use crate::error::ToolError;
use crate::model::file_name;
use crate::tool;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Prefix given to repaired archives, next to their source
pub const REPAIRED_PREFIX: &str = "repaired_";

/// Answer to the single-disk archive prompt
const SINGLE_DISK_CONFIRMATION: &[u8] = b"y\n";

/// Repair capability: broken zip in, structurally valid zip out
#[async_trait]
pub trait Repair: Send + Sync {
    /// Path the repaired copy of `damaged` will be written to
    fn output_path(&self, damaged: &Path) -> Result<PathBuf, ToolError>;

    /// Repair `damaged`. On success the damaged file is removed and the
    /// repaired path is returned; on failure the damaged file is left alone.
    async fn repair(&self, damaged: &Path) -> Result<PathBuf, ToolError>;
}

/// Repairs archives with `zip -FF <damaged> --out <repaired>`
#[derive(Debug, Clone)]
pub struct ZipFixRepairer {
    program: PathBuf,
}

impl Default for ZipFixRepairer {
    fn default() -> Self {
        Self::new("zip")
    }
}

impl ZipFixRepairer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Repair for ZipFixRepairer {
    fn output_path(&self, damaged: &Path) -> Result<PathBuf, ToolError> {
        let name =
            file_name(damaged).ok_or_else(|| ToolError::InvalidInput(damaged.to_path_buf()))?;
        let dir = damaged.parent().unwrap_or_else(|| Path::new("."));
        Ok(dir.join(format!("{REPAIRED_PREFIX}{name}")))
    }

    async fn repair(&self, damaged: &Path) -> Result<PathBuf, ToolError> {
        let repaired = self.output_path(damaged)?;

        tracing::debug!(
            "Running {} -FF {} --out {}",
            self.program.display(),
            damaged.display(),
            repaired.display()
        );

        let mut cmd = Command::new(&self.program);
        cmd.arg("-FF").arg(damaged).arg("--out").arg(&repaired);

        tool::run(cmd, "zip -FF", Some(SINGLE_DISK_CONFIRMATION), &repaired).await?;

        if let Err(e) = tokio::fs::remove_file(damaged).await {
            tracing::warn!("Failed to remove repaired source {}: {}", damaged.display(), e);
        }

        Ok(repaired)
    }
}
