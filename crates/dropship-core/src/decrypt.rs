//! Decryption adapter
//!
//! Runs the vendor decryption engine (a Java archive) against one incoming
//! file. The engine writes a zip-shaped file whose end-of-central-directory
//! record is known to be broken; nothing here validates it.

use crate::error::ToolError;
use crate::model::{file_name, DecryptionKey};
use crate::tool;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Suffix appended to the incoming file name for the decrypter output
pub const DECRYPTED_SUFFIX: &str = "_DECRYPTED.zip";

/// Decryption capability: ciphertext file in, zip-shaped file out
#[async_trait]
pub trait Decrypt: Send + Sync {
    /// Path the output for `input` will be written to
    fn output_path(&self, input: &Path) -> Result<PathBuf, ToolError>;

    /// Decrypt `input` with `key`, returning the path of the output archive
    async fn decrypt(&self, key: &DecryptionKey, input: &Path) -> Result<PathBuf, ToolError>;
}

/// Invokes `<java> -jar <jar> <key> <input> <output>`
#[derive(Debug, Clone)]
pub struct JarDecrypter {
    java: PathBuf,
    jar: PathBuf,
    output_dir: PathBuf,
}

impl JarDecrypter {
    pub fn new(jar: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            java: PathBuf::from("java"),
            jar: jar.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Use a specific Java launcher instead of `java` from `PATH`
    #[must_use]
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }
}

#[async_trait]
impl Decrypt for JarDecrypter {
    fn output_path(&self, input: &Path) -> Result<PathBuf, ToolError> {
        let name = file_name(input).ok_or_else(|| ToolError::InvalidInput(input.to_path_buf()))?;
        Ok(self.output_dir.join(format!("{name}{DECRYPTED_SUFFIX}")))
    }

    async fn decrypt(&self, key: &DecryptionKey, input: &Path) -> Result<PathBuf, ToolError> {
        let output = self.output_path(input)?;

        // The key is positional; keep it out of the logged command line
        tracing::debug!(
            "Running {} -jar {} <key> {} {}",
            self.java.display(),
            self.jar.display(),
            input.display(),
            output.display()
        );

        let mut cmd = Command::new(&self.java);
        cmd.arg("-jar")
            .arg(&self.jar)
            .arg(key.expose())
            .arg(input)
            .arg(&output);

        tool::run(cmd, "decrypter", None, &output).await?;
        Ok(output)
    }
}
