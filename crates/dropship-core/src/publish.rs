//! Object store publishing
//!
//! Uploads local files to a bucket under a logical folder. The object key is
//! always `<folder>/<basename>`; an existing object with the same key is
//! overwritten without any check.

use crate::error::PublishError;
use crate::model::UploadTarget;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write-only blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `target.file` to `target.bucket` under `target.key()`.
    /// Returns the full key written.
    async fn put_file(&self, target: &UploadTarget) -> Result<String, PublishError>;
}

/// Static credentials read from a TOML file
#[derive(Deserialize, Clone)]
pub struct StoreCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl StoreCredentials {
    /// Load credentials from the file the credentials locator points at
    pub fn from_file(path: &Path) -> Result<Self, PublishError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PublishError::Client(format!(
                "failed to read credentials file {}: {e}",
                path.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|e| {
            PublishError::Client(format!(
                "failed to parse credentials file {}: {e}",
                path.display()
            ))
        })
    }
}

/// S3-compatible endpoint configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Region name; S3-compatible services usually accept any value
    pub region: String,

    /// Custom endpoint (MinIO, GCS interoperability, ...), empty for AWS S3
    pub endpoint: Option<String>,

    /// Prefix prepended to every key
    pub prefix: String,

    pub credentials_file: PathBuf,
}

/// Object store over the S3 API
pub struct S3ObjectStore {
    client: Client,
    prefix: String,
}

impl S3ObjectStore {
    /// Build a client from `config`. Fails if the credentials cannot be loaded.
    pub fn new(config: &S3Config) -> Result<Self, PublishError> {
        let creds = StoreCredentials::from_file(&config.credentials_file)?;
        let credentials = Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            creds.session_token,
            None,
            "dropship-credentials-file",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .behavior_version_latest();

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            prefix: config.prefix.clone(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, target: &UploadTarget) -> Result<String, PublishError> {
        let key = target
            .key()
            .ok_or_else(|| PublishError::InvalidPath(target.file.clone()))?;
        let full_key = self.full_key(&key);

        let body = ByteStream::from_path(&target.file)
            .await
            .map_err(|e| PublishError::Open {
                path: target.file.clone(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&full_key)
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Upload {
                bucket: target.bucket.clone(),
                key: full_key.clone(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(full_key)
    }
}

/// Uploads single files or folder contents to one bucket
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload `path` as `<folder>/<basename(path)>`
    pub async fn publish_file(&self, folder: &str, path: &Path) -> Result<String, PublishError> {
        let target = UploadTarget::new(self.bucket.clone(), folder, path);
        let key = self.store.put_file(&target).await?;
        tracing::info!(
            "File {} uploaded to bucket {} as {}",
            path.display(),
            self.bucket,
            key
        );
        Ok(key)
    }

    /// Upload every entry directly under `dir`, in name order.
    ///
    /// Every entry must be a regular file: a subfolder fails the whole step
    /// before anything is uploaded. Otherwise stops at the first failed
    /// upload; keys uploaded before it are not reported.
    pub async fn publish_folder(&self, folder: &str, dir: &Path) -> Result<Vec<String>, PublishError> {
        let files = top_level_files(dir)?;

        let mut keys = Vec::with_capacity(files.len());
        for file in files {
            keys.push(self.publish_file(folder, &file).await?);
        }
        Ok(keys)
    }
}

/// Entries directly under `dir`, sorted by name. Fails on anything that is
/// not a regular file.
fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let list_err = |source| PublishError::List {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        let path = std::path::absolute(entry.path()).map_err(list_err)?;
        if !entry.file_type().map_err(list_err)?.is_file() {
            return Err(PublishError::NotAFile(path));
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
