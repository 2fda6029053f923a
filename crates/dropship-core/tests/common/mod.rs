//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use dropship_core::{
    Decrypt, DecryptionKey, Pipeline, PipelineConfig, PublishError, Publisher, Repair, ToolError,
    UploadTarget, ZipExtractor,
};
use dropship_core::{ObjectStore, ZipFixRepairer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zip::write::{SimpleFileOptions, ZipWriter};

pub const BUCKET: &str = "bucket";

/// Build zip bytes from `(name, contents)` pairs
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buf);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

pub fn write_file(path: &Path, data: &[u8]) {
    let mut file = File::create(path).unwrap();
    file.write_all(data).unwrap();
}

/// In-memory object store keyed by `<bucket>/<key>`
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Logical folders whose uploads fail
    pub failing_folders: Vec<String>,
}

impl MemoryStore {
    pub fn failing(folders: &[&str]) -> Self {
        Self {
            failing_folders: folders.iter().map(|f| (*f).to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_file(&self, target: &UploadTarget) -> Result<String, PublishError> {
        let key = target
            .key()
            .ok_or_else(|| PublishError::InvalidPath(target.file.clone()))?;
        if self.failing_folders.contains(&target.folder) {
            return Err(PublishError::Upload {
                bucket: target.bucket.clone(),
                key,
                message: "injected failure".to_string(),
            });
        }
        let data = std::fs::read(&target.file).map_err(|e| PublishError::Open {
            path: target.file.clone(),
            message: e.to_string(),
        })?;
        let full = format!("{}/{}", target.bucket, key);
        self.objects.lock().unwrap().insert(full.clone(), data);
        Ok(full)
    }
}

/// What the fake decrypter does with an input
#[derive(Clone)]
pub enum DecryptBehavior {
    /// Write the input bytes unchanged (tests feed plain zip files)
    Passthrough,
    /// Write these bytes
    Emit(Vec<u8>),
    /// Fail without writing anything
    Fail,
    /// Write a partial output, then fail
    FailAfterPartialWrite,
    /// Pass through, except for inputs with this file name, which fail
    FailNamed(&'static str),
    /// Write a partial output, then never finish
    Hang,
}

pub struct FakeDecrypter {
    pub out_dir: PathBuf,
    pub behavior: DecryptBehavior,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl FakeDecrypter {
    pub fn new(out_dir: &Path, behavior: DecryptBehavior) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }
}

fn failed(tool: &str) -> ToolError {
    ToolError::Launch {
        tool: tool.to_string(),
        source: std::io::Error::other("exit status: 1"),
    }
}

#[async_trait]
impl Decrypt for FakeDecrypter {
    fn output_path(&self, input: &Path) -> Result<PathBuf, ToolError> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ToolError::InvalidInput(input.to_path_buf()))?;
        Ok(self.out_dir.join(format!("{name}_DECRYPTED.zip")))
    }

    async fn decrypt(&self, _key: &DecryptionKey, input: &Path) -> Result<PathBuf, ToolError> {
        self.calls.lock().unwrap().push(input.to_path_buf());
        let output = self.output_path(input)?;
        match &self.behavior {
            DecryptBehavior::Passthrough => {
                std::fs::copy(input, &output).map_err(|_| failed("decrypter"))?;
            }
            DecryptBehavior::Emit(bytes) => write_file(&output, bytes),
            DecryptBehavior::Fail => return Err(failed("decrypter")),
            DecryptBehavior::FailAfterPartialWrite => {
                write_file(&output, b"PK\x03\x04 trunc");
                return Err(failed("decrypter"));
            }
            DecryptBehavior::FailNamed(name) => {
                if input.file_name().and_then(|n| n.to_str()) == Some(*name) {
                    return Err(failed("decrypter"));
                }
                std::fs::copy(input, &output).map_err(|_| failed("decrypter"))?;
            }
            DecryptBehavior::Hang => {
                write_file(&output, b"PK\x03\x04 trunc");
                std::future::pending::<()>().await;
            }
        }
        Ok(output)
    }
}

/// Repairer that copies the input to `repaired_<name>` or fails
pub struct FakeRepairer {
    pub fail: bool,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl FakeRepairer {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Repair for FakeRepairer {
    fn output_path(&self, damaged: &Path) -> Result<PathBuf, ToolError> {
        ZipFixRepairer::default().output_path(damaged)
    }

    async fn repair(&self, damaged: &Path) -> Result<PathBuf, ToolError> {
        self.calls.lock().unwrap().push(damaged.to_path_buf());
        if self.fail {
            return Err(failed("zip -FF"));
        }
        let repaired = self.output_path(damaged)?;
        std::fs::copy(damaged, &repaired).map_err(|_| failed("zip -FF"))?;
        std::fs::remove_file(damaged).map_err(|_| failed("zip -FF"))?;
        Ok(repaired)
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub decrypter: Arc<FakeDecrypter>,
    pub repairer: Arc<FakeRepairer>,
}

pub fn harness(
    work_dir: &Path,
    decrypt: DecryptBehavior,
    repair_fails: bool,
    store: MemoryStore,
    keep_failed_archives: bool,
) -> Harness {
    let store = Arc::new(store);
    let decrypter = Arc::new(FakeDecrypter::new(work_dir, decrypt));
    let repairer = Arc::new(FakeRepairer::new(repair_fails));

    let mut config = PipelineConfig::new(BUCKET, DecryptionKey::new("test-key"));
    config.keep_failed_archives = keep_failed_archives;

    let pipeline = Pipeline::new(
        config,
        decrypter.clone(),
        repairer.clone(),
        Arc::new(ZipExtractor),
        Publisher::new(store.clone(), BUCKET),
    );

    Harness {
        pipeline,
        store,
        decrypter,
        repairer,
    }
}
