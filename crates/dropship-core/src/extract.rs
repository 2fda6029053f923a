//! ZIP archive extraction
//!
//! Materializes every entry of a repaired archive under a fresh folder next
//! to it. Extraction is all-or-nothing from the caller's point of view: the
//! first failing entry aborts the run. Entries already written stay on disk.

use crate::error::ExtractError;
use crate::model::file_name;
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zip::ZipArchive;

/// Suffix of the destination folder, appended to the archive file name
pub const EXTRACTED_SUFFIX: &str = "_extracted";

/// Extraction capability: valid zip in, populated folder out
#[async_trait]
pub trait Extract: Send + Sync {
    /// Extract `archive` into a new folder and remove the archive.
    /// Fails if the destination folder already exists.
    async fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractError>;
}

/// Extractor backed by the `zip` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

#[async_trait]
impl Extract for ZipExtractor {
    async fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractError> {
        let archive = archive.to_path_buf();
        let destination = destination_for(&archive);

        // Dropping this future stops the blocking task at the next entry
        let stop = StopOnDrop(Arc::new(AtomicBool::new(false)));
        let flag = Arc::clone(&stop.0);

        tokio::task::spawn_blocking(move || {
            let written = extract_zip_until(&archive, &destination, &flag)?;
            tracing::info!(
                "Extracted {} file(s) from {} to {}",
                written.len(),
                archive.display(),
                destination.display()
            );
            if let Err(e) = std::fs::remove_file(&archive) {
                tracing::warn!("Failed to remove extracted archive {}: {}", archive.display(), e);
            }
            Ok::<_, ExtractError>(destination)
        })
        .await
        .map_err(|e| ExtractError::Join(e.to_string()))?
    }
}

/// Raises its flag when dropped
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// `<dir>/<archive name>_extracted`
pub fn destination_for(archive: &Path) -> PathBuf {
    let dir = archive.parent().unwrap_or_else(|| Path::new("."));
    let name = file_name(archive).unwrap_or("archive");
    dir.join(format!("{name}{EXTRACTED_SUFFIX}"))
}

/// Extract every entry of `archive` under `destination`, preserving relative
/// paths. Returns the written files in archive order.
///
/// # Errors
///
/// Returns `ExtractError` if:
/// - the archive cannot be opened or its directory cannot be read
/// - `destination` already exists or cannot be created
/// - an entry name would escape `destination`
/// - any entry cannot be read or written
pub fn extract_zip(archive: &Path, destination: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    extract_zip_until(archive, destination, &AtomicBool::new(false))
}

/// [`extract_zip`] that checks `stop` before each entry. When it is raised,
/// the destination folder created here is removed and
/// [`ExtractError::Cancelled`] is returned.
fn extract_zip_until(
    archive: &Path,
    destination: &Path,
    stop: &AtomicBool,
) -> Result<Vec<PathBuf>, ExtractError> {
    if stop.load(Ordering::Relaxed) {
        return Err(ExtractError::Cancelled);
    }

    let file = File::open(archive).map_err(|e| ExtractError::Open {
        path: archive.to_path_buf(),
        source: zip::result::ZipError::Io(e),
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|source| ExtractError::Open {
        path: archive.to_path_buf(),
        source,
    })?;

    match std::fs::create_dir(destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ExtractError::DestinationExists(destination.to_path_buf()));
        }
        Err(source) => {
            return Err(ExtractError::CreateDestination {
                path: destination.to_path_buf(),
                source,
            });
        }
    }

    let mut written = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        if stop.load(Ordering::Relaxed) {
            if let Err(e) = std::fs::remove_dir_all(destination) {
                tracing::warn!("Failed to remove {}: {}", destination.display(), e);
            }
            return Err(ExtractError::Cancelled);
        }

        let mut entry = zip
            .by_index(index)
            .map_err(|source| ExtractError::Read { index, source })?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::UnsafePath(name));
        };
        let target = destination.join(relative);

        let entry_err = |source: io::Error| ExtractError::Entry {
            name: name.clone(),
            source,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(entry_err)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(entry_err)?;
        }
        let mut out = File::create(&target).map_err(entry_err)?;
        io::copy(&mut entry, &mut out).map_err(entry_err)?;

        tracing::debug!("Extracted {} -> {}", name, target.display());
        written.push(target);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap();
                    let key = rel.to_string_lossy().replace('\\', "/");
                    files.insert(key, std::fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    #[test]
    fn test_destination_naming() {
        assert_eq!(
            destination_for(Path::new("/tmp/repaired_a.zip")),
            PathBuf::from("/tmp/repaired_a.zip_extracted")
        );
    }

    #[test]
    fn test_extracted_tree_matches_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("repaired.zip");
        write_zip(
            &archive,
            &[
                ("readings.xml", b"<readings/>"),
                ("meta/", b""),
                ("meta/index.txt", b"1"),
                ("deep/er/blob.bin", &[0, 159, 146, 150]),
            ],
        );

        let dest = destination_for(&archive);
        let written = extract_zip(&archive, &dest).unwrap();
        assert_eq!(written.len(), 3);

        let tree = read_tree(&dest);
        let expected: BTreeMap<String, Vec<u8>> = [
            ("readings.xml", b"<readings/>".to_vec()),
            ("meta/index.txt", b"1".to_vec()),
            ("deep/er/blob.bin", vec![0, 159, 146, 150]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(tree, expected);
    }

    #[test]
    fn test_existing_destination_is_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("x.txt", b"x")]);

        let dest = destination_for(&archive);
        extract_zip(&archive, &dest).unwrap();

        let err = extract_zip(&archive, &dest).unwrap_err();
        assert!(matches!(err, ExtractError::DestinationExists(_)));
        // The first extraction is untouched
        assert_eq!(std::fs::read(dest.join("x.txt")).unwrap(), b"x");
    }

    #[test]
    fn test_invalid_archive_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip at all").unwrap();

        let err = extract_zip(&archive, &destination_for(&archive)).unwrap_err();
        assert!(matches!(err, ExtractError::Open { .. }));
        assert!(!destination_for(&archive).exists());
    }

    #[test]
    fn test_entry_write_failure_names_entry() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("clash.zip");
        // A file and a directory with the same path cannot both exist
        write_zip(&archive, &[("a", b"file"), ("a/b.txt", b"nested")]);

        let dest = destination_for(&archive);
        let err = extract_zip(&archive, &dest).unwrap_err();
        match err {
            ExtractError::Entry { name, .. } => assert_eq!(name, "a/b.txt"),
            other => panic!("unexpected error: {other:?}"),
        }
        // No rollback of what was already written
        assert!(dest.join("a").is_file());
    }

    #[test]
    fn test_raised_stop_flag_leaves_no_folder() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("late.zip");
        write_zip(&archive, &[("a.xml", b"a"), ("b.xml", b"b")]);
        let dest = destination_for(&archive);

        let err = extract_zip_until(&archive, &dest, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert!(!dest.exists());
        assert!(archive.exists());
    }

    #[test]
    fn test_stop_on_drop_raises_flag() {
        let stop = StopOnDrop(Arc::new(AtomicBool::new(false)));
        let flag = Arc::clone(&stop.0);
        drop(stop);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_zip_extractor_removes_archive_on_success() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("repaired_s.zip");
        write_zip(&archive, &[("readings.xml", b"<r/>")]);

        let folder = ZipExtractor.extract(&archive).await.unwrap();
        assert_eq!(folder, dir.path().join("repaired_s.zip_extracted"));
        assert!(folder.join("readings.xml").is_file());
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_zip_extractor_keeps_archive_on_failure() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("repaired_t.zip");
        write_zip(&archive, &[("readings.xml", b"<r/>")]);
        std::fs::create_dir(destination_for(&archive)).unwrap();

        let err = ZipExtractor.extract(&archive).await.unwrap_err();
        assert!(matches!(err, ExtractError::DestinationExists(_)));
        assert!(archive.exists());
    }
}
