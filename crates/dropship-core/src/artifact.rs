//! Scoped ownership of intermediate files and folders
//!
//! An [`Artifact`] deletes its path when dropped unless it was explicitly
//! retained. Deletion is best-effort: failures are logged and never
//! propagated, and a path that is already gone counts as released.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
}

/// Guard over one intermediate artifact of a pipeline run
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    kind: Kind,
    armed: bool,
}

impl Artifact {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: Kind::File,
            armed: true,
        }
    }

    /// Guard the path a stage is about to write. Whatever already sits there
    /// belongs to an earlier run and is not removed if the stage fails;
    /// call [`Artifact::adopt`] once the stage has produced its output.
    pub fn planned(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let armed = !path.exists();
        if !armed {
            tracing::warn!("{} already exists and will not be cleaned up", path.display());
        }
        Self {
            path,
            kind: Kind::File,
            armed,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: Kind::Dir,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take ownership of the path a stage actually produced
    pub fn adopt(&mut self, path: PathBuf) {
        self.path = path;
        self.armed = true;
    }

    /// Leave the artifact on disk and give up ownership
    pub fn retain(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Delete now if owned. Returns whether the path is gone afterwards.
    pub fn release(mut self) -> bool {
        if !std::mem::replace(&mut self.armed, false) {
            return !self.path.exists();
        }
        remove(&self.path, self.kind)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if self.armed {
            remove(&self.path, self.kind);
        }
    }
}

/// Best-effort removal of `path`
pub fn remove_file(path: &Path) -> bool {
    remove(path, Kind::File)
}

fn remove(path: &Path, kind: Kind) -> bool {
    let result = match kind {
        Kind::File => std::fs::remove_file(path),
        Kind::Dir => std::fs::remove_dir_all(path),
    };
    match result {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
