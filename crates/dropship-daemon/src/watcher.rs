//! Drop-folder watcher
//!
//! Turns `notify` create events, and files moved in, for one directory into
//! settled [`FileArrivalEvent`]s. A new file is only released once no create or
//! modify event has been seen for it during the settle window, so files that
//! are still being written are not picked up early.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dropship_core::{EventSource, EventSourceError, FileArrivalEvent};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Watches a single directory, non-recursively
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    root: PathBuf,
    settler: Settler,
    ready: VecDeque<FileArrivalEvent>,
}

impl DirectoryWatcher {
    /// Start watching `dir`. Must be called inside a tokio runtime.
    pub fn new(dir: &Path, settle: Duration) -> Result<Self> {
        let root = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the watcher is being torn down
            let _ = tx.send(res);
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        Ok(Self {
            _watcher: watcher,
            rx,
            root,
            settler: Settler::new(settle),
            ready: VecDeque::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Queue the regular files already in the directory, in name order.
    ///
    /// Returns how many were queued.
    pub fn queue_existing(&mut self) -> Result<usize> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let count = files.len();
        for path in files {
            self.settler.forget(&path);
            self.ready.push_back(FileArrivalEvent::new(path));
        }
        if count > 0 {
            info!("Queued {} file(s) already in {}", count, self.root.display());
        }
        Ok(count)
    }
}

#[async_trait]
impl EventSource for DirectoryWatcher {
    async fn next(&mut self) -> Result<Option<FileArrivalEvent>, EventSourceError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }

            let deadline = self.settler.next_deadline();
            tokio::select! {
                raw = self.rx.recv() => match raw {
                    Some(Ok(event)) => self.settler.record(&event, Instant::now()),
                    Some(Err(err)) => return Err(EventSourceError::Backend(err.to_string())),
                    None => return Err(EventSourceError::Closed),
                },
                () = sleep_until(deadline) => {
                    for path in self.settler.release(Instant::now()) {
                        debug!("Settled {}", path.display());
                        self.ready.push_back(FileArrivalEvent::new(path));
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A created file waiting for its writes to settle
#[derive(Debug, Clone, Copy)]
struct Pending {
    first_seen: Instant,
    last_seen: Instant,
}

/// Debounce state for newly created files
#[derive(Debug)]
struct Settler {
    pending: HashMap<PathBuf, Pending>,
    settle: Duration,
}

impl Settler {
    fn new(settle: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            settle,
        }
    }

    /// Fold a raw notify event into the pending map
    fn record(&mut self, event: &Event, now: Instant) {
        match event.kind {
            EventKind::Create(CreateKind::Folder) => {}
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.track(path, now);
                }
            }
            // A file moved in is an arrival like a created one
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.track(path, now);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.pending.remove(from);
                    self.track(to, now);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.pending.remove(path);
                }
            }
            // Backends that cannot tell the two sides of a rename apart
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.track(path, now);
                    } else {
                        self.pending.remove(path);
                    }
                }
            }
            // Only files we saw arrive are tracked; writes just push back
            // their release.
            EventKind::Modify(_) => {
                for path in &event.paths {
                    if let Some(pending) = self.pending.get_mut(path) {
                        pending.last_seen = now;
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.pending.remove(path);
                }
            }
            _ => {}
        }
    }

    fn track(&mut self, path: &Path, now: Instant) {
        if path.is_dir() {
            return;
        }
        self.pending
            .entry(path.to_path_buf())
            .and_modify(|p| p.last_seen = now)
            .or_insert(Pending {
                first_seen: now,
                last_seen: now,
            });
    }

    fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Earliest instant at which a pending file may settle
    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_seen + self.settle)
            .min()
    }

    /// Remove and return settled paths, oldest creation first
    fn release(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<(PathBuf, Instant)> = Vec::new();
        let settle = self.settle;
        self.pending.retain(|path, p| {
            if now.duration_since(p.last_seen) >= settle {
                settled.push((path.clone(), p.first_seen));
                false
            } else {
                true
            }
        });
        settled.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        settled.into_iter().map(|(path, _)| path).collect()
    }
}
