//! Background directory poller that keeps the Loader's live filter set
//! consistent with what's on disk. Exactly one poller per process; it never
//! blocks request handling, communicating with request workers only
//! through the Loader's atomically-published sequences.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::loader::FilterLoader;

/// One watched directory, paired with the filter kind its files belong to.
#[derive(Debug, Clone)]
pub struct WatchedDirectory {
    pub kind: String,
    pub path: PathBuf,
}

pub struct FilterFileManager {
    loader: Arc<FilterLoader>,
    directories: Vec<WatchedDirectory>,
    poll_interval: Duration,
    extension: String,
}

/// A running poller. Dropping this without calling [`shutdown`] aborts the
/// background task.
pub struct FileManagerHandle {
    task: JoinHandle<()>,
}

impl FileManagerHandle {
    /// Cooperative cancellation: aborts the poller and waits for it to
    /// unwind.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

impl FilterFileManager {
    pub fn new(loader: Arc<FilterLoader>, directories: Vec<WatchedDirectory>, poll_interval: Duration, extension: impl Into<String>) -> Self {
        Self {
            loader,
            directories,
            poll_interval,
            extension: extension.into(),
        }
    }

    /// Spawns the poller on the current Tokio runtime and returns a handle
    /// for shutdown.
    pub fn start(self: Arc<Self>) -> FileManagerHandle {
        let manager = self.clone();
        let task = tokio::spawn(async move {
            let mut seen: HashSet<String> = HashSet::new();
            let mut interval = tokio::time::interval(manager.poll_interval);
            loop {
                interval.tick().await;
                manager.scan_once(&mut seen).await;
            }
        });
        FileManagerHandle { task }
    }

    /// One scan pass: load every eligible file, then drop any previously
    /// seen path that's gone missing. Exposed directly so tests can drive
    /// scans deterministically instead of racing a timer.
    pub async fn scan_once(&self, seen: &mut HashSet<String>) {
        let mut present: HashSet<String> = HashSet::new();

        for dir in &self.directories {
            let entries = match tokio::fs::read_dir(&dir.path).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(path = %dir.path.display(), error = %err, "could not scan filter directory");
                    continue;
                }
            };
            self.scan_directory(entries, &mut present).await;
        }

        let removed: Vec<String> = seen.difference(&present).cloned().collect();
        for path in removed {
            tracing::info!(path, "filter source removed, dropping from registry");
            self.loader.remove(&path);
        }

        *seen = present;
    }

    async fn scan_directory(&self, mut entries: tokio::fs::ReadDir, present: &mut HashSet<String>) {
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "error reading directory entry");
                    break;
                }
            };

            let path = entry.path();
            if !self.is_eligible(&path) {
                continue;
            }
            let path_str = path.to_string_lossy().into_owned();
            present.insert(path_str.clone());

            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    self.loader.get_or_create(&path_str, &bytes);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not read filter source, skipping");
                }
            }
        }
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .map(|ext| ext.to_string_lossy() == self.extension)
                .unwrap_or(false)
    }
}
