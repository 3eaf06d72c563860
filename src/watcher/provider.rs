//! File system watch provider using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::FileEvent;
use crate::error::WatcherError;
use crate::Result;

/// Capacity of the event channel between notify and the engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Recursive watches over workspace roots, delivering [`FileEvent`]s on a
/// channel in the order notify reports them. Dropping it releases every
/// watch.
pub struct WatchProvider {
    watcher: RecommendedWatcher,
    watched_dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl WatchProvider {
    /// Create a provider that sends events to `event_tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new(event_tx: mpsc::Sender<FileEvent>) -> Result<Self> {
        let watched_dirs = Arc::new(Mutex::new(Vec::new()));
        let watched_dirs_clone = Arc::clone(&watched_dirs);

        let watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(event) {
                        if !is_under_watched(&watched_dirs_clone.lock(), file_event.path()) {
                            continue;
                        }
                        if event_tx.blocking_send(file_event).is_err() {
                            tracing::debug!("Event channel closed, dropping notification");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: "init".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            watcher,
            watched_dirs,
        })
    }

    /// Add a directory to watch recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        self.watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched_dirs.lock().push(path.clone());
        tracing::info!(path = %path.display(), "Watching directory");

        Ok(())
    }

    /// Stop watching a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        self.watched_dirs.lock().retain(|p| p != path);

        self.watcher
            .unwatch(path)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "Stopped watching directory");
        Ok(())
    }

    /// Get list of watched directories.
    #[must_use]
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched_dirs.lock().clone()
    }
}

/// Check if a path is under any watched directory.
fn is_under_watched(watched: &[PathBuf], path: &Path) -> bool {
    watched.iter().any(|dir| path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_under_watched() {
        let watched = vec![
            PathBuf::from("/home/user/project"),
            PathBuf::from("/var/data"),
        ];

        assert!(is_under_watched(
            &watched,
            Path::new("/home/user/project/src/main.rs")
        ));
        assert!(is_under_watched(&watched, Path::new("/var/data/file.txt")));
        assert!(!is_under_watched(&watched, Path::new("/tmp/other.txt")));
    }

    #[test]
    fn test_provider_nonexistent_dir() {
        let (tx, _rx) = mpsc::channel(8);
        let mut provider = WatchProvider::new(tx).unwrap();

        let result = provider.watch("/nonexistent/directory");
        assert!(result.is_err());
    }

    #[test]
    fn test_provider_watch_and_unwatch() {
        let tmp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let mut provider = WatchProvider::new(tx).unwrap();

        provider.watch(tmp.path()).unwrap();
        assert_eq!(provider.watched_dirs().len(), 1);

        provider.unwatch(tmp.path()).unwrap();
        assert!(provider.watched_dirs().is_empty());
    }
}
