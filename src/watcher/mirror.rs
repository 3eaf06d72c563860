//! Local mirror of what has been handed to the sink.
//!
//! The mirror records the modification time each file had when it was last
//! indexed, so unchanged files are not sent again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::metrics;

/// Last indexed state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    /// Absolute file path.
    pub path: PathBuf,
    /// Modification time observed when the file was indexed.
    pub last_modified: SystemTime,
}

impl FileIndexEntry {
    /// Create an entry.
    #[must_use]
    pub const fn new(path: PathBuf, last_modified: SystemTime) -> Self {
        Self {
            path,
            last_modified,
        }
    }
}

/// Path to entry map shared by the queue and the orchestrator.
#[derive(Debug, Default)]
pub struct FileMirror {
    entries: Mutex<HashMap<PathBuf, FileIndexEntry>>,
}

impl FileMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<FileIndexEntry> {
        self.entries.lock().get(path).cloned()
    }

    /// Whether a path is tracked.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// True if the file is untracked or its mtime differs from the record.
    #[must_use]
    pub fn needs_index(&self, path: &Path, current: SystemTime) -> bool {
        self.entries
            .lock()
            .get(path)
            .map_or(true, |entry| entry.last_modified != current)
    }

    /// Record a set of entries.
    pub fn upsert_all(&self, entries: impl IntoIterator<Item = FileIndexEntry>) {
        let mut map = self.entries.lock();
        for entry in entries {
            map.insert(entry.path.clone(), entry);
        }
        metrics::FILES_TRACKED.set(gauge_value(map.len()));
    }

    /// Drop one entry, returning it if it existed.
    pub fn remove(&self, path: &Path) -> Option<FileIndexEntry> {
        let mut map = self.entries.lock();
        let removed = map.remove(path);
        metrics::FILES_TRACKED.set(gauge_value(map.len()));
        removed
    }

    /// Drop every entry at or below `prefix`, returning the removed paths.
    pub fn remove_under(&self, prefix: &Path) -> Vec<PathBuf> {
        let mut map = self.entries.lock();
        let doomed: Vec<PathBuf> = map
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        for path in &doomed {
            map.remove(path);
        }
        metrics::FILES_TRACKED.set(gauge_value(map.len()));
        doomed
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
        metrics::FILES_TRACKED.set(0);
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sorted copy of all entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FileIndexEntry> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

fn gauge_value(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
