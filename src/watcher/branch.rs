//! VCS head marker monitoring.
//!
//! A change to `<root>/.git/HEAD` means the checked-out branch moved. The
//! monitor debounces those per root; the orchestrator supplies the rescan.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::debounce::Debouncer;

/// Debounces branch switches per workspace root.
pub struct BranchMonitor {
    marker: PathBuf,
    delay: Duration,
    timers: Debouncer<PathBuf>,
}

impl BranchMonitor {
    /// Create a monitor for `marker` (relative to each root).
    #[must_use]
    pub fn new(marker: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            marker: marker.into(),
            delay,
            timers: Debouncer::new(),
        }
    }

    /// Absolute marker path for a root.
    #[must_use]
    pub fn marker_for(&self, root: &Path) -> PathBuf {
        root.join(&self.marker)
    }

    /// Log whether a root has a marker. Roots without one can still gain it
    /// later (e.g. `git init`), so events are honoured either way.
    pub fn track(&self, root: &Path) -> bool {
        let marker = self.marker_for(root);
        let present = marker.is_file();
        if present {
            tracing::debug!(marker = %marker.display(), "Monitoring VCS head marker");
        } else {
            tracing::debug!(root = %root.display(), "No VCS head marker found");
        }
        present
    }

    /// The root whose marker is `path`, if any.
    #[must_use]
    pub fn root_for_marker<'a>(
        &self,
        path: &Path,
        roots: impl IntoIterator<Item = &'a PathBuf>,
    ) -> Option<PathBuf> {
        roots
            .into_iter()
            .find(|root| path == self.marker_for(root))
            .cloned()
    }

    /// Restart the quiet window for `root`; `rescan` runs when it expires.
    pub fn marker_changed<F, Fut>(&self, root: PathBuf, rescan: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(root = %root.display(), "VCS head changed, scheduling rescan");
        self.timers.schedule(root, self.delay, rescan);
    }

    /// Whether a rescan is waiting for `root`.
    #[must_use]
    pub fn is_pending(&self, root: &Path) -> bool {
        self.timers.is_pending(&root.to_path_buf())
    }

    /// Whether any rescan is waiting or running its callback.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.timers.is_quiet()
    }

    /// Drop a pending rescan for `root`.
    pub fn cancel(&self, root: &Path) -> bool {
        self.timers.cancel(&root.to_path_buf())
    }

    /// Drop every pending rescan.
    pub fn cancel_all(&self) -> usize {
        self.timers.cancel_all()
    }
}
