//! Directory scanner for seeding and full rescans.
//!
//! Walks a root, pruning directories the [`IgnoreResolver`] excludes, and
//! collects every eligible file. The walk checks a cancellation token per
//! entry so a removed root or a disposed engine stops it promptly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use super::ignore::IgnoreResolver;
use crate::Result;

/// Scan statistics.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_found: AtomicU64,
    pub files_queued: AtomicU64,
    pub files_skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl ScanStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_queued: self.files_queued.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of scan stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub files_found: u64,
    pub files_queued: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Outcome of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Eligible files, in walk order.
    pub files: Vec<PathBuf>,
    pub stats: ScanStatsSnapshot,
    /// The walk stopped early; `files` is partial.
    pub cancelled: bool,
}

impl ScanReport {
    /// Split the files into sink-sized batches.
    pub fn batches(&self, size: usize) -> impl Iterator<Item = &[PathBuf]> {
        self.files.chunks(size.max(1))
    }
}

/// Enumerates eligible files under a root.
#[derive(Debug, Clone)]
pub struct Scanner {
    resolver: Arc<IgnoreResolver>,
    max_file_size: u64,
}

impl Scanner {
    /// Create a scanner sharing the engine's resolver.
    #[must_use]
    pub const fn new(resolver: Arc<IgnoreResolver>, max_file_size: u64) -> Self {
        Self {
            resolver,
            max_file_size,
        }
    }

    /// Walk `root` synchronously. Run it on a blocking thread.
    #[must_use]
    pub fn scan(&self, root: &Path, cancel: &CancellationToken) -> ScanReport {
        let stats = ScanStats::new();
        let mut files = Vec::new();

        tracing::info!(path = %root.display(), "Starting directory scan");

        let resolver = Arc::clone(&self.resolver);
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry.file_type().is_some_and(|t| t.is_dir())
                    || !resolver.is_dir_excluded(entry.path())
            })
            .build();

        for entry in walker {
            if cancel.is_cancelled() {
                tracing::debug!(path = %root.display(), "Directory scan cancelled");
                return ScanReport {
                    files,
                    stats: stats.snapshot(),
                    cancelled: true,
                };
            }

            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    let entry_path = entry.path();

                    stats.files_found.fetch_add(1, Ordering::Relaxed);

                    if self.resolver.is_excluded(entry_path) {
                        stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    match entry.metadata() {
                        Ok(metadata) if metadata.len() <= self.max_file_size => {}
                        Ok(_) => {
                            stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        Err(e) => {
                            tracing::debug!(path = %entry_path.display(), error = %e, "Cannot stat file");
                            stats.errors.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    }

                    files.push(entry_path.to_path_buf());
                    stats.files_queued.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error walking directory");
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let snapshot = stats.snapshot();
        tracing::info!(
            path = %root.display(),
            found = snapshot.files_found,
            queued = snapshot.files_queued,
            skipped = snapshot.files_skipped,
            errors = snapshot.errors,
            "Directory scan complete"
        );

        ScanReport {
            files,
            stats: snapshot,
            cancelled: false,
        }
    }

    /// Async version of [`Scanner::scan`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blocking task panics.
    pub async fn scan_async(&self, root: &Path, cancel: CancellationToken) -> Result<ScanReport> {
        let scanner = self.clone();
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || scanner.scan(&root, &cancel))
            .await
            .map_err(|e| crate::Error::internal(format!("Scan task failed: {e}")))
    }
}
