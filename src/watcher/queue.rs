//! Deduplicated indexing queue with a single-flight drain loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::ignore::IgnoreResolver;
use super::mirror::{FileIndexEntry, FileMirror};
use crate::metrics;
use crate::observability::spans;
use crate::sink::{IndexBatch, IndexSink};

/// Counters for queue and engine activity.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub events_received: AtomicU64,
    pub paths_enqueued: AtomicU64,
    pub paths_filtered: AtomicU64,
    pub files_indexed: AtomicU64,
    pub files_removed: AtomicU64,
    pub batches: AtomicU64,
    pub sink_failures: AtomicU64,
    pub rescans: AtomicU64,
    pub rescans_dropped: AtomicU64,
}

impl EngineStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            paths_enqueued: self.paths_enqueued.load(Ordering::Relaxed),
            paths_filtered: self.paths_filtered.load(Ordering::Relaxed),
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            rescans: self.rescans.load(Ordering::Relaxed),
            rescans_dropped: self.rescans_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub events_received: u64,
    pub paths_enqueued: u64,
    pub paths_filtered: u64,
    pub files_indexed: u64,
    pub files_removed: u64,
    pub batches: u64,
    pub sink_failures: u64,
    pub rescans: u64,
    pub rescans_dropped: u64,
}

/// Result of offering a path to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Added to the pending set.
    Queued,
    /// Already pending.
    AlreadyPending,
    /// Excluded by ignore rules or the inclusion glob.
    Ignored,
    /// Could not be stat'ed; usually vanished.
    Missing,
    /// A directory.
    Directory,
    /// Larger than the size limit.
    TooLarge,
    /// Modification time matches the mirror.
    Unchanged,
}

impl Enqueued {
    /// Whether the path is ineligible for the index as it stands on disk.
    #[must_use]
    pub const fn is_excluded(self) -> bool {
        matches!(self, Self::Ignored | Self::TooLarge)
    }
}

#[derive(Default)]
struct QueueState {
    pending: HashSet<PathBuf>,
    draining: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    resolver: Arc<IgnoreResolver>,
    mirror: Arc<FileMirror>,
    sink: Arc<dyn IndexSink>,
    max_file_size: u64,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
}

/// Pending-path set drained by at most one loop at a time.
#[derive(Clone)]
pub struct IndexQueue {
    inner: Arc<QueueInner>,
}

impl IndexQueue {
    /// Create a queue feeding `sink`.
    #[must_use]
    pub fn new(
        resolver: Arc<IgnoreResolver>,
        mirror: Arc<FileMirror>,
        sink: Arc<dyn IndexSink>,
        max_file_size: u64,
        stats: Arc<EngineStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                resolver,
                mirror,
                sink,
                max_file_size,
                stats,
                shutdown,
            }),
        }
    }

    /// Offer a path. Eligible, changed files join the pending set and a
    /// drain loop is started if none is running.
    pub async fn enqueue(&self, path: PathBuf) -> Enqueued {
        let outcome = self.check(&path).await;
        if outcome != Enqueued::Queued {
            self.inner
                .stats
                .paths_filtered
                .fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path = %path.display(), ?outcome, "Path not queued");
            return outcome;
        }

        let start_drain = {
            let mut state = self.inner.state.lock();
            if !state.pending.insert(path) {
                return Enqueued::AlreadyPending;
            }
            metrics::PENDING_PATHS.set(gauge_value(state.pending.len()));
            !std::mem::replace(&mut state.draining, true)
        };

        self.inner
            .stats
            .paths_enqueued
            .fetch_add(1, Ordering::Relaxed);

        if start_drain {
            let queue = self.clone();
            tokio::spawn(async move { queue.drain().await });
        }

        Enqueued::Queued
    }

    /// Index one pre-filtered chunk straight away, bypassing the pending set.
    ///
    /// Used by full scans so each chunk maps to exactly one sink call.
    pub async fn index_chunk(&self, paths: Vec<PathBuf>) -> usize {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| !self.inner.mirror.contains(p))
            .collect();
        self.index_paths(paths).await
    }

    /// Number of paths waiting.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// True when nothing is pending and no drain loop is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending.is_empty() && !state.draining
    }

    /// Drop every pending path below `prefix`.
    pub fn discard_under(&self, prefix: &Path) {
        let mut state = self.inner.state.lock();
        state.pending.retain(|p| !p.starts_with(prefix));
        metrics::PENDING_PATHS.set(gauge_value(state.pending.len()));
    }

    async fn check(&self, path: &Path) -> Enqueued {
        // Directories are reported before filtering; file rules and the
        // inclusion glob do not apply to them.
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot stat path");
                return Enqueued::Missing;
            }
        };

        if metadata.is_dir() {
            return Enqueued::Directory;
        }

        if self.inner.resolver.is_excluded(path) {
            return Enqueued::Ignored;
        }

        if metadata.len() > self.inner.max_file_size {
            return Enqueued::TooLarge;
        }

        if let Ok(modified) = metadata.modified() {
            if !self.inner.mirror.needs_index(path, modified) {
                return Enqueued::Unchanged;
            }
        }

        if self.inner.state.lock().pending.contains(path) {
            return Enqueued::AlreadyPending;
        }

        Enqueued::Queued
    }

    async fn drain(&self) {
        loop {
            let paths: Vec<PathBuf> = {
                let mut state = self.inner.state.lock();
                if state.pending.is_empty() || self.inner.shutdown.is_cancelled() {
                    state.draining = false;
                    state.pending.clear();
                    metrics::PENDING_PATHS.set(0);
                    return;
                }
                metrics::PENDING_PATHS.set(0);
                state.pending.drain().collect()
            };

            self.index_paths(paths).await;

            tokio::task::yield_now().await;
        }
    }

    async fn index_paths(&self, paths: Vec<PathBuf>) -> usize {
        let mut batch = IndexBatch::new();
        for path in paths {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    let Ok(modified) = metadata.modified() else {
                        continue;
                    };
                    batch.insert(path.clone(), FileIndexEntry::new(path, modified));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping vanished file");
                }
            }
        }

        if batch.is_empty() || self.inner.shutdown.is_cancelled() {
            return 0;
        }

        let size = batch.len();
        // Recorded before the sink call; a failed batch is not retried.
        self.inner.mirror.upsert_all(batch.values().cloned());

        let result = self
            .inner
            .sink
            .index_files(batch)
            .instrument(spans::batch_span(size))
            .await;

        self.inner.stats.batches.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(()) => {
                self.inner
                    .stats
                    .files_indexed
                    .fetch_add(size as u64, Ordering::Relaxed);
                metrics::FILES_INDEXED.inc_by(size as u64);
                metrics::BATCHES.with_label_values(&["ok"]).inc();
                tracing::debug!(files = size, "Indexed batch");
            }
            Err(e) => {
                self.inner
                    .stats
                    .sink_failures
                    .fetch_add(1, Ordering::Relaxed);
                metrics::BATCHES.with_label_values(&["error"]).inc();
                tracing::error!(files = size, error = %e, "Sink failed to index batch");
            }
        }

        size
    }
}

fn gauge_value(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
