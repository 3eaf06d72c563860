//! The indexing engine: lifecycle, event routing and guarded rescans.
//!
//! ```text
//! notify ─► events ─► modify debounce ─┐
//!                 └─► create/delete ───┴─► IndexQueue ─► IndexSink
//! scanner / branch monitor ──────────────► IndexQueue (chunked)
//! ```
//!
//! Lifecycle: `Uninitialized → Initializing → SteadyState → Disposed`.
//! File events are only accepted in `SteadyState`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::branch::BranchMonitor;
use super::debounce::Debouncer;
use super::events::{ChangeKind, FileEvent};
use super::ignore::IgnoreResolver;
use super::mirror::{FileIndexEntry, FileMirror};
use super::provider::{WatchProvider, EVENT_CHANNEL_CAPACITY};
use super::queue::{EngineStats, EngineStatsSnapshot, Enqueued, IndexQueue};
use super::scanner::Scanner;
use crate::config::EngineConfig;
use crate::error::WatcherError;
use crate::metrics;
use crate::observability::spans;
use crate::sink::IndexSink;
use crate::{Error, Result};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    SteadyState,
    Disposed,
}

impl EngineState {
    /// Lowercase name, for errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::SteadyState => "steady",
            Self::Disposed => "disposed",
        }
    }
}

/// What caused a full rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanTrigger {
    Initial,
    Manual,
    BranchSwitch,
    FolderAdded,
}

impl RescanTrigger {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Manual => "manual",
            Self::BranchSwitch => "branch_switch",
            Self::FolderAdded => "folder_added",
        }
    }
}

/// Result of asking for a full rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// The rescan ran; `files` were handed to the sink.
    Completed { files: usize },
    /// Another rescan was in flight, so this request was dropped.
    AlreadyRunning,
}

/// Single flag shared by every kind of full rescan. Losers are dropped.
#[derive(Debug, Default)]
struct ReindexGuard(AtomicBool);

impl ReindexGuard {
    fn try_acquire(&self) -> Option<ReindexPermit<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReindexPermit(&self.0))
    }

    fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, including on unwind.
struct ReindexPermit<'a>(&'a AtomicBool);

impl Drop for ReindexPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    config: EngineConfig,
    state: Mutex<EngineState>,
    roots: Mutex<Vec<PathBuf>>,
    resolver: Arc<IgnoreResolver>,
    mirror: Arc<FileMirror>,
    queue: IndexQueue,
    sink: Arc<dyn IndexSink>,
    modify_timers: Debouncer<PathBuf>,
    branch: BranchMonitor,
    reindex: ReindexGuard,
    scans: Mutex<HashMap<PathBuf, CancellationToken>>,
    shutdown: CancellationToken,
    provider: Mutex<Option<WatchProvider>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<EngineStats>,
}

/// Keeps an [`IndexSink`] in sync with a set of workspace roots.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Build an engine. Nothing is scanned or watched until [`initialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a root cannot be
    /// canonicalized, or the inclusion glob does not compile.
    ///
    /// [`initialize`]: Engine::initialize
    pub fn new(config: EngineConfig, sink: Arc<dyn IndexSink>) -> Result<Self> {
        config.validate()?;

        let mut roots = Vec::with_capacity(config.roots.len());
        for root in &config.roots {
            let canonical = canonical_root(root)?;
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }

        let resolver = Arc::new(IgnoreResolver::new(
            config.ignore_file_name.clone(),
            config.extra_ignore.clone(),
            config.include_glob.as_deref(),
        )?);
        let mirror = Arc::new(FileMirror::new());
        let stats = EngineStats::new();
        let shutdown = CancellationToken::new();
        let queue = IndexQueue::new(
            Arc::clone(&resolver),
            Arc::clone(&mirror),
            Arc::clone(&sink),
            config.max_file_size,
            Arc::clone(&stats),
            shutdown.clone(),
        );
        let branch = BranchMonitor::new(config.head_marker.clone(), config.branch_debounce());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(EngineState::Uninitialized),
                roots: Mutex::new(roots),
                resolver,
                mirror,
                queue,
                sink,
                modify_timers: Debouncer::new(),
                branch,
                reindex: ReindexGuard::default(),
                scans: Mutex::new(HashMap::new()),
                shutdown,
                provider: Mutex::new(None),
                event_loop: Mutex::new(None),
                stats,
            }),
        })
    }

    /// Load ignore files, scan every root, then start watching.
    ///
    /// # Errors
    ///
    /// Returns an error if called twice, if the engine is disposed while
    /// initializing, or if a root cannot be watched.
    pub async fn initialize(&self) -> Result<()> {
        self.transition(EngineState::Uninitialized, EngineState::Initializing)?;
        metrics::init_metrics();

        let roots = self.roots();
        let permit = self.inner.reindex.try_acquire();

        for root in &roots {
            let loaded = self.inner.resolver.add_root_async(root).await?;
            self.inner.branch.track(root);
            tracing::debug!(root = %root.display(), ignore_files = loaded, "Root registered");
        }

        for root in &roots {
            if self.state() == EngineState::Disposed {
                return Err(WatcherError::Disposed.into());
            }
            self.scan_root(root, RescanTrigger::Initial).await;
        }
        drop(permit);

        if self.inner.config.watch_filesystem {
            self.start_watching(&roots)?;
        }

        self.transition(EngineState::Initializing, EngineState::SteadyState)
            .map_err(|e| {
                // Disposed mid-initialize; make sure the watches go too.
                self.inner.provider.lock().take();
                e
            })?;

        tracing::info!(
            roots = roots.len(),
            tracked = self.inner.mirror.len(),
            "Indexing engine ready"
        );
        Ok(())
    }

    /// Stop everything. Safe to call in any state, any number of times.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == EngineState::Disposed {
                return;
            }
            *state = EngineState::Disposed;
        }

        self.inner.shutdown.cancel();
        let timers = self.inner.modify_timers.cancel_all() + self.inner.branch.cancel_all();
        self.inner.scans.lock().clear();
        self.inner.provider.lock().take();
        if let Some(handle) = self.inner.event_loop.lock().take() {
            handle.abort();
        }

        tracing::info!(cancelled_timers = timers, "Indexing engine disposed");
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.inner.state.lock()
    }

    /// Workspace roots, canonicalized.
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        self.inner.roots.lock().clone()
    }

    /// Sorted copy of the local mirror.
    #[must_use]
    pub fn tracked_files(&self) -> Vec<FileIndexEntry> {
        self.inner.mirror.snapshot()
    }

    /// Paths waiting in the queue.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.queue.pending_len()
    }

    /// Live modify-debounce timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.modify_timers.pending()
    }

    /// True when no queue work, debounce timer or rescan is outstanding.
    ///
    /// Timers are checked before the queue: a fired action enqueues its
    /// path before it stops counting as in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.inner.branch.is_active()
            && self.inner.modify_timers.is_quiet()
            && !self.inner.reindex.is_held()
            && self.inner.queue.is_idle()
    }

    /// Whether a full rescan is running.
    #[must_use]
    pub fn is_rescanning(&self) -> bool {
        self.inner.reindex.is_held()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Clear the mirror and rescan every root.
    ///
    /// Returns [`ReindexOutcome::AlreadyRunning`] without doing anything if
    /// any full rescan is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error unless the engine is in steady state.
    pub async fn reindex_workspace(&self) -> Result<ReindexOutcome> {
        self.ensure_steady()?;
        let Some(_permit) = self.inner.reindex.try_acquire() else {
            self.record_dropped_rescan(RescanTrigger::Manual);
            return Ok(ReindexOutcome::AlreadyRunning);
        };

        self.inner.mirror.clear();
        let mut files = 0;
        for root in self.roots() {
            files += self.scan_root(&root, RescanTrigger::Manual).await;
        }
        Ok(ReindexOutcome::Completed { files })
    }

    /// Start tracking a new workspace root and scan it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not in steady state, the path is
    /// not a directory, it is already a root, or it cannot be watched.
    pub async fn add_root(&self, path: impl AsRef<Path>) -> Result<ReindexOutcome> {
        self.ensure_steady()?;
        let root = canonical_root(path.as_ref())?;

        {
            let mut roots = self.inner.roots.lock();
            if roots.contains(&root) {
                return Err(Error::config(format!(
                    "'{}' is already a workspace root",
                    root.display()
                )));
            }
            roots.push(root.clone());
        }

        self.inner.resolver.add_root_async(&root).await?;
        self.inner.branch.track(&root);
        if let Some(provider) = self.inner.provider.lock().as_mut() {
            provider.watch(&root)?;
        }

        tracing::info!(root = %root.display(), "Workspace root added");
        Ok(self.rescan_guarded(root, RescanTrigger::FolderAdded).await)
    }

    /// Stop tracking a workspace root. Its mirror entries are dropped
    /// without calling the sink; an in-flight scan of it is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a workspace root.
    pub fn remove_root(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let root = {
            let mut roots = self.inner.roots.lock();
            let canonical = path.canonicalize().ok();
            let Some(index) = roots
                .iter()
                .position(|r| r == path || Some(r) == canonical.as_ref())
            else {
                return Err(Error::config(format!(
                    "'{}' is not a workspace root",
                    path.display()
                )));
            };
            roots.remove(index)
        };

        if let Some(token) = self.inner.scans.lock().remove(&root) {
            token.cancel();
        }
        if let Some(provider) = self.inner.provider.lock().as_mut() {
            if let Err(e) = provider.unwatch(&root) {
                tracing::warn!(root = %root.display(), error = %e, "Failed to unwatch root");
            }
        }
        self.inner.branch.cancel(&root);
        self.inner
            .modify_timers
            .cancel_where(|p| p.starts_with(&root));
        self.inner.queue.discard_under(&root);
        self.inner.resolver.remove_root(&root);
        let dropped = self.inner.mirror.remove_under(&root);

        tracing::info!(root = %root.display(), dropped = dropped.len(), "Workspace root removed");
        Ok(())
    }

    /// Route one filesystem event. Events outside steady state are dropped.
    ///
    /// Creates and deletes are applied before this returns; modifies are
    /// debounced per path.
    pub async fn handle_event(&self, event: FileEvent) {
        if self.state() != EngineState::SteadyState {
            tracing::trace!(path = %event.path().display(), "Engine not ready, dropping event");
            return;
        }
        self.inner
            .stats
            .events_received
            .fetch_add(1, Ordering::Relaxed);

        for (kind, path) in event.into_changes() {
            self.handle_change(kind, path).await;
        }
    }

    /// Consume events from `rx` in arrival order until it closes or the
    /// engine is disposed.
    pub async fn run_events(self, rx: mpsc::Receiver<FileEvent>) {
        let shutdown = self.inner.shutdown.clone();
        run_event_loop(Arc::downgrade(&self.inner), rx, shutdown).await;
    }

    /// [`run_events`](Engine::run_events) on a background task that does not
    /// keep the engine alive.
    pub fn spawn_event_loop(&self, rx: mpsc::Receiver<FileEvent>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(run_event_loop(weak, rx, shutdown))
    }

    async fn handle_change(&self, kind: ChangeKind, path: PathBuf) {
        let inner = &self.inner;

        let marker_root = inner.branch.root_for_marker(&path, &*inner.roots.lock());
        if let Some(root) = marker_root {
            self.schedule_branch_rescan(root);
            return;
        }

        if inner.resolver.root_of(&path).is_none() {
            return;
        }

        if inner.resolver.is_ignore_file(&path) {
            let dir_ignored = path
                .parent()
                .is_some_and(|dir| inner.resolver.is_dir_excluded(dir));
            if !dir_ignored {
                inner
                    .resolver
                    .ignore_file_changed(&path, kind == ChangeKind::Delete);
            }
            return;
        }

        match kind {
            ChangeKind::Create => {
                if self.refresh_path(path.clone()).await == Enqueued::Directory {
                    self.index_subtree(&path).await;
                }
            }
            ChangeKind::Modify => {
                let weak = Arc::downgrade(&self.inner);
                let key = path.clone();
                inner
                    .modify_timers
                    .schedule(key, inner.config.modify_debounce(), move || async move {
                        if let Some(inner) = weak.upgrade() {
                            Engine { inner }.refresh_path(path).await;
                        }
                    });
            }
            ChangeKind::Delete => {
                inner.modify_timers.cancel(&path);
                inner.queue.discard_under(&path);
                self.remove_path(&path).await;
            }
        }
    }

    /// Enqueue `path`, or drop it from the index if it is now excluded.
    async fn refresh_path(&self, path: PathBuf) -> Enqueued {
        if self.state() != EngineState::SteadyState {
            return Enqueued::Ignored;
        }
        let outcome = self.inner.queue.enqueue(path.clone()).await;
        if outcome.is_excluded() && self.inner.mirror.contains(&path) {
            tracing::debug!(path = %path.display(), ?outcome, "Tracked file is now excluded");
            self.remove_path(&path).await;
        }
        outcome
    }

    /// Remove a file, or every tracked file under a directory.
    async fn remove_path(&self, path: &Path) {
        let removed = match self.inner.mirror.remove(path) {
            Some(entry) => vec![entry.path],
            None => self.inner.mirror.remove_under(path),
        };

        for file in removed {
            match self.inner.sink.remove_file_from_index(&file).await {
                Ok(()) => {
                    self.inner
                        .stats
                        .files_removed
                        .fetch_add(1, Ordering::Relaxed);
                    metrics::FILES_REMOVED.inc();
                    tracing::debug!(path = %file.display(), "Removed file from index");
                }
                Err(e) => {
                    self.inner
                        .stats
                        .sink_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::error!(path = %file.display(), error = %e, "Sink failed to remove file");
                }
            }
        }
    }

    /// Index a directory that appeared in one piece (mkdir -p, move-in).
    async fn index_subtree(&self, dir: &Path) {
        if self.inner.resolver.is_dir_excluded(dir) {
            return;
        }
        let scanner = Scanner::new(
            Arc::clone(&self.inner.resolver),
            self.inner.config.max_file_size,
        );
        match scanner
            .scan_async(dir, self.inner.shutdown.child_token())
            .await
        {
            Ok(report) => {
                for chunk in report.batches(self.inner.config.scan_batch_size) {
                    self.inner.queue.index_chunk(chunk.to_vec()).await;
                }
            }
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "Failed to scan new directory");
            }
        }
    }

    fn schedule_branch_rescan(&self, root: PathBuf) {
        let weak = Arc::downgrade(&self.inner);
        let task_root = root.clone();
        self.inner.branch.marker_changed(root, move || async move {
            if let Some(inner) = weak.upgrade() {
                let engine = Engine { inner };
                if engine.state() == EngineState::SteadyState {
                    engine
                        .rescan_guarded(task_root, RescanTrigger::BranchSwitch)
                        .await;
                }
            }
        });
    }

    async fn rescan_guarded(&self, root: PathBuf, trigger: RescanTrigger) -> ReindexOutcome {
        let Some(_permit) = self.inner.reindex.try_acquire() else {
            self.record_dropped_rescan(trigger);
            return ReindexOutcome::AlreadyRunning;
        };

        if !self.inner.roots.lock().contains(&root) {
            return ReindexOutcome::Completed { files: 0 };
        }

        let files = self.scan_root(&root, trigger).await;
        ReindexOutcome::Completed { files }
    }

    /// Full scan of one root. The caller holds the reindex permit.
    async fn scan_root(&self, root: &Path, trigger: RescanTrigger) -> usize {
        let inner = &self.inner;
        let token = inner.shutdown.child_token();
        inner
            .scans
            .lock()
            .insert(root.to_path_buf(), token.clone());

        if trigger != RescanTrigger::Initial {
            inner.mirror.remove_under(root);
            if let Err(e) = inner.resolver.reload_root_async(root).await {
                tracing::warn!(root = %root.display(), error = %e, "Failed to reload ignore files");
            }
        }

        let scanner = Scanner::new(Arc::clone(&inner.resolver), inner.config.max_file_size);
        let span = spans::scan_span(root, trigger.as_str());
        let report = match scanner
            .scan_async(root, token.clone())
            .instrument(span)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(root = %root.display(), error = %e, "Scan failed");
                inner.scans.lock().remove(root);
                return 0;
            }
        };

        let mut indexed = 0;
        if !report.cancelled {
            for chunk in report.batches(inner.config.scan_batch_size) {
                if token.is_cancelled() {
                    break;
                }
                indexed += inner.queue.index_chunk(chunk.to_vec()).await;
            }
        }

        inner.scans.lock().remove(root);

        if token.is_cancelled() {
            tracing::debug!(root = %root.display(), trigger = trigger.as_str(), "Rescan cancelled");
            return indexed;
        }

        inner.stats.rescans.fetch_add(1, Ordering::Relaxed);
        metrics::RESCANS.with_label_values(&[trigger.as_str()]).inc();
        tracing::info!(
            root = %root.display(),
            trigger = trigger.as_str(),
            files = indexed,
            "Rescan complete"
        );
        indexed
    }

    fn start_watching(&self, roots: &[PathBuf]) -> Result<()> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut provider = WatchProvider::new(tx)?;
        for root in roots {
            provider.watch(root)?;
        }
        *self.inner.provider.lock() = Some(provider);

        let handle = self.spawn_event_loop(rx);
        *self.inner.event_loop.lock() = Some(handle);
        Ok(())
    }

    fn record_dropped_rescan(&self, trigger: RescanTrigger) {
        self.inner
            .stats
            .rescans_dropped
            .fetch_add(1, Ordering::Relaxed);
        metrics::RESCANS_DROPPED.inc();
        tracing::info!(
            trigger = trigger.as_str(),
            "Rescan already in flight, dropping request"
        );
    }

    fn ensure_steady(&self) -> Result<()> {
        match self.state() {
            EngineState::SteadyState => Ok(()),
            EngineState::Disposed => Err(WatcherError::Disposed.into()),
            actual => Err(WatcherError::InvalidState {
                expected: EngineState::SteadyState.as_str(),
                actual: actual.as_str(),
            }
            .into()),
        }
    }

    fn transition(&self, from: EngineState, to: EngineState) -> Result<()> {
        let mut state = self.inner.state.lock();
        if *state == from {
            *state = to;
            return Ok(());
        }
        if *state == EngineState::Disposed {
            return Err(WatcherError::Disposed.into());
        }
        Err(WatcherError::InvalidState {
            expected: from.as_str(),
            actual: state.as_str(),
        }
        .into())
    }
}

async fn run_event_loop(
    inner: Weak<Inner>,
    mut rx: mpsc::Receiver<FileEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        Engine { inner }.handle_event(event).await;
    }
    tracing::debug!("Event loop stopped");
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    let canonical = path.canonicalize().map_err(|e| {
        Error::config(format!("cannot resolve root '{}': {e}", path.display()))
    })?;
    if !canonical.is_dir() {
        return Err(Error::config(format!(
            "workspace root '{}' is not a directory",
            canonical.display()
        )));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkCall};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_for(root: &Path, sink: &Arc<MemorySink>) -> Engine {
        let config = EngineConfig {
            watch_filesystem: false,
            modify_debounce_ms: 100,
            branch_debounce_ms: 100,
            ..EngineConfig::new(vec![root.to_path_buf()])
        };
        Engine::new(config, sink.clone()).unwrap()
    }

    async fn wait_idle(engine: &Engine) {
        for _ in 0..500 {
            if engine.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine did not become idle");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(EngineState::SteadyState.as_str(), "steady");
        assert_eq!(RescanTrigger::BranchSwitch.as_str(), "branch_switch");
    }

    #[test]
    fn test_reindex_guard_releases_on_drop() {
        let guard = ReindexGuard::default();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let config = EngineConfig::new(vec![PathBuf::from("/nonexistent/tidemark")]);
        let result = Engine::new(config, Arc::new(MemorySink::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(tmp.path(), &sink);
        assert_eq!(engine.state(), EngineState::Uninitialized);

        engine.initialize().await.unwrap();
        assert_eq!(engine.state(), EngineState::SteadyState);
        assert!(engine.initialize().await.is_err());

        engine.dispose();
        engine.dispose();
        assert_eq!(engine.state(), EngineState::Disposed);
        assert!(matches!(
            engine.reindex_workspace().await,
            Err(Error::Watcher(WatcherError::Disposed))
        ));
    }

    #[tokio::test]
    async fn test_dispose_before_initialize() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(tmp.path(), &sink);

        engine.dispose();
        assert!(engine.initialize().await.is_err());
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_dropped_before_steady_state() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("a.rs"), "x").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);

        engine
            .handle_event(FileEvent::Created(root.join("a.rs")))
            .await;
        assert!(sink.calls().is_empty());
        assert_eq!(engine.stats().events_received, 0);
    }

    #[tokio::test]
    async fn test_created_directory_is_indexed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        let dir = root.join("pkg");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("a.rs"), "a").unwrap();
        fs::write(dir.join("inner/b.rs"), "b").unwrap();

        engine.handle_event(FileEvent::Created(dir.clone())).await;

        let mut indexed: Vec<PathBuf> = sink.index_calls().concat();
        indexed.sort();
        assert_eq!(indexed, vec![dir.join("a.rs"), dir.join("inner/b.rs")]);
    }

    #[tokio::test]
    async fn test_created_directory_is_indexed_under_inclusion_glob() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let sink = Arc::new(MemorySink::new());
        let config = EngineConfig {
            watch_filesystem: false,
            include_glob: Some("**/*.md".to_string()),
            ..EngineConfig::new(vec![root.clone()])
        };
        let engine = Engine::new(config, sink.clone()).unwrap();
        engine.initialize().await.unwrap();

        let docs = root.join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("guide.md"), "# guide").unwrap();
        fs::write(docs.join("build.rs"), "fn main() {}").unwrap();

        engine.handle_event(FileEvent::Created(docs.clone())).await;

        assert_eq!(sink.index_calls(), vec![vec![docs.join("guide.md")]]);
    }

    #[tokio::test]
    async fn test_idle_only_after_debounced_work_lands() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let file = root.join("a.rs");
        fs::write(&file, "v1").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(std::time::SystemTime::now() + Duration::from_secs(30))
            .unwrap();
        engine.handle_event(FileEvent::Modified(file.clone())).await;
        assert!(!engine.is_idle());

        wait_idle(&engine).await;
        assert_eq!(sink.index_calls(), vec![vec![file.clone()], vec![file]]);
    }

    #[tokio::test]
    async fn test_delete_directory_removes_tracked_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/a.rs"), "a").unwrap();
        fs::write(root.join("pkg/b.rs"), "b").unwrap();
        fs::write(root.join("keep.rs"), "k").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        fs::remove_dir_all(root.join("pkg")).unwrap();
        engine
            .handle_event(FileEvent::Deleted(root.join("pkg")))
            .await;

        let mut removed = sink.remove_calls();
        removed.sort();
        assert_eq!(removed, vec![root.join("pkg/a.rs"), root.join("pkg/b.rs")]);
        assert_eq!(engine.tracked_files().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_untracked_path_skips_sink() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        engine
            .handle_event(FileEvent::Deleted(root.join("never-seen.rs")))
            .await;
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_index_entry() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("old.rs"), "x").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();
        sink.clear();

        fs::rename(root.join("old.rs"), root.join("new.rs")).unwrap();
        engine
            .handle_event(FileEvent::Renamed {
                from: root.join("old.rs"),
                to: root.join("new.rs"),
            })
            .await;
        assert!(sink.wait_for_calls(2, Duration::from_secs(5)).await);

        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Remove(root.join("old.rs")),
                SinkCall::Index(vec![root.join("new.rs")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_newly_ignored_file_is_removed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("gen.rs"), "x").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();
        assert_eq!(engine.tracked_files().len(), 1);

        fs::write(root.join(".gitignore"), "gen.rs\n").unwrap();
        engine
            .handle_event(FileEvent::Created(root.join(".gitignore")))
            .await;
        engine
            .handle_event(FileEvent::Modified(root.join("gen.rs")))
            .await;
        assert!(sink.wait_for_calls(2, Duration::from_secs(5)).await);
        wait_idle(&engine).await;

        assert_eq!(sink.remove_calls(), vec![root.join("gen.rs")]);
        assert!(engine.tracked_files().is_empty());
    }

    #[tokio::test]
    async fn test_run_events_until_channel_closes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(engine.clone().run_events(rx));

        fs::write(root.join("a.rs"), "a").unwrap();
        tx.send(FileEvent::Created(root.join("a.rs"))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(engine.stats().events_received, 1);
        assert!(sink.wait_for_calls(1, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_remove_root_cancels_work() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("a.rs"), "a").unwrap();
        let sink = Arc::new(MemorySink::new());
        let engine = engine_for(&root, &sink);
        engine.initialize().await.unwrap();

        engine
            .handle_event(FileEvent::Modified(root.join("a.rs")))
            .await;
        assert_eq!(engine.pending_timers(), 1);

        engine.remove_root(&root).unwrap();
        assert_eq!(engine.pending_timers(), 0);
        assert!(engine.roots().is_empty());
        assert!(engine.tracked_files().is_empty());
        assert!(engine.remove_root(&root).is_err());
    }
}
