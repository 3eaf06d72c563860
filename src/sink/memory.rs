//! In-memory sink that records every call.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{IndexBatch, IndexSink};
use crate::error::SinkError;

/// A recorded sink invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    /// `index_files` with the batch's paths in order.
    Index(Vec<PathBuf>),
    /// `remove_file_from_index` for one path.
    Remove(PathBuf),
}

/// Sink that keeps a log of calls in memory.
///
/// Useful for embedding hosts that poll for work and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SinkCall>>,
    fail: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (they are still recorded).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Only the `index_files` batches, as path lists.
    #[must_use]
    pub fn index_calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Index(paths) => Some(paths.clone()),
                SinkCall::Remove(_) => None,
            })
            .collect()
    }

    /// Only the removed paths.
    #[must_use]
    pub fn remove_calls(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Remove(path) => Some(path.clone()),
                SinkCall::Index(_) => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Wait until at least `count` calls have been recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.calls.lock().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, call: SinkCall) -> Result<(), SinkError> {
        self.calls.lock().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("memory sink set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexSink for MemorySink {
    async fn index_files(&self, batch: IndexBatch) -> Result<(), SinkError> {
        self.record(SinkCall::Index(batch.into_keys().collect()))
    }

    async fn remove_file_from_index(&self, path: &Path) -> Result<(), SinkError> {
        self.record(SinkCall::Remove(path.to_path_buf()))
    }
}
