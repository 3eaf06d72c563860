//! Index sinks.
//!
//! A sink is the external system that stores indexed content. The engine
//! only ever calls two operations on it and treats both as fire-and-forget:
//! failures are logged, never retried. Retry and backoff belong to the sink.

mod jsonl;
mod logging;
mod memory;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use jsonl::JsonLinesSink;
pub use logging::LogSink;
pub use memory::{MemorySink, SinkCall};

use crate::error::SinkError;
use crate::watcher::FileIndexEntry;

/// One drain cycle worth of files, keyed by absolute path.
pub type IndexBatch = BTreeMap<PathBuf, FileIndexEntry>;

/// Destination for indexing work.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Index (or re-index) every file in the batch.
    async fn index_files(&self, batch: IndexBatch) -> Result<(), SinkError>;

    /// Drop a single file from the index.
    async fn remove_file_from_index(&self, path: &Path) -> Result<(), SinkError>;
}
