//! Sink that only logs what it would index.

use std::path::Path;

use async_trait::async_trait;

use super::{IndexBatch, IndexSink};
use crate::error::SinkError;

/// Logs every call through `tracing`. Handy for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl IndexSink for LogSink {
    async fn index_files(&self, batch: IndexBatch) -> Result<(), SinkError> {
        for entry in batch.values() {
            tracing::debug!(path = %entry.path.display(), "Would index file");
        }
        tracing::info!(files = batch.len(), "Index batch");
        Ok(())
    }

    async fn remove_file_from_index(&self, path: &Path) -> Result<(), SinkError> {
        tracing::info!(path = %path.display(), "Remove from index");
        Ok(())
    }
}
