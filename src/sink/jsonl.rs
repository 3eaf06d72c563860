//! JSON-lines sink: one object per call, written to any `Write`.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::{IndexBatch, IndexSink};
use crate::error::SinkError;

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Record<'a> {
    Index { files: Vec<FileRecord<'a>> },
    Remove { path: &'a Path },
}

#[derive(Serialize)]
struct FileRecord<'a> {
    path: &'a Path,
    last_modified: String,
}

/// Streams sink calls as newline-delimited JSON.
///
/// ```text
/// {"op":"index","files":[{"path":"/p/a.rs","last_modified":"2024-01-01T00:00:00.000Z"}]}
/// {"op":"remove","path":"/p/a.rs"}
/// ```
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the inner writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn emit(&self, record: &Record<'_>) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)
            .map_err(|e| SinkError::Rejected(format!("failed to serialize record: {e}")))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl<W: Write + Send> IndexSink for JsonLinesSink<W> {
    async fn index_files(&self, batch: IndexBatch) -> Result<(), SinkError> {
        let files = batch
            .values()
            .map(|entry| FileRecord {
                path: &entry.path,
                last_modified: rfc3339(entry.last_modified),
            })
            .collect();
        self.emit(&Record::Index { files })
    }

    async fn remove_file_from_index(&self, path: &Path) -> Result<(), SinkError> {
        self.emit(&Record::Remove { path })
    }
}
