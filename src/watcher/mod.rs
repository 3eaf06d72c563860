//! File system watching and incremental indexing.
//!
//! This module provides:
//! - Layered ignore rules with per-directory ignore files
//! - Per-path debouncing of modify events
//! - A deduplicated indexing queue feeding an [`IndexSink`](crate::sink::IndexSink)
//! - Full scans of workspace roots, including after branch switches
//! - The [`Engine`] that ties them together

mod branch;
mod debounce;
mod engine;
mod events;
mod ignore;
mod mirror;
mod provider;
mod queue;
mod scanner;

pub use branch::BranchMonitor;
pub use debounce::Debouncer;
pub use engine::{Engine, EngineState, ReindexOutcome, RescanTrigger};
pub use events::{ChangeKind, FileEvent};
pub use ignore::{IgnoreResolver, IgnoreSet, DEFAULT_IGNORE_PATTERNS};
pub use mirror::{FileIndexEntry, FileMirror};
pub use provider::{WatchProvider, EVENT_CHANNEL_CAPACITY};
pub use queue::{Enqueued, EngineStats, EngineStatsSnapshot, IndexQueue};
pub use scanner::{ScanReport, ScanStats, ScanStatsSnapshot, Scanner};
