//! Tidemark
//!
//! Incremental file-indexing engine. Keeps an external index in sync with
//! one or more workspace roots: an initial scan, debounced updates from
//! filesystem events, and full rescans when the checked-out branch moves.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod sink;
pub mod watcher;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use sink::IndexSink;
pub use watcher::{Engine, EngineState, FileEvent, ReindexOutcome};
