//! Error types and Result aliases for Tidemark.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Per-path failures inside the engine (vanished files, unreadable ignore
//! files, sink rejections) are logged and swallowed; only construction and
//! lifecycle failures reach callers.

use thiserror::Error;

/// Result type alias using Tidemark's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tidemark operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching / lifecycle error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Ignore rule error.
    #[error("ignore error: {0}")]
    Ignore(#[from] IgnoreError),

    /// Index sink error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher and engine lifecycle errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Operation not allowed in the current engine state.
    #[error("invalid engine state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// The engine has been disposed.
    #[error("engine has been disposed")]
    Disposed,
}

/// Ignore rule errors.
#[derive(Error, Debug)]
pub enum IgnoreError {
    /// A glob or gitignore line failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// An ignore file could not be read or parsed.
    #[error("failed to parse ignore file '{path}': {reason}")]
    Parse { path: String, reason: String },
}

/// Errors reported by an index sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The sink could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// I/O failure while writing to the sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IgnoreError {
    /// Create an invalid-pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}
