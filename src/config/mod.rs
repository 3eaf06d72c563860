//! Configuration management for Tidemark.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - JSON configuration file (lowest priority)

mod settings;

pub use settings::{
    EngineConfig, DEFAULT_BRANCH_DEBOUNCE_MS, DEFAULT_MAX_FILE_SIZE, DEFAULT_MODIFY_DEBOUNCE_MS,
    DEFAULT_SCAN_BATCH_SIZE,
};
