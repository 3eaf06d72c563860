//! Engine configuration and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default quiet window for modify events.
pub const DEFAULT_MODIFY_DEBOUNCE_MS: u64 = 800;

/// Default quiet window after a branch switch before rescanning.
pub const DEFAULT_BRANCH_DEBOUNCE_MS: u64 = 3_000;

/// Files larger than this are never indexed.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Number of paths per sink call during full scans.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 50;

/// Configuration for the indexing engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Workspace roots to index.
    pub roots: Vec<PathBuf>,

    /// Optional allowlist glob, matched against root-relative paths.
    pub include_glob: Option<String>,

    /// Extra gitignore lines merged into the built-in denylist.
    pub extra_ignore: Vec<String>,

    /// Name of the per-directory ignore file.
    pub ignore_file_name: String,

    /// Debounce window for modify events, in milliseconds.
    pub modify_debounce_ms: u64,

    /// Debounce window for branch switches, in milliseconds.
    pub branch_debounce_ms: u64,

    /// Largest indexable file, in bytes (inclusive).
    pub max_file_size: u64,

    /// Paths per sink call during full scans.
    pub scan_batch_size: usize,

    /// VCS head marker, relative to each root.
    pub head_marker: PathBuf,

    /// Subscribe to filesystem notifications after the initial scan.
    pub watch_filesystem: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            include_glob: None,
            extra_ignore: Vec::new(),
            ignore_file_name: ".gitignore".to_string(),
            modify_debounce_ms: DEFAULT_MODIFY_DEBOUNCE_MS,
            branch_debounce_ms: DEFAULT_BRANCH_DEBOUNCE_MS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            head_marker: PathBuf::from(".git").join("HEAD"),
            watch_filesystem: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults for the given roots.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid config file '{}': {e}", path.display())))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(Error::config("scan_batch_size cannot be 0"));
        }

        if self.max_file_size == 0 {
            return Err(Error::config("max_file_size cannot be 0"));
        }

        if self.modify_debounce_ms == 0 {
            return Err(Error::config("modify_debounce_ms cannot be 0"));
        }

        if self.ignore_file_name.is_empty() || self.ignore_file_name.contains('/') {
            return Err(Error::config(format!(
                "invalid ignore_file_name '{}'",
                self.ignore_file_name
            )));
        }

        if self.head_marker.as_os_str().is_empty() || self.head_marker.is_absolute() {
            return Err(Error::config(format!(
                "head_marker must be a relative path, got '{}'",
                self.head_marker.display()
            )));
        }

        for root in &self.roots {
            if !root.is_dir() {
                return Err(Error::config(format!(
                    "workspace root '{}' is not a directory",
                    root.display()
                )));
            }
        }

        Ok(())
    }

    /// Debounce window for modify events.
    #[must_use]
    pub const fn modify_debounce(&self) -> Duration {
        Duration::from_millis(self.modify_debounce_ms)
    }

    /// Debounce window for branch switches.
    #[must_use]
    pub const fn branch_debounce(&self) -> Duration {
        Duration::from_millis(self.branch_debounce_ms)
    }
}
