//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels (`RUST_LOG` takes precedence)
//! - Spans for scans and sink batches

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// # Panics
///
/// Panics if a tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span constructors shared by the engine.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering one full scan of a workspace root.
    #[must_use]
    pub fn scan_span(root: &Path, trigger: &str) -> Span {
        info_span!("scan", root = %root.display(), trigger = %trigger)
    }

    /// Span covering one drain cycle of the indexing queue.
    #[must_use]
    pub fn batch_span(size: usize) -> Span {
        info_span!("index_batch", size = size)
    }
}
