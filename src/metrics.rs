//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Files currently present in the local mirror.
pub static FILES_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tidemark_files_tracked",
        "Number of files recorded in the local index mirror"
    )
    .unwrap()
});

/// Files handed to the sink for indexing.
pub static FILES_INDEXED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tidemark_files_indexed_total",
        "Total number of files sent to the index sink"
    )
    .unwrap()
});

/// Files removed from the index.
pub static FILES_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tidemark_files_removed_total",
        "Total number of files removed from the index sink"
    )
    .unwrap()
});

/// Sink batch calls by outcome.
pub static BATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tidemark_batches_total",
        "Total number of batch index calls",
        &["outcome"]
    )
    .unwrap()
});

/// Paths waiting in the indexing queue.
pub static PENDING_PATHS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tidemark_pending_paths",
        "Number of paths waiting in the indexing queue"
    )
    .unwrap()
});

/// Completed full rescans by trigger.
pub static RESCANS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tidemark_rescans_total",
        "Total number of full rescans",
        &["trigger"]
    )
    .unwrap()
});

/// Rescans dropped because another was in flight.
pub static RESCANS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tidemark_rescans_dropped_total",
        "Total number of rescan requests dropped while another scan was running"
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*FILES_TRACKED;
    let _ = &*FILES_INDEXED;
    let _ = &*FILES_REMOVED;
    let _ = &*BATCHES;
    let _ = &*PENDING_PATHS;
    let _ = &*RESCANS;
    let _ = &*RESCANS_DROPPED;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render all registered metrics in the Prometheus text format.
#[must_use]
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
