//! Tidemark - incremental file indexing
//!
//! Entry point for the indexing daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tidemark::metrics::{gather_text, init_metrics};
use tidemark::observability::init_tracing;
use tidemark::sink::{IndexSink, JsonLinesSink, LogSink};
use tidemark::{Engine, EngineConfig, Error, Result};

/// Where indexing calls go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Log every call
    Log,
    /// Write one JSON record per call to stdout
    Jsonl,
}

/// Tidemark - keep an index in sync with your workspace
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace roots to index
    #[arg(short, long = "root", env = "TIDEMARK_ROOTS", value_delimiter = ',')]
    roots: Vec<PathBuf>,

    /// Only index files matching this glob (relative to the root)
    #[arg(short, long, env = "TIDEMARK_INCLUDE")]
    include: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "TIDEMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Sink receiving index calls
    #[arg(long, env = "TIDEMARK_SINK", value_enum, default_value = "log")]
    sink: SinkKind,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIDEMARK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "TIDEMARK_LOG_JSON")]
    log_json: bool,

    /// Index once and exit instead of watching
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("Tidemark v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if !cli.roots.is_empty() {
        config.roots = cli.roots;
    }
    if cli.include.is_some() {
        config.include_glob = cli.include;
    }
    if config.roots.is_empty() {
        return Err(Error::config("at least one --root is required"));
    }
    if cli.once {
        config.watch_filesystem = false;
    }

    tracing::debug!(?config, "Configuration loaded");

    init_metrics();

    let sink: Arc<dyn IndexSink> = match cli.sink {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Jsonl => Arc::new(JsonLinesSink::new(std::io::stdout())),
    };

    let engine = Engine::new(config, sink)?;
    engine.initialize().await?;

    if !cli.once {
        tracing::info!("Watching for changes, press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    engine.dispose();

    let stats = engine.stats();
    tracing::info!(
        indexed = stats.files_indexed,
        removed = stats.files_removed,
        rescans = stats.rescans,
        "Shutting down"
    );
    tracing::debug!(metrics = %gather_text(), "Final metrics");

    Ok(())
}
