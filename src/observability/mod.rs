//! Logging initialization.
//!
//! Counters and histograms are emitted through the `metrics` facade at the
//! call sites; wiring an exporter is the embedder's choice. This module
//! only owns the tracing subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console output.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to
/// `askbase=info`. Safe to call once per process; later calls are no-ops.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("askbase=info"));

    match format {
        LogFormat::Pretty => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init();
        },
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .try_init();
        },
    }
}
