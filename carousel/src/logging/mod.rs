//! Log capture and process diagnostics.
//!
//! Two separate channels live here:
//!
//! - **Run log** ([`LogSink`], [`LogWriter`]): text produced by stage
//!   executors, sanitized and forwarded to the observer line by line.
//! - **Diagnostics** ([`init_tracing`]): the coordinator's own `tracing`
//!   events, written to stderr and filtered through `RUST_LOG`. Passing a
//!   sink mirrors them into the run log as well.

mod layer;
mod sanitize;
mod sink;

pub use layer::LogSinkLayer;
pub use sanitize::sanitize;
pub use sink::{LogFallback, LogLine, LogSink, LogSinkMetrics, LogWriter};

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_directive` (e.g. `"info"`).
/// Output goes to stderr in compact format. When `sink` is given, events are
/// also forwarded into it through a [`LogSinkLayer`].
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Example
/// ```bash
/// RUST_LOG=carousel=debug cargo run
/// ```
pub fn init_tracing(default_directive: &str, sink: Option<LogSink>) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(sink.map(LogSinkLayer::new))
        .try_init()
}
