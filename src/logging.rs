//! Structured logging setup.
//!
//! One subscriber, initialized once at startup from `--log-level`,
//! overridable per-module with `RUST_LOG`. Every request gets one log line
//! on completion (method, path, status, duration, MCP method, SSE flag,
//! bytes in/out); lifecycle events (startup, shutdown stages, TLS load,
//! health transitions) are logged where they occur.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber. `default_level` is the
/// `--log-level` flag value; `RUST_LOG` always wins when set.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).json())
        .init();
}
