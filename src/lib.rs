//! MCP Observability Sidecar Proxy
//!
//! A transparent reverse proxy placed alongside a single MCP server. It
//! forwards every request and response byte-for-byte, deriving Prometheus
//! metrics and structured logs from the traffic it observes — no retries,
//! no auth, no caching, no multi-backend routing.

pub mod config;
pub mod daemon;
pub mod error;
pub mod health;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod proxy;
pub mod sse;

pub use config::ProxyConfig;
pub use error::{Error, Result};
pub use proxy::ProxyServer;
