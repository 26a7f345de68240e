//! The proxy engine: a transparent reverse proxy in front of one upstream
//! MCP server. `capture` classifies and relays the upstream response,
//! `forward` rewrites and dials the request, `server` wires both into the
//! two listeners (client traffic, metrics/health).

pub mod capture;
pub mod forward;
pub mod server;

pub use server::{AppState, ProxyServer};
