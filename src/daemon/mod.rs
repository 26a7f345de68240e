//! Process lifecycle: signal handling for graceful shutdown. The proxy
//! always runs in the foreground of its container, so there is no
//! daemonization, PID file, or `start`/`stop` process-management surface
//! here — just the signal-to-shutdown-token wiring `main.rs` uses.

pub mod signals;
