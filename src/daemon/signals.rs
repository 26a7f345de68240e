//! Signal handling for graceful shutdown.
//!
//! SIGINT/SIGTERM cancel a root [`CancellationToken`]; every long-running
//! task (proxy listener, metrics listener, health checker) watches the
//! same token and winds down on its own schedule from there.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawns the signal watcher and returns the root token it will cancel.
#[cfg(unix)]
pub fn setup_signal_handlers() -> CancellationToken {
    use tokio::signal::unix::{signal, SignalKind};

    let token = CancellationToken::new();
    let watcher_token = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("received SIGINT, initiating graceful shutdown");
            }
        }

        watcher_token.cancel();
    });

    token
}

/// Windows has no SIGTERM; Ctrl+C is the only signal worth watching.
#[cfg(windows)]
pub fn setup_signal_handlers() -> CancellationToken {
    use tokio::signal;

    let token = CancellationToken::new();
    let watcher_token = token.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, initiating graceful shutdown");
            watcher_token.cancel();
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_starts_uncancelled() {
        let token = setup_signal_handlers();
        assert!(!token.is_cancelled());
    }
}
