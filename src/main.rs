//! MCP observability sidecar proxy — entry point.
//!
//! Binds two listeners (client traffic, metrics/health), starts the
//! background health checker, and waits for SIGINT/SIGTERM to run a staged
//! shutdown: proxy listener drains first, then the metrics listener, then
//! the metrics recorder itself.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mcp_observability_proxy::config::{Cli, ProxyConfig};
use mcp_observability_proxy::daemon::signals::setup_signal_handlers;
use mcp_observability_proxy::{logging, ProxyServer, Result};

const PROXY_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const METRICS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const RECORDER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = ProxyConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        target_addr = %config.target_addr,
        metrics_addr = %config.metrics_addr,
        "starting mcp-observability-proxy"
    );

    let server = Arc::new(ProxyServer::new(config)?);
    let root_shutdown = setup_signal_handlers();
    let proxy_token = CancellationToken::new();
    let metrics_token = CancellationToken::new();

    let health_handle = server.state().health.clone().spawn(root_shutdown.clone());

    let proxy_task = tokio::spawn({
        let server = server.clone();
        let token = proxy_token.clone();
        async move { server.run_proxy(token, PROXY_SHUTDOWN_GRACE).await }
    });
    let metrics_task = tokio::spawn({
        let server = server.clone();
        let token = metrics_token.clone();
        async move { server.run_metrics(token, METRICS_SHUTDOWN_GRACE).await }
    });

    root_shutdown.cancelled().await;
    info!("shutdown signal received, draining proxy listener");
    proxy_token.cancel();
    await_stage(proxy_task, PROXY_SHUTDOWN_GRACE, "proxy").await;

    info!("draining metrics listener");
    metrics_token.cancel();
    await_stage(metrics_task, METRICS_SHUTDOWN_GRACE, "metrics").await;

    info!("stopping metrics recorder");
    server.state().metrics.shutdown(RECORDER_SHUTDOWN_GRACE).await;

    if let Err(e) = health_handle.await {
        error!(error = %e, "health checker task panicked");
    }

    info!("shutdown complete");
    Ok(())
}

async fn await_stage(
    task: tokio::task::JoinHandle<Result<()>>,
    grace: Duration,
    name: &'static str,
) {
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(Ok(()))) => {},
        Ok(Ok(Err(e))) => error!(listener = name, error = %e, "listener exited with an error"),
        Ok(Err(e)) => error!(listener = name, error = %e, "listener task panicked"),
        Err(_) => warn!(listener = name, "listener did not drain within its grace period"),
    }
}
