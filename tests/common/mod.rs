//! Shared test harness: boots a real proxy instance bound to ephemeral
//! ports in front of a caller-supplied upstream address.

use std::net::SocketAddr;
use std::time::Duration;

use mcp_observability_proxy::config::ProxyConfig;
use mcp_observability_proxy::ProxyServer;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestProxy {
    pub proxy_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    shutdown: CancellationToken,
    proxy_handle: tokio::task::JoinHandle<()>,
    metrics_handle: tokio::task::JoinHandle<()>,
}

impl TestProxy {
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.proxy_addr)
    }

    pub fn metrics_url(&self) -> String {
        format!("http://{}", self.metrics_addr)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.proxy_handle.abort();
        self.metrics_handle.abort();
    }
}

/// Starts a proxy in front of `target_addr` with a short health-check
/// interval, and waits until both listeners are accepting connections.
pub async fn start_proxy(target_addr: SocketAddr) -> TestProxy {
    let proxy_addr = free_addr().await;
    let metrics_addr = free_addr().await;

    let config = ProxyConfig {
        listen_addr: proxy_addr,
        target_addr,
        metrics_addr,
        log_level: "info".to_string(),
        health_check_interval: Duration::from_millis(100),
        tls: None,
    };

    let server = std::sync::Arc::new(ProxyServer::new(config).expect("failed to build proxy"));
    let shutdown = CancellationToken::new();

    let proxy_handle = tokio::spawn({
        let server = server.clone();
        let token = shutdown.clone();
        async move {
            let _ = server.run_proxy(token, Duration::from_secs(1)).await;
        }
    });
    let metrics_handle = tokio::spawn({
        let server = server.clone();
        let token = shutdown.clone();
        async move {
            let _ = server.run_metrics(token, Duration::from_secs(1)).await;
        }
    });

    wait_until_accepting(proxy_addr).await;
    wait_until_accepting(metrics_addr).await;

    TestProxy {
        proxy_addr,
        metrics_addr,
        shutdown,
        proxy_handle,
        metrics_handle,
    }
}

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    listener.local_addr().expect("read local addr")
}

async fn wait_until_accepting(addr: SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("listener at {addr} never came up");
}

pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build test HTTP client")
}
