//! Server assembly: shared state, the two routers (proxy + metrics/health),
//! and the listener tasks main.rs wires up under the root shutdown token.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::health::HealthChecker;
use crate::metrics::MetricsRecorder;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub http_client: reqwest::Client,
    pub metrics: MetricsRecorder,
    pub health: Arc<HealthChecker>,
}

pub struct ProxyServer {
    state: AppState,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                crate::error::Error::Config(format!("failed to build HTTP client: {e}"))
            })?;

        let metrics = MetricsRecorder::new();
        metrics.set_info(env!("CARGO_PKG_VERSION"), &config.target_addr.to_string());

        let health = HealthChecker::new(config.target_addr.to_string(), config.health_check_interval);

        Ok(Self {
            state: AppState {
                config: Arc::new(config),
                http_client,
                metrics,
                health,
            },
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Binds and serves the client-facing proxy listener until `shutdown`
    /// fires, then drains in-flight requests for up to `grace`. Serves
    /// plain HTTP, or TLS when `--tls-enabled` was set at startup.
    pub async fn run_proxy(&self, shutdown: CancellationToken, grace: Duration) -> Result<()> {
        let addr = self.state.config.listen_addr;
        let router = build_proxy_router(self.state.clone());

        match &self.state.config.tls {
            Some(tls) => serve_tls(addr, router, tls, shutdown, grace).await,
            None => serve(addr, router, shutdown, grace, "proxy").await,
        }
    }

    /// Binds and serves `/metrics`, `/healthz`, `/readyz` until `shutdown`
    /// fires.
    pub async fn run_metrics(&self, shutdown: CancellationToken, grace: Duration) -> Result<()> {
        let addr = self.state.config.metrics_addr;
        let router = build_metrics_router(self.state.clone());
        serve(addr, router, shutdown, grace, "metrics").await
    }
}

async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
    name: &'static str,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        crate::error::Error::Server(format!("failed to bind {name} listener on {addr}: {e}"))
    })?;
    info!(%addr, listener = name, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!(listener = name, grace_seconds = grace.as_secs(), "draining connections");
        })
        .await
        .map_err(|e| crate::error::Error::Server(format!("{name} listener failed: {e}")))
}

async fn serve_tls(
    addr: SocketAddr,
    router: Router,
    tls: &crate::config::TlsConfig,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let server_config = crate::config::load_rustls_config(tls)?;
    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(server_config));
    let handle = axum_server::Handle::new();
    info!(%addr, listener = "proxy", tls = true, "listening");

    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            info!(listener = "proxy", grace_seconds = grace.as_secs(), "draining connections");
            handle.graceful_shutdown(Some(grace));
        }
    });

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|e| crate::error::Error::Server(format!("proxy TLS listener failed: {e}")))
}

/// No `TimeoutLayer` here: spec requires no write timeout on the
/// client-facing listener, since a GET + SSE response can stay open
/// indefinitely. `TraceLayer` is safe since it only logs, never bounds
/// connection lifetime.
fn build_proxy_router(state: AppState) -> Router {
    Router::new()
        .fallback(any(crate::proxy::forward::handle))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn build_metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", any(metrics_handler))
        .route("/healthz", any(healthz_handler))
        .route("/readyz", any(readyz_handler))
        .layer(
            ServiceBuilder::new()
                .layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(10)))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    match state.metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to export metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to export metrics").into_response()
        },
    }
}

/// Liveness: the process is up and answering HTTP at all. Never reflects
/// upstream health.
async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "uptime_seconds": state.health.uptime().as_secs_f64(),
        })),
    )
}

/// Readiness: reflects the last upstream probe. A caller using this to
/// gate traffic (e.g. a Kubernetes readiness probe) will stop sending
/// traffic here the moment the upstream stops answering.
async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.health.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let status_label = if ready { "healthy" } else { "unhealthy" };

    let target = match state.health.last_probe().await {
        Some(probe) => json!({
            "status": if probe.last_error.is_none() { "up" } else { "down" },
            "latency_ms": probe.last_latency.as_secs_f64() * 1000.0,
            "last_check": probe.last_check_time.to_rfc3339(),
            "error": probe.last_error,
        }),
        None => json!({
            "status": "down",
            "latency_ms": 0.0,
            "last_check": null,
            "error": "no probe has run yet",
        }),
    };

    (
        status,
        Json(json!({
            "status": status_label,
            "uptime_seconds": state.health.uptime().as_secs_f64(),
            "checks": { "target": target },
        })),
    )
}
