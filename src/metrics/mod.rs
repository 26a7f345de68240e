//! Prometheus instrumentation. One registration block for the full
//! instrument set, a thin recorder facade the proxy engine calls into, and
//! a text-format exporter for the `/metrics` scrape handler.
//!
//! Instrument names and label sets here are a stable wire contract: anything
//! scraping this endpoint names these metrics exactly, so renaming one is a
//! breaking change, not a refactor.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_counter, register_counter_vec, register_gauge,
    register_gauge_vec, register_histogram, register_histogram_vec, Counter, CounterVec, Encoder,
    Gauge, GaugeVec, Histogram, HistogramVec, Registry, TextEncoder,
};

use crate::error::{Error, Result};

lazy_static! {
    pub static ref PROXY_INFO: GaugeVec = register_gauge_vec!(
        opts!("mcp_proxy_info", "Static build and configuration info, value is always 1"),
        &["version", "target"]
    )
    .unwrap();

    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        opts!("mcp_requests_total", "Total MCP requests received from clients"),
        &["status", "method"]
    )
    .unwrap();

    pub static ref REQUEST_DURATION_SECONDS: Histogram = register_histogram!(histogram_opts!(
        "mcp_request_duration_seconds",
        "End-to-end request duration as observed by the proxy",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ))
    .unwrap();

    pub static ref REQUEST_SIZE_BYTES: Histogram = register_histogram!(histogram_opts!(
        "mcp_request_size_bytes",
        "Size of the captured request body",
        vec![100.0, 1000.0, 10000.0, 100000.0, 1000000.0]
    ))
    .unwrap();

    pub static ref RESPONSE_SIZE_BYTES: Histogram = register_histogram!(histogram_opts!(
        "mcp_response_size_bytes",
        "Size of the captured response body",
        vec![100.0, 1000.0, 10000.0, 100000.0, 1000000.0]
    ))
    .unwrap();

    pub static ref ACTIVE_CONNECTIONS: Gauge = register_gauge!(
        "mcp_active_connections",
        "In-flight requests currently being forwarded"
    )
    .unwrap();

    pub static ref TOOL_CALLS_TOTAL: CounterVec = register_counter_vec!(
        opts!("mcp_tool_calls_total", "Total tools/call invocations observed"),
        &["tool_name"]
    )
    .unwrap();

    pub static ref RESOURCE_READS_TOTAL: CounterVec = register_counter_vec!(
        opts!("mcp_resource_reads_total", "Total resources/read invocations observed"),
        &["resource_uri"]
    )
    .unwrap();

    pub static ref REQUEST_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        opts!("mcp_request_errors_total", "Total JSON-RPC error responses observed"),
        &["method", "error_code"]
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_TOTAL: Counter = register_counter!(
        "mcp_sse_connections_total",
        "Total long-lived SSE connections opened (GET requests answered with text/event-stream)"
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: Gauge = register_gauge!(
        "mcp_sse_connections_active",
        "Long-lived SSE connections currently open"
    )
    .unwrap();

    pub static ref SSE_CONNECTION_DURATION_SECONDS: Histogram = register_histogram!(histogram_opts!(
        "mcp_sse_connection_duration_seconds",
        "Lifetime of a long-lived SSE connection, from first byte to close",
        vec![0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    ))
    .unwrap();

    pub static ref SSE_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        opts!("mcp_sse_events_total", "Total SSE events parsed out of streaming upstream responses"),
        &["event_type"]
    )
    .unwrap();

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry.register(Box::new(PROXY_INFO.clone())).unwrap();
        registry.register(Box::new(REQUESTS_TOTAL.clone())).unwrap();
        registry.register(Box::new(REQUEST_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(REQUEST_SIZE_BYTES.clone())).unwrap();
        registry.register(Box::new(RESPONSE_SIZE_BYTES.clone())).unwrap();
        registry.register(Box::new(ACTIVE_CONNECTIONS.clone())).unwrap();
        registry.register(Box::new(TOOL_CALLS_TOTAL.clone())).unwrap();
        registry.register(Box::new(RESOURCE_READS_TOTAL.clone())).unwrap();
        registry.register(Box::new(REQUEST_ERRORS_TOTAL.clone())).unwrap();
        registry.register(Box::new(SSE_CONNECTIONS_TOTAL.clone())).unwrap();
        registry.register(Box::new(SSE_CONNECTIONS_ACTIVE.clone())).unwrap();
        registry.register(Box::new(SSE_CONNECTION_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(SSE_EVENTS_TOTAL.clone())).unwrap();
        registry
    };
}

/// Thin facade the proxy engine and health checker call into, so call
/// sites never reference the `lazy_static` instruments directly.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Stamps the one-shot build-info gauge. Called once at startup.
    pub fn set_info(&self, version: &str, target: &str) {
        PROXY_INFO.with_label_values(&[version, target]).set(1.0);
    }

    /// Recorded exactly once per inbound request, regardless of SSE vs
    /// buffered or upstream success vs failure, with the final HTTP status
    /// and the MCP method (or `"unknown"`).
    pub fn record_request(&self, status: &str, method: &str) {
        REQUESTS_TOTAL.with_label_values(&[status, method]).inc();
    }

    pub fn record_duration(&self, duration: Duration) {
        REQUEST_DURATION_SECONDS.observe(duration.as_secs_f64());
    }

    /// Size histograms are observed only when strictly positive.
    pub fn record_request_size(&self, bytes: usize) {
        if bytes > 0 {
            REQUEST_SIZE_BYTES.observe(bytes as f64);
        }
    }

    pub fn record_response_size(&self, bytes: usize) {
        if bytes > 0 {
            RESPONSE_SIZE_BYTES.observe(bytes as f64);
        }
    }

    pub fn connection_started(&self) {
        ACTIVE_CONNECTIONS.inc();
    }

    pub fn connection_finished(&self) {
        ACTIVE_CONNECTIONS.dec();
    }

    pub fn record_tool_call(&self, tool_name: &str) {
        TOOL_CALLS_TOTAL.with_label_values(&[tool_name]).inc();
    }

    pub fn record_resource_read(&self, resource_uri: &str) {
        RESOURCE_READS_TOTAL.with_label_values(&[resource_uri]).inc();
    }

    pub fn record_request_error(&self, method: &str, error_code: &str) {
        REQUEST_ERRORS_TOTAL.with_label_values(&[method, error_code]).inc();
    }

    /// Opens one long-lived SSE connection: fires `sse_connections_total`
    /// once and moves `sse_connections_active` up by one. Only called for
    /// the GET + `text/event-stream` case; POST Streamable HTTP replies
    /// never reach this.
    pub fn sse_connection_opened(&self) {
        SSE_CONNECTIONS_TOTAL.inc();
        SSE_CONNECTIONS_ACTIVE.inc();
    }

    /// Closes the connection opened by `sse_connection_opened`, symmetric by
    /// construction: every open has exactly one close, driven by the
    /// capture stream's drop guard so it fires regardless of how the stream
    /// ended.
    pub fn sse_connection_closed(&self, duration: Duration) {
        SSE_CONNECTIONS_ACTIVE.dec();
        SSE_CONNECTION_DURATION_SECONDS.observe(duration.as_secs_f64());
    }

    pub fn record_sse_event(&self, event_type: &str) {
        SSE_EVENTS_TOTAL.with_label_values(&[event_type]).inc();
    }

    /// Renders the current registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| Error::Server(format!("failed to encode metrics: {e}")))?;
        Ok(buffer)
    }

    /// Nothing to flush: the registry is process-local and in-memory, so
    /// shutdown is just a log marker for the staged-shutdown sequence.
    pub async fn shutdown(&self, deadline: Duration) {
        tracing::debug!(?deadline, "metrics recorder has no state to drain");
    }
}
