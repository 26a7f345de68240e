//! Response capture: the point where an upstream response becomes either a
//! fully-buffered reply or a long-lived SSE stream.
//!
//! The state machine is `Fresh -> Buffered -> Done` for an ordinary
//! response, or `Fresh -> Streaming-SSE -> Closed-SSE` for one classified
//! as event-stream traffic. The classifier fires exactly once, the instant
//! the upstream status and headers are in hand: `(request method == GET)
//! AND (response content-type starts with "text/event-stream")`. Everything
//! after that point is either a single buffered copy or a chunk-by-chunk
//! passthrough; there is no third path.
//!
//! The `Streaming-SSE -> Closed-SSE` transition is driven by `StreamGuard`'s
//! `Drop` impl rather than an explicit close call, so it fires exactly once
//! whether the stream ends cleanly, the client disconnects, or upstream
//! errors mid-body.

use std::time::Instant;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::mcp;
use crate::metrics::MetricsRecorder;
use crate::sse::SseFramer;

const MAX_BUFFERED_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub is_sse: bool,
    /// The raw buffered bytes, for a second pass of MCP response parsing in
    /// `forward.rs`. `None` for a streaming SSE response, whose body is
    /// never fully held in memory.
    pub buffered_bytes: Option<Bytes>,
}

/// Classifies and captures an upstream `reqwest::Response`, producing the
/// response this proxy sends to the client.
pub async fn capture(
    request_method: &Method,
    upstream: reqwest::Response,
    mcp_method: String,
    metrics: MetricsRecorder,
) -> crate::error::Result<CapturedResponse> {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let is_sse = request_method == Method::GET && content_type_is_event_stream(&headers);

    if is_sse {
        debug!(mcp_method = %mcp_method, "classified response as streaming SSE");
        let body = stream_sse(upstream, mcp_method, metrics);
        Ok(CapturedResponse {
            status,
            headers,
            body: Body::from_stream(body),
            is_sse: true,
            buffered_bytes: None,
        })
    } else {
        let bytes = buffer_body(upstream).await?;
        Ok(CapturedResponse {
            status,
            headers,
            body: Body::from(bytes.clone()),
            is_sse: false,
            buffered_bytes: Some(bytes),
        })
    }
}

fn content_type_is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("text/event-stream"))
        .unwrap_or(false)
}

async fn buffer_body(response: reqwest::Response) -> crate::error::Result<Bytes> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| crate::error::Error::UpstreamRead(e.to_string()))?;
    if bytes.len() > MAX_BUFFERED_BODY_BYTES {
        warn!(bytes = bytes.len(), "buffered response exceeds soft cap");
    }
    Ok(bytes)
}

/// Drives the framer and the chunk-forwarding together, and fires the
/// close-side metrics exactly once via `Drop` no matter how the stream ends.
/// Opening is paired one-to-one with this guard's construction.
struct StreamGuard {
    metrics: MetricsRecorder,
    started_at: Instant,
    events_seen: u64,
    close_reason: &'static str,
}

impl StreamGuard {
    fn new(metrics: MetricsRecorder) -> Self {
        metrics.sse_connection_opened();
        Self {
            metrics,
            started_at: Instant::now(),
            events_seen: 0,
            close_reason: "client_disconnect",
        }
    }

    fn mark_clean_close(&mut self) {
        self.close_reason = "upstream_closed";
    }

    fn mark_error(&mut self) {
        self.close_reason = "upstream_error";
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.metrics.sse_connection_closed(self.started_at.elapsed());
        debug!(
            events = self.events_seen,
            reason = self.close_reason,
            "SSE stream closed"
        );
    }
}

fn stream_sse(
    response: reqwest::Response,
    mcp_method: String,
    metrics: MetricsRecorder,
) -> impl futures_util::Stream<Item = std::result::Result<Bytes, std::io::Error>> {
    stream! {
        let mut guard = StreamGuard::new(metrics.clone());
        let mut framer = SseFramer::new();
        let mut upstream = response.bytes_stream();

        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    for event in framer.push(&chunk) {
                        guard.events_seen += 1;
                        metrics.record_sse_event(event.event.as_deref().unwrap_or("message"));
                        record_event_payload_metrics(&event.data, &mcp_method, &metrics);
                    }
                    yield Ok(chunk);
                }
                Some(Err(e)) => {
                    guard.mark_error();
                    yield Err(std::io::Error::other(e.to_string()));
                    break;
                }
                None => {
                    guard.mark_clean_close();
                    break;
                }
            }
        }
    }
}

/// Re-parses one SSE event's `data` payload as MCP JSON-RPC, first as a
/// request then as a response, to keep tool-call/resource-read/error
/// metrics flowing for long-lived streams the same way they do for
/// buffered replies. Parse failures are silently ignored — not every event
/// payload is a JSON-RPC envelope.
fn record_event_payload_metrics(data: &str, mcp_method: &str, metrics: &MetricsRecorder) {
    if let Ok(request) = mcp::parse_request(data.as_bytes()) {
        if let Some(tool_name) = request.tool_name {
            metrics.record_tool_call(&tool_name);
        }
        if let Some(resource_uri) = request.resource_uri {
            metrics.record_resource_read(&resource_uri);
        }
        return;
    }
    if let Ok(response) = mcp::parse_response(data.as_bytes()) {
        if let Some(code) = response.error_code {
            metrics.record_request_error(mcp_method, &code.to_string());
        }
    }
}
