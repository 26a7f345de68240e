//! Request forwarding: rewrite, dial, and hand off to the capture layer.
//! No retries, no caching, no auth — everything not named here is out of
//! scope by design.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Request, Response, Uri};
use axum::response::IntoResponse;
use tracing::{info, warn};

use crate::error::Error;
use crate::mcp;
use crate::metrics::MetricsRecorder;
use crate::proxy::server::AppState;

const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that describe a hop, not the message, and must never be
/// forwarded verbatim to the next hop.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Increments `mcp_active_connections` on construction, decrements on drop,
/// so every return path out of `forward` — success, upstream-dial failure,
/// or response-build failure — balances the gauge exactly once.
struct ActiveConnectionGuard<'a>(&'a MetricsRecorder);

impl<'a> ActiveConnectionGuard<'a> {
    fn new(metrics: &'a MetricsRecorder) -> Self {
        metrics.connection_started();
        Self(metrics)
    }
}

impl Drop for ActiveConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.connection_finished();
    }
}

/// Catch-all handler: every inbound request, regardless of path, is
/// forwarded to the single configured upstream.
pub async fn handle(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    forward(state, request).await
}

async fn forward(state: AppState, request: Request<Body>) -> Response<Body> {
    let started_at = Instant::now();
    let _connection_guard = ActiveConnectionGuard::new(&state.metrics);

    let (parts, body) = request.into_parts();
    let client_addr = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let body_bytes = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return error_response(
                &state.metrics,
                "unknown",
                started_at,
                "failed to read request body",
            );
        },
    };
    state.metrics.record_request_size(body_bytes.len());

    let parsed_request = mcp::parse_request(&body_bytes).ok();
    let mcp_method = parsed_request
        .as_ref()
        .map(|p| p.method.clone())
        .unwrap_or_else(|| "unknown".to_string());
    if parsed_request.is_none() {
        warn!("request body did not parse as JSON-RPC; forwarding unchanged, method=unknown");
    }
    if let Some(parsed) = &parsed_request {
        if let Some(tool_name) = &parsed.tool_name {
            state.metrics.record_tool_call(tool_name);
        }
        if let Some(resource_uri) = &parsed.resource_uri {
            state.metrics.record_resource_read(resource_uri);
        }
    }

    let upstream_url = match rewrite_url(&parts.uri, &state.config.target_addr.to_string()) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "failed to rewrite upstream URL");
            return error_response(
                &state.metrics,
                &mcp_method,
                started_at,
                "failed to rewrite upstream URL",
            );
        },
    };

    let mut upstream_req = state
        .http_client
        .request(parts.method.clone(), upstream_url)
        .body(body_bytes.to_vec());
    for (name, value) in parts.headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        upstream_req = upstream_req.header(name, value);
    }
    upstream_req = inject_forwarded_headers(upstream_req, &parts.headers, &client_addr);

    let upstream_response = match upstream_req.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "failed to reach upstream");
            return error_response(
                &state.metrics,
                &mcp_method,
                started_at,
                &format!("failed to reach upstream: {e}"),
            );
        },
    };

    let captured = match crate::proxy::capture::capture(
        &parts.method,
        upstream_response,
        mcp_method.clone(),
        state.metrics.clone(),
    )
    .await
    {
        Ok(captured) => captured,
        Err(e) => {
            warn!(error = %e, "failed reading upstream response");
            return error_response(
                &state.metrics,
                &mcp_method,
                started_at,
                "upstream read failed",
            );
        },
    };

    if let Some(raw) = &captured.buffered_bytes {
        state.metrics.record_response_size(raw.len());
        if let Ok(parsed_response) = mcp::parse_response(raw) {
            if let Some(code) = parsed_response.error_code {
                state.metrics.record_request_error(&mcp_method, &code.to_string());
            }
        }
    }

    let status_label = captured.status.as_u16().to_string();
    state.metrics.record_request(&status_label, &mcp_method);
    state.metrics.record_duration(started_at.elapsed());

    info!(
        method = %parts.method,
        mcp_method = %mcp_method,
        status = captured.status.as_u16(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        is_sse = captured.is_sse,
        "request forwarded"
    );

    let mut response = Response::builder().status(captured.status);
    for (name, value) in captured.headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        response = response.header(name, value);
    }
    match response.body(captured.body) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "failed to build response");
            Error::Server(format!("failed to build response: {e}")).into_response()
        },
    }
}

/// Builds the client-visible error response for a request that never made
/// it to capture, recording `requests_total` and duration exactly once
/// along the way, matching the bookkeeping the success path does. Every
/// caller here hits an upstream-side failure, so the status is always 502.
fn error_response(
    metrics: &MetricsRecorder,
    mcp_method: &str,
    started_at: Instant,
    message: &str,
) -> Response<Body> {
    let error = Error::UpstreamDial(message.to_string());
    metrics.record_request(&error.status_code().as_u16().to_string(), mcp_method);
    metrics.record_duration(started_at.elapsed());
    error.into_response()
}

fn rewrite_url(uri: &Uri, target_addr: &str) -> crate::error::Result<String> {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Ok(format!("http://{target_addr}{path_and_query}"))
}

fn inject_forwarded_headers(
    builder: reqwest::RequestBuilder,
    original: &HeaderMap,
    client_addr: &str,
) -> reqwest::RequestBuilder {
    let existing_for = original
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let forwarded_for = match existing_for {
        Some(existing) => format!("{existing}, {client_addr}"),
        None => client_addr.to_string(),
    };

    builder
        .header(HeaderName::from_static("x-forwarded-for"), forwarded_for)
        .header(HeaderName::from_static("x-forwarded-proto"), "http")
        .header(HeaderName::from_static("x-forwarded-host"), client_addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_url_preserves_path_and_query() {
        let uri: Uri = "/mcp/tools/call?foo=bar".parse().unwrap();
        let rewritten = rewrite_url(&uri, "127.0.0.1:9000").unwrap();
        assert_eq!(rewritten, "http://127.0.0.1:9000/mcp/tools/call?foo=bar");
    }

    #[test]
    fn rewrite_url_defaults_to_root_path() {
        let uri: Uri = "/".parse().unwrap();
        let rewritten = rewrite_url(&uri, "127.0.0.1:9000").unwrap();
        assert_eq!(rewritten, "http://127.0.0.1:9000/");
    }
}
