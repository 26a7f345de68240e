//! Error types for the proxy, one variant per row of the error-kind table.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy. Every failure either updates a metric, emits a
/// log line, or both; none of these are retried inside the proxy.
#[derive(Error, Debug)]
pub enum Error {
    /// TLS file missing, unsupported TLS version, unparseable listen/target address.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to open a connection to the upstream MCP server.
    #[error("failed to reach upstream: {0}")]
    UpstreamDial(String),

    /// Upstream connection dropped or errored while a response was in flight.
    #[error("upstream read failed: {0}")]
    UpstreamRead(String),

    /// The SSE framer's internal line-scanner failed (should be unreachable
    /// for well-formed byte streams; recorded for visibility).
    #[error("SSE stream error: {0}")]
    SseStream(String),

    /// Server bind/listen failure, either the proxy listener or metrics listener.
    #[error("server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status code for errors that still have headers left to send. SSE
    /// mid-stream errors never reach this path; by the time the framer sees
    /// bytes, the 200 has already gone out.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UpstreamDial(_) | Error::UpstreamRead(_) | Error::SseStream(_) => {
                StatusCode::BAD_GATEWAY
            },
            Error::Config(_) | Error::Server(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            },
            "id": null
        }));
        (status, body).into_response()
    }
}

/// Non-fatal MCP body parse failures. These never abort the request: on a
/// parse failure the proxy still forwards the bytes untouched and logs the
/// MCP method as `"unknown"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpParseError {
    #[error("empty body")]
    EmptyBody,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("not a JSON-RPC 2.0 envelope: {0}")]
    InvalidFormat(String),
}
