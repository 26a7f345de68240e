//! MCP message parsing: best-effort JSON-RPC 2.0 decoding used purely to
//! label metrics and log lines. Parsing never blocks or mutates the bytes
//! that get forwarded to the client.

mod message;

pub use message::{
    is_known_method, method_category, parse_request, parse_response, JsonRpcId, ParsedRequest,
    ParsedResponse,
};
