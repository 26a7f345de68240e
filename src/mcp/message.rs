//! JSON-RPC 2.0 envelope parsing for MCP requests and responses.
//!
//! The proxy never needs to reconstruct the body it forwards — bytes go
//! through unchanged — so parsing here exists purely to pull out labels for
//! metrics and log lines. A parse failure is never fatal: `forward.rs` falls
//! back to `"unknown"` for the method label and keeps going.

use serde_json::Value;

use crate::error::McpParseError;

/// The closed set of MCP methods this proxy recognizes by name. Anything
/// outside this set is still forwarded and labeled, just not considered
/// "known" for classification purposes.
const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "notifications/initialized",
    "ping",
    "tools/list",
    "tools/call",
    "resources/list",
    "resources/read",
    "resources/templates/list",
    "resources/subscribe",
    "resources/unsubscribe",
    "prompts/list",
    "prompts/get",
    "logging/setLevel",
    "completion/complete",
];

/// Whether `name` is one of the fixed MCP method names this proxy knows
/// about, as opposed to an extension method some server chose to support.
pub fn is_known_method(name: &str) -> bool {
    KNOWN_METHODS.contains(&name)
}

/// The JSON-RPC `id` field, modeled so its syntactic kind survives
/// inspection: a request with a string id, a numeric id, an explicit
/// `null` id (a notification-shaped response, or a client being sloppy),
/// and a field that was absent entirely are all distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcId {
    String(String),
    Number(serde_json::Number),
    Null,
    Absent,
}

impl JsonRpcId {
    fn from_field(value: Option<&Value>) -> Result<Self, McpParseError> {
        match value {
            None => Ok(JsonRpcId::Absent),
            Some(Value::Null) => Ok(JsonRpcId::Null),
            Some(Value::String(s)) => Ok(JsonRpcId::String(s.clone())),
            Some(Value::Number(n)) => Ok(JsonRpcId::Number(n.clone())),
            Some(other) => Err(McpParseError::InvalidFormat(format!(
                "id must be a string, number, or null, got {other}"
            ))),
        }
    }

    /// Render back to a `serde_json::Value` the way it would appear on the
    /// wire, for inclusion in structured log fields.
    pub fn as_value(&self) -> Value {
        match self {
            JsonRpcId::String(s) => Value::String(s.clone()),
            JsonRpcId::Number(n) => Value::Number(n.clone()),
            JsonRpcId::Null | JsonRpcId::Absent => Value::Null,
        }
    }
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::String(s) => write!(f, "{s}"),
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::Null => write!(f, "null"),
            JsonRpcId::Absent => write!(f, "-"),
        }
    }
}

/// A decoded request body: single or batch. For a batch, the first element
/// drives `method`/`id`/`is_notification`, and `batch_size` records how many
/// elements the array held; the rest are not individually retained, since
/// nothing downstream of this parser needs more than the label set.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub id: JsonRpcId,
    pub method: String,
    pub is_notification: bool,
    pub is_batch: bool,
    pub batch_size: usize,
    pub tool_name: Option<String>,
    pub resource_uri: Option<String>,
    pub prompt_name: Option<String>,
}

/// A decoded response body: single or batch, symmetric with [`ParsedRequest`].
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub id: JsonRpcId,
    pub is_error: bool,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
    pub is_batch: bool,
    pub batch_size: usize,
}

/// Best-effort request parse. Accepts a single JSON-RPC object or a batch
/// array; for a batch, the first element supplies the top-level fields.
pub fn parse_request(bytes: &[u8]) -> Result<ParsedRequest, McpParseError> {
    let trimmed = trim_leading_whitespace(bytes);
    if trimmed.is_empty() {
        return Err(McpParseError::EmptyBody);
    }

    if trimmed[0] == b'[' {
        let items: Vec<Value> =
            serde_json::from_slice(trimmed).map_err(|e| McpParseError::InvalidJson(e.to_string()))?;
        if items.is_empty() {
            return Err(McpParseError::InvalidFormat("batch request is empty".into()));
        }
        let first = items[0]
            .as_object()
            .ok_or_else(|| McpParseError::InvalidFormat("batch element is not an object".into()))?;
        let mut parsed = parse_request_object(first)?;
        parsed.is_batch = true;
        parsed.batch_size = items.len();
        Ok(parsed)
    } else {
        let value: Value = serde_json::from_slice(trimmed)
            .map_err(|e| McpParseError::InvalidJson(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| McpParseError::InvalidFormat("body is not a JSON object".into()))?;
        parse_request_object(obj)
    }
}

fn parse_request_object(
    obj: &serde_json::Map<String, Value>,
) -> Result<ParsedRequest, McpParseError> {
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(McpParseError::InvalidFormat(
            "missing or unrecognized jsonrpc version".into(),
        ));
    }
    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| McpParseError::InvalidFormat("missing or empty method".into()))?
        .to_string();
    let id = JsonRpcId::from_field(obj.get("id"))?;
    let is_notification = !obj.contains_key("id");

    let params = obj.get("params");
    let tool_name = (method == "tools/call")
        .then(|| params.and_then(|p| p.get("name")).and_then(Value::as_str))
        .flatten()
        .map(str::to_string);
    let resource_uri = (method == "resources/read")
        .then(|| params.and_then(|p| p.get("uri")).and_then(Value::as_str))
        .flatten()
        .map(str::to_string);
    let prompt_name = (method == "prompts/get")
        .then(|| params.and_then(|p| p.get("name")).and_then(Value::as_str))
        .flatten()
        .map(str::to_string);

    Ok(ParsedRequest {
        id,
        method,
        is_notification,
        is_batch: false,
        batch_size: 1,
        tool_name,
        resource_uri,
        prompt_name,
    })
}

/// Best-effort response parse. Accepts a single JSON-RPC object or a batch
/// array; for a batch, the first element supplies the top-level fields.
pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, McpParseError> {
    let trimmed = trim_leading_whitespace(bytes);
    if trimmed.is_empty() {
        return Err(McpParseError::EmptyBody);
    }

    if trimmed[0] == b'[' {
        let items: Vec<Value> =
            serde_json::from_slice(trimmed).map_err(|e| McpParseError::InvalidJson(e.to_string()))?;
        if items.is_empty() {
            return Err(McpParseError::InvalidFormat("batch response is empty".into()));
        }
        let first = items[0]
            .as_object()
            .ok_or_else(|| McpParseError::InvalidFormat("batch element is not an object".into()))?;
        let mut parsed = parse_response_object(first)?;
        parsed.is_batch = true;
        parsed.batch_size = items.len();
        Ok(parsed)
    } else {
        let value: Value = serde_json::from_slice(trimmed)
            .map_err(|e| McpParseError::InvalidJson(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| McpParseError::InvalidFormat("body is not a JSON object".into()))?;
        parse_response_object(obj)
    }
}

fn parse_response_object(
    obj: &serde_json::Map<String, Value>,
) -> Result<ParsedResponse, McpParseError> {
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");
    if has_result == has_error {
        return Err(McpParseError::InvalidFormat(
            "response must carry exactly one of result or error".into(),
        ));
    }
    let id = JsonRpcId::from_field(obj.get("id"))?;

    let (error_code, error_message) = match obj.get("error").and_then(Value::as_object) {
        Some(error) => (
            error.get("code").and_then(Value::as_i64),
            error.get("message").and_then(Value::as_str).map(str::to_string),
        ),
        None => (None, None),
    };

    Ok(ParsedResponse {
        id,
        is_error: has_error,
        error_code,
        error_message,
        is_batch: false,
        batch_size: 1,
    })
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Collapses a method name into the coarse category spec.md calls out for
/// classification: `core | tools | resources | prompts | logging |
/// completion | unknown`.
pub fn method_category(method: &str) -> &'static str {
    match method {
        "initialize" | "notifications/initialized" | "ping" => "core",
        m if m.starts_with("tools/") => "tools",
        m if m.starts_with("resources/") => "resources",
        m if m.starts_with("prompts/") => "prompts",
        m if m.starts_with("logging/") => "logging",
        m if m.starts_with("completion/") => "completion",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_id_request() {
        let body = br#"{"jsonrpc":"2.0","id":42,"method":"tools/call","params":{}}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.id, JsonRpcId::Number(42.into()));
        assert_eq!(parsed.method, "tools/call");
        assert!(!parsed.is_notification);
    }

    #[test]
    fn parses_string_id_request() {
        let body = br#"{"jsonrpc":"2.0","id":"abc-123","method":"initialize"}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.id, JsonRpcId::String("abc-123".into()));
    }

    #[test]
    fn notification_has_absent_id() {
        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.id, JsonRpcId::Absent);
        assert!(parsed.is_notification);
    }

    #[test]
    fn explicit_null_id_is_distinct_from_absent() {
        let body = br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.id, JsonRpcId::Null);
        assert_ne!(parsed.id, JsonRpcId::Absent);
        // An explicit null id is still a present member, not a notification.
        assert!(!parsed.is_notification);
    }

    #[test]
    fn rejects_empty_body() {
        assert_eq!(parse_request(b""), Err(McpParseError::EmptyBody));
    }

    #[test]
    fn rejects_non_jsonrpc_object() {
        let body = br#"{"method":"tools/call"}"#;
        assert!(matches!(
            parse_request(body),
            Err(McpParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn extracts_tool_name_from_tools_call() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_weather","arguments":{}}}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.tool_name.as_deref(), Some("get_weather"));
        assert!(parsed.resource_uri.is_none());
    }

    #[test]
    fn extracts_resource_uri_from_resources_read() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"file:///a.txt"}}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.resource_uri.as_deref(), Some("file:///a.txt"));
    }

    #[test]
    fn extracts_prompt_name_from_prompts_get() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"prompts/get","params":{"name":"greeting"}}"#;
        let parsed = parse_request(body).unwrap();
        assert_eq!(parsed.prompt_name.as_deref(), Some("greeting"));
    }

    #[test]
    fn parses_batch_request_using_first_element() {
        let body = br#"[
            {"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"a"}},
            {"jsonrpc":"2.0","id":2,"method":"resources/read","params":{"uri":"x"}}
        ]"#;
        let parsed = parse_request(body).unwrap();
        assert!(parsed.is_batch);
        assert_eq!(parsed.batch_size, 2);
        assert_eq!(parsed.method, "tools/call");
        assert_eq!(parsed.tool_name.as_deref(), Some("a"));
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(matches!(
            parse_request(b"[]"),
            Err(McpParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn response_requires_exactly_one_of_result_or_error() {
        let neither = br#"{"jsonrpc":"2.0","id":1}"#;
        assert!(parse_response(neither).is_err());

        let both = br#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":-1,"message":"x"}}"#;
        assert!(parse_response(both).is_err());

        let ok = br#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let parsed = parse_response(ok).unwrap();
        assert!(!parsed.is_error);
        assert!(parsed.error_code.is_none());
    }

    #[test]
    fn response_error_extracts_code_and_message() {
        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let parsed = parse_response(body).unwrap();
        assert!(parsed.is_error);
        assert_eq!(parsed.error_code, Some(-32601));
        assert_eq!(parsed.error_message.as_deref(), Some("Method not found"));
    }

    #[test]
    fn parses_batch_response_using_first_element() {
        let body = br#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","id":2,"result":{}}]"#;
        let parsed = parse_response(body).unwrap();
        assert!(parsed.is_batch);
        assert_eq!(parsed.batch_size, 2);
    }

    #[test]
    fn method_category_buckets_known_prefixes() {
        assert_eq!(method_category("tools/call"), "tools");
        assert_eq!(method_category("resources/read"), "resources");
        assert_eq!(method_category("initialize"), "core");
        assert_eq!(method_category("notifications/progress"), "unknown");
        assert_eq!(method_category("whatever"), "unknown");
    }

    #[test]
    fn is_known_method_recognizes_closed_set() {
        assert!(is_known_method("tools/call"));
        assert!(is_known_method("resources/subscribe"));
        assert!(!is_known_method("totally/made/up"));
    }
}
