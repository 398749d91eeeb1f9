//! JSON-RPC 2.0 types for the MCP wire protocol.
//!
//! Each message is a discrete text frame (one line of JSON when bridged to a
//! local process). Decoded frames fall into exactly one of three shapes,
//! captured by [`Message`]: a request (`id` + `method`), a response (`id` +
//! `result`/`error`), or a notification (`method`, no `id`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision spoken by the gateway.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// WebSocket close code a coordinator uses to permanently reject a session
/// (auth/version mismatch). Sessions receiving it must not auto-reconnect.
pub const CLOSE_CODE_REJECTED: u16 = 4004;

// ── JSON-RPC error codes ────────────────────────────────────────────

pub const CODE_PARSE_ERROR: i64 = -32700;
pub const CODE_INVALID_REQUEST: i64 = -32600;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_INTERNAL_ERROR: i64 = -32603;
/// Server-defined range: tool taxonomy.
pub const CODE_TOOL_NOT_FOUND: i64 = -32000;
pub const CODE_SERVICE_UNAVAILABLE: i64 = -32001;
pub const CODE_TOOL_TIMEOUT: i64 = -32002;
pub const CODE_EXECUTION_ERROR: i64 = -32003;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request ids
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC request id, either a number or a string per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(u64),
    Str(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Num(n) => write!(f, "{n}"),
            RequestId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Num(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Str(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::Str(s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 request (has an `id`, expects a response).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no `id`, fire-and-forget).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn ok(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn err(id: impl Into<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Check if the response represents an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extract the result value, returning an error if the response is an error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tagged message union
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A decoded wire frame. The router matches on this exhaustively; there is
/// no fourth shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl Message {
    /// Classify and decode a text frame.
    ///
    /// Shape detection happens before full deserialization: a `method` with
    /// an `id` is a request, a `method` without one is a notification, an
    /// `id` with `result` or `error` is a response.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidFrame("frame is not a JSON object".into()));
        }

        let has_method = value.get("method").is_some();
        let has_id = value.get("id").map(|v| !v.is_null()).unwrap_or(false);

        if has_method && has_id {
            Ok(Message::Request(serde_json::from_value(value)?))
        } else if has_method {
            Ok(Message::Notification(serde_json::from_value(value)?))
        } else if has_id && (value.get("result").is_some() || value.get("error").is_some()) {
            Ok(Message::Response(serde_json::from_value(value)?))
        } else {
            Err(ProtocolError::InvalidFrame(
                "frame is neither request, response, nor notification".into(),
            ))
        }
    }

    /// Serialize back to a single-line text frame.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        let json = match self {
            Message::Request(r) => serde_json::to_string(r)?,
            Message::Response(r) => serde_json::to_string(r)?,
            Message::Notification(n) => serde_json::to_string(n)?,
        };
        Ok(json)
    }
}

/// Errors that can occur while decoding a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP-specific payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Peer identity exchanged during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

/// Result payload the gateway answers `initialize` with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: PeerInfo,
}

/// Build the gateway's `initialize` result.
pub fn initialize_result() -> InitializeResult {
    InitializeResult {
        protocol_version: PROTOCOL_VERSION.into(),
        capabilities: serde_json::json!({ "tools": {} }),
        server_info: PeerInfo {
            name: "toolgate".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    }
}

/// A single tool definition returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// The result payload for `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<McpToolDef>,
}

/// A single content item in a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }
}

/// The result payload for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolCallContent>,
    #[serde(default)]
    #[serde(rename = "isError")]
    pub is_error: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request() {
        let req = JsonRpcRequest::new(1u64, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn string_ids_roundtrip() {
        let req = JsonRpcRequest::new("hb:42", "ping", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"id\":\"hb:42\""));
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, RequestId::Str("hb:42".into()));
    }

    #[test]
    fn parse_classifies_request() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.method, "ping");
                assert_eq!(req.id, RequestId::Num(7));
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn parse_classifies_notification() {
        let msg =
            Message::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn parse_classifies_response() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        match msg {
            Message::Response(resp) => {
                assert!(!resp.is_error());
                assert_eq!(resp.into_result().unwrap(), serde_json::json!({"ok": true}));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parse_classifies_error_response() {
        let msg = Message::parse(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        match msg {
            Message::Response(resp) => {
                let err = resp.into_result().unwrap_err();
                assert_eq!(err.code, CODE_METHOD_NOT_FOUND);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_shapeless_frames() {
        assert!(Message::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Message::parse(r#"[1,2,3]"#).is_err());
        assert!(Message::parse("not json").is_err());
    }

    #[test]
    fn null_id_is_not_an_id() {
        // Per JSON-RPC, a null id is reserved for parse-error responses;
        // a method with a null id is treated as a notification.
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":null,"method":"x"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn response_constructors() {
        let ok = JsonRpcResponse::ok(3u64, serde_json::json!({"v": 1}));
        assert!(!ok.is_error());
        let err = JsonRpcResponse::err(3u64, CODE_INVALID_PARAMS, "arguments must be an object");
        assert!(err.is_error());
        assert_eq!(err.error.unwrap().code, -32602);
    }

    #[test]
    fn initialize_result_shape() {
        let init = initialize_result();
        assert_eq!(init.protocol_version, PROTOCOL_VERSION);
        assert_eq!(init.server_info.name, "toolgate");
        let json = serde_json::to_string(&init).unwrap();
        assert!(json.contains("protocolVersion"));
        assert!(json.contains("serverInfo"));
    }

    #[test]
    fn tools_list_missing_description_defaults_empty() {
        let raw = r#"{ "tools": [{ "name": "ping" }] }"#;
        let result: ToolsListResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.tools[0].description, "");
        assert!(result.tools[0].input_schema.get("type").is_some());
    }

    #[test]
    fn tool_call_result_error_flag() {
        let raw = r#"{ "content": [{ "type": "text", "text": "nope" }], "isError": true }"#;
        let result: ToolCallResult = serde_json::from_str(raw).unwrap();
        assert!(result.is_error);
        assert_eq!(result.content[0].text, "nope");
    }

    #[test]
    fn frame_roundtrip() {
        let req = JsonRpcRequest::new(42u64, "tools/call", Some(serde_json::json!({"name": "t"})));
        let frame = Message::Request(req.clone()).to_frame().unwrap();
        let parsed = Message::parse(&frame).unwrap();
        assert_eq!(parsed, Message::Request(req));
    }
}
