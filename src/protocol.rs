//! JSON-RPC 2.0 envelopes and the transport-normalized request form.
//!
//! Every transport parses incoming frames into [`JsonRpcRequest`], normalizes
//! them into [`InboundRequest`], and renders the kernel's answer back out of
//! [`JsonRpcResponse`]. The wire schema is the MCP dialect of JSON-RPC 2.0;
//! method names are stable and case-sensitive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes used by the kernel.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC 2.0 request envelope.
///
/// A request without an `id` is a notification; it is dispatched but no
/// response frame is produced for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The error member of a JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

/// A JSON-RPC 2.0 response envelope, success or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl JsonRpcResponse {
    /// Builds a success envelope correlated with `id`.
    pub fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error envelope correlated with `id`.
    pub fn error(id: Option<Value>, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Which transport produced a request. Carried in request metadata and in
/// the HTTP health payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection-level metadata attached to a normalized request.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub transport: TransportKind,
    /// Opaque connection id (WebSocket only).
    pub connection_id: Option<String>,
    pub user_agent: Option<String>,
    pub peer_addr: Option<String>,
}

impl RequestMetadata {
    pub fn for_transport(transport: TransportKind) -> Self {
        Self {
            transport,
            connection_id: None,
            user_agent: None,
            peer_addr: None,
        }
    }
}

/// The transport-normalized request handed to the kernel.
///
/// Every transport produces this shape. Session identifiers come from the
/// envelope params (`sessionId` / `userId` / `workflowId` / `message`
/// members); the HTTP transport additionally harvests them from the
/// `x-session-id`, `x-user-id`, and `x-workflow-id` headers.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub params: Value,
    pub id: Option<Value>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub workflow_id: Option<String>,
    pub message: Option<String>,
    pub metadata: RequestMetadata,
}

impl InboundRequest {
    /// Normalizes a parsed envelope, pulling session fields out of params.
    pub fn from_envelope(req: JsonRpcRequest, metadata: RequestMetadata) -> Self {
        let params = req.params.unwrap_or(Value::Null);
        let field = |name: &str| {
            params
                .get(name)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        };
        Self {
            session_id: field("sessionId"),
            user_id: field("userId"),
            workflow_id: field("workflowId"),
            message: field("message"),
            method: req.method,
            params,
            id: req.id,
            metadata,
        }
    }

    /// True when the request is a notification (no id, no response frame).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips() {
        let text = r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#;
        let req: JsonRpcRequest = serde_json::from_str(text).unwrap();
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, Some(json!(7)));
        assert!(req.params.is_none());
    }

    #[test]
    fn error_response_skips_result_member() {
        let resp = JsonRpcResponse::error(Some(json!(1)), RpcErrorObject::internal("boom"));
        let rendered = serde_json::to_value(&resp).unwrap();
        assert_eq!(rendered["error"]["code"], json!(INTERNAL_ERROR));
        assert!(rendered.get("result").is_none());
    }

    #[test]
    fn normalization_pulls_session_fields_from_params() {
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({
                "name": "demo:echo",
                "sessionId": "s-1",
                "userId": "u-1",
                "message": "hello"
            })),
        };
        let inbound =
            InboundRequest::from_envelope(req, RequestMetadata::for_transport(TransportKind::Stdio));
        assert_eq!(inbound.session_id.as_deref(), Some("s-1"));
        assert_eq!(inbound.user_id.as_deref(), Some("u-1"));
        assert_eq!(inbound.message.as_deref(), Some("hello"));
        assert!(inbound.workflow_id.is_none());
    }
}
