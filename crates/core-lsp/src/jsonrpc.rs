//! JSON-RPC 2.0 message shapes used by the LSP base protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u32,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u32, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Error code for "method not found", used when a server sends us a
/// request we do not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Any incoming message, before classification.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// Classified incoming message.
#[derive(Debug)]
pub enum Message {
    /// Response to one of our requests.
    Response {
        id: u32,
        result: Option<Value>,
        error: Option<ResponseError>,
    },
    /// Server-initiated notification.
    Notification { method: String, params: Value },
    /// Server-initiated request (needs a reply).
    ServerRequest {
        id: Value,
        method: String,
        params: Value,
    },
}

/// Parse and classify one JSON body.
pub fn classify(body: &str) -> Result<Message, String> {
    let incoming: Incoming = serde_json::from_str(body).map_err(|e| e.to_string())?;
    match (incoming.id, incoming.method) {
        (Some(id), Some(method)) => Ok(Message::ServerRequest {
            id,
            method,
            params: incoming.params.unwrap_or(Value::Null),
        }),
        (None, Some(method)) => Ok(Message::Notification {
            method,
            params: incoming.params.unwrap_or(Value::Null),
        }),
        (Some(id), None) => {
            let id = id
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| format!("non-numeric response id: {id}"))?;
            Ok(Message::Response {
                id,
                result: incoming.result,
                error: incoming.error,
            })
        }
        (None, None) => Err("message is neither request, response, nor notification".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization_shape() {
        let req = Request::new(7, "textDocument/hover", json!({"x": 1}));
        let text = serde_json::to_string(&req).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "textDocument/hover");
        assert_eq!(value["params"]["x"], 1);
    }

    #[test]
    fn notification_omits_null_params() {
        let n = Notification::new("exit", Value::Null);
        let text = serde_json::to_string(&n).unwrap();
        assert!(!text.contains("params"));
    }

    #[test]
    fn classify_response_notification_and_request() {
        assert!(matches!(
            classify(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap(),
            Message::Response { id: 3, .. }
        ));
        assert!(matches!(
            classify(r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#)
                .unwrap(),
            Message::Notification { .. }
        ));
        assert!(matches!(
            classify(r#"{"jsonrpc":"2.0","id":"srv-1","method":"workspace/configuration"}"#)
                .unwrap(),
            Message::ServerRequest { .. }
        ));
    }

    #[test]
    fn classify_error_response_keeps_payload() {
        let msg = classify(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        match msg {
            Message::Response { id, error, .. } => {
                assert_eq!(id, 9);
                assert_eq!(error.unwrap().code, METHOD_NOT_FOUND);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(classify("not json").is_err());
        assert!(classify("{}").is_err());
    }
}
