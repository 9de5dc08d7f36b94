//! Wire types of the runtime protocol.
//!
//! Messages are JSON-RPC 2.0 objects, one per line, carrying the subset of
//! the Model Context Protocol needed to discover and call tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::TransportError;

/// The JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";
/// The protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for invalid parameters.
pub const INVALID_PARAMS: i64 = -32602;

/// A tool exposed by the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique name of the tool.
    pub name: String,
    /// What the tool does, shown to the model.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments object.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

/// Result of `tools/list`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools on this page.
    pub tools: Vec<ToolDescriptor>,
    /// Cursor for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of `tools/call`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    #[serde(default)]
    pub content: Vec<Content>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result with a single text block.
    #[inline]
    pub fn success<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A failed result with a single text block.
    #[inline]
    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Flattens all content blocks into text, one block per line.
    pub fn text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|content| match content {
                Content::Text { text } => text.clone(),
                Content::Image { mime_type } => format!("[image: {mime_type}]"),
                Content::Resource { resource } => resource
                    .get("text")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| resource.to_string()),
                Content::Unsupported => "[unsupported content]".to_owned(),
            })
            .collect();
        parts.join("\n")
    }
}

/// A content block of a tool result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image; only the media type is kept.
    Image {
        /// Media type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The raw resource object.
        resource: Value,
    },
    /// Any content type this client does not know.
    #[serde(other)]
    Unsupported,
}

/// A JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

impl From<RpcError> for TransportError {
    #[inline]
    fn from(err: RpcError) -> Self {
        TransportError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// A message received from the runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// The answer to one of our requests.
    Response {
        /// The id of our request.
        id: u64,
        /// The result, or the error object.
        outcome: Result<Value, RpcError>,
    },
    /// A request initiated by the runtime.
    Request {
        /// The id chosen by the runtime, echoed back verbatim.
        id: Value,
        /// The method.
        method: String,
    },
    /// A notification from the runtime.
    Notification {
        /// The method.
        method: String,
    },
    /// An error the runtime could not attribute to a request, sent with a
    /// `null` id when it failed to parse what it received.
    Unattributed(RpcError),
}

/// Encodes a request line, including the trailing newline.
pub fn encode_request(id: u64, method: &str, params: &Value) -> Vec<u8> {
    encode_line(&json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    }))
}

/// Encodes a notification line, including the trailing newline.
pub fn encode_notification(method: &str, params: Option<Value>) -> Vec<u8> {
    let mut msg = Map::new();
    msg.insert("jsonrpc".to_owned(), JSONRPC_VERSION.into());
    msg.insert("method".to_owned(), method.into());
    if let Some(params) = params {
        msg.insert("params".to_owned(), params);
    }
    encode_line(&Value::Object(msg))
}

/// Encodes `notifications/cancelled` for a request nobody waits for anymore.
pub fn encode_cancelled(id: u64, reason: &str) -> Vec<u8> {
    encode_notification(
        "notifications/cancelled",
        Some(json!({ "requestId": id, "reason": reason })),
    )
}

/// Encodes a response line, including the trailing newline.
pub fn encode_response(id: &Value, outcome: Result<Value, RpcError>) -> Vec<u8> {
    let mut msg = Map::new();
    msg.insert("jsonrpc".to_owned(), JSONRPC_VERSION.into());
    msg.insert("id".to_owned(), id.clone());
    match outcome {
        Ok(result) => {
            msg.insert("result".to_owned(), result);
        }
        Err(err) => {
            msg.insert("error".to_owned(), json!(err));
        }
    }
    encode_line(&Value::Object(msg))
}

fn encode_line(value: &Value) -> Vec<u8> {
    // `Value` serialization cannot fail, and never contains raw newlines.
    let mut line = value.to_string().into_bytes();
    line.push(b'\n');
    line
}

/// Decodes one line received from the runtime.
pub fn decode_incoming(line: &str) -> Result<Incoming, TransportError> {
    let value: Value = serde_json::from_str(line).map_err(|err| {
        TransportError::Protocol(format!("invalid JSON ({err}): {line}"))
    })?;
    let Value::Object(mut msg) = value else {
        return Err(TransportError::Protocol(format!("not an object: {line}")));
    };

    let id = msg.remove("id");
    let method = msg
        .remove("method")
        .and_then(|method| method.as_str().map(ToOwned::to_owned));

    match (id, method) {
        (Some(id), Some(method)) => Ok(Incoming::Request { id, method }),
        (None, Some(method)) => Ok(Incoming::Notification { method }),
        (Some(Value::Null), None) => match msg.remove("error") {
            Some(error) => Ok(Incoming::Unattributed(decode_error(error)?)),
            None => Err(TransportError::Protocol(format!(
                "response without id: {line}"
            ))),
        },
        (Some(id), None) => {
            let id = id.as_u64().ok_or_else(|| {
                TransportError::Protocol(format!("unexpected response id {id}"))
            })?;
            let outcome = if let Some(error) = msg.remove("error") {
                Err(decode_error(error)?)
            } else if let Some(result) = msg.remove("result") {
                Ok(result)
            } else {
                return Err(TransportError::Protocol(format!(
                    "response {id} has neither result nor error"
                )));
            };
            Ok(Incoming::Response { id, outcome })
        }
        (None, None) => {
            Err(TransportError::Protocol(format!("unrecognized message: {line}")))
        }
    }
}

fn decode_error(error: Value) -> Result<RpcError, TransportError> {
    serde_json::from_value(error).map_err(|err| {
        TransportError::Protocol(format!("malformed error object: {err}"))
    })
}

/// Parameters of the `initialize` request.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response() {
        let incoming = decode_incoming(
            r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#,
        )
        .unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 7,
                outcome: Ok(json!({ "tools": [] })),
            }
        );

        // `null` is a valid result.
        let incoming =
            decode_incoming(r#"{"jsonrpc":"2.0","id":8,"result":null}"#)
                .unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 8,
                outcome: Ok(Value::Null),
            }
        );

        let incoming = decode_incoming(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32602,"message":"Unknown tool"}}"#,
        )
        .unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 9,
                outcome: Err(RpcError {
                    code: INVALID_PARAMS,
                    message: "Unknown tool".to_owned(),
                }),
            }
        );
    }

    #[test]
    fn test_decode_server_messages() {
        assert_eq!(
            decode_incoming(r#"{"jsonrpc":"2.0","id":"s1","method":"ping"}"#)
                .unwrap(),
            Incoming::Request {
                id: json!("s1"),
                method: "ping".to_owned(),
            }
        );
        assert_eq!(
            decode_incoming(
                r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#
            )
            .unwrap(),
            Incoming::Notification {
                method: "notifications/message".to_owned(),
            }
        );
    }

    #[test]
    fn test_decode_unattributed_error() {
        assert_eq!(
            decode_incoming(
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#
            )
            .unwrap(),
            Incoming::Unattributed(RpcError {
                code: -32700,
                message: "Parse error".to_owned(),
            })
        );
    }

    #[test]
    fn test_encode_cancelled() {
        let value: Value =
            serde_json::from_slice(&encode_cancelled(4, "timed out")).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "method": "notifications/cancelled",
                "params": { "requestId": 4, "reason": "timed out" },
            })
        );
    }

    #[test]
    fn test_decode_malformed() {
        for line in [
            "Downloading pyodide...",
            "[1, 2]",
            r#"{"jsonrpc":"2.0"}"#,
            r#"{"jsonrpc":"2.0","id":"x","result":{}}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":null,"result":{}}"#,
        ] {
            assert!(
                matches!(decode_incoming(line), Err(TransportError::Protocol(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn test_encode_request() {
        let line = encode_request(3, "tools/list", &json!({}));
        assert_eq!(line.last(), Some(&b'\n'));
        let value: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/list",
                "params": {},
            })
        );
    }

    #[test]
    fn test_call_tool_result_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "<status>success</status>" },
                { "type": "image", "mimeType": "image/png", "data": "AAAA" },
                { "type": "audio", "data": "AAAA" },
            ],
            "isError": false,
        }))
        .unwrap();
        assert_eq!(
            result.text(),
            "<status>success</status>\n[image: image/png]\n[unsupported content]"
        );
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: ToolDescriptor =
            serde_json::from_value(json!({ "name": "run_python_code" }))
                .unwrap();
        assert_eq!(descriptor.description, "");
        assert_eq!(descriptor.input_schema, json!({ "type": "object" }));
    }
}
