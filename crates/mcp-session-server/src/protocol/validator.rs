//! JSON-RPC envelope validation.

use crate::types::{JsonRpcMessage, McpError, McpResult, JSONRPC_VERSION};

/// Validate that an inbound JSON-RPC message is well-formed.
pub fn validate_message(message: &JsonRpcMessage) -> McpResult<()> {
    let version = match message {
        JsonRpcMessage::Request(req) => &req.jsonrpc,
        JsonRpcMessage::Notification(n) => &n.jsonrpc,
        JsonRpcMessage::Response(resp) => &resp.jsonrpc,
        JsonRpcMessage::Error(err) => &err.jsonrpc,
    };

    if version != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{version}\""
        )));
    }

    if message.method().is_some_and(str::is_empty) {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Parse a raw JSON body into a single JSON-RPC message.
///
/// Batches are not accepted on this transport.
pub fn parse_envelope(body: serde_json::Value) -> McpResult<JsonRpcMessage> {
    if body.is_array() {
        return Err(McpError::InvalidRequest(
            "Batch requests are not supported".to_string(),
        ));
    }
    let message: JsonRpcMessage =
        serde_json::from_value(body).map_err(|e| McpError::InvalidRequest(e.to_string()))?;
    validate_message(&message)?;
    Ok(message)
}
