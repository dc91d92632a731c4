//! Message framing for newline-delimited JSON (stdio mode).

use crate::protocol::validator::parse_envelope;
use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

/// Parse a single line of text as a JSON-RPC message.
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))?;
    parse_envelope(value)
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message(value: &serde_json::Value) -> McpResult<String> {
    let mut json = serde_json::to_string(value).map_err(McpError::Json)?;
    json.push('\n');
    Ok(json)
}

/// Frame an error that could not be tied to a request id.
pub fn frame_error(error: &McpError) -> McpResult<String> {
    let value = serde_json::to_value(error.to_json_rpc_error(RequestId::Null))
        .map_err(|e| McpError::InternalError(e.to_string()))?;
    frame_message(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_blank_and_garbage() {
        assert!(matches!(parse_message("   "), Err(McpError::ParseError(_))));
        assert!(matches!(parse_message("{nope"), Err(McpError::ParseError(_))));
        assert!(matches!(
            parse_message(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#),
            Err(McpError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_frame_error_is_single_line() {
        let framed = frame_error(&McpError::ParseError("bad".into())).unwrap();
        assert!(framed.ends_with('\n'));
        assert_eq!(framed.matches('\n').count(), 1);
        let value: serde_json::Value = serde_json::from_str(framed.trim()).unwrap();
        assert_eq!(value["error"]["code"], -32700);
        assert!(value["id"].is_null());
    }
}
