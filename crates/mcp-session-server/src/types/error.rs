//! Error types and JSON-RPC error codes for the MCP server.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use mcp_units::{UnitError, UnitKind};

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Server-defined error codes.
pub mod mcp_error_codes {
    /// Bad request: missing/unknown session id, or verb not allowed in this mode.
    pub const BAD_REQUEST: i32 = -32000;
    /// Missing or invalid bearer token.
    pub const UNAUTHORIZED: i32 = -32001;
    /// Client exceeded its request budget.
    pub const RATE_LIMITED: i32 = -32002;

    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const PROMPT_NOT_FOUND: i32 = -32804;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Missing, unknown, or closed session id.
    #[error("Bad Request: {0}")]
    Session(String),

    /// HTTP verb not supported in the active mode.
    #[error("Method not allowed.")]
    MethodNotAllowed,

    /// A notification stream is already open for this session.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unauthorized — missing or invalid bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::PromptNotFound(_) => PROMPT_NOT_FOUND,
            McpError::Session(_) | McpError::MethodNotAllowed | McpError::Conflict(_) => {
                BAD_REQUEST
            }
            McpError::Config(_) | McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
            McpError::Unauthorized => UNAUTHORIZED,
            McpError::RateLimited { .. } => RATE_LIMITED,
        }
    }

    /// HTTP status used when this error ends an exchange before the engine answers.
    pub fn http_status(&self) -> StatusCode {
        match self {
            McpError::ParseError(_)
            | McpError::InvalidRequest(_)
            | McpError::Json(_)
            | McpError::Session(_) => StatusCode::BAD_REQUEST,
            McpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            McpError::Conflict(_) => StatusCode::CONFLICT,
            McpError::Unauthorized => StatusCode::UNAUTHORIZED,
            McpError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            McpError::MethodNotFound(_)
            | McpError::InvalidParams(_)
            | McpError::ResourceNotFound(_)
            | McpError::ToolNotFound(_)
            | McpError::PromptNotFound(_) => StatusCode::OK,
            McpError::InternalError(_)
            | McpError::Config(_)
            | McpError::Transport(_)
            | McpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }

    /// Render as an HTTP response carrying a JSON-RPC error body.
    pub fn into_http_response(self, id: RequestId) -> Response {
        let status = self.http_status();
        let retry_after = match &self {
            McpError::RateLimited { retry_after_secs } => Some((*retry_after_secs).max(1)),
            _ => None,
        };
        let mut response = (status, Json(self.to_json_rpc_error(id))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        self.into_http_response(RequestId::Null)
    }
}

impl From<UnitError> for McpError {
    fn from(e: UnitError) -> Self {
        match e {
            UnitError::NotFound { kind, name } => match kind {
                UnitKind::Action => McpError::ToolNotFound(name),
                UnitKind::Datasource => McpError::ResourceNotFound(name),
                UnitKind::Template => McpError::PromptNotFound(name),
            },
            UnitError::Validation(msg) => McpError::InvalidParams(msg),
            UnitError::Handler(msg) => McpError::InternalError(msg),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
