//! Auth middleware — checks the Bearer token if one is configured.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::types::McpError;

/// Expected bearer token; `None` disables the check.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub token: Option<String>,
}

impl AuthState {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

pub async fn auth_layer(
    State(state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.is_authorized(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthorized request");
        return McpError::Unauthorized.into_response();
    }

    next.run(request).await
}
