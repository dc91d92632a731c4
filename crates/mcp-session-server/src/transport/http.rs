//! HTTP transport — the MCP endpoint, middleware stack, and /health.
//!
//! In stateful mode every request after the handshake carries a
//! `session-id` header that routes it to its session's transport. In
//! stateless mode each POST is served by a throwaway engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use futures::StreamExt;
use tower_http::cors::{AllowOrigin, CorsLayer};

use mcp_units::Registry;

use crate::config::ServerConfig;
use crate::middleware::{auth_layer, metrics_layer, rate_limit_layer, AuthState, RateLimiter};
use crate::protocol::validator::parse_envelope;
use crate::protocol::{Engine, EngineOptions};
use crate::session::SessionTable;
use crate::types::{JsonRpcMessage, McpError, McpResult};

use super::{generate_session_id, SessionIdGenerator, StatelessHandler, StreamableTransport};

/// Header carrying the session id, in both directions.
pub const SESSION_HEADER: &str = "session-id";

/// Shared state behind every route.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionTable,
    registry: Arc<Registry>,
    options: EngineOptions,
    stateless: Option<StatelessHandler>,
    id_generator: SessionIdGenerator,
}

impl AppState {
    pub fn stateless(&self) -> Option<&StatelessHandler> {
        self.stateless.as_ref()
    }
}

/// MCP over streamable HTTP.
pub struct HttpTransport {
    state: Arc<AppState>,
}

impl HttpTransport {
    pub fn new(config: ServerConfig, registry: Arc<Registry>, options: EngineOptions) -> Self {
        Self::with_id_generator(config, registry, options, Arc::new(generate_session_id))
    }

    pub fn with_id_generator(
        config: ServerConfig,
        registry: Arc<Registry>,
        options: EngineOptions,
        id_generator: SessionIdGenerator,
    ) -> Self {
        let stateless = (!config.session_management_enabled)
            .then(|| StatelessHandler::new(registry.clone(), options.clone()));
        Self {
            state: Arc::new(AppState {
                config,
                sessions: SessionTable::new(),
                registry,
                options,
                stateless,
                id_generator,
            }),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.state.sessions
    }

    /// Build the axum app: MCP path behind auth, rate limit, and metrics;
    /// `/health` outside auth.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let config = &state.config;

        let mut mcp = Router::new()
            .route(
                &config.path,
                get(handle_get).post(handle_post).delete(handle_delete),
            )
            .layer(middleware::from_fn_with_state(
                Arc::new(AuthState::new(config.auth_token.clone())),
                auth_layer,
            ));
        if let Some(limit) = config.rate_limit {
            mcp = mcp.layer(middleware::from_fn_with_state(
                Arc::new(RateLimiter::new(limit)),
                rate_limit_layer,
            ));
        }

        let mut app = mcp
            .route("/health", get(handle_health))
            .layer(middleware::from_fn(metrics_layer));
        if config.cors_enabled {
            app = app.layer(cors_layer(config));
        }
        app.with_state(state)
    }

    /// Serve until Ctrl-C, then close every session.
    pub async fn run(&self) -> McpResult<()> {
        let addr = self.state.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!(
            "HTTP transport listening on {addr}{} ({} mode)",
            self.state.config.path,
            self.state.config.mode()
        );

        let sessions = self.state.sessions.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
                return;
            }
            tracing::info!("Shutdown signal received");
            // Open notification streams would otherwise hold connections open.
            sessions.close_all();
        })
        .await
        .map_err(|e| McpError::Transport(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let origin = match config
        .cors_origin
        .as_deref()
        .map(HeaderValue::from_str)
    {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(_)) => {
            tracing::warn!("Ignoring invalid CORS origin; allowing any");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            session_header.clone(),
        ])
        .expose_headers([session_header])
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn reply(response: Option<serde_json::Value>) -> Response {
    match response {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_post(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let message = match serde_json::from_slice(&body)
        .map_err(|e| McpError::ParseError(e.to_string()))
        .and_then(parse_envelope)
    {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Rejected malformed envelope: {e}");
            return e.into_response();
        }
    };
    let id = message.id();

    let result = match (&state.stateless, session_id(&headers)) {
        (Some(stateless), _) => stateless.handle(message).await.map(reply),
        (None, Some(session)) => forward(&state, session, message).await,
        (None, None) if message.is_handshake() => establish(&state, message).await,
        (None, None) => Err(McpError::Session(
            "No valid session ID provided".to_string(),
        )),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!("POST rejected: {e}");
        e.into_http_response(id)
    })
}

/// Route a message to an existing session.
async fn forward(state: &AppState, session_id: &str, message: JsonRpcMessage) -> McpResult<Response> {
    let session = state
        .sessions
        .get(session_id)
        .ok_or_else(|| McpError::Session("Session not found".to_string()))?;
    let outcome = session.transport.handle_post(message).await?;
    Ok(reply(outcome.response))
}

/// Closes a handshake's transport unless the session was established.
struct HandshakeGuard {
    transport: Arc<StreamableTransport>,
    armed: bool,
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Handshake did not establish a session; closing");
            self.transport.close();
        }
    }
}

/// Build a new engine and transport and run the handshake on them.
async fn establish(state: &AppState, message: JsonRpcMessage) -> McpResult<Response> {
    let engine = Arc::new(Engine::from_registry(state.options.clone(), &state.registry));
    let transport = Arc::new(StreamableTransport::stateful(state.id_generator.clone()));
    let mut guard = HandshakeGuard {
        transport: transport.clone(),
        armed: true,
    };
    transport.connect(engine.clone())?;
    state.sessions.watch(&transport, engine)?;

    let outcome = transport.handle_post(message).await?;
    let Some(session_id) = outcome.established else {
        return Ok(reply(outcome.response));
    };
    guard.armed = false;

    let mut response = reply(outcome.response);
    match HeaderValue::from_str(&session_id) {
        Ok(value) => {
            response.headers_mut().insert(SESSION_HEADER, value);
            Ok(response)
        }
        Err(e) => {
            state.sessions.remove(&session_id);
            Err(McpError::InternalError(format!("Unusable session id: {e}")))
        }
    }
}

async fn handle_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if state.stateless.is_some() {
        return McpError::MethodNotAllowed.into_response();
    }
    let session = match session_id(&headers).and_then(|id| state.sessions.get(id)) {
        Some(session) => session,
        None => {
            return McpError::Session("No valid session ID provided".to_string()).into_response()
        }
    };

    match session.transport.open_stream() {
        Ok(notifications) => {
            tracing::info!(session = %session.id, "Notification stream opened");
            let events = notifications.map(|n| Event::default().event("message").json_data(n));
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(e) => {
            tracing::warn!(session = %session.id, "GET rejected: {e}");
            e.into_response()
        }
    }
}

async fn handle_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if state.stateless.is_some() {
        return McpError::MethodNotAllowed.into_response();
    }
    let Some(id) = session_id(&headers) else {
        return McpError::Session("No valid session ID provided".to_string()).into_response();
    };

    match state.sessions.remove(id) {
        Some(_) => StatusCode::OK.into_response(),
        None => {
            tracing::warn!(session = %id, "DELETE for unknown session");
            McpError::Session("Session not found".to_string()).into_response()
        }
    }
}

/// Health check endpoint — no auth required.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut health = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.config.mode(),
        "sessions": state.sessions.len(),
    });
    if let Some(stateless) = &state.stateless {
        health["exchanges"] = serde_json::json!(stateless.stats());
    }
    Json(health)
}
