//! HTTP transport tests: session routing, lifecycle, stateless mode, middleware.
//!
//! The axum app is driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mcp_units::{unit_fn, Registry, UnitKind, UnitMeta};

use mcp_session_server::config::{RateLimitConfig, ServerConfig};
use mcp_session_server::transport::SESSION_HEADER;
use mcp_session_server::{default_registry, EngineOptions, HttpTransport};

// ─────────────────────── helpers ───────────────────────

fn server(config: ServerConfig, registry: Registry) -> (HttpTransport, Router) {
    let transport = HttpTransport::new(config, Arc::new(registry), EngineOptions::default());
    let app = transport.router();
    (transport, app)
}

fn stateful() -> (HttpTransport, Router) {
    server(ServerConfig::default(), default_registry())
}

fn stateless() -> (HttpTransport, Router) {
    let config = ServerConfig {
        session_management_enabled: false,
        ..ServerConfig::default()
    };
    server(config, default_registry())
}

fn mcp_request(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

fn init_request() -> Value {
    mcp_request(
        0,
        "initialize",
        json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }),
    )
}

fn call(id: i64, tool: &str, arguments: Value) -> Value {
    mcp_request(id, "tools/call", json!({ "name": tool, "arguments": arguments }))
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn session_id(&self) -> Option<&str> {
        self.headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
    }
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn request(method: Method, session: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri("/mcp");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn post(app: &Router, session: Option<&str>, body: Value) -> Reply {
    send(app, request(Method::POST, session, Some(&body))).await
}

async fn delete(app: &Router, session: Option<&str>) -> Reply {
    send(app, request(Method::DELETE, session, None)).await
}

async fn open_session(app: &Router) -> String {
    let reply = post(app, None, init_request()).await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.session_id().expect("session-id header").to_string()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(done(), "condition not reached");
}

// ─────────────────────── session lifecycle ───────────────────────

#[tokio::test]
async fn test_handshake_then_add() {
    let (transport, app) = stateful();

    let reply = post(&app, None, init_request()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["result"]["protocolVersion"], "2025-03-26");
    let session = reply.session_id().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&session).is_ok());
    assert!(transport.sessions().contains(&session));

    let reply = post(&app, Some(&session), call(1, "add", json!({ "a": 2, "b": 3 }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], 1);
    assert_eq!(reply.body["result"]["content"][0]["text"], "5");
    assert!(reply.session_id().is_none());
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let (transport, app) = stateful();
    let a = open_session(&app).await;
    let b = open_session(&app).await;
    assert_ne!(a, b);
    assert_eq!(transport.sessions().len(), 2);
}

#[tokio::test]
async fn test_unknown_session_is_rejected_without_mutation() {
    let (transport, app) = stateful();
    let session = open_session(&app).await;

    let reply = post(&app, Some("not-a-session"), call(1, "add", json!({ "a": 1, "b": 1 }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32000);
    assert_eq!(reply.body["id"], 1);

    // A handshake with an unknown id is not upgraded either.
    let reply = post(&app, Some("not-a-session"), init_request()).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.session_id().is_none());

    assert_eq!(transport.sessions().ids(), vec![session]);
}

#[tokio::test]
async fn test_missing_header_requires_handshake() {
    let (transport, app) = stateful();
    let reply = post(&app, None, mcp_request(1, "tools/list", json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32000);
    assert!(transport.sessions().is_empty());
}

#[tokio::test]
async fn test_failed_handshake_creates_no_session() {
    let (transport, app) = stateful();
    let reply = post(&app, None, mcp_request(0, "initialize", json!({}))).await;
    assert_eq!(reply.body["error"]["code"], -32602);
    assert!(reply.session_id().is_none());
    assert!(transport.sessions().is_empty());
}

#[tokio::test]
async fn test_delete_twice() {
    let (transport, app) = stateful();
    let session = open_session(&app).await;

    let first = delete(&app, Some(&session)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert!(!transport.sessions().contains(&session));

    let second = delete(&app, Some(&session)).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.body["error"]["code"], -32000);

    let reply = post(&app, Some(&session), mcp_request(2, "ping", json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_without_header() {
    let (_transport, app) = stateful();
    let reply = delete(&app, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notifications_are_accepted() {
    let (_transport, app) = stateful();
    let session = open_session(&app).await;
    let reply = post(
        &app,
        Some(&session),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
    )
    .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert!(reply.body.is_null());
}

#[tokio::test]
async fn test_handler_failure_keeps_session_active() {
    let (transport, app) = stateful();
    let session = open_session(&app).await;

    let reply = post(&app, Some(&session), call(1, "fail", json!({ "message": "boom" }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["result"]["isError"], true);
    assert_eq!(reply.body["result"]["content"][0]["text"], "boom");

    let reply = post(&app, Some(&session), call(2, "add", json!({ "a": 1, "b": 1 }))).await;
    assert_eq!(reply.body["result"]["content"][0]["text"], "2");
    assert!(transport.sessions().contains(&session));
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let (_transport, app) = stateful();

    let garbage = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send(&app, garbage).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32700);

    let reply = post(&app, None, json!([init_request()])).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32600);

    let reply = post(&app, None, json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_requests_within_a_session_are_ordered() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    for (name, delay) in [("slow", 100u64), ("fast", 0)] {
        let log = log.clone();
        registry.register_unit(
            UnitKind::Action,
            name,
            UnitMeta::describe(name),
            unit_fn(move |_args, _ctx| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name}:start"));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().unwrap().push(format!("{name}:end"));
                    Ok(json!(name))
                }
            }),
        );
    }
    let (_transport, app) = server(ServerConfig::default(), registry);
    let session = open_session(&app).await;

    let (first, second) = tokio::join!(
        post(&app, Some(&session), call(1, "slow", json!({}))),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            post(&app, Some(&session), call(2, "fast", json!({}))).await
        }
    );
    assert_eq!(first.body["result"]["content"][0]["text"], "slow");
    assert_eq!(second.body["result"]["content"][0]["text"], "fast");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["slow:start", "slow:end", "fast:start", "fast:end"]
    );
}

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let (transport, app) = stateful();
    let a = open_session(&app).await;
    let b = open_session(&app).await;

    delete(&app, Some(&a)).await;
    let reply = post(&app, Some(&b), mcp_request(1, "ping", json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(transport.sessions().ids(), vec![b]);
}

// ─────────────────────── notification stream ───────────────────────

#[tokio::test]
async fn test_stream_delivers_notifications_and_closes_on_disconnect() {
    let (transport, app) = stateful();
    let session = open_session(&app).await;

    let stream = app
        .clone()
        .oneshot(request(Method::GET, Some(&session), None))
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    assert_eq!(
        stream.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    // Only one stream per session.
    let second = send(&app, request(Method::GET, Some(&session), None)).await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    post(&app, Some(&session), call(1, "echo", json!({ "message": "hello" }))).await;

    let mut frames = stream.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(1), frames.next())
        .await
        .expect("notification frame")
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.contains("event: message"), "{frame}");
    assert!(frame.contains("notifications/message"), "{frame}");
    assert!(frame.contains("hello"), "{frame}");

    drop(frames);
    let sessions = transport.sessions().clone();
    wait_until(|| !sessions.contains(&session)).await;
}

#[tokio::test]
async fn test_stream_requires_known_session() {
    let (_transport, app) = stateful();
    let reply = send(&app, request(Method::GET, None, None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = send(&app, request(Method::GET, Some("nope"), None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"]["code"], -32000);
}

#[tokio::test]
async fn test_delete_ends_open_stream() {
    let (_transport, app) = stateful();
    let session = open_session(&app).await;
    let stream = app
        .clone()
        .oneshot(request(Method::GET, Some(&session), None))
        .await
        .unwrap();

    delete(&app, Some(&session)).await;

    let mut frames = stream.into_body().into_data_stream();
    let next = tokio::time::timeout(Duration::from_secs(1), frames.next())
        .await
        .expect("stream should end");
    assert!(next.is_none());
}

// ─────────────────────── stateless mode ───────────────────────

#[tokio::test]
async fn test_stateless_exchanges_are_isolated() {
    let (transport, app) = stateless();

    let (a, b) = tokio::join!(
        post(&app, None, call(1, "add", json!({ "a": 1, "b": 2 }))),
        post(&app, None, call(2, "add", json!({ "a": 3, "b": 4 })))
    );
    assert_eq!(a.body["result"]["content"][0]["text"], "3");
    assert_eq!(b.body["result"]["content"][0]["text"], "7");
    assert!(a.session_id().is_none());
    assert!(b.session_id().is_none());

    let stats = transport.state().stateless().unwrap().stats();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.live, 0);
    assert!(transport.sessions().is_empty());
}

#[tokio::test]
async fn test_stateless_handshake_has_no_session_header() {
    let (_transport, app) = stateless();
    let reply = post(&app, None, init_request()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["result"]["serverInfo"].is_object());
    assert!(reply.session_id().is_none());
}

#[tokio::test]
async fn test_stateless_concurrent_handshakes() {
    let (transport, app) = stateless();

    let (a, b) = tokio::join!(
        post(&app, None, init_request()),
        post(&app, None, init_request())
    );
    for reply in [&a, &b] {
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["result"]["protocolVersion"], "2025-03-26");
        assert!(reply.session_id().is_none());
    }

    let stats = transport.state().stateless().unwrap().stats();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.live, 0);
    assert!(transport.sessions().is_empty());
}

#[tokio::test]
async fn test_stateless_rejects_get_and_delete() {
    let (_transport, app) = stateless();
    for method in [Method::GET, Method::DELETE] {
        let reply = send(&app, request(method, Some("anything"), None)).await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(reply.body["error"]["code"], -32000);
        assert_eq!(reply.body["error"]["message"], "Method not allowed.");
        assert!(reply.body["id"].is_null());
    }
}

// ─────────────────────── middleware & health ───────────────────────

#[tokio::test]
async fn test_auth_guards_mcp_path_but_not_health() {
    let config = ServerConfig {
        auth_token: Some("s3cret".to_string()),
        ..ServerConfig::default()
    };
    let (transport, app) = server(config, default_registry());

    let reply = post(&app, None, init_request()).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"]["code"], -32001);
    assert!(transport.sessions().is_empty());

    let mut authed = request(Method::POST, None, Some(&init_request()));
    authed
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let reply = send(&app, authed).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.session_id().is_some());

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let reply = send(&app, health).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["sessions"], 1);
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let config = ServerConfig {
        rate_limit: Some(RateLimitConfig {
            rps: 1.0,
            burst: 1.0,
        }),
        ..ServerConfig::default()
    };
    let (_transport, app) = server(config, default_registry());

    let first = post(&app, None, init_request()).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = post(&app, None, init_request()).await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.body["error"]["code"], -32002);
    assert_eq!(second.headers[header::RETRY_AFTER], "1");
}

#[tokio::test]
async fn test_health_reports_mode() {
    let (_transport, app) = stateless();
    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let reply = send(&app, health).await;
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["mode"], "stateless");
    assert_eq!(reply.body["sessions"], 0);
}

#[tokio::test]
async fn test_close_all_drains_sessions() {
    let (transport, app) = stateful();
    open_session(&app).await;
    open_session(&app).await;
    assert_eq!(transport.sessions().close_all(), 2);
    assert!(transport.sessions().is_empty());
}
