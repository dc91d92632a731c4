//! Streamable HTTP transport — one instance per session or stateless exchange.
//!
//! The transport drives exactly one [`Engine`]. Exchanges are serialized
//! through a FIFO lock, so a session never processes two requests at once
//! and responses come back in the order requests arrived. Lifecycle changes
//! are reported as [`TransportEvent`]s on a channel the owner subscribes to
//! once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use futures::Stream;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};

use crate::protocol::Engine;
use crate::types::{JsonRpcMessage, JsonRpcNotification, McpError, McpResult};

/// Produces a fresh session identifier.
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Mint an unguessable session id (UUID v4 from the OS RNG).
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle events emitted by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The handshake succeeded and `session_id` was minted. The receiver
    /// must make the session routable, then fire `registered`; the handshake
    /// response is held until it does.
    Established {
        session_id: String,
        registered: oneshot::Sender<()>,
    },
    /// The transport shut down; emitted exactly once.
    Closed { session_id: Option<String> },
}

/// Outcome of a single POST exchange.
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// JSON-RPC response, or `None` when the message was a notification.
    pub response: Option<serde_json::Value>,
    /// Set when this exchange established the session.
    pub established: Option<String>,
}

pub struct StreamableTransport {
    id_generator: Option<SessionIdGenerator>,
    session_id: OnceLock<String>,
    engine: OnceLock<Arc<Engine>>,
    exchange: Mutex<()>,
    events: mpsc::UnboundedSender<TransportEvent>,
    event_rx: StdMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    closed: watch::Sender<bool>,
    stream_open: AtomicBool,
}

impl StreamableTransport {
    /// Stateful transport that mints a session id on a successful handshake.
    pub fn stateful(id_generator: SessionIdGenerator) -> Self {
        Self::build(Some(id_generator))
    }

    /// Transport for a single stateless exchange; never mints an id.
    pub fn stateless() -> Self {
        Self::build(None)
    }

    fn build(id_generator: Option<SessionIdGenerator>) -> Self {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            id_generator,
            session_id: OnceLock::new(),
            engine: OnceLock::new(),
            exchange: Mutex::new(()),
            events,
            event_rx: StdMutex::new(Some(event_rx)),
            closed,
            stream_open: AtomicBool::new(false),
        }
    }

    /// Take the lifecycle event receiver. Only the first caller gets it.
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Bind the engine this transport drives.
    pub fn connect(&self, engine: Arc<Engine>) -> McpResult<()> {
        self.engine
            .set(engine)
            .map_err(|_| McpError::Transport("Transport already connected".to_string()))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn engine(&self) -> McpResult<&Arc<Engine>> {
        self.engine
            .get()
            .ok_or_else(|| McpError::Transport("Transport not connected".to_string()))
    }

    /// Process one inbound message. Holds the exchange lock for the whole
    /// call, including the handler invocation.
    pub async fn handle_post(&self, message: JsonRpcMessage) -> McpResult<ExchangeOutcome> {
        let _turn = self.exchange.lock().await;

        if self.is_closed() {
            return Err(McpError::Session("Session is closed".to_string()));
        }
        let engine = self.engine()?;

        let is_handshake = message.is_handshake();
        if is_handshake && self.session_id.get().is_some() {
            return Err(McpError::InvalidRequest(
                "Server already initialized".to_string(),
            ));
        }

        tracing::debug!(
            session = ?self.session_id(),
            method = ?message.method(),
            "Dispatching exchange"
        );
        let response = engine.handle_message(message).await;

        let established = match (&self.id_generator, &response) {
            (Some(generate), Some(body)) if is_handshake && body.get("result").is_some() => {
                Some(self.establish(engine, generate()).await?)
            }
            _ => None,
        };

        Ok(ExchangeOutcome {
            response,
            established,
        })
    }

    async fn establish(&self, engine: &Engine, session_id: String) -> McpResult<String> {
        self.session_id
            .set(session_id.clone())
            .map_err(|_| McpError::InternalError("Session id already minted".to_string()))?;
        engine.bind_session(&session_id);

        let (registered, ack) = oneshot::channel();
        self.events
            .send(TransportEvent::Established {
                session_id: session_id.clone(),
                registered,
            })
            .map_err(|_| McpError::Transport("No session listener attached".to_string()))?;
        ack.await
            .map_err(|_| McpError::Transport("Session listener dropped".to_string()))?;

        tracing::info!(session = %session_id, "Session established");
        Ok(session_id)
    }

    /// Open the server-to-client notification stream.
    ///
    /// At most one stream per transport. The stream ends when the transport
    /// closes; dropping it (client disconnect) closes the transport.
    pub fn open_stream(
        self: &Arc<Self>,
    ) -> McpResult<impl Stream<Item = JsonRpcNotification> + Send + 'static> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(McpError::Session("Session is closed".to_string()));
        }
        let mut notifications = self.engine()?.subscribe();
        if self.stream_open.swap(true, Ordering::SeqCst) {
            return Err(McpError::Conflict(
                "Only one notification stream is allowed per session".to_string(),
            ));
        }

        let guard = DisconnectGuard(self.clone());

        Ok(async_stream::stream! {
            let _guard = guard;
            loop {
                let received = tokio::select! {
                    changed = closed.changed() => {
                        if changed.is_err() || *closed.borrow() {
                            break;
                        }
                        continue;
                    }
                    received = notifications.recv() => received,
                };
                match received {
                    Ok(notification) => yield notification,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notification stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Shut the transport down. Idempotent; the first call emits `Closed`.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        let session_id = self.session_id.get().cloned();
        tracing::debug!(session = ?session_id, "Transport closed");
        let _ = self.events.send(TransportEvent::Closed { session_id });
    }
}

/// Closes the transport when the notification stream is dropped.
struct DisconnectGuard(Arc<StreamableTransport>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.stream_open.store(false, Ordering::SeqCst);
        if !self.0.is_closed() {
            tracing::info!(session = ?self.0.session_id(), "Notification stream disconnected");
            self.0.close();
        }
    }
}
