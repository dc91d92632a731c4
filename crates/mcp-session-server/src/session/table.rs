//! Concurrent map of established sessions.
//!
//! Entries are inserted only by a transport watcher when a handshake
//! succeeds, and removed on DELETE, on transport closure, or at shutdown.

use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::protocol::Engine;
use crate::transport::{StreamableTransport, TransportEvent};
use crate::types::{McpError, McpResult};

/// One established session.
pub struct Session {
    pub id: String,
    pub transport: Arc<StreamableTransport>,
    pub engine: Arc<Engine>,
    pub created_at: DateTime<Utc>,
    last_seen_at: Mutex<DateTime<Utc>>,
}

impl Session {
    fn new(id: String, transport: Arc<StreamableTransport>, engine: Arc<Engine>) -> Self {
        let now = Utc::now();
        Self {
            id,
            transport,
            engine,
            created_at: now,
            last_seen_at: Mutex::new(now),
        }
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
            .lock()
            .map(|t| *t)
            .unwrap_or(self.created_at)
    }

    fn touch(&self) {
        if let Ok(mut seen) = self.last_seen_at.lock() {
            *seen = Utc::now();
        }
    }

    fn close(&self) {
        self.transport.close();
        self.engine.close();
    }
}

/// Session id → live transport and engine.
#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session, refreshing its last-seen time.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| entry.value().clone())?;
        session.touch();
        Some(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn insert(&self, session: Session) {
        let id = session.id.clone();
        if self.sessions.insert(id.clone(), Arc::new(session)).is_some() {
            tracing::error!(session = %id, "Session id collision; previous entry replaced");
        }
        self.record_size();
    }

    /// Remove and close a session. Returns `None` if the id is unknown.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        self.record_size();
        session.close();
        tracing::info!(session = %id, "Session removed");
        Some(session)
    }

    /// Remove `id` only while it still maps to `transport`.
    fn remove_if_same(&self, id: &str, transport: *const StreamableTransport) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, session| Arc::as_ptr(&session.transport) == transport)
            .is_some();
        if removed {
            self.record_size();
            tracing::info!(session = %id, "Session closed by transport");
        }
        removed
    }

    /// Close and drop every session. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let ids = self.ids();
        let closed = ids.iter().filter(|id| self.remove(id).is_some()).count();
        if closed > 0 {
            tracing::info!(closed, "Closed all sessions");
        }
        closed
    }

    /// Subscribe to a transport's lifecycle events and keep the table in
    /// step with them. Must be called before the handshake is processed.
    pub fn watch(
        &self,
        transport: &Arc<StreamableTransport>,
        engine: Arc<Engine>,
    ) -> McpResult<JoinHandle<()>> {
        let mut events = transport.subscribe().ok_or_else(|| {
            McpError::Transport("Transport events already subscribed".to_string())
        })?;
        let table = self.clone();
        let watched: Weak<StreamableTransport> = Arc::downgrade(transport);

        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Established {
                        session_id,
                        registered,
                    } => {
                        let Some(transport) = watched.upgrade() else {
                            break;
                        };
                        table.insert(Session::new(session_id, transport, engine.clone()));
                        let _ = registered.send(());
                    }
                    TransportEvent::Closed { session_id } => {
                        if let Some(id) = session_id {
                            table.remove_if_same(&id, watched.as_ptr());
                        }
                        break;
                    }
                }
            }
            engine.close();
        }))
    }

    fn record_size(&self) {
        metrics::gauge!("mcp_sessions_active").set(self.sessions.len() as f64);
    }
}

impl std::fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTable")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
