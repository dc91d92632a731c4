//! Stateless mode — a throwaway engine and transport per POST.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use mcp_units::Registry;
use serde::Serialize;

use crate::protocol::{Engine, EngineOptions};
use crate::types::{JsonRpcMessage, McpResult};

use super::StreamableTransport;

/// Counters exposed for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatelessStats {
    /// Engines built since start.
    pub created: u64,
    /// Engines not yet torn down.
    pub live: usize,
}

/// Serves each exchange on a fresh engine that never outlives it.
pub struct StatelessHandler {
    registry: Arc<Registry>,
    options: EngineOptions,
    created: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl StatelessHandler {
    pub fn new(registry: Arc<Registry>, options: EngineOptions) -> Self {
        Self {
            registry,
            options,
            created: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stats(&self) -> StatelessStats {
        StatelessStats {
            created: self.created.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
        }
    }

    /// Process one message. The engine and transport are torn down when
    /// this future completes, fails, or is dropped.
    pub async fn handle(&self, message: JsonRpcMessage) -> McpResult<Option<serde_json::Value>> {
        let context = self.open()?;
        let outcome = context.transport.handle_post(message).await?;
        Ok(outcome.response)
    }

    fn open(&self) -> McpResult<StatelessContext> {
        let engine = Arc::new(Engine::from_registry(self.options.clone(), &self.registry));
        let transport = Arc::new(StreamableTransport::stateless());

        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let context = StatelessContext {
            transport,
            engine,
            live: self.live.clone(),
        };

        context.transport.connect(context.engine.clone())?;
        Ok(context)
    }
}

/// One exchange's engine and transport. Dropping it closes both.
struct StatelessContext {
    transport: Arc<StreamableTransport>,
    engine: Arc<Engine>,
    live: Arc<AtomicUsize>,
}

impl Drop for StatelessContext {
    fn drop(&mut self) {
        self.transport.close();
        self.engine.close();
        self.live.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("Stateless exchange torn down");
    }
}
