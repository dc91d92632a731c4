//! Stdio transport — reads JSON-RPC from stdin, writes to stdout.
//!
//! A single process-wide session: one engine, no session ids. Engine
//! notifications are interleaved with responses on stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};

use crate::protocol::Engine;
use crate::types::{McpError, McpResult};

use super::framing;

/// Stdio transport for desktop MCP clients.
pub struct StdioTransport {
    engine: Arc<Engine>,
}

impl StdioTransport {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Run the transport loop until EOF on stdin.
    pub async fn run(&self) -> McpResult<()> {
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();

        let forwarder = tokio::spawn(forward_notifications(
            self.engine.subscribe(),
            stdout.clone(),
        ));

        tracing::info!("Stdio transport started");

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await.map_err(McpError::Io)?;

            if bytes_read == 0 {
                tracing::info!("EOF on stdin, shutting down");
                break;
            }

            if line.trim().is_empty() {
                continue;
            }

            let framed = match framing::parse_message(&line) {
                Ok(msg) => match self.engine.handle_message(msg).await {
                    Some(response) => framing::frame_message(&response)?,
                    None => continue,
                },
                Err(e) => {
                    tracing::warn!("Parse error: {e}");
                    framing::frame_error(&e)?
                }
            };
            write_line(&mut *stdout.lock().await, &framed).await?;
        }

        self.engine.close();
        forwarder.abort();
        Ok(())
    }
}

async fn forward_notifications<W>(
    mut notifications: broadcast::Receiver<crate::types::JsonRpcNotification>,
    out: Arc<Mutex<W>>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                let framed = serde_json::to_value(&notification)
                    .map_err(McpError::Json)
                    .and_then(|v| framing::frame_message(&v));
                match framed {
                    Ok(framed) => {
                        if let Err(e) = write_line(&mut *out.lock().await, &framed).await {
                            tracing::warn!("Failed to write notification: {e}");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to frame notification: {e}"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dropped notifications on stdout");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, framed: &str) -> McpResult<()> {
    out.write_all(framed.as_bytes()).await.map_err(McpError::Io)?;
    out.flush().await.map_err(McpError::Io)
}
