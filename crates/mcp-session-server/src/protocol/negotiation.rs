//! MCP capability negotiation during initialization.

use crate::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, McpError, McpResult,
    ServerCapabilities, MCP_VERSION, SUPPORTED_VERSIONS,
};

/// Stored client capabilities after negotiation.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub client: ClientCapabilities,
    pub client_info: Option<Implementation>,
    pub protocol_version: Option<String>,
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    pub fn negotiate(
        &mut self,
        params: InitializeParams,
        server_info: &Implementation,
        capabilities: ServerCapabilities,
        instructions: Option<String>,
    ) -> McpResult<InitializeResult> {
        if self.client_info.is_some() {
            return Err(McpError::InvalidRequest(
                "Server already initialized".to_string(),
            ));
        }

        let protocol_version = if SUPPORTED_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version.clone()
        } else {
            tracing::warn!(
                "Client requested protocol version {}, server supports {}. Proceeding with server version.",
                params.protocol_version,
                MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        tracing::info!(
            "Initialized with client: {} v{}",
            params.client_info.name,
            params.client_info.version
        );

        self.client = params.capabilities;
        self.client_info = Some(params.client_info);
        self.protocol_version = Some(protocol_version.clone());

        Ok(InitializeResult {
            protocol_version,
            capabilities,
            server_info: server_info.clone(),
            instructions,
        })
    }

    pub fn mark_initialized(&mut self) -> McpResult<()> {
        if self.client_info.is_none() {
            return Err(McpError::InvalidRequest(
                "initialized notification before initialize".to_string(),
            ));
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
        Ok(())
    }
}
