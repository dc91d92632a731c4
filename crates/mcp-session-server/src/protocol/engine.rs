//! Protocol engine — one instance per session or stateless exchange.
//!
//! The engine owns its own copy of the registered units, negotiates the
//! handshake, and dispatches JSON-RPC requests to unit callbacks. It knows
//! nothing about HTTP; a transport feeds it parsed messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use mcp_units::{
    normalize_action_output, normalize_datasource_output, normalize_template_output,
    HandlerRecord, Notifier, Registry, UnitContext, UnitError, UnitKind,
};

use crate::types::*;

use super::negotiation::NegotiatedCapabilities;

/// Buffered server-to-client notifications per engine.
const NOTIFICATION_BUFFER: usize = 64;

/// Identity and greeting an engine presents during the handshake.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub server_info: Implementation,
    pub instructions: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            server_info: Implementation::default(),
            instructions: Some(
                "Use tools/list, resources/list and prompts/list to discover the units \
                 this server exposes."
                    .to_string(),
            ),
        }
    }
}

/// Fan-out of notifications to the session's stream subscribers.
struct Outbound {
    sender: broadcast::Sender<JsonRpcNotification>,
    min_level: RwLock<LogLevel>,
}

impl Notifier for Outbound {
    fn notify(&self, method: &str, params: Value) {
        if method == LOG_MESSAGE_METHOD {
            let level = params
                .get("level")
                .and_then(Value::as_str)
                .map(LogLevel::parse_lenient)
                .unwrap_or_default();
            let min = self.min_level.read().map(|l| *l).unwrap_or_default();
            if level < min {
                return;
            }
        }
        // No subscribers is not an error: the client may never open a stream.
        let _ = self
            .sender
            .send(JsonRpcNotification::new(method.to_string(), Some(params)));
    }
}

/// The protocol engine bound 1:1 to a transport.
pub struct Engine {
    units: Registry,
    options: EngineOptions,
    capabilities: Mutex<NegotiatedCapabilities>,
    outbound: Arc<Outbound>,
    session_id: OnceLock<String>,
    closed: AtomicBool,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            units: Registry::new(),
            options,
            capabilities: Mutex::new(NegotiatedCapabilities::default()),
            outbound: Arc::new(Outbound {
                sender,
                min_level: RwLock::new(LogLevel::Debug),
            }),
            session_id: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Build an engine carrying every record from `registry`.
    pub fn from_registry(options: EngineOptions, registry: &Registry) -> Self {
        let mut engine = Self::new(options);
        for record in registry.records() {
            engine.register_unit(record.clone());
        }
        engine
    }

    pub fn register_unit(&mut self, record: HandlerRecord) {
        self.units.register(record);
    }

    pub fn units(&self) -> &Registry {
        &self.units
    }

    /// Record the session id minted by the transport.
    pub fn bind_session(&self, session_id: &str) {
        if self.session_id.set(session_id.to_string()).is_err() {
            tracing::warn!("Engine already bound to session {:?}", self.session_id.get());
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    /// Subscribe to server-to-client notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.outbound.sender.subscribe()
    }

    pub fn notify(&self, method: &str, params: Value) {
        self.outbound.notify(method, params);
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(session = ?self.session_id(), "Engine closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn is_initialized(&self) -> bool {
        self.capabilities.lock().await.initialized
    }

    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            _ => {
                tracing::warn!("Received unexpected message type from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let result = if self.is_closed() {
            Err(McpError::Session("Session is closed".to_string()))
        } else {
            self.dispatch_request(request).await
        };

        match result {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
            Err(e) => serde_json::to_value(e.to_json_rpc_error(id)).unwrap_or_default(),
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let JsonRpcRequest { method, params, .. } = request;
        match method.as_str() {
            HANDSHAKE_METHOD => self.handle_initialize(params).await,
            "ping" => Ok(Value::Object(serde_json::Map::new())),

            "tools/list" => self.handle_tools_list(),
            "tools/call" => {
                let call: ToolCallParams = required_params(params, "Tool call params required")?;
                self.call_tool(&call.name, call.arguments).await
            }

            "resources/list" => self.handle_resources_list(),
            "resources/templates/list" => self.handle_resource_templates_list(),
            "resources/read" => self.handle_resources_read(params).await,

            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(params).await,

            "logging/setLevel" => {
                let set: SetLevelParams = required_params(params, "Level required")?;
                if let Ok(mut level) = self.outbound.min_level.write() {
                    *level = set.level;
                }
                Ok(Value::Object(serde_json::Map::new()))
            }

            // Actions may also be invoked directly by name.
            other if self.units.get_unit(UnitKind::Action, other).is_ok() => {
                self.call_tool(other, params).await
            }

            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                let mut caps = self.capabilities.lock().await;
                if let Err(e) = caps.mark_initialized() {
                    tracing::warn!("Failed to mark initialized: {e}");
                }
            }
            "notifications/cancelled" | "$/cancelRequest" => {
                let params = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelRequestParams>(p).ok());
                tracing::info!(request = ?params.map(|p| p.request_id), "Received cancellation notification");
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    fn unit_context(&self) -> UnitContext {
        UnitContext::new(
            self.outbound.clone(),
            self.session_id().map(str::to_string),
        )
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams =
            required_params(params, "Initialize params required")?;

        let mut caps = self.capabilities.lock().await;
        let result = caps.negotiate(
            init_params,
            &self.options.server_info,
            ServerCapabilities::for_registry(&self.units),
            self.options.instructions.clone(),
        )?;

        to_result(result)
    }

    fn handle_tools_list(&self) -> McpResult<Value> {
        let tools = self
            .units
            .list_units(UnitKind::Action)
            .iter()
            .map(|record| ToolDefinition {
                name: record.name.clone(),
                description: record.meta.description.clone(),
                input_schema: record.input_schema(),
            })
            .collect();

        to_result(ToolListResult {
            tools,
            next_cursor: None,
        })
    }

    /// Invoke an action. Callback failures become an error result, not a
    /// JSON-RPC error, so the session stays usable.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<Value> {
        let record = self.units.get_unit(UnitKind::Action, name)?;

        let result = match record.invoke(arguments, self.unit_context()).await {
            Ok(value) => normalize_action_output(value),
            Err(UnitError::Handler(message)) => {
                self.report_failure(UnitKind::Action, name, &message);
                ToolCallResult::error(message)
            }
            Err(e) => return Err(e.into()),
        };

        to_result(result)
    }

    fn handle_resources_list(&self) -> McpResult<Value> {
        let resources = self
            .units
            .list_units(UnitKind::Datasource)
            .iter()
            .filter(|r| !r.is_template)
            .map(|record| ResourceDefinition {
                uri: record
                    .meta
                    .uri_template
                    .clone()
                    .unwrap_or_else(|| record.name.clone()),
                name: record.name.clone(),
                description: record.meta.description.clone(),
                mime_type: record.meta.mime_type.clone(),
            })
            .collect();

        to_result(ResourceListResult {
            resources,
            next_cursor: None,
        })
    }

    fn handle_resource_templates_list(&self) -> McpResult<Value> {
        let resource_templates = self
            .units
            .list_units(UnitKind::Datasource)
            .iter()
            .filter(|r| r.is_template)
            .filter_map(|record| {
                Some(ResourceTemplateDefinition {
                    uri_template: record.meta.uri_template.clone()?,
                    name: record.name.clone(),
                    description: record.meta.description.clone(),
                    mime_type: record.meta.mime_type.clone(),
                })
            })
            .collect();

        to_result(ResourceTemplateListResult {
            resource_templates,
            next_cursor: None,
        })
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> McpResult<Value> {
        let read: ResourceReadParams = required_params(params, "Resource read params required")?;

        let (record, mut vars) = self
            .units
            .resolve_uri(&read.uri)
            .ok_or_else(|| McpError::ResourceNotFound(read.uri.clone()))?;
        vars.insert("uri".to_string(), Value::String(read.uri.clone()));

        let result = match record
            .invoke(Some(Value::Object(vars)), self.unit_context())
            .await
        {
            Ok(value) => {
                normalize_datasource_output(&read.uri, record.meta.mime_type.as_deref(), value)
            }
            Err(UnitError::Handler(message)) => {
                self.report_failure(UnitKind::Datasource, &record.name, &message);
                ReadResourceResult::error(&read.uri, message)
            }
            Err(e) => return Err(e.into()),
        };

        to_result(result)
    }

    fn handle_prompts_list(&self) -> McpResult<Value> {
        let prompts = self
            .units
            .list_units(UnitKind::Template)
            .iter()
            .map(|record| PromptDefinition {
                name: record.name.clone(),
                description: record.meta.description.clone(),
                arguments: record.validator().map(|shape| {
                    shape
                        .fields()
                        .map(|(name, field)| PromptArgument {
                            name: name.to_string(),
                            description: field.description.clone(),
                            required: !field.optional,
                        })
                        .collect()
                }),
            })
            .collect();

        to_result(PromptListResult {
            prompts,
            next_cursor: None,
        })
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> McpResult<Value> {
        let get: PromptGetParams = required_params(params, "Prompt get params required")?;
        let record = self.units.get_unit(UnitKind::Template, &get.name)?;

        let result = match record.invoke(get.arguments, self.unit_context()).await {
            Ok(value) => normalize_template_output(record.description(), value),
            Err(UnitError::Handler(message)) => {
                self.report_failure(UnitKind::Template, &record.name, &message);
                PromptGetResult::error(record.description(), message)
            }
            Err(e) => return Err(e.into()),
        };

        to_result(result)
    }

    /// Callback failures are logged and surfaced to the client as an
    /// error-level log notification.
    fn report_failure(&self, kind: UnitKind, name: &str, message: &str) {
        tracing::warn!(kind = %kind, unit = name, "Unit failed: {message}");
        let params = LogMessageParams {
            level: LogLevel::Error,
            logger: Some(name.to_string()),
            data: Value::String(format!("{name}: {message}")),
        };
        if let Ok(params) = serde_json::to_value(params) {
            self.notify(LOG_MESSAGE_METHOD, params);
        }
    }
}

fn required_params<T: DeserializeOwned>(params: Option<Value>, missing: &str) -> McpResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams(missing.to_string()))
}

fn to_result(value: impl serde::Serialize) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}
