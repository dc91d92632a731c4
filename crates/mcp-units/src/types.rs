//! Core data types for callable units.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::FieldMap;

/// The three kinds of callable unit a server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Invoked through `tools/call`.
    Action,
    /// Read through `resources/read`.
    Datasource,
    /// Expanded through `prompts/get`.
    Template,
}

impl UnitKind {
    pub const ALL: [UnitKind; 3] = [UnitKind::Action, UnitKind::Datasource, UnitKind::Template];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Action => "action",
            UnitKind::Datasource => "datasource",
            UnitKind::Template => "template",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            UnitKind::Action => 0,
            UnitKind::Datasource => 1,
            UnitKind::Template => 2,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability metadata supplied at registration time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<FieldMap>,
    /// Resource URI for datasources. May contain `{var}` placeholders.
    #[serde(default, rename = "uriTemplate", skip_serializing_if = "Option::is_none")]
    pub uri_template: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl UnitMeta {
    pub fn describe(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: FieldMap) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri_template = Some(uri.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Arguments handed to a unit callback.
///
/// `Validated` carries values that passed the unit's declared schema.
/// `Untyped` is the explicit bag used when no schema was declared.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitArgs {
    Validated(Map<String, Value>),
    Untyped(Map<String, Value>),
}

impl UnitArgs {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Fetch a required numeric argument.
    pub fn require_f64(&self, key: &str) -> UnitResult<f64> {
        self.get_f64(key)
            .ok_or_else(|| UnitError::Validation(format!("'{key}' must be a number")))
    }

    /// Fetch a required string argument.
    pub fn require_str(&self, key: &str) -> UnitResult<&str> {
        self.get_str(key)
            .ok_or_else(|| UnitError::Validation(format!("'{key}' must be a string")))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        match self {
            UnitArgs::Validated(map) | UnitArgs::Untyped(map) => map,
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        match self {
            UnitArgs::Validated(map) | UnitArgs::Untyped(map) => map,
        }
    }

    pub fn is_validated(&self) -> bool {
        matches!(self, UnitArgs::Validated(_))
    }
}

/// Sink for server-to-client notifications raised while a unit runs.
pub trait Notifier: Send + Sync {
    fn notify(&self, method: &str, params: Value);
}

/// Per-invocation context supplied by the engine.
#[derive(Clone, Default)]
pub struct UnitContext {
    notifier: Option<Arc<dyn Notifier>>,
    session_id: Option<String>,
}

impl UnitContext {
    pub fn new(notifier: Arc<dyn Notifier>, session_id: Option<String>) -> Self {
        Self {
            notifier: Some(notifier),
            session_id,
        }
    }

    /// Session the invocation belongs to. `None` in stateless mode.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Emit a `notifications/message` log entry to the client.
    pub fn log(&self, level: &str, data: Value) {
        self.notify(
            "notifications/message",
            serde_json::json!({ "level": level, "data": data }),
        );
    }

    pub fn notify(&self, method: &str, params: Value) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(method, params);
        }
    }
}

impl fmt::Debug for UnitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitContext")
            .field("session_id", &self.session_id)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// Errors raised by the registry or by unit callbacks.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: UnitKind, name: String },

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("{0}")]
    Handler(String),
}

impl UnitError {
    pub fn handler(message: impl Into<String>) -> Self {
        UnitError::Handler(message.into())
    }
}

/// Convenience result type.
pub type UnitResult<T> = Result<T, UnitError>;
