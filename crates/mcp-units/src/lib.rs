//! Callable units for MCP servers — registry, schema adapter, and output normalization.

pub mod content;
pub mod registry;
pub mod schema;
pub mod types;
pub mod uri;

pub use content::{
    normalize_action_output, normalize_datasource_output, normalize_template_output,
    PromptGetResult, PromptMessage, ReadResourceResult, ResourceContent, ToolCallResult,
    ToolContent,
};
pub use registry::{unit_fn, HandlerRecord, Registry, UnitCallback, UnitFuture};
pub use schema::{fields, to_validator, FieldMap, FieldSpec, ObjectShape, ShapeField, Validator};
pub use types::*;
pub use uri::UriTemplate;
