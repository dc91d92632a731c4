//! MCP protocol handling — the per-session engine and JSON-RPC dispatch.

pub mod engine;
pub mod negotiation;
pub mod validator;

pub use engine::{Engine, EngineOptions};
