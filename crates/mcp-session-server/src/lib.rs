//! MCP Session Server — session-scoped MCP over streamable HTTP, with a
//! stateless fallback and a stdio mode.

pub mod config;
pub mod middleware;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod units;

pub use config::ServerConfig;
pub use protocol::{Engine, EngineOptions};
pub use session::SessionTable;
pub use transport::{HttpTransport, StatelessHandler, StdioTransport};
pub use units::default_registry;
