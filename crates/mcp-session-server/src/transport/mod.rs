//! Transport layer for MCP communication.

pub mod framing;
pub mod http;
pub mod stateless;
pub mod stdio;
pub mod streamable;

pub use http::{HttpTransport, SESSION_HEADER};
pub use stateless::{StatelessHandler, StatelessStats};
pub use stdio::StdioTransport;
pub use streamable::{
    generate_session_id, ExchangeOutcome, SessionIdGenerator, StreamableTransport,
    TransportEvent,
};
