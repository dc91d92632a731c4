//! HTTP middleware stages that run before the MCP router.
//!
//! None of these know about sessions; they see only the raw request.

pub mod auth;
pub mod metrics;
pub mod rate_limit;

pub use auth::{auth_layer, AuthState};
pub use self::metrics::metrics_layer;
pub use rate_limit::{rate_limit_layer, RateLimiter};
