//! Server configuration: defaults, overlaid by environment, overlaid by CLI.

use std::net::SocketAddr;

use crate::types::{McpError, McpResult};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3100;
pub const DEFAULT_PATH: &str = "/mcp";

/// Token bucket settings applied per client IP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained requests per second.
    pub rps: f64,
    /// Bucket capacity.
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 10.0,
            burst: 20.0,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub cors_enabled: bool,
    /// Allowed origin; `None` allows any.
    pub cors_origin: Option<String>,
    pub session_management_enabled: bool,
    /// Bearer token required on the MCP path when set.
    pub auth_token: Option<String>,
    /// Rate limiting is off when `None`.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            cors_enabled: false,
            cors_origin: None,
            session_management_enabled: true,
            auth_token: None,
            rate_limit: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> McpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> McpResult<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("MCP_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("MCP_PORT") {
            config.port = parse_value("MCP_PORT", &port)?;
        }
        if let Some(path) = lookup("MCP_PATH") {
            config.path = path;
        }
        if let Some(enabled) = lookup("MCP_CORS_ENABLED") {
            config.cors_enabled = parse_flag("MCP_CORS_ENABLED", &enabled)?;
        }
        config.cors_origin = lookup("MCP_CORS_ORIGIN").filter(|o| !o.is_empty());
        if let Some(enabled) = lookup("MCP_SESSION_MANAGEMENT") {
            config.session_management_enabled = parse_flag("MCP_SESSION_MANAGEMENT", &enabled)?;
        }
        config.auth_token = lookup("AGENTIC_TOKEN")
            .or_else(|| lookup("MCP_AUTH_TOKEN"))
            .filter(|t| !t.is_empty());

        let rps = lookup("MCP_RATE_LIMIT_RPS")
            .map(|v| parse_value::<f64>("MCP_RATE_LIMIT_RPS", &v))
            .transpose()?;
        let burst = lookup("MCP_RATE_LIMIT_BURST")
            .map(|v| parse_value::<f64>("MCP_RATE_LIMIT_BURST", &v))
            .transpose()?;
        if rps.is_some() || burst.is_some() {
            let defaults = RateLimitConfig::default();
            config.rate_limit = Some(RateLimitConfig {
                rps: rps.unwrap_or(defaults.rps),
                burst: burst.unwrap_or(defaults.burst),
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> McpResult<()> {
        if !self.path.starts_with('/') || self.path == "/health" {
            return Err(McpError::Config(format!(
                "Invalid MCP path '{}': must start with '/' and not be /health",
                self.path
            )));
        }
        if let Some(limit) = &self.rate_limit {
            if limit.rps <= 0.0 || limit.burst < 1.0 {
                return Err(McpError::Config(
                    "Rate limit needs rps > 0 and burst >= 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> McpResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| McpError::Config(format!("Invalid listen address: {e}")))
    }

    pub fn mode(&self) -> &'static str {
        if self.session_management_enabled {
            "stateful"
        } else {
            "stateless"
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> McpResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| McpError::Config(format!("{key}={raw}: {e}")))
}

fn parse_flag(key: &str, raw: &str) -> McpResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(McpError::Config(format!("{key}={raw}: expected a boolean"))),
    }
}
