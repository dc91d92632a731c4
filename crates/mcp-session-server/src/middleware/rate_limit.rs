//! Rate limiting middleware — one token bucket per client IP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::types::McpError;

/// Minimum spacing between sweeps of idle buckets.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> Result<(), f64> {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.rps).min(config.burst);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err((1.0 - self.tokens) / config.rps)
        }
    }
}

/// Buckets by client key, plus when idle ones were last dropped.
struct Buckets {
    by_key: HashMap<String, TokenBucket>,
    last_sweep: Instant,
}

impl Buckets {
    /// Drop buckets idle long enough to have refilled; a fresh bucket is
    /// identical to them.
    fn sweep(&mut self, idle_after: Duration, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = now;
        let before = self.by_key.len();
        self.by_key
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < idle_after);
        let evicted = before - self.by_key.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.by_key.len(), "Swept idle rate-limit buckets");
        }
    }
}

pub struct RateLimiter {
    buckets: Mutex<Buckets>,
    config: RateLimitConfig,
    idle_after: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let idle_after =
            Duration::try_from_secs_f64(config.burst / config.rps).unwrap_or(Duration::MAX);
        Self {
            buckets: Mutex::new(Buckets {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            config,
            idle_after,
        }
    }

    /// Charge one request to `key`. On refusal, returns whole seconds to wait.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let Ok(mut buckets) = self.buckets.lock() else {
            return Ok(());
        };
        buckets.sweep(self.idle_after, now);
        let bucket = buckets
            .by_key
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.burst, now));

        bucket
            .try_acquire(&self.config, now)
            .map_err(|wait| (wait.ceil() as u64).max(1))
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().map(|b| b.by_key.len()).unwrap_or(0)
    }
}

pub async fn rate_limit_layer(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after_secs) => {
            tracing::warn!(client = %key, retry_after_secs, "Rate limit exceeded");
            metrics::counter!("mcp_rate_limited_total").increment(1);
            McpError::RateLimited { retry_after_secs }.into_response()
        }
    }
}
