//! Per-client admission control.
//!
//! # Responsibilities
//! - Decide whether a client may send another request
//! - Reject over-limit clients with 429 before routing
//!
//! # Design Decisions
//! - Clients are keyed by peer IP
//! - Fixed window counters; the window is reset lazily by the first call
//!   after it elapses, so no background task is needed

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::config::{RateLimitConfig, RateLimiterKind};
use crate::http::response::plain_error;
use crate::observability::metrics;

/// Admission control contract.
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Count a request from `client` and say whether it may proceed.
    fn is_allowed(&self, client: &str) -> bool;

    /// Request counts per client in the current window.
    fn state(&self) -> HashMap<String, u32>;

    /// Requests allowed per window, and the window length.
    fn limit(&self) -> (u32, Duration);
}

/// Admits everything.
#[derive(Debug, Default)]
pub struct NoOpRateLimiter;

impl RateLimiter for NoOpRateLimiter {
    fn is_allowed(&self, _client: &str) -> bool {
        true
    }

    fn state(&self) -> HashMap<String, u32> {
        HashMap::new()
    }

    fn limit(&self) -> (u32, Duration) {
        (u32::MAX, Duration::ZERO)
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    counts: HashMap<String, u32>,
}

/// At most `limit` requests per client per window.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    current: Mutex<Window>,
}

impl FixedWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            current: Mutex::new(Window {
                started: Instant::now(),
                counts: HashMap::new(),
            }),
        }
    }

    fn roll(&self, window: &mut Window) {
        let now = Instant::now();
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.counts.clear();
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn is_allowed(&self, client: &str) -> bool {
        let mut window = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.roll(&mut window);

        let count = window.counts.entry(client.to_string()).or_insert(0);
        if *count >= self.limit {
            return false;
        }
        *count += 1;
        true
    }

    fn state(&self) -> HashMap<String, u32> {
        let mut window = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.roll(&mut window);
        window.counts.clone()
    }

    fn limit(&self) -> (u32, Duration) {
        (self.limit, self.window)
    }
}

/// Build the configured limiter.
pub fn from_config(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    match config.kind {
        RateLimiterKind::None => Arc::new(NoOpRateLimiter),
        RateLimiterKind::FixedWindow => {
            tracing::info!(limit = config.limit, window_ms = config.window_ms, "Fixed window rate limiting enabled");
            Arc::new(FixedWindowRateLimiter::new(config.limit, config.window()))
        }
    }
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<dyn RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        tracing::error!(uri = %request.uri(), "Could not determine client IP");
        return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Could not determine client IP");
    };

    let client = addr.ip().to_string();
    if limiter.is_allowed(&client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited("fixed_window");
        plain_error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
    }
}
