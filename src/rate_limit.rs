//! In-memory request rate limiting.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<String, VecDeque<Instant>>`,
//! keyed by `rate_limit:<identity>:<route>` where identity is `user:<uuid>`
//! for authenticated callers and `ip:<addr>` otherwise. The middleware
//! resolves the caller once and leaves the `SessionUser` in request
//! extensions so handlers do not repeat the lookup.
//!
//! TRADE-OFFS
//! ==========
//! Counters live in process memory, so limits are per instance. Empty
//! windows are dropped on access to keep the map bounded by active callers.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use time::OffsetDateTime;

use crate::services::{activity_log, session};
use crate::state::AppState;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self { max_requests, window: Duration::from_secs(window_secs) }
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("rate limit exceeded ({attempts}/{limit} requests per {window_secs}s)")]
pub struct RateLimitExceeded {
    pub attempts: usize,
    pub limit: usize,
    pub window_secs: u64,
    /// Whole seconds until the oldest request leaves the window.
    pub retry_after_secs: u64,
}

/// Budget left after an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: usize,
    pub remaining: usize,
    pub reset_after: Duration,
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), config }
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check the key's window, then record the request.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` when the window is already full.
    pub fn check_and_record(&self, key: &str) -> Result<RateLimitStatus, RateLimitExceeded> {
        self.check_and_record_at(key, Instant::now())
    }

    fn check_and_record_at(&self, key: &str, now: Instant) -> Result<RateLimitStatus, RateLimitExceeded> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        let window = inner.entry(key.to_owned()).or_default();
        prune_window(window, now, cfg.window);
        if window.len() >= cfg.max_requests {
            let wait = window
                .front()
                .map_or(cfg.window, |oldest| cfg.window.saturating_sub(now.duration_since(*oldest)));
            return Err(RateLimitExceeded {
                attempts: window.len(),
                limit: cfg.max_requests,
                window_secs: cfg.window.as_secs(),
                retry_after_secs: ceil_secs(wait).max(1),
            });
        }
        window.push_back(now);

        let remaining = cfg.max_requests - window.len();
        let reset_after = window
            .front()
            .map_or(cfg.window, |oldest| cfg.window.saturating_sub(now.duration_since(*oldest)));

        inner.retain(|_, w| {
            prune_window(w, now, cfg.window);
            !w.is_empty()
        });

        Ok(RateLimitStatus { limit: cfg.max_requests, remaining, reset_after })
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Build the limiter key for a caller and route.
#[must_use]
pub fn request_signature(user: Option<&session::SessionUser>, ip: Option<&str>, route: &str) -> String {
    let identity = match (user, ip) {
        (Some(user), _) => format!("user:{}", user.id),
        (None, Some(ip)) => format!("ip:{ip}"),
        (None, None) => "ip:unknown".to_owned(),
    };
    format!("rate_limit:{identity}:{route}")
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Route-level middleware enforcing the per-caller budget.
pub async fn enforce(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |p| p.as_str().to_owned());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);

    let user = match session::token_from_headers(req.headers()) {
        Some(token) => match session::validate_session(&state.pool, &token).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed during rate limiting");
                None
            }
        },
        None => None,
    };

    let key = request_signature(user.as_ref(), ip.as_deref(), &route);
    let status = match state.rate_limiter.check_and_record(&key) {
        Ok(status) => status,
        Err(exceeded) => {
            activity_log::log_security_event(
                "rate_limit_exceeded",
                &serde_json::json!({
                    "ip": ip,
                    "user_id": user.as_ref().map(|u| u.id),
                    "endpoint": route,
                    "attempts": exceeded.attempts,
                    "limit": exceeded.limit,
                }),
            );
            return too_many_requests(exceeded.retry_after_secs);
        }
    };

    if let Some(user) = user {
        req.extensions_mut().insert(user);
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), status);
    response
}

fn too_many_requests(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "success": false,
            "message": RATE_LIMIT_MESSAGE,
            "retry_after": retry_after,
        })),
    )
        .into_response()
}

fn apply_headers(headers: &mut HeaderMap, status: RateLimitStatus) {
    let reset_at = OffsetDateTime::now_utc().unix_timestamp()
        + i64::try_from(status.reset_after.as_secs()).unwrap_or(i64::MAX / 2);
    headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
