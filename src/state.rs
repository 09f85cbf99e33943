//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Clone is required by Axum; every field is a pool handle or `Arc`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::mail::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let rate_limiter = RateLimiter::new(RateLimitConfig::new(
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        ));
        Self { pool, config: Arc::new(config), mailer, rate_limiter }
    }
}


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
