//! Environment-driven server configuration.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` loads `.env` (if present) and builds one `Config` before anything
//! else starts. Optional integrations (Resend mail) degrade to disabled when
//! their variables are missing instead of failing start-up.

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_APP_ENV: &str = "production";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 120;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Resend credentials for outbound mail.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub app_env: String,
    /// Base URL used when building parent-facing signing links.
    pub frontend_url: String,
    pub mail: Option<MailConfig>,
    pub cookie_secure: bool,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
}

impl Config {
    /// Build the configuration from process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `DATABASE_URL` is missing or a numeric variable
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let port = env_parse_strict("PORT", DEFAULT_PORT)?;
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_APP_ENV.into());
        let frontend_url = std::env::var("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.into());

        let mail = match (std::env::var("RESEND_API_KEY"), std::env::var("RESEND_FROM")) {
            (Ok(api_key), Ok(from)) if !api_key.trim().is_empty() => Some(MailConfig { api_key, from }),
            _ => None,
        };

        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| frontend_url.starts_with("https://"));

        Ok(Self {
            database_url,
            port,
            app_env,
            frontend_url,
            mail,
            cookie_secure,
            rate_limit_max_requests: env_parse_strict("RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS)?,
            rate_limit_window_secs: env_parse_strict("RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?,
        })
    }

    /// Public signing link for a permission slip token.
    #[must_use]
    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/permission-slip/{token}", self.frontend_url)
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool(&raw))
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse_strict<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
