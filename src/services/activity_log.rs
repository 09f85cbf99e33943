//! Structured activity and audit logging.
//!
//! Every event is a `tracing` record with a fixed `event` field so log
//! pipelines can filter on it. Request payloads are redacted before logging.

use axum::http::Method;
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::RequestContext;

/// Payload keys that never reach the logs.
pub const REDACTED_KEYS: &[&str] = &[
    "password",
    "password_confirmation",
    "current_password",
    "signature",
    "token",
    "code",
];

const REDACTED: &str = "[redacted]";

/// Replace sensitive values anywhere in a JSON payload.
#[must_use]
pub fn redact(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if REDACTED_KEYS.contains(&k.as_str()) {
                        (k.clone(), Value::String(REDACTED.into()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

pub fn log_api_request(method: &Method, url: &str, payload: Option<&Value>, user_id: Option<Uuid>) {
    let payload = payload.map(redact).unwrap_or(Value::Null);
    tracing::info!(
        event = "api_request",
        %method,
        url,
        user_id = ?user_id,
        payload = %payload,
        "api request"
    );
}

pub fn log_api_response(method: &Method, url: &str, status: u16, user_id: Option<Uuid>) {
    if status >= 500 {
        tracing::error!(event = "api_response", %method, url, status, user_id = ?user_id, "api response");
    } else if status >= 400 {
        tracing::warn!(event = "api_response", %method, url, status, user_id = ?user_id, "api response");
    } else {
        tracing::info!(event = "api_response", %method, url, status, user_id = ?user_id, "api response");
    }
}

/// Audit trail for a state change made by a user (or by a public signer).
pub fn log_user_activity(user_id: Option<Uuid>, action: &str, model: &str, model_id: Option<Uuid>, changes: &Value) {
    tracing::info!(
        event = "user_activity",
        user_id = ?user_id,
        action,
        model,
        model_id = ?model_id,
        changes = %changes,
        "user activity"
    );
}

pub fn log_security_event(name: &str, context: &Value) {
    tracing::warn!(event = "security_event", event_name = name, context = %context, "security event");
}

/// Log a failure with the request it happened in.
pub fn log_error<E: std::fmt::Display + ?Sized>(err: &E, ctx: &RequestContext) {
    tracing::error!(
        event = "api_error",
        error = %err,
        request_url = %ctx.url,
        request_method = %ctx.method,
        user_id = ?ctx.user_id,
        "api operation failed"
    );
}

pub fn log_email_event(name: &str, recipient: &str, subject: &str, success: bool, error: Option<&str>) {
    if success {
        tracing::info!(event = "email_event", event_name = name, recipient, subject, success, "email event");
    } else {
        tracing::warn!(event = "email_event", event_name = name, recipient, subject, success, error = ?error, "email event");
    }
}

#[cfg(test)]
#[path = "activity_log_test.rs"]
mod tests;
