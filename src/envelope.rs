//! Response envelope shared by every API endpoint.
//!
//! DESIGN
//! ======
//! Every body has the same outer shape:
//!
//! ```text
//! { success, message, data?, timestamp, pagination?, meta? }
//! ```
//!
//! `data` is emitted only for non-null payloads, so passing `()` or `None`
//! produces a message-only body. Builders return `ApiResponse`, which
//! implements `IntoResponse`; handlers compose them inside
//! `handle_api_operation`, the single place where unexpected failures are
//! logged with request context and masked as a generic 500.

use std::panic::AssertUnwindSafe;

use axum::extract::{FromRequestParts, MatchedPath};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::error::{ApiError, ValidationErrors};
use crate::services::activity_log;
use crate::services::session::SessionUser;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Success";
pub const DEFAULT_ERROR_MESSAGE: &str = "Error";
pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed";
pub const NOT_FOUND_MESSAGE: &str = "Resource not found";
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
pub const CREATED_MESSAGE: &str = "Resource created successfully";
pub const UPDATED_MESSAGE: &str = "Resource updated successfully";
pub const DELETED_MESSAGE: &str = "Resource deleted successfully";

/// Message returned for any failure caught by `handle_api_operation`.
pub const SERVER_ERROR_MESSAGE: &str = "An error occurred while processing your request";

const MAX_PER_PAGE: u64 = 100;

// =============================================================================
// API RESPONSE
// =============================================================================

/// A status code plus an envelope body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiResponse {
    fn new(success: bool, message: &str, status: StatusCode) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(success));
        body.insert("message".into(), Value::String(message.to_owned()));
        Self { status, body }
    }

    fn with_data<T: Serialize>(mut self, data: T) -> Self {
        if let Some(value) = to_data(data) {
            self.body.insert("data".into(), value);
        }
        self
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_owned(), value);
        self
    }

    fn stamped(mut self) -> Self {
        self.body.insert("timestamp".into(), Value::String(now_iso8601()));
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

/// Serialize a payload, treating JSON `null` as "no payload".
fn to_data<T: Serialize>(data: T) -> Option<Value> {
    match serde_json::to_value(data) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "response payload failed to serialize");
            None
        }
    }
}

/// Current UTC time as an ISO 8601 string.
#[must_use]
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

// =============================================================================
// BUILDERS
// =============================================================================
//
// An empty `message` falls back to the builder's default.

fn or_default<'a>(message: &'a str, default: &'a str) -> &'a str {
    if message.trim().is_empty() { default } else { message }
}

pub fn success<T: Serialize>(data: T, message: &str, status: StatusCode) -> ApiResponse {
    ApiResponse::new(true, or_default(message, DEFAULT_SUCCESS_MESSAGE), status)
        .with_data(data)
        .stamped()
}

pub fn error<T: Serialize>(message: &str, data: T, status: StatusCode) -> ApiResponse {
    ApiResponse::new(false, or_default(message, DEFAULT_ERROR_MESSAGE), status)
        .with_data(data)
        .stamped()
}

/// 422 with `data.errors` holding the per-field messages.
#[must_use]
pub fn validation_error(errors: &ValidationErrors) -> ApiResponse {
    error(
        VALIDATION_FAILED_MESSAGE,
        serde_json::json!({ "errors": errors }),
        StatusCode::UNPROCESSABLE_ENTITY,
    )
}

#[must_use]
pub fn not_found(message: &str) -> ApiResponse {
    error(or_default(message, NOT_FOUND_MESSAGE), (), StatusCode::NOT_FOUND)
}

#[must_use]
pub fn unauthorized(message: &str) -> ApiResponse {
    error(or_default(message, UNAUTHORIZED_MESSAGE), (), StatusCode::UNAUTHORIZED)
}

#[must_use]
pub fn forbidden(message: &str) -> ApiResponse {
    error(or_default(message, FORBIDDEN_MESSAGE), (), StatusCode::FORBIDDEN)
}

#[must_use]
pub fn server_error(message: &str) -> ApiResponse {
    error(or_default(message, INTERNAL_ERROR_MESSAGE), (), StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn created<T: Serialize>(data: T, message: &str) -> ApiResponse {
    success(data, or_default(message, CREATED_MESSAGE), StatusCode::CREATED)
}

pub fn updated<T: Serialize>(data: T, message: &str) -> ApiResponse {
    success(data, or_default(message, UPDATED_MESSAGE), StatusCode::OK)
}

#[must_use]
pub fn deleted(message: &str) -> ApiResponse {
    success((), or_default(message, DELETED_MESSAGE), StatusCode::OK)
}

/// A list without pagination. `meta` is emitted only when non-empty.
pub fn collection<T: Serialize>(items: &[T], message: &str, meta: Map<String, Value>) -> ApiResponse {
    let response = ApiResponse::new(true, or_default(message, DEFAULT_SUCCESS_MESSAGE), StatusCode::OK).with_field(
        "data",
        to_data(items).unwrap_or_else(|| Value::Array(Vec::new())),
    );
    let response = if meta.is_empty() {
        response
    } else {
        response.with_field("meta", Value::Object(meta))
    };
    response.stamped()
}

pub fn paginated<T: Serialize>(page: &Page<T>, message: &str) -> ApiResponse {
    ApiResponse::new(true, or_default(message, DEFAULT_SUCCESS_MESSAGE), StatusCode::OK)
        .with_field(
            "data",
            to_data(&page.items).unwrap_or_else(|| Value::Array(Vec::new())),
        )
        .with_field("pagination", page.pagination())
        .stamped()
}

// =============================================================================
// PAGINATION
// =============================================================================

/// `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageParams {
    /// Resolve to a 1-based page and a per-page size clamped to `1..=100`.
    #[must_use]
    pub fn resolve(self, default_per_page: u64) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(default_per_page)
            .clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }

    /// SQL `LIMIT` / `OFFSET` pair for the resolved page.
    #[must_use]
    pub fn limit_offset(self, default_per_page: u64) -> (i64, i64) {
        let (page, per_page) = self.resolve(default_per_page);
        let limit = i64::try_from(per_page).unwrap_or(i64::MAX);
        let offset = i64::try_from((page - 1).saturating_mul(per_page)).unwrap_or(i64::MAX);
        (limit, offset)
    }
}

/// One page of a length-aware result set.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    /// Path used to build the `links` URLs.
    pub path: String,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, params: PageParams, default_per_page: u64, path: impl Into<String>) -> Self {
        let (current_page, per_page) = params.resolve(default_per_page);
        Self { items, current_page, per_page, total, path: path.into() }
    }

    /// Last page number; an empty result still has one (empty) page.
    #[must_use]
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    /// 1-based position of the first item on this page.
    #[must_use]
    pub fn first_item(&self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        Some((self.current_page - 1) * self.per_page + 1)
    }

    /// 1-based position of the last item on this page.
    #[must_use]
    pub fn last_item(&self) -> Option<u64> {
        let first = self.first_item()?;
        Some(first + self.items.len() as u64 - 1)
    }

    #[must_use]
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    #[must_use]
    pub fn url(&self, page: u64) -> String {
        format!("{}?page={page}", self.path)
    }

    #[must_use]
    pub fn previous_page_url(&self) -> Option<String> {
        (self.current_page > 1).then(|| self.url(self.current_page - 1))
    }

    #[must_use]
    pub fn next_page_url(&self) -> Option<String> {
        self.has_more_pages().then(|| self.url(self.current_page + 1))
    }

    /// Map the items while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            path: self.path,
        }
    }

    fn pagination(&self) -> Value {
        serde_json::json!({
            "current_page": self.current_page,
            "last_page": self.last_page(),
            "per_page": self.per_page,
            "total": self.total,
            "from": self.first_item(),
            "to": self.last_item(),
            "has_more_pages": self.has_more_pages(),
            "links": {
                "first": self.url(1),
                "last": self.url(self.last_page()),
                "prev": self.previous_page_url(),
                "next": self.next_page_url(),
            },
        })
    }
}

// =============================================================================
// REQUEST CONTEXT
// =============================================================================

/// Request metadata carried into logs.
///
/// `url` is the matched route template (`/api/v1/public/permission-slips/{token}`)
/// rather than the raw path, so credentials carried in path segments stay out
/// of the logs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    pub user_id: Option<Uuid>,
    pub payload: Option<Value>,
}

impl RequestContext {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), user_id: None, payload: None }
    }

    /// Attach the request body for logging. Sensitive keys are redacted when logged.
    #[must_use]
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).ok();
        self
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let matched = parts.extensions.get::<MatchedPath>().map(MatchedPath::as_str);
        let mut ctx = Self::new(parts.method.clone(), loggable_url(matched, &parts.uri));
        if let Some(user) = parts.extensions.get::<SessionUser>() {
            ctx.user_id = Some(user.id);
        }
        Ok(ctx)
    }
}

fn loggable_url(matched: Option<&str>, uri: &Uri) -> String {
    let path = matched.unwrap_or_else(|| uri.path());
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

// =============================================================================
// OPERATION WRAPPER
// =============================================================================

/// Run an API operation with request/response logging.
///
/// A successful operation's response is returned untouched. Client rejections
/// (`ApiError` other than `Internal`) render their own envelope. Internal
/// errors and panics are logged with the request context and answered with a
/// generic 500 that carries no error detail.
pub async fn handle_api_operation<F, E>(ctx: &RequestContext, operation: F) -> Response
where
    F: Future<Output = Result<Response, E>>,
    E: Into<ApiError>,
{
    activity_log::log_api_request(&ctx.method, &ctx.url, ctx.payload.as_ref(), ctx.user_id);

    let outcome = AssertUnwindSafe(operation).catch_unwind().await;
    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            let err: ApiError = err.into();
            if err.is_internal() {
                activity_log::log_error(&err, ctx);
            }
            err.to_envelope().into_response()
        }
        Err(_) => {
            activity_log::log_error(&"operation panicked", ctx);
            server_error(SERVER_ERROR_MESSAGE).into_response()
        }
    };

    activity_log::log_api_response(&ctx.method, &ctx.url, response.status().as_u16(), ctx.user_id);
    response
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
