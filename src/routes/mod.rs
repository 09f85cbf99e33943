//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every API endpoint lives under `/api/v1` and answers with the envelope.
//! The rate limiter is a route layer, so it only runs for matched routes and
//! sees the matched path template as the route key. `/api/health` sits
//! outside the limiter; unknown `/api/*` paths get the 404 envelope.

pub mod attendance;
pub mod auth;
pub mod bookings;
pub mod messages;
pub mod permission_slips;
pub mod programs;
pub mod schools;

use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use time::Date;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::envelope;
use crate::error::ValidationErrors;
use crate::rate_limit;
use crate::state::AppState;
use crate::validation;

pub const ENDPOINT_NOT_FOUND_MESSAGE: &str = "Endpoint not found";

/// Versioned API routes, rate limited per caller and route.
fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/request-code", post(auth::request_code))
        .route("/auth/verify-code", post(auth::verify_code))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/schools", get(schools::list_schools).post(schools::create_school))
        .route("/schools/{id}", get(schools::get_school))
        .route("/programs", get(programs::list_programs).post(programs::create_program))
        .route(
            "/programs/{id}",
            get(programs::get_program)
                .patch(programs::update_program)
                .delete(programs::delete_program),
        )
        .route("/programs/{id}/activate", post(programs::activate_program))
        .route("/programs/{id}/deactivate", post(programs::deactivate_program))
        .route("/bookings", get(bookings::list_bookings).post(bookings::create_booking))
        .route("/bookings/{id}", get(bookings::get_booking).patch(bookings::update_booking))
        .route("/bookings/{id}/confirm", post(bookings::confirm_booking))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/bookings/{id}/complete", post(bookings::complete_booking))
        .route("/bookings/{id}/students", get(bookings::list_students).post(bookings::add_students))
        .route("/bookings/{id}/statistics", get(bookings::booking_statistics))
        .route(
            "/permission-slips",
            get(permission_slips::list_slips).post(permission_slips::create_slips),
        )
        .route("/permission-slips/statistics", get(permission_slips::slip_statistics))
        .route("/permission-slips/requiring-reminders", get(permission_slips::requiring_reminders))
        .route("/permission-slips/bulk-reminders", post(permission_slips::bulk_reminders))
        .route(
            "/permission-slips/{id}",
            get(permission_slips::get_slip).delete(permission_slips::delete_slip),
        )
        .route("/permission-slips/{id}/reminder", post(permission_slips::send_reminder))
        .route("/public/permission-slips/{token}", get(permission_slips::public_slip))
        .route("/public/permission-slips/{token}/sign", post(permission_slips::sign_slip))
        .route("/attendance", get(attendance::list_attendance))
        .route(
            "/attendance/sessions",
            get(attendance::list_sessions).post(attendance::create_session),
        )
        .route("/attendance/sessions/{id}", get(attendance::get_session))
        .route("/attendance/sessions/{id}/checklist", patch(attendance::update_checklist))
        .route("/attendance/sessions/{id}/status", post(attendance::transition_session))
        .route("/attendance/sessions/{id}/summary", get(attendance::session_summary))
        .route("/attendance/sessions/{id}/check-in", post(attendance::check_in))
        .route("/attendance/sessions/{id}/check-out", post(attendance::check_out))
        .route("/messages", post(messages::send_message))
        .route("/messages/conversations", get(messages::list_conversations))
        .route("/messages/{user_id}", get(messages::conversation))
        .route("/messages/{user_id}/read", post(messages::mark_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce))
}

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes(&state))
        .route("/api/health", get(health))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
        .with_state(state)
}

/// HTTP span keyed by the route template; raw paths can carry slip tokens.
fn request_span(req: &Request) -> tracing::Span {
    let route = req.extensions().get::<MatchedPath>().map(MatchedPath::as_str);
    tracing::info_span!("http_request", method = %req.method(), route)
}

/// `GET /api/health`: version, time, and environment.
pub async fn health(State(state): State<AppState>) -> Response {
    envelope::success(
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": envelope::now_iso8601(),
            "environment": state.config.app_env,
        }),
        "API is healthy",
        StatusCode::OK,
    )
    .into_response()
}

async fn fallback(uri: Uri) -> Response {
    if uri.path() == "/api" || uri.path().starts_with("/api/") {
        envelope::not_found(ENDPOINT_NOT_FOUND_MESSAGE).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Parse an optional `YYYY-MM-DD` query value, recording a field error.
pub(crate) fn query_date(errors: &mut ValidationErrors, field: &str, raw: Option<&str>) -> Option<Date> {
    let raw = validation::non_blank(raw)?;
    let date = validation::parse_date(raw);
    if date.is_none() {
        errors.add(field, "The date must be a valid date (YYYY-MM-DD).");
    }
    date
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
