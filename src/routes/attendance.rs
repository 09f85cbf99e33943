//! Event-day attendance routes for admins and attendance staff.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{self, RequestContext, handle_api_operation};
use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::filter::{self, ListFilter};
use crate::routes::auth::{ATTENDANCE_STAFF, AuthUser};
use crate::routes::query_date;
use crate::services::activity_log;
use crate::services::attendance::{
    self, AttendanceError, Checklist, Movement, NewSession, SessionFilter, SessionStatus, StudentRef,
};
use crate::state::AppState;
use crate::validation;

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        match err {
            AttendanceError::SessionNotFound(_) => Self::NotFound("Attendance session not found".into()),
            AttendanceError::BookingNotFound(_) => Self::NotFound("Booking not found".into()),
            AttendanceError::StudentNotFound => Self::NotFound("Student not found for this session".into()),
            err @ AttendanceError::BookingNotConfirmed => Self::Conflict(err.to_string()),
            AttendanceError::InvalidTransition(reason) => Self::Conflict(reason.into()),
            AttendanceError::Validation(errors) => Self::Validation(errors),
            AttendanceError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AttendanceQuery {
    pub session_id: Option<Uuid>,
    pub search: Option<String>,
    pub status: Option<String>,
}

/// `GET /api/v1/attendance`: roster with live counts.
pub async fn list_attendance(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<AttendanceQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let entries = attendance::list_entries(&state.pool, query.session_id).await?;
        let summary = attendance::summarize(&entries);
        let visible = ListFilter::new(query.search.as_deref(), query.status.as_deref()).apply(entries);
        let meta = serde_json::Map::from_iter([
            ("session_id".to_owned(), serde_json::json!(query.session_id)),
            ("summary".to_owned(), serde_json::json!(summary)),
        ]);
        Ok::<_, ApiError>(envelope::collection(&visible, envelope::DEFAULT_SUCCESS_MESSAGE, meta).into_response())
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub booking_id: Option<Uuid>,
    pub status: Option<String>,
    pub date: Option<String>,
}

impl SessionQuery {
    fn into_filter(self) -> Result<SessionFilter, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date = query_date(&mut errors, "date", self.date.as_deref());
        let status = match validation::non_blank(self.status.as_deref()) {
            None | Some(filter::ALL) => None,
            Some(raw) => {
                let parsed = SessionStatus::parse(raw);
                if parsed.is_none() {
                    errors.add("status", "The selected status is invalid.");
                }
                parsed
            }
        };
        errors.into_result()?;
        Ok(SessionFilter { booking_id: self.booking_id, status, date })
    }
}

/// `GET /api/v1/attendance/sessions`
pub async fn list_sessions(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<SessionQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let filter = query.into_filter()?;
        let sessions = attendance::list_sessions(&state.pool, &filter).await?;
        Ok::<_, ApiError>(
            envelope::collection(&sessions, envelope::DEFAULT_SUCCESS_MESSAGE, serde_json::Map::new()).into_response(),
        )
    })
    .await
}

/// `POST /api/v1/attendance/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<NewSession>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let created = attendance::create_session(&state.pool, &body, auth.user.id).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "created",
            "attendance_session",
            Some(created.id),
            &serde_json::json!({ "booking_id": created.booking_id, "session_date": created.session_date.to_string() }),
        );
        Ok::<_, ApiError>(envelope::created(created, "Attendance session created successfully").into_response())
    })
    .await
}

/// `GET /api/v1/attendance/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let session = attendance::get_session(&state.pool, id).await?;
        Ok::<_, ApiError>(envelope::success(session, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

/// `PATCH /api/v1/attendance/sessions/{id}/checklist`
pub async fn update_checklist(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Checklist>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let updated = attendance::update_checklist(&state.pool, id, body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "checklist_updated",
            "attendance_session",
            Some(id),
            &serde_json::to_value(body).unwrap_or_default(),
        );
        Ok::<_, ApiError>(envelope::updated(updated, "Checklist updated successfully").into_response())
    })
    .await
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TransitionBody {
    pub status: String,
}

/// `POST /api/v1/attendance/sessions/{id}/status`
pub async fn transition_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TransitionBody>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let next = SessionStatus::parse(body.status.trim())
            .ok_or_else(|| ValidationErrors::single("status", "The selected status is invalid."))?;
        let updated = attendance::transition_session(&state.pool, id, next).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "status_changed",
            "attendance_session",
            Some(id),
            &serde_json::json!({ "status": next.as_str() }),
        );
        Ok::<_, ApiError>(envelope::updated(updated, "Session status updated successfully").into_response())
    })
    .await
}

/// `GET /api/v1/attendance/sessions/{id}/summary`
pub async fn session_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let entries = attendance::list_entries(&state.pool, Some(id)).await?;
        let summary = attendance::summarize(&entries);
        Ok::<_, ApiError>(envelope::success(summary, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

async fn record(
    state: AppState,
    ctx: RequestContext,
    auth: AuthUser,
    id: Uuid,
    body: StudentRef,
    movement: Movement,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ATTENDANCE_STAFF)?;
        let entry = attendance::record_movement(&state.pool, id, &body, movement, auth.user.id).await?;
        let (action, message) = match movement {
            Movement::CheckIn => ("checked_in", "Student checked in successfully"),
            Movement::CheckOut => ("checked_out", "Student checked out successfully"),
        };
        activity_log::log_user_activity(
            Some(auth.user.id),
            action,
            "attendance_record",
            Some(entry.id),
            &serde_json::json!({ "session_id": id, "student_id": entry.student_id }),
        );
        let parent_notified = attendance::notify_parent(state.mailer.as_ref(), &entry, movement).await;
        Ok::<_, ApiError>(
            envelope::updated(serde_json::json!({ "record": entry, "parent_notified": parent_notified }), message)
                .into_response(),
        )
    })
    .await
}

/// `POST /api/v1/attendance/sessions/{id}/check-in`
pub async fn check_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StudentRef>,
) -> Response {
    record(state, ctx, auth, id, body, Movement::CheckIn).await
}

/// `POST /api/v1/attendance/sessions/{id}/check-out`
pub async fn check_out(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StudentRef>,
) -> Response {
    record(state, ctx, auth, id, body, Movement::CheckOut).await
}

#[cfg(test)]
#[path = "attendance_test.rs"]
mod tests;
