//! Booking routes.
//!
//! Teachers see and manage only their own bookings; admins see all.
//! Confirmation and completion are admin decisions. Lifecycle changes email
//! the booking contact after the state change commits.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{self, Page, PageParams, RequestContext, handle_api_operation};
use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::routes::auth::{ADMIN, AuthUser, BOOKING_STAFF, STAFF};
use crate::routes::query_date;
use crate::services::activity_log;
use crate::services::booking::{
    self, Booking, BookingError, BookingFilter, BookingNotice, BookingPatch, CompleteBooking, ConfirmBooking,
    NewBooking, NewStudent,
};
use crate::services::session::{Role, SessionUser};
use crate::state::AppState;

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(_) => Self::NotFound("Booking not found".into()),
            BookingError::ProgramNotFound(_) => {
                Self::Validation(ValidationErrors::single("program_id", "The selected program is invalid."))
            }
            BookingError::SchoolNotFound(_) => {
                Self::Validation(ValidationErrors::single("school_id", "The selected school is invalid."))
            }
            BookingError::ProgramInactive => Self::Validation(ValidationErrors::single(
                "program_id",
                "The selected program is not accepting bookings.",
            )),
            err @ BookingError::CapacityExceeded(_) => {
                Self::Validation(ValidationErrors::single("student_count", err.to_string()))
            }
            BookingError::InvalidTransition(reason) => Self::Conflict(reason.into()),
            BookingError::Validation(errors) => Self::Validation(errors),
            BookingError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

/// Admins manage every booking; teachers only their own.
pub(crate) fn ensure_can_manage(user: &SessionUser, booking: &Booking) -> Result<(), ApiError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Teacher if booking.teacher_id == user.id => Ok(()),
        _ => Err(ApiError::Forbidden("You do not have permission to manage this booking".into())),
    }
}

/// Staff may read any booking; teachers only their own.
fn ensure_can_view(user: &SessionUser, booking: &Booking) -> Result<(), ApiError> {
    if user.role == Role::Teacher {
        return ensure_can_manage(user, booking);
    }
    crate::routes::auth::require_roles(user, STAFF)
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub school_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub program_id: Option<Uuid>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl BookingQuery {
    fn into_filter(self, user: &SessionUser) -> Result<(BookingFilter, PageParams), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let start_date = query_date(&mut errors, "start_date", self.start_date.as_deref());
        let end_date = query_date(&mut errors, "end_date", self.end_date.as_deref());
        errors.into_result()?;
        let teacher_id = if user.role == Role::Teacher { Some(user.id) } else { self.teacher_id };
        Ok((
            BookingFilter {
                school_id: self.school_id,
                teacher_id,
                program_id: self.program_id,
                status: self.status,
                start_date,
                end_date,
                search: self.search,
            },
            PageParams { page: self.page, per_page: self.per_page },
        ))
    }
}

/// `GET /api/v1/bookings`
pub async fn list_bookings(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<BookingQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(STAFF)?;
        let (filter, params) = query.into_filter(&auth.user)?;
        let (items, total) = booking::list_bookings(&state.pool, &filter, params).await?;
        let page = Page::new(items, total, params, booking::DEFAULT_PER_PAGE, "/api/v1/bookings");
        Ok::<_, ApiError>(envelope::paginated(&page, envelope::DEFAULT_SUCCESS_MESSAGE).into_response())
    })
    .await
}

/// `POST /api/v1/bookings`
pub async fn create_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<NewBooking>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        let created = booking::create_booking(&state.pool, auth.user.id, &body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "created",
            "booking",
            Some(created.id),
            &serde_json::json!({ "reference": created.reference, "student_count": created.student_count }),
        );
        booking::send_notice(state.mailer.as_ref(), &created, BookingNotice::Created).await;
        Ok::<_, ApiError>(envelope::created(created, "Booking created successfully").into_response())
    })
    .await
}

/// `GET /api/v1/bookings/{id}`
pub async fn get_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let found = booking::get_booking(&state.pool, id).await?;
        ensure_can_view(&auth.user, &found)?;
        Ok::<_, ApiError>(envelope::success(found, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

/// `PATCH /api/v1/bookings/{id}`
pub async fn update_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<BookingPatch>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let existing = booking::get_booking(&state.pool, id).await?;
        ensure_can_manage(&auth.user, &existing)?;
        let updated = booking::update_booking(&state.pool, id, &body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "updated",
            "booking",
            Some(id),
            &serde_json::to_value(&body).unwrap_or_default(),
        );
        Ok::<_, ApiError>(envelope::updated(updated, "Booking updated successfully").into_response())
    })
    .await
}

/// `POST /api/v1/bookings/{id}/confirm`: admin only.
pub async fn confirm_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmBooking>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let confirmed = booking::confirm_booking(&state.pool, id, &body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "confirmed",
            "booking",
            Some(id),
            &serde_json::json!({ "date": body.date, "time": body.time }),
        );
        booking::send_notice(state.mailer.as_ref(), &confirmed, BookingNotice::Confirmed).await;
        Ok::<_, ApiError>(envelope::updated(confirmed, "Booking confirmed successfully").into_response())
    })
    .await
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

/// `POST /api/v1/bookings/{id}/cancel`
pub async fn cancel_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let existing = booking::get_booking(&state.pool, id).await?;
        ensure_can_manage(&auth.user, &existing)?;
        let cancelled = booking::cancel_booking(&state.pool, id, body.reason.as_deref()).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "cancelled",
            "booking",
            Some(id),
            &serde_json::json!({ "reason": body.reason }),
        );
        booking::send_notice(
            state.mailer.as_ref(),
            &cancelled,
            BookingNotice::Cancelled { reason: body.reason.as_deref() },
        )
        .await;
        Ok::<_, ApiError>(envelope::updated(cancelled, "Booking cancelled successfully").into_response())
    })
    .await
}

/// `POST /api/v1/bookings/{id}/complete`: admin only.
pub async fn complete_booking(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CompleteBooking>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let completed = booking::complete_booking(&state.pool, id, &body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "completed",
            "booking",
            Some(id),
            &serde_json::json!({ "rating": body.rating }),
        );
        booking::send_notice(state.mailer.as_ref(), &completed, BookingNotice::Completed).await;
        Ok::<_, ApiError>(envelope::updated(completed, "Booking completed successfully").into_response())
    })
    .await
}

/// `GET /api/v1/bookings/{id}/students`
pub async fn list_students(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let found = booking::get_booking(&state.pool, id).await?;
        ensure_can_view(&auth.user, &found)?;
        let students = booking::list_students(&state.pool, id).await?;
        let meta = serde_json::Map::from_iter([("booking_id".to_owned(), serde_json::json!(id))]);
        Ok::<_, ApiError>(envelope::collection(&students, envelope::DEFAULT_SUCCESS_MESSAGE, meta).into_response())
    })
    .await
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddStudentsBody {
    pub students: Vec<NewStudent>,
}

/// `POST /api/v1/bookings/{id}/students`
pub async fn add_students(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AddStudentsBody>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let existing = booking::get_booking(&state.pool, id).await?;
        ensure_can_manage(&auth.user, &existing)?;
        let added = booking::add_students(&state.pool, id, &body.students).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "students_added",
            "booking",
            Some(id),
            &serde_json::json!({ "added_count": added.added_count }),
        );
        Ok::<_, ApiError>(envelope::created(added, "Students added successfully").into_response())
    })
    .await
}

/// `GET /api/v1/bookings/{id}/statistics`
pub async fn booking_statistics(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let found = booking::get_booking(&state.pool, id).await?;
        ensure_can_view(&auth.user, &found)?;
        let stats = booking::booking_statistics(&state.pool, id).await?;
        Ok::<_, ApiError>(envelope::success(stats, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

#[cfg(test)]
#[path = "bookings_test.rs"]
mod tests;
