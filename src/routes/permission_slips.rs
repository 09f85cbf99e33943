//! Permission slip routes.
//!
//! Staff endpoints require a session. The `/public/...` endpoints are what
//! the emailed signing link opens; the access token in the path is the
//! only credential, and the public view never echoes it back.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::envelope::{self, Page, PageParams, RequestContext, handle_api_operation};
use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::rate_limit;
use crate::routes::auth::{AuthUser, BOOKING_STAFF, STAFF};
use crate::routes::bookings::ensure_can_manage;
use crate::routes::query_date;
use crate::services::activity_log;
use crate::services::booking;
use crate::services::permission_slip::{self as slips, SignSlip, SlipEmail, SlipError, SlipFilter, SlipStatus};
use crate::state::AppState;
use crate::validation;

const DEFAULT_REMINDER_DAYS: i64 = 3;

impl From<SlipError> for ApiError {
    fn from(err: SlipError) -> Self {
        match err {
            SlipError::NotFound => Self::NotFound("Permission slip not found".into()),
            SlipError::BookingNotFound(_) => Self::NotFound("Booking not found".into()),
            err @ (SlipError::BookingNotConfirmed
            | SlipError::AlreadySigned
            | SlipError::SignedSlipLocked
            | SlipError::ReminderNotAllowed(_)) => Self::Conflict(err.to_string()),
            SlipError::Validation(errors) => Self::Validation(errors),
            SlipError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SlipQuery {
    pub booking_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl SlipQuery {
    fn into_filter(self) -> Result<(SlipFilter, PageParams), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date_from = query_date(&mut errors, "date_from", self.date_from.as_deref());
        let date_to = query_date(&mut errors, "date_to", self.date_to.as_deref());
        errors.into_result()?;
        Ok((
            SlipFilter {
                booking_id: self.booking_id,
                school_id: self.school_id,
                status: SlipStatus::parse(self.status.as_deref()),
                search: self.search,
                date_from,
                date_to,
            },
            PageParams { page: self.page, per_page: self.per_page },
        ))
    }
}

// =============================================================================
// STAFF
// =============================================================================

/// `GET /api/v1/permission-slips`
pub async fn list_slips(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<SlipQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(STAFF)?;
        let (filter, params) = query.into_filter()?;
        let (items, total) = slips::list_slips(&state.pool, &filter, params, validation::today()).await?;
        let page = Page::new(items, total, params, slips::DEFAULT_PER_PAGE, "/api/v1/permission-slips")
            .map(|slip| slips::staff_view(slip, &state.config));
        Ok::<_, ApiError>(envelope::paginated(&page, envelope::DEFAULT_SUCCESS_MESSAGE).into_response())
    })
    .await
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateSlipsBody {
    pub booking_id: Uuid,
}

/// `POST /api/v1/permission-slips`: create slips for every student of a
/// confirmed booking and email each parent a signing link.
pub async fn create_slips(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<CreateSlipsBody>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        let target = booking::get_booking(&state.pool, body.booking_id).await?;
        ensure_can_manage(&auth.user, &target)?;

        let created = slips::create_slips_for_booking(&state.pool, body.booking_id).await?;
        let mut emails_sent = 0usize;
        for slip in &created {
            if slips::send_slip_email(state.mailer.as_ref(), &state.config, slip, SlipEmail::SigningRequest).await {
                emails_sent += 1;
            }
        }
        activity_log::log_user_activity(
            Some(auth.user.id),
            "created",
            "permission_slips",
            Some(body.booking_id),
            &serde_json::json!({ "created_count": created.len(), "emails_sent": emails_sent }),
        );

        let views: Vec<_> = created
            .into_iter()
            .map(|slip| slips::staff_view(slip, &state.config))
            .collect();
        Ok::<_, ApiError>(
            envelope::created(
                serde_json::json!({
                    "created_count": views.len(),
                    "emails_sent": emails_sent,
                    "slips": views,
                }),
                "Permission slips created successfully",
            )
            .into_response(),
        )
    })
    .await
}

/// `GET /api/v1/permission-slips/{id}`
pub async fn get_slip(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(STAFF)?;
        let slip = slips::get_slip(&state.pool, id).await?;
        Ok::<_, ApiError>(
            envelope::success(slips::staff_view(slip, &state.config), envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK)
                .into_response(),
        )
    })
    .await
}

/// `DELETE /api/v1/permission-slips/{id}`: unsigned slips only.
pub async fn delete_slip(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        slips::delete_slip(&state.pool, id).await?;
        activity_log::log_user_activity(Some(auth.user.id), "deleted", "permission_slip", Some(id), &serde_json::json!({}));
        Ok::<_, ApiError>(envelope::deleted("Permission slip deleted successfully").into_response())
    })
    .await
}

/// `POST /api/v1/permission-slips/{id}/reminder`
pub async fn send_reminder(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        let outcome = slips::send_reminder(&state.pool, state.mailer.as_ref(), &state.config, id).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "reminder_sent",
            "permission_slip",
            Some(id),
            &serde_json::json!({ "delivered": outcome.delivered }),
        );
        let message = if outcome.delivered {
            "Reminder sent successfully"
        } else {
            "Reminder email could not be delivered"
        };
        Ok::<_, ApiError>(envelope::success(outcome, message, StatusCode::OK).into_response())
    })
    .await
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BulkRemindersBody {
    pub slip_ids: Vec<Uuid>,
}

/// `POST /api/v1/permission-slips/bulk-reminders`
pub async fn bulk_reminders(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<BulkRemindersBody>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        if body.slip_ids.is_empty() {
            return Err(ApiError::from(ValidationErrors::single(
                "slip_ids",
                "At least one permission slip is required.",
            )));
        }
        let result = slips::send_bulk_reminders(&state.pool, state.mailer.as_ref(), &state.config, &body.slip_ids).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "bulk_reminders_sent",
            "permission_slip",
            None,
            &serde_json::json!({ "sent": result.sent, "skipped": result.skipped, "failed": result.failed }),
        );
        let message = format!("Sent {} reminders", result.sent);
        Ok::<_, ApiError>(envelope::success(result, &message, StatusCode::OK).into_response())
    })
    .await
}

/// `GET /api/v1/permission-slips/statistics`
pub async fn slip_statistics(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<SlipQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(STAFF)?;
        let (filter, _) = query.into_filter()?;
        let stats = slips::slip_statistics(&state.pool, &filter, validation::today()).await?;
        Ok::<_, ApiError>(envelope::success(stats, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct ReminderQuery {
    pub days_before: Option<i64>,
}

/// `GET /api/v1/permission-slips/requiring-reminders`
pub async fn requiring_reminders(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Query(query): Query<ReminderQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(BOOKING_STAFF)?;
        let days = query.days_before.unwrap_or(DEFAULT_REMINDER_DAYS);
        let found = slips::slips_requiring_reminders(&state.pool, days, validation::today()).await?;
        let views: Vec<_> = found.into_iter().map(|slip| slips::staff_view(slip, &state.config)).collect();
        let meta = serde_json::Map::from_iter([("days_before".to_owned(), serde_json::json!(days))]);
        Ok::<_, ApiError>(envelope::collection(&views, envelope::DEFAULT_SUCCESS_MESSAGE, meta).into_response())
    })
    .await
}

// =============================================================================
// PUBLIC
// =============================================================================

/// `GET /api/v1/public/permission-slips/{token}`
pub async fn public_slip(State(state): State<AppState>, ctx: RequestContext, Path(token): Path<String>) -> Response {
    handle_api_operation(&ctx, async move {
        let slip = slips::get_slip_by_token(&state.pool, &token).await?;
        let view = slip.view(OffsetDateTime::now_utc(), None);
        Ok::<_, ApiError>(envelope::success(view, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

/// `POST /api/v1/public/permission-slips/{token}/sign`
pub async fn sign_slip(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Path(token): Path<String>,
    Json(body): Json<SignSlip>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    let ip = rate_limit::client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    handle_api_operation(&ctx, async move {
        let signed = slips::sign_slip(&state.pool, &token, &body, ip.as_deref()).await?;
        activity_log::log_user_activity(
            None,
            "signed",
            "permission_slip",
            Some(signed.id),
            &serde_json::json!({ "parent_email": signed.parent_email, "ip": ip }),
        );
        slips::send_slip_email(state.mailer.as_ref(), &state.config, &signed, SlipEmail::SignedConfirmation).await;
        let view = signed.view(OffsetDateTime::now_utc(), None);
        Ok::<_, ApiError>(envelope::updated(view, "Permission slip signed successfully").into_response())
    })
    .await
}

#[cfg(test)]
#[path = "permission_slips_test.rs"]
mod tests;
