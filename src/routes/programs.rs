//! Program catalogue routes. Reads are open to any signed-in user; writes are admin only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope::{self, Page, PageParams, RequestContext, handle_api_operation};
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::routes::auth::{ADMIN, AuthUser};
use crate::services::activity_log;
use crate::services::program::{self, ProgramError, ProgramFilter, ProgramInput, ProgramPatch};
use crate::state::AppState;

impl From<ProgramError> for ApiError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::NotFound(_) => Self::NotFound("Program not found".into()),
            ProgramError::HasBookings => Self::Conflict("Programs with bookings cannot be deleted".into()),
            ProgramError::Validation(errors) => Self::Validation(errors),
            ProgramError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProgramQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// `GET /api/v1/programs`
pub async fn list_programs(
    State(state): State<AppState>,
    ctx: RequestContext,
    _auth: AuthUser,
    Query(query): Query<ProgramQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let params = PageParams { page: query.page, per_page: query.per_page };
        let filter = ProgramFilter { search: query.search, category: query.category, active: query.active };
        let (items, total) = program::list_programs(&state.pool, &filter, params).await?;
        let page = Page::new(items, total, params, program::DEFAULT_PER_PAGE, "/api/v1/programs");
        Ok::<_, ApiError>(envelope::paginated(&page, envelope::DEFAULT_SUCCESS_MESSAGE).into_response())
    })
    .await
}

/// `POST /api/v1/programs`
pub async fn create_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<ProgramInput>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let created = program::create_program(&state.pool, &body, auth.user.id).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "created",
            "program",
            Some(created.id),
            &serde_json::json!({ "title": created.title }),
        );
        Ok::<_, ApiError>(envelope::created(created, "Program created successfully").into_response())
    })
    .await
}

/// `GET /api/v1/programs/{id}`
pub async fn get_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let found = program::get_program(&state.pool, id).await?;
        Ok::<_, ApiError>(envelope::success(found, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

/// `PATCH /api/v1/programs/{id}`
pub async fn update_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ProgramPatch>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let changes = serde_json::to_value(&body).unwrap_or_default();
        let updated = program::update_program(&state.pool, id, body).await?;
        activity_log::log_user_activity(Some(auth.user.id), "updated", "program", Some(id), &changes);
        Ok::<_, ApiError>(envelope::updated(updated, "Program updated successfully").into_response())
    })
    .await
}

/// `DELETE /api/v1/programs/{id}`
pub async fn delete_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        program::delete_program(&state.pool, id).await?;
        activity_log::log_user_activity(Some(auth.user.id), "deleted", "program", Some(id), &serde_json::json!({}));
        Ok::<_, ApiError>(envelope::deleted("Program deleted successfully").into_response())
    })
    .await
}

async fn set_active(state: AppState, ctx: RequestContext, auth: AuthUser, id: Uuid, active: bool) -> Response {
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let updated = program::set_program_active(&state.pool, id, active).await?;
        let action = if active { "activated" } else { "deactivated" };
        activity_log::log_user_activity(Some(auth.user.id), action, "program", Some(id), &serde_json::json!({}));
        Ok::<_, ApiError>(envelope::updated(updated, &format!("Program {action} successfully")).into_response())
    })
    .await
}

/// `POST /api/v1/programs/{id}/activate`
pub async fn activate_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    set_active(state, ctx, auth, id, true).await
}

/// `POST /api/v1/programs/{id}/deactivate`
pub async fn deactivate_program(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    set_active(state, ctx, auth, id, false).await
}
