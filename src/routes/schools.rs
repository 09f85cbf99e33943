//! School routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope::{self, Page, PageParams, RequestContext, handle_api_operation};
use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::routes::auth::{ADMIN, AuthUser};
use crate::services::activity_log;
use crate::services::school::{self, NewSchool, SchoolError};
use crate::state::AppState;

impl From<SchoolError> for ApiError {
    fn from(err: SchoolError) -> Self {
        match err {
            SchoolError::NotFound(_) => Self::NotFound("School not found".into()),
            SchoolError::CodeTaken(_) => {
                Self::Validation(ValidationErrors::single("code", "The code has already been taken."))
            }
            SchoolError::Validation(errors) => Self::Validation(errors),
            SchoolError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SchoolQuery {
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// `GET /api/v1/schools`
pub async fn list_schools(
    State(state): State<AppState>,
    ctx: RequestContext,
    _auth: AuthUser,
    Query(query): Query<SchoolQuery>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let params = PageParams { page: query.page, per_page: query.per_page };
        let (items, total) = school::list_schools(&state.pool, query.search.as_deref(), params).await?;
        let page = Page::new(items, total, params, school::DEFAULT_PER_PAGE, "/api/v1/schools");
        Ok::<_, ApiError>(envelope::paginated(&page, envelope::DEFAULT_SUCCESS_MESSAGE).into_response())
    })
    .await
}

/// `POST /api/v1/schools`: admin only.
pub async fn create_school(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<NewSchool>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        auth.require(ADMIN)?;
        let created = school::create_school(&state.pool, &body).await?;
        activity_log::log_user_activity(
            Some(auth.user.id),
            "created",
            "school",
            Some(created.id),
            &serde_json::json!({ "code": created.code }),
        );
        Ok::<_, ApiError>(envelope::created(created, "School created successfully").into_response())
    })
    .await
}

/// `GET /api/v1/schools/{id}`
pub async fn get_school(
    State(state): State<AppState>,
    ctx: RequestContext,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let found = school::get_school(&state.pool, id).await?;
        Ok::<_, ApiError>(envelope::success(found, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}
