//! Direct message routes. Every signed-in user may message any other user.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::envelope::{self, Page, PageParams, RequestContext, handle_api_operation};
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::routes::auth::AuthUser;
use crate::services::message::{self, MessageError, NewMessage};
use crate::state::AppState;

impl From<MessageError> for ApiError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::RecipientNotFound(_) => Self::NotFound("Recipient not found".into()),
            MessageError::Validation(errors) => Self::Validation(errors),
            MessageError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

/// `POST /api/v1/messages`
pub async fn send_message(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Json(body): Json<NewMessage>,
) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let sent = message::send_message(&state.pool, auth.user.id, &body).await?;
        Ok::<_, ApiError>(envelope::created(sent, "Message sent successfully").into_response())
    })
    .await
}

/// `GET /api/v1/messages/conversations`
pub async fn list_conversations(State(state): State<AppState>, ctx: RequestContext, auth: AuthUser) -> Response {
    handle_api_operation(&ctx, async move {
        let rows = message::conversations(&state.pool, auth.user.id).await?;
        let unread: i64 = rows.iter().map(|c| c.unread_count).sum();
        let meta = serde_json::Map::from_iter([("unread_total".to_owned(), serde_json::json!(unread))]);
        Ok::<_, ApiError>(envelope::collection(&rows, envelope::DEFAULT_SUCCESS_MESSAGE, meta).into_response())
    })
    .await
}

/// `GET /api/v1/messages/{user_id}`: newest first.
pub async fn conversation(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(partner_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let (items, total) = message::conversation(&state.pool, auth.user.id, partner_id, params).await?;
        let page = Page::new(items, total, params, message::DEFAULT_PER_PAGE, format!("/api/v1/messages/{partner_id}"));
        Ok::<_, ApiError>(envelope::paginated(&page, envelope::DEFAULT_SUCCESS_MESSAGE).into_response())
    })
    .await
}

/// `POST /api/v1/messages/{user_id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    ctx: RequestContext,
    auth: AuthUser,
    Path(partner_id): Path<Uuid>,
) -> Response {
    handle_api_operation(&ctx, async move {
        let marked = message::mark_read(&state.pool, auth.user.id, partner_id).await?;
        Ok::<_, ApiError>(
            envelope::updated(serde_json::json!({ "marked_read": marked }), "Messages marked as read").into_response(),
        )
    })
    .await
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;
