//! Auth routes: email access codes, session cookie, current user.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::envelope::{self, RequestContext, handle_api_operation};
use crate::error::{ApiError, ValidationErrors};
use crate::extract::Json;
use crate::services::activity_log;
use crate::services::email_auth::{self, EmailAuthError};
use crate::services::session::{self, Role, SessionUser};
use crate::state::AppState;

const SESSION_MAX_AGE: Duration = Duration::days(30);

pub const ADMIN: &[Role] = &[Role::Admin];
pub const BOOKING_STAFF: &[Role] = &[Role::Admin, Role::Teacher];
pub const ATTENDANCE_STAFF: &[Role] = &[Role::Admin, Role::AttendanceStaff];
pub const STAFF: &[Role] = &[Role::Admin, Role::Teacher, Role::AttendanceStaff];

impl From<EmailAuthError> for ApiError {
    fn from(err: EmailAuthError) -> Self {
        match err {
            EmailAuthError::InvalidEmail => {
                Self::Validation(ValidationErrors::single("email", "The email must be a valid email address."))
            }
            EmailAuthError::InvalidCode | EmailAuthError::VerificationFailed => {
                Self::Unauthorized("Invalid or expired access code".into())
            }
            EmailAuthError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user from a Bearer token or the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: SessionUser,
    pub token: String,
}

impl AuthUser {
    /// # Errors
    ///
    /// Returns `Forbidden` unless the user holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        require_roles(&self.user, roles)
    }
}

/// # Errors
///
/// Returns `Forbidden` unless the user holds one of `roles`.
pub fn require_roles(user: &SessionUser, roles: &[Role]) -> Result<(), ApiError> {
    if user.has_any_role(roles) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You do not have permission to perform this action".into()))
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = session::token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized(envelope::UNAUTHORIZED_MESSAGE.into()))?;

        // The rate limiter already resolved the session for this request.
        if let Some(user) = parts.extensions.get::<SessionUser>() {
            return Ok(Self { user: user.clone(), token });
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, &token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized(envelope::UNAUTHORIZED_MESSAGE.into()))?;
        Ok(Self { user, token })
    }
}

// =============================================================================
// COOKIES
// =============================================================================

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((session::COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(SESSION_MAX_AGE)
        .build()
}

fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((session::COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct RequestCodeBody {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyCodeBody {
    pub email: String,
    pub code: String,
}

/// `POST /api/v1/auth/request-code`: email a fresh access code.
pub async fn request_code(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<RequestCodeBody>) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let code = email_auth::request_access_code(&state.pool, &body.email).await?;
        let email = email_auth::normalize_email(&body.email).unwrap_or_default();
        email_auth::send_access_code_email(state.mailer.as_ref(), &email, &code).await;
        Ok::<_, ApiError>(
            envelope::success(serde_json::json!({ "email": email }), "Access code sent", StatusCode::OK)
                .into_response(),
        )
    })
    .await
}

/// `POST /api/v1/auth/verify-code`: exchange a code for a session.
pub async fn verify_code(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<VerifyCodeBody>) -> Response {
    let ctx = ctx.with_payload(&body);
    handle_api_operation(&ctx, async move {
        let user_id = match email_auth::verify_access_code(&state.pool, &body.email, &body.code).await {
            Ok(id) => id,
            Err(EmailAuthError::Database(e)) => return Err(ApiError::from(e)),
            Err(e) => {
                activity_log::log_security_event(
                    "access_code_rejected",
                    &serde_json::json!({ "email": body.email.trim().to_ascii_lowercase() }),
                );
                return Err(e.into());
            }
        };
        let token = session::create_session(&state.pool, user_id).await?;
        let user = session::validate_session(&state.pool, &token)
            .await?
            .ok_or_else(|| ApiError::Internal("session vanished after creation".into()))?;

        activity_log::log_user_activity(
            Some(user.id),
            "login",
            "user",
            Some(user.id),
            &serde_json::json!({}),
        );
        let jar = CookieJar::new().add(session_cookie(token.clone(), state.config.cookie_secure));
        let body = envelope::success(serde_json::json!({ "token": token, "user": user }), "Signed in", StatusCode::OK);
        Ok::<_, ApiError>((jar, body).into_response())
    })
    .await
}

/// `GET /api/v1/auth/me`: current user.
pub async fn me(ctx: RequestContext, auth: AuthUser) -> Response {
    handle_api_operation(&ctx, async move {
        Ok::<_, ApiError>(envelope::success(auth.user, envelope::DEFAULT_SUCCESS_MESSAGE, StatusCode::OK).into_response())
    })
    .await
}

/// `POST /api/v1/auth/logout`: delete the session and clear the cookie.
pub async fn logout(State(state): State<AppState>, ctx: RequestContext, auth: AuthUser) -> Response {
    handle_api_operation(&ctx, async move {
        session::delete_session(&state.pool, &auth.token).await?;
        let jar = CookieJar::new().add(cleared_session_cookie(state.config.cookie_secure));
        Ok::<_, ApiError>((jar, envelope::success((), "Signed out", StatusCode::OK)).into_response())
    })
    .await
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
