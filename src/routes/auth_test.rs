use super::*;
use axum::http::Request;
use axum::http::header::AUTHORIZATION;
use uuid::Uuid;

use crate::state::test_helpers::test_app_state;

fn user(role: Role) -> SessionUser {
    SessionUser { id: Uuid::new_v4(), name: "Sarah Johnson".into(), email: "sarah@example.org".into(), role }
}

fn parts(builder: axum::http::request::Builder) -> Parts {
    builder.body(()).unwrap().into_parts().0
}

#[test]
fn roles_gate_operations() {
    assert!(require_roles(&user(Role::Admin), ADMIN).is_ok());
    assert!(require_roles(&user(Role::Teacher), BOOKING_STAFF).is_ok());
    assert!(require_roles(&user(Role::AttendanceStaff), ATTENDANCE_STAFF).is_ok());

    let err = require_roles(&user(Role::Parent), STAFF).unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert!(require_roles(&user(Role::Teacher), ATTENDANCE_STAFF).is_err());
}

#[test]
fn email_auth_errors_map_to_statuses() {
    assert_eq!(ApiError::from(EmailAuthError::InvalidEmail).status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ApiError::from(EmailAuthError::InvalidCode).status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ApiError::from(EmailAuthError::VerificationFailed).status(), StatusCode::UNAUTHORIZED);
    assert!(ApiError::from(EmailAuthError::Database(sqlx::Error::PoolTimedOut)).is_internal());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let state = test_app_state();
    let mut parts = parts(Request::builder().uri("/api/v1/auth/me"));
    let err = AuthUser::from_request_parts(&mut parts, &state).await.err().unwrap();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn resolved_session_user_is_reused() {
    let state = test_app_state();
    let mut parts = parts(
        Request::builder()
            .uri("/api/v1/auth/me")
            .header(AUTHORIZATION, "Bearer abc123"),
    );
    let expected = user(Role::Teacher);
    parts.extensions.insert(expected.clone());

    let auth = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(auth.user.id, expected.id);
    assert_eq!(auth.token, "abc123");
}

#[test]
fn session_cookie_is_http_only() {
    let cookie = session_cookie("tok".into(), true);
    assert_eq!(cookie.name(), session::COOKIE_NAME);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.max_age(), Some(SESSION_MAX_AGE));

    let cleared = cleared_session_cookie(false);
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age(), Some(Duration::ZERO));
}
