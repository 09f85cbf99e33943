use super::*;
use axum::http::HeaderValue;

// =============================================================================
// bytes_to_hex
// =============================================================================

#[test]
fn bytes_to_hex_empty() {
    assert_eq!(bytes_to_hex(&[]), "");
}

#[test]
fn bytes_to_hex_leading_zero() {
    assert_eq!(bytes_to_hex(&[0x0a]), "0a");
}

#[test]
fn bytes_to_hex_multi_byte() {
    assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
}

// =============================================================================
// generate_token
// =============================================================================

#[test]
fn generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_token_two_calls_differ() {
    assert_ne!(generate_token(), generate_token());
}

// =============================================================================
// roles
// =============================================================================

#[test]
fn role_round_trips_through_storage_name() {
    for role in [Role::Admin, Role::Teacher, Role::AttendanceStaff, Role::Parent] {
        assert_eq!(Role::parse(role.as_str()), role);
    }
}

#[test]
fn unknown_role_is_parent() {
    assert_eq!(Role::parse("superuser"), Role::Parent);
}

#[test]
fn role_serializes_snake_case() {
    assert_eq!(serde_json::to_value(Role::AttendanceStaff).unwrap(), "attendance_staff");
}

#[test]
fn has_any_role_checks_membership() {
    let user = SessionUser {
        id: Uuid::new_v4(),
        name: "Maria Garcia".into(),
        email: "maria@example.org".into(),
        role: Role::AttendanceStaff,
    };
    assert!(user.has_any_role(&[Role::Admin, Role::AttendanceStaff]));
    assert!(!user.has_any_role(&[Role::Admin, Role::Teacher]));
}

// =============================================================================
// token_from_headers
// =============================================================================

#[test]
fn token_from_bearer_header() {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
    assert_eq!(token_from_headers(&headers).as_deref(), Some("abc123"));
}

#[test]
fn token_from_cookie() {
    let mut headers = HeaderMap::new();
    headers.insert("cookie", HeaderValue::from_static("theme=dark; session_token=feed"));
    assert_eq!(token_from_headers(&headers).as_deref(), Some("feed"));
}

#[test]
fn bearer_wins_over_cookie() {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer fromheader"));
    headers.insert("cookie", HeaderValue::from_static("session_token=fromcookie"));
    assert_eq!(token_from_headers(&headers).as_deref(), Some("fromheader"));
}

#[test]
fn missing_or_empty_token_is_none() {
    assert_eq!(token_from_headers(&HeaderMap::new()), None);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
    headers.insert("cookie", HeaderValue::from_static("session_token="));
    assert_eq!(token_from_headers(&headers), None);
}
