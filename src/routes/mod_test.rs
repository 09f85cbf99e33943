use super::*;
use crate::state::test_helpers::{post_json, send_raw, test_app_state};

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn router_builds_without_route_conflicts() {
    let _ = app(test_app_state());
}

#[tokio::test]
async fn health_reports_version_and_environment() {
    let response = health(State(test_app_state())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "API is healthy");
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["data"]["environment"], "testing");
    assert!(body["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_api_paths_get_the_envelope() {
    let response = fallback(Uri::from_static("/api/v1/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], ENDPOINT_NOT_FOUND_MESSAGE);
}

#[tokio::test]
async fn other_paths_get_a_plain_404() {
    let response = fallback(Uri::from_static("/favicon.ico")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

#[test]
fn query_date_records_field_errors() {
    let mut errors = ValidationErrors::new();
    assert_eq!(query_date(&mut errors, "date", Some("2026-09-01")), validation::parse_date("2026-09-01"));
    assert_eq!(query_date(&mut errors, "date", Some("  ")), None);
    assert_eq!(query_date(&mut errors, "date", None), None);
    assert!(errors.get("date").is_none());

    assert_eq!(query_date(&mut errors, "start_date", Some("01/09/2026")), None);
    assert_eq!(errors.get("start_date").unwrap()[0], "The date must be a valid date (YYYY-MM-DD).");
}

#[tokio::test]
async fn rejected_json_body_gets_the_validation_envelope() {
    let (status, body) = send_raw(app(test_app_state()), &post_json("/api/v1/auth/request-code", "{}")).await;
    assert_eq!(status, 422);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["errors"]["email"][0], "The email field is required.");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn malformed_json_body_gets_the_error_envelope() {
    let (status, body) = send_raw(app(test_app_state()), &post_json("/api/v1/auth/verify-code", "{\"email\":")).await;
    assert_eq!(status, 400);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}
