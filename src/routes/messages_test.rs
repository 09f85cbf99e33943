use axum::http::StatusCode;

use super::*;
use crate::error::ValidationErrors;

#[test]
fn unknown_recipient_is_not_found() {
    let err = ApiError::from(MessageError::RecipientNotFound(Uuid::nil()));
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "Recipient not found");
}

#[test]
fn validation_and_database_errors() {
    let err = ApiError::from(MessageError::Validation(ValidationErrors::single("body", "required")));
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(ApiError::from(MessageError::Database(sqlx::Error::PoolTimedOut)).is_internal());
}
