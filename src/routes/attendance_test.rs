use super::*;

#[test]
fn transition_and_booking_state_errors_are_conflicts() {
    let err = ApiError::from(AttendanceError::InvalidTransition("Only active sessions can be completed"));
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.to_string(), "Only active sessions can be completed");
    assert_eq!(ApiError::from(AttendanceError::BookingNotConfirmed).status(), StatusCode::CONFLICT);
}

#[test]
fn unknown_student_is_not_found() {
    let err = ApiError::from(AttendanceError::StudentNotFound);
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::from(AttendanceError::SessionNotFound(Uuid::nil())).status(), StatusCode::NOT_FOUND);
}

#[test]
fn database_failures_are_internal() {
    assert!(ApiError::from(AttendanceError::Database(sqlx::Error::PoolClosed)).is_internal());
}

#[test]
fn session_query_parses_status_and_date() {
    let query = SessionQuery { status: Some("active".into()), date: Some("2026-05-14".into()), ..Default::default() };
    let filter = query.into_filter().unwrap();
    assert_eq!(filter.status, Some(SessionStatus::Active));
    assert_eq!(filter.date, validation::parse_date("2026-05-14"));
}

#[test]
fn session_query_all_tab_is_unfiltered() {
    let query = SessionQuery { status: Some("all".into()), ..Default::default() };
    assert_eq!(query.into_filter().unwrap().status, None);
}

#[test]
fn session_query_rejects_unknown_status() {
    let query = SessionQuery { status: Some("paused".into()), date: Some("tomorrow".into()), ..Default::default() };
    let errors = query.into_filter().unwrap_err();
    assert!(errors.get("status").is_some());
    assert!(errors.get("date").is_some());
}
