use super::*;
use time::macros::{date, time};

#[test]
fn parse_date_accepts_iso_dates() {
    assert_eq!(parse_date("2025-03-15"), Some(date!(2025 - 03 - 15)));
    assert_eq!(parse_date(" 2025-03-15 "), Some(date!(2025 - 03 - 15)));
    assert_eq!(parse_date("2025-02-30"), None);
    assert_eq!(parse_date("15/03/2025"), None);
}

#[test]
fn parse_time_of_day_is_24_hour() {
    assert_eq!(parse_time_of_day("09:30"), Some(time!(09:30)));
    assert_eq!(parse_time_of_day("23:59"), Some(time!(23:59)));
    assert_eq!(parse_time_of_day("24:00"), None);
    assert_eq!(parse_time_of_day("9am"), None);
}

#[test]
fn non_blank_trims() {
    assert_eq!(non_blank(Some("  field trip ")), Some("field trip"));
    assert_eq!(non_blank(Some("   ")), None);
    assert_eq!(non_blank(None), None);
}

#[test]
fn check_length_reports_required_short_and_long() {
    let mut errors = ValidationErrors::new();
    check_length(&mut errors, "title", "", 3, 10);
    check_length(&mut errors, "name", "ab", 3, 10);
    check_length(&mut errors, "code", "abcdefghijk", 2, 10);
    check_length(&mut errors, "ok", "fine", 3, 10);
    assert_eq!(errors.get("title").unwrap(), ["The title field is required."]);
    assert_eq!(errors.get("name").unwrap(), ["The name must be at least 3 characters."]);
    assert_eq!(errors.get("code").unwrap(), ["The code may not be greater than 10 characters."]);
    assert!(errors.get("ok").is_none());
}

#[test]
fn check_range_is_inclusive() {
    let mut errors = ValidationErrors::new();
    check_range(&mut errors, "max_students", 1, 1, 500);
    check_range(&mut errors, "max_students", 500, 1, 500);
    assert!(errors.is_empty());
    check_range(&mut errors, "max_students", 501, 1, 500);
    assert_eq!(errors.get("max_students").unwrap(), ["The max students must be between 1 and 500."]);
}
