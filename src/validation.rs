//! Field validation helpers shared by the domain services.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};

use crate::error::ValidationErrors;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_OF_DAY_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

/// Today's date in UTC.
#[must_use]
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Parse `YYYY-MM-DD`.
#[must_use]
pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), DATE_FORMAT).ok()
}

/// Parse a 24-hour `HH:MM` time of day.
#[must_use]
pub fn parse_time_of_day(raw: &str) -> Option<Time> {
    Time::parse(raw.trim(), TIME_OF_DAY_FORMAT).ok()
}

/// Trimmed value, `None` when blank.
#[must_use]
pub fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

/// Record an error unless `value` has between `min` and `max` characters after trimming.
pub fn check_length(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 && min > 0 {
        errors.add(field, format!("The {} field is required.", label(field)));
    } else if len < min {
        errors.add(field, format!("The {} must be at least {min} characters.", label(field)));
    } else if len > max {
        errors.add(field, format!("The {} may not be greater than {max} characters.", label(field)));
    }
}

/// Record an error unless `min <= value <= max`.
pub fn check_range<T>(errors: &mut ValidationErrors, field: &str, value: T, min: T, max: T)
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        errors.add(field, format!("The {} must be between {min} and {max}.", label(field)));
    }
}

/// Record an error unless `raw` is a valid `HH:MM` time.
pub fn check_time_of_day(errors: &mut ValidationErrors, field: &str, raw: &str) {
    if parse_time_of_day(raw).is_none() {
        errors.add(field, format!("The {} must be a valid time (HH:MM).", label(field)));
    }
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
