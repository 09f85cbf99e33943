//! School registry.
//!
//! Schools own bookings; their short `code` feeds booking references, so it
//! is stored uppercase and must be unique.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::envelope::PageParams;
use crate::error::ValidationErrors;
use crate::filter;
use crate::validation;

pub const DEFAULT_PER_PAGE: u64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum SchoolError {
    #[error("school not found: {0}")]
    NotFound(Uuid),
    #[error("school code already taken: {0}")]
    CodeTaken(String),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct School {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewSchool {
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Uppercase a school code; `None` unless it is 2-10 ASCII alphanumerics.
#[must_use]
pub fn normalize_school_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = (2..=10).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_alphanumeric());
    valid.then_some(code)
}

/// Validate a new school, returning the normalized code.
///
/// # Errors
///
/// Returns the per-field messages when any field is invalid.
pub fn validate_new_school(input: &NewSchool) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    validation::check_length(&mut errors, "name", &input.name, 2, 255);
    let code = normalize_school_code(&input.code);
    if code.is_none() {
        errors.add("code", "The code must be 2-10 letters or digits.");
    }
    if let Some(email) = validation::non_blank(input.email.as_deref()) {
        if crate::services::email_auth::normalize_email(email).is_none() {
            errors.add("email", "The email must be a valid email address.");
        }
    }
    errors.into_result()?;
    Ok(code.unwrap_or_default())
}

pub async fn create_school(pool: &PgPool, input: &NewSchool) -> Result<School, SchoolError> {
    let code = validate_new_school(input).map_err(SchoolError::Validation)?;

    let result = sqlx::query_as::<_, School>(
        r"INSERT INTO schools (name, code, address, phone, email)
          VALUES ($1, $2, $3, $4, $5)
          RETURNING id, name, code, address, phone, email, created_at",
    )
    .bind(input.name.trim())
    .bind(&code)
    .bind(validation::non_blank(input.address.as_deref()))
    .bind(validation::non_blank(input.phone.as_deref()))
    .bind(validation::non_blank(input.email.as_deref()).map(str::to_ascii_lowercase))
    .fetch_one(pool)
    .await;

    match result {
        Ok(school) => Ok(school),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(SchoolError::CodeTaken(code)),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_school(pool: &PgPool, id: Uuid) -> Result<School, SchoolError> {
    sqlx::query_as::<_, School>(
        "SELECT id, name, code, address, phone, email, created_at FROM schools WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(SchoolError::NotFound(id))
}

/// Page of schools ordered by name, optionally searched by name or code.
pub async fn list_schools(
    pool: &PgPool,
    search: Option<&str>,
    params: PageParams,
) -> Result<(Vec<School>, u64), SchoolError> {
    let search = filter::normalize_search(search).map(filter::like_pattern);
    let (limit, offset) = params.limit_offset(DEFAULT_PER_PAGE);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM schools");
    push_search(&mut count, search.as_deref());
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut rows = QueryBuilder::<Postgres>::new(
        "SELECT id, name, code, address, phone, email, created_at FROM schools",
    );
    push_search(&mut rows, search.as_deref());
    rows.push(" ORDER BY name ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let schools = rows.build_query_as::<School>().fetch_all(pool).await?;

    Ok((schools, u64::try_from(total).unwrap_or(0)))
}

fn push_search(builder: &mut QueryBuilder<'_, Postgres>, pattern: Option<&str>) {
    if let Some(pattern) = pattern {
        builder
            .push(" WHERE (name ILIKE ")
            .push_bind(pattern.to_owned())
            .push(" OR code ILIKE ")
            .push_bind(pattern.to_owned())
            .push(")");
    }
}

#[cfg(test)]
#[path = "school_test.rs"]
mod tests;
