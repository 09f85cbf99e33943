//! Program catalogue.
//!
//! DESIGN
//! ======
//! Updates are partial: a `ProgramPatch` is merged over the stored program
//! and the merged result is validated as a whole, so a patch can never leave
//! a program in a state `create_program` would have rejected.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::envelope::PageParams;
use crate::error::ValidationErrors;
use crate::filter;
use crate::validation;

pub const DEFAULT_PER_PAGE: u64 = 20;

const PROGRAM_COLUMNS: &str = "id, title, description, category, grade_levels, duration_minutes, \
     max_students, price_per_student_cents, is_active, created_by, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("program not found: {0}")]
    NotFound(Uuid),
    #[error("program has bookings and cannot be deleted")]
    HasBookings,
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Program {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub grade_levels: Vec<String>,
    pub duration_minutes: i32,
    pub max_students: i32,
    pub price_per_student_cents: i64,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProgramInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub grade_levels: Vec<String>,
    pub duration_minutes: i32,
    pub max_students: i32,
    pub price_per_student_cents: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProgramPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub grade_levels: Option<Vec<String>>,
    pub duration_minutes: Option<i32>,
    pub max_students: Option<i32>,
    pub price_per_student_cents: Option<i64>,
    pub is_active: Option<bool>,
}

/// List filters. `category = "all"` matches every category.
#[derive(Debug, Clone, Default)]
pub struct ProgramFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
}

impl Program {
    #[must_use]
    pub fn to_input(&self) -> ProgramInput {
        ProgramInput {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            grade_levels: self.grade_levels.clone(),
            duration_minutes: self.duration_minutes,
            max_students: self.max_students,
            price_per_student_cents: self.price_per_student_cents,
            is_active: self.is_active,
        }
    }
}

impl ProgramInput {
    /// Overlay the fields present in `patch`.
    #[must_use]
    pub fn apply(mut self, patch: ProgramPatch) -> Self {
        if let Some(v) = patch.title {
            self.title = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.grade_levels {
            self.grade_levels = v;
        }
        if let Some(v) = patch.duration_minutes {
            self.duration_minutes = v;
        }
        if let Some(v) = patch.max_students {
            self.max_students = v;
        }
        if let Some(v) = patch.price_per_student_cents {
            self.price_per_student_cents = v;
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
        self
    }

    /// # Errors
    ///
    /// Returns the per-field messages when any field is out of range.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validation::check_length(&mut errors, "title", &self.title, 3, 255);
        validation::check_length(&mut errors, "category", &self.category, 1, 100);
        if self.description.chars().count() > 5000 {
            errors.add("description", "The description may not be greater than 5000 characters.");
        }
        validation::check_range(&mut errors, "duration_minutes", self.duration_minutes, 15, 480);
        validation::check_range(&mut errors, "max_students", self.max_students, 1, 500);
        if self.price_per_student_cents < 0 {
            errors.add("price_per_student_cents", "The price per student must be at least 0.");
        }
        if self.grade_levels.iter().any(|g| g.trim().is_empty()) {
            errors.add("grade_levels", "Grade levels may not be blank.");
        }
        errors.into_result()
    }
}

// =============================================================================
// CRUD
// =============================================================================

pub async fn create_program(pool: &PgPool, input: &ProgramInput, created_by: Uuid) -> Result<Program, ProgramError> {
    input.validate().map_err(ProgramError::Validation)?;

    let program = sqlx::query_as::<_, Program>(&format!(
        r"INSERT INTO programs (title, description, category, grade_levels, duration_minutes,
                                max_students, price_per_student_cents, is_active, created_by)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          RETURNING {PROGRAM_COLUMNS}"
    ))
    .bind(input.title.trim())
    .bind(input.description.trim())
    .bind(input.category.trim())
    .bind(&input.grade_levels)
    .bind(input.duration_minutes)
    .bind(input.max_students)
    .bind(input.price_per_student_cents)
    .bind(input.is_active)
    .bind(created_by)
    .fetch_one(pool)
    .await?;
    Ok(program)
}

pub async fn get_program(pool: &PgPool, id: Uuid) -> Result<Program, ProgramError> {
    sqlx::query_as::<_, Program>(&format!("SELECT {PROGRAM_COLUMNS} FROM programs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ProgramError::NotFound(id))
}

pub async fn update_program(pool: &PgPool, id: Uuid, patch: ProgramPatch) -> Result<Program, ProgramError> {
    let current = get_program(pool, id).await?;
    let merged = current.to_input().apply(patch);
    merged.validate().map_err(ProgramError::Validation)?;

    let program = sqlx::query_as::<_, Program>(&format!(
        r"UPDATE programs
          SET title = $2, description = $3, category = $4, grade_levels = $5,
              duration_minutes = $6, max_students = $7, price_per_student_cents = $8,
              is_active = $9, updated_at = now()
          WHERE id = $1
          RETURNING {PROGRAM_COLUMNS}"
    ))
    .bind(id)
    .bind(merged.title.trim())
    .bind(merged.description.trim())
    .bind(merged.category.trim())
    .bind(&merged.grade_levels)
    .bind(merged.duration_minutes)
    .bind(merged.max_students)
    .bind(merged.price_per_student_cents)
    .bind(merged.is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(ProgramError::NotFound(id))?;
    Ok(program)
}

pub async fn set_program_active(pool: &PgPool, id: Uuid, active: bool) -> Result<Program, ProgramError> {
    sqlx::query_as::<_, Program>(&format!(
        "UPDATE programs SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {PROGRAM_COLUMNS}"
    ))
    .bind(id)
    .bind(active)
    .fetch_optional(pool)
    .await?
    .ok_or(ProgramError::NotFound(id))
}

/// Delete a program that has never been booked.
pub async fn delete_program(pool: &PgPool, id: Uuid) -> Result<(), ProgramError> {
    let booked: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bookings WHERE program_id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if booked {
        return Err(ProgramError::HasBookings);
    }

    let result = sqlx::query("DELETE FROM programs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ProgramError::NotFound(id));
    }
    Ok(())
}

pub async fn list_programs(
    pool: &PgPool,
    filter: &ProgramFilter,
    params: PageParams,
) -> Result<(Vec<Program>, u64), ProgramError> {
    let (limit, offset) = params.limit_offset(DEFAULT_PER_PAGE);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM programs WHERE TRUE");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut rows = QueryBuilder::<Postgres>::new(format!("SELECT {PROGRAM_COLUMNS} FROM programs WHERE TRUE"));
    push_filters(&mut rows, filter);
    rows.push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let programs = rows.build_query_as::<Program>().fetch_all(pool).await?;

    Ok((programs, u64::try_from(total).unwrap_or(0)))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProgramFilter) {
    if let Some(search) = filter::normalize_search(filter.search.as_deref()) {
        let pattern = filter::like_pattern(search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR category ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = filter::normalize_tab(filter.category.as_deref()) {
        builder.push(" AND category = ").push_bind(category.to_owned());
    }
    if let Some(active) = filter.active {
        builder.push(" AND is_active = ").push_bind(active);
    }
}

#[cfg(test)]
#[path = "program_test.rs"]
mod tests;
