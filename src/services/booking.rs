//! Bookings: a school reserving a program for a group of students.
//!
//! DESIGN
//! ======
//! Lifecycle is `pending -> confirmed -> completed`, with `cancelled`
//! reachable from either open state. Each transition is checked twice: in
//! Rust against the loaded row (to produce a precise 409 message) and in the
//! `UPDATE ... WHERE status = ...` guard so concurrent transitions cannot
//! both win.
//!
//! The reference (`SPK-<school>-<YYYYMMDD>-<seq>`) is derived from the
//! identity column after insert, inside the same transaction.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::envelope::PageParams;
use crate::error::ValidationErrors;
use crate::filter;
use crate::services::email_auth::normalize_email;
use crate::services::mail::{self, Mailer};
use crate::validation;

pub const DEFAULT_PER_PAGE: u64 = 20;
pub const PAYMENT_TERMS_DAYS: i64 = 7;
const CHECK_IN_CODE_LEN: usize = 8;
const CHECK_IN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const BOOKING_FROM: &str = r"
    FROM bookings b
    JOIN schools s ON s.id = b.school_id
    JOIN programs p ON p.id = b.program_id
    JOIN users u ON u.id = b.teacher_id";

const BOOKING_COLUMNS: &str = r"SELECT
    b.id, b.reference, b.school_id, s.name AS school_name, s.code AS school_code,
    b.program_id, p.title AS program_title, b.teacher_id, u.name AS teacher_name,
    u.email AS teacher_email, b.student_count, b.total_cost_cents, b.status,
    b.payment_status, b.preferred_date, b.preferred_time, b.confirmed_date,
    b.confirmed_time, b.payment_due_date, b.special_requests, b.contact_info, b.notes,
    b.rating, b.feedback, b.confirmed_at, b.cancelled_at, b.completed_at, b.created_at,
    b.updated_at";

const STUDENT_COLUMNS: &str = "id, booking_id, first_name, last_name, grade, parent_name, parent_email, \
     parent_phone, medical_info, special_needs, check_in_code, created_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("booking not found: {0}")]
    NotFound(Uuid),
    #[error("program not found: {0}")]
    ProgramNotFound(Uuid),
    #[error("school not found: {0}")]
    SchoolNotFound(Uuid),
    #[error("program is not accepting bookings")]
    ProgramInactive,
    #[error("Student count exceeds program capacity of {0}")]
    CapacityExceeded(i32),
    #[error("{0}")]
    InvalidTransition(&'static str),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: Option<String>,
    pub school_id: Uuid,
    pub school_name: String,
    pub school_code: String,
    pub program_id: Uuid,
    pub program_title: String,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    #[serde(skip)]
    pub teacher_email: String,
    pub student_count: i32,
    pub total_cost_cents: i64,
    pub status: BookingStatus,
    pub payment_status: String,
    pub preferred_date: Option<Date>,
    pub preferred_time: Option<String>,
    pub confirmed_date: Option<Date>,
    pub confirmed_time: Option<String>,
    pub payment_due_date: Option<Date>,
    pub special_requests: Option<String>,
    pub contact_info: Value,
    pub notes: Option<String>,
    pub rating: Option<i16>,
    pub feedback: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub confirmed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, PgRow> for Booking {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = BookingStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: Box::new(UnknownStatus(status.clone())),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            reference: row.try_get("reference")?,
            school_id: row.try_get("school_id")?,
            school_name: row.try_get("school_name")?,
            school_code: row.try_get("school_code")?,
            program_id: row.try_get("program_id")?,
            program_title: row.try_get("program_title")?,
            teacher_id: row.try_get("teacher_id")?,
            teacher_name: row.try_get("teacher_name")?,
            teacher_email: row.try_get("teacher_email")?,
            student_count: row.try_get("student_count")?,
            total_cost_cents: row.try_get("total_cost_cents")?,
            status,
            payment_status: row.try_get("payment_status")?,
            preferred_date: row.try_get("preferred_date")?,
            preferred_time: row.try_get("preferred_time")?,
            confirmed_date: row.try_get("confirmed_date")?,
            confirmed_time: row.try_get("confirmed_time")?,
            payment_due_date: row.try_get("payment_due_date")?,
            special_requests: row.try_get("special_requests")?,
            contact_info: row.try_get("contact_info")?,
            notes: row.try_get("notes")?,
            rating: row.try_get("rating")?,
            feedback: row.try_get("feedback")?,
            confirmed_at: row.try_get("confirmed_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookingStudent {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: Option<String>,
    pub medical_info: Option<String>,
    pub special_needs: Option<String>,
    pub check_in_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookingStatistics {
    pub total_students: i64,
    pub checked_in_students: i64,
    pub permission_slips_signed: i64,
    pub permission_slips_required: i64,
    pub all_permission_slips_signed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddedStudents {
    pub added_count: usize,
    pub total_students: i64,
    pub students: Vec<BookingStudent>,
}

// =============================================================================
// INPUTS
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewBooking {
    pub school_id: Uuid,
    pub program_id: Uuid,
    pub student_count: i32,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub special_requests: Option<String>,
    #[serde(default)]
    pub contact_info: Option<Value>,
}

impl NewBooking {
    /// Validate shape; returns the parsed preferred date.
    ///
    /// # Errors
    ///
    /// Returns per-field messages for a non-positive count or malformed date/time.
    pub fn validate(&self, today: Date) -> Result<Option<Date>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.student_count < 1 {
            errors.add("student_count", "The student count must be at least 1.");
        }
        let preferred_date = validate_optional_date(&mut errors, "preferred_date", self.preferred_date.as_deref());
        if preferred_date.is_some_and(|d| d < today) {
            errors.add("preferred_date", "The preferred date must be today or later.");
        }
        if let Some(time) = validation::non_blank(self.preferred_time.as_deref()) {
            validation::check_time_of_day(&mut errors, "preferred_time", time);
        }
        validate_contact_info(&mut errors, self.contact_info.as_ref());
        errors.into_result()?;
        Ok(preferred_date)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BookingPatch {
    pub student_count: Option<i32>,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub special_requests: Option<String>,
    pub notes: Option<String>,
    pub contact_info: Option<Value>,
}

impl BookingPatch {
    /// # Errors
    ///
    /// Returns per-field messages for malformed values.
    pub fn validate(&self) -> Result<Option<Date>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.student_count.is_some_and(|c| c < 1) {
            errors.add("student_count", "The student count must be at least 1.");
        }
        let preferred_date = validate_optional_date(&mut errors, "preferred_date", self.preferred_date.as_deref());
        if let Some(time) = validation::non_blank(self.preferred_time.as_deref()) {
            validation::check_time_of_day(&mut errors, "preferred_time", time);
        }
        validate_contact_info(&mut errors, self.contact_info.as_ref());
        errors.into_result()?;
        Ok(preferred_date)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmBooking {
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

impl ConfirmBooking {
    /// # Errors
    ///
    /// Returns per-field messages for a malformed date or time.
    pub fn validate(&self) -> Result<Date, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date = validation::parse_date(&self.date);
        if date.is_none() {
            errors.add("date", "The date must be a valid date (YYYY-MM-DD).");
        }
        validation::check_time_of_day(&mut errors, "time", &self.time);
        errors.into_result()?;
        Ok(date.unwrap_or_else(validation::today))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompleteBooking {
    pub rating: Option<i16>,
    pub feedback: Option<String>,
}

impl CompleteBooking {
    /// # Errors
    ///
    /// Returns a message when the rating is outside 1-5.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(rating) = self.rating {
            validation::check_range(&mut errors, "rating", rating, 1, 5);
        }
        if self.feedback.as_deref().is_some_and(|f| f.chars().count() > 2000) {
            errors.add("feedback", "The feedback may not be greater than 2000 characters.");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: Option<String>,
    pub medical_info: Option<String>,
    pub special_needs: Option<String>,
}

/// Validate a batch of students; field keys are `students.<index>.<field>`.
///
/// # Errors
///
/// Returns every invalid field across the batch.
pub fn validate_students(students: &[NewStudent]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if students.is_empty() {
        errors.add("students", "At least one student is required.");
    }
    for (i, student) in students.iter().enumerate() {
        let key = |field: &str| format!("students.{i}.{field}");
        validation::check_length(&mut errors, &key("first_name"), &student.first_name, 1, 100);
        validation::check_length(&mut errors, &key("last_name"), &student.last_name, 1, 100);
        validation::check_length(&mut errors, &key("parent_name"), &student.parent_name, 1, 255);
        if normalize_email(&student.parent_email).is_none() {
            errors.add(&key("parent_email"), "The parent email must be a valid email address.");
        }
    }
    errors.into_result()
}

/// List filters; the status filter treats `"all"` as no filter.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub school_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub program_id: Option<Uuid>,
    pub status: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub search: Option<String>,
}

fn validate_optional_date(errors: &mut ValidationErrors, field: &str, raw: Option<&str>) -> Option<Date> {
    let raw = validation::non_blank(raw)?;
    let date = validation::parse_date(raw);
    if date.is_none() {
        errors.add(field, "The date must be a valid date (YYYY-MM-DD).");
    }
    date
}

fn validate_contact_info(errors: &mut ValidationErrors, contact: Option<&Value>) {
    let Some(contact) = contact else { return };
    if !contact.is_object() {
        errors.add("contact_info", "The contact info must be an object.");
        return;
    }
    if let Some(email) = contact.get("primary_contact_email") {
        if email.as_str().and_then(normalize_email).is_none() {
            errors.add("contact_info.primary_contact_email", "The primary contact email must be a valid email address.");
        }
    }
}

// =============================================================================
// RULES
// =============================================================================

/// `SPK-<first three of school code>-<YYYYMMDD>-<seq, zero padded to 4>`.
#[must_use]
pub fn booking_reference(school_code: &str, date: Date, seq: i64) -> String {
    let prefix: String = school_code.chars().take(3).collect::<String>().to_uppercase();
    format!(
        "SPK-{prefix}-{:04}{:02}{:02}-{seq:04}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[must_use]
pub fn total_cost_cents(student_count: i32, price_per_student_cents: i64) -> i64 {
    i64::from(student_count).saturating_mul(price_per_student_cents)
}

/// # Errors
///
/// Returns `CapacityExceeded` when `student_count > max_students`.
pub fn check_capacity(student_count: i64, max_students: i32) -> Result<(), BookingError> {
    if student_count > i64::from(max_students) {
        return Err(BookingError::CapacityExceeded(max_students));
    }
    Ok(())
}

#[must_use]
pub fn payment_due_date(today: Date) -> Date {
    today.saturating_add(Duration::days(PAYMENT_TERMS_DAYS))
}

/// Append the cancellation line to any existing notes.
#[must_use]
pub fn cancellation_notes(existing: Option<&str>, reason: Option<&str>) -> String {
    let reason = validation::non_blank(reason).unwrap_or("No reason provided");
    match existing.filter(|n| !n.is_empty()) {
        Some(notes) => format!("{notes}\nCancelled: {reason}"),
        None => format!("Cancelled: {reason}"),
    }
}

#[must_use]
pub fn generate_check_in_code() -> String {
    let mut rng = rand::rng();
    (0..CHECK_IN_CODE_LEN)
        .map(|_| char::from(CHECK_IN_ALPHABET[rng.random_range(0..CHECK_IN_ALPHABET.len())]))
        .collect()
}

impl Booking {
    /// # Errors
    ///
    /// Rejects anything but a pending booking.
    pub fn ensure_confirmable(&self) -> Result<(), BookingError> {
        if self.status != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition("Only pending bookings can be confirmed"));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects closed bookings and confirmed dates less than a day away.
    pub fn ensure_cancellable(&self, today: Date) -> Result<(), BookingError> {
        if !matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(BookingError::InvalidTransition(
                "Only pending or confirmed bookings can be cancelled",
            ));
        }
        if let Some(date) = self.confirmed_date {
            if (date - today).whole_days() < 1 {
                return Err(BookingError::InvalidTransition(
                    "Bookings cannot be cancelled less than one day before the program date",
                ));
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects unconfirmed bookings and confirmed dates still in the future.
    pub fn ensure_completable(&self, today: Date) -> Result<(), BookingError> {
        if self.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidTransition("Only confirmed bookings can be completed"));
        }
        if self.confirmed_date.is_some_and(|date| date > today) {
            return Err(BookingError::InvalidTransition(
                "Bookings cannot be completed before the program date",
            ));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects student-count changes once the booking is confirmed.
    pub fn ensure_student_count_editable(&self) -> Result<(), BookingError> {
        if self.status == BookingStatus::Confirmed {
            return Err(BookingError::InvalidTransition(
                "Cannot change student count for confirmed bookings",
            ));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects adding students to cancelled or completed bookings.
    pub fn ensure_accepts_students(&self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Completed => Err(BookingError::InvalidTransition(
                "Students cannot be added to a completed booking",
            )),
            BookingStatus::Cancelled => Err(BookingError::InvalidTransition(
                "Students cannot be added to a cancelled booking",
            )),
            BookingStatus::Pending | BookingStatus::Confirmed => Ok(()),
        }
    }

    /// Where booking notifications go: the primary contact, else the teacher.
    #[must_use]
    pub fn contact_email(&self) -> &str {
        self.contact_info
            .get("primary_contact_email")
            .and_then(Value::as_str)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(&self.teacher_email)
    }

    fn label(&self) -> &str {
        self.reference.as_deref().unwrap_or("(pending reference)")
    }
}

// =============================================================================
// QUERIES
// =============================================================================

pub async fn get_booking(pool: &PgPool, id: Uuid) -> Result<Booking, BookingError> {
    sqlx::query_as::<_, Booking>(&format!("{BOOKING_COLUMNS} {BOOKING_FROM} WHERE b.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(BookingError::NotFound(id))
}

/// Newest first.
pub async fn list_bookings(
    pool: &PgPool,
    filter: &BookingFilter,
    params: PageParams,
) -> Result<(Vec<Booking>, u64), BookingError> {
    let (limit, offset) = params.limit_offset(DEFAULT_PER_PAGE);

    let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) {BOOKING_FROM} WHERE TRUE"));
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut rows = QueryBuilder::<Postgres>::new(format!("{BOOKING_COLUMNS} {BOOKING_FROM} WHERE TRUE"));
    push_filters(&mut rows, filter);
    rows.push(" ORDER BY b.created_at DESC, b.id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let bookings = rows.build_query_as::<Booking>().fetch_all(pool).await?;

    Ok((bookings, u64::try_from(total).unwrap_or(0)))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    if let Some(id) = filter.school_id {
        builder.push(" AND b.school_id = ").push_bind(id);
    }
    if let Some(id) = filter.teacher_id {
        builder.push(" AND b.teacher_id = ").push_bind(id);
    }
    if let Some(id) = filter.program_id {
        builder.push(" AND b.program_id = ").push_bind(id);
    }
    if let Some(status) = filter::normalize_tab(filter.status.as_deref()) {
        builder.push(" AND b.status = ").push_bind(status.to_owned());
    }
    if let Some(start) = filter.start_date {
        builder.push(" AND b.confirmed_date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        builder.push(" AND b.confirmed_date <= ").push_bind(end);
    }
    if let Some(search) = filter::normalize_search(filter.search.as_deref()) {
        let pattern = filter::like_pattern(search);
        builder
            .push(" AND (b.reference ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR s.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.title ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

pub async fn create_booking(pool: &PgPool, teacher_id: Uuid, input: &NewBooking) -> Result<Booking, BookingError> {
    let today = validation::today();
    let preferred_date = input.validate(today).map_err(BookingError::Validation)?;

    let mut tx = pool.begin().await?;

    let program = sqlx::query_as::<_, (i32, i64, bool)>(
        "SELECT max_students, price_per_student_cents, is_active FROM programs WHERE id = $1 FOR SHARE",
    )
    .bind(input.program_id)
    .fetch_optional(tx.as_mut())
    .await?;
    let Some((max_students, price, is_active)) = program else {
        return Err(BookingError::ProgramNotFound(input.program_id));
    };
    if !is_active {
        return Err(BookingError::ProgramInactive);
    }
    check_capacity(i64::from(input.student_count), max_students)?;

    let school_code: String = sqlx::query_scalar("SELECT code FROM schools WHERE id = $1")
        .bind(input.school_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(BookingError::SchoolNotFound(input.school_id))?;

    let (id, seq) = sqlx::query_as::<_, (Uuid, i64)>(
        r"INSERT INTO bookings (school_id, program_id, teacher_id, student_count, total_cost_cents,
                                preferred_date, preferred_time, special_requests, contact_info)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          RETURNING id, seq",
    )
    .bind(input.school_id)
    .bind(input.program_id)
    .bind(teacher_id)
    .bind(input.student_count)
    .bind(total_cost_cents(input.student_count, price))
    .bind(preferred_date)
    .bind(validation::non_blank(input.preferred_time.as_deref()))
    .bind(validation::non_blank(input.special_requests.as_deref()))
    .bind(input.contact_info.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    .fetch_one(tx.as_mut())
    .await?;

    sqlx::query("UPDATE bookings SET reference = $2 WHERE id = $1")
        .bind(id)
        .bind(booking_reference(&school_code, today, seq))
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    get_booking(pool, id).await
}

pub async fn update_booking(pool: &PgPool, id: Uuid, patch: &BookingPatch) -> Result<Booking, BookingError> {
    let preferred_date = patch.validate().map_err(BookingError::Validation)?;
    let booking = get_booking(pool, id).await?;

    let mut total_cost = booking.total_cost_cents;
    if let Some(count) = patch.student_count {
        booking.ensure_student_count_editable()?;
        let (max_students, price) = sqlx::query_as::<_, (i32, i64)>(
            "SELECT max_students, price_per_student_cents FROM programs WHERE id = $1",
        )
        .bind(booking.program_id)
        .fetch_one(pool)
        .await?;
        check_capacity(i64::from(count), max_students)?;
        total_cost = total_cost_cents(count, price);
    }

    let updated = sqlx::query(
        r"UPDATE bookings
          SET student_count = COALESCE($2, student_count),
              total_cost_cents = $3,
              preferred_date = COALESCE($4, preferred_date),
              preferred_time = COALESCE($5, preferred_time),
              special_requests = COALESCE($6, special_requests),
              notes = COALESCE($7, notes),
              contact_info = COALESCE($8, contact_info),
              updated_at = now()
          WHERE id = $1 AND ($2::INTEGER IS NULL OR status <> 'confirmed')",
    )
    .bind(id)
    .bind(patch.student_count)
    .bind(total_cost)
    .bind(preferred_date)
    .bind(validation::non_blank(patch.preferred_time.as_deref()))
    .bind(patch.special_requests.as_deref())
    .bind(patch.notes.as_deref())
    .bind(patch.contact_info.clone())
    .execute(pool)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(BookingError::InvalidTransition(
            "Cannot change student count for confirmed bookings",
        ));
    }

    get_booking(pool, id).await
}

pub async fn confirm_booking(pool: &PgPool, id: Uuid, input: &ConfirmBooking) -> Result<Booking, BookingError> {
    let date = input.validate().map_err(BookingError::Validation)?;
    let booking = get_booking(pool, id).await?;
    booking.ensure_confirmable()?;

    let result = sqlx::query(
        r"UPDATE bookings
          SET status = 'confirmed', confirmed_date = $2, confirmed_time = $3,
              confirmed_at = now(), payment_due_date = $4,
              notes = COALESCE($5, notes), updated_at = now()
          WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(date)
    .bind(input.time.trim())
    .bind(payment_due_date(validation::today()))
    .bind(validation::non_blank(input.notes.as_deref()))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(BookingError::InvalidTransition("Only pending bookings can be confirmed"));
    }

    get_booking(pool, id).await
}

pub async fn cancel_booking(pool: &PgPool, id: Uuid, reason: Option<&str>) -> Result<Booking, BookingError> {
    let booking = get_booking(pool, id).await?;
    booking.ensure_cancellable(validation::today())?;

    let result = sqlx::query(
        r"UPDATE bookings
          SET status = 'cancelled', notes = $2, cancelled_at = now(), updated_at = now()
          WHERE id = $1 AND status IN ('pending', 'confirmed')",
    )
    .bind(id)
    .bind(cancellation_notes(booking.notes.as_deref(), reason))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(BookingError::InvalidTransition(
            "Only pending or confirmed bookings can be cancelled",
        ));
    }

    get_booking(pool, id).await
}

pub async fn complete_booking(pool: &PgPool, id: Uuid, input: &CompleteBooking) -> Result<Booking, BookingError> {
    input.validate().map_err(BookingError::Validation)?;
    let booking = get_booking(pool, id).await?;
    booking.ensure_completable(validation::today())?;

    let result = sqlx::query(
        r"UPDATE bookings
          SET status = 'completed', rating = $2, feedback = $3, completed_at = now(), updated_at = now()
          WHERE id = $1 AND status = 'confirmed'",
    )
    .bind(id)
    .bind(input.rating)
    .bind(validation::non_blank(input.feedback.as_deref()))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(BookingError::InvalidTransition("Only confirmed bookings can be completed"));
    }

    get_booking(pool, id).await
}

// =============================================================================
// STUDENTS
// =============================================================================

/// Ordered by last name, then first name.
pub async fn list_students(pool: &PgPool, booking_id: Uuid) -> Result<Vec<BookingStudent>, BookingError> {
    get_booking(pool, booking_id).await?;
    let students = sqlx::query_as::<_, BookingStudent>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM booking_students WHERE booking_id = $1 ORDER BY last_name, first_name, id"
    ))
    .bind(booking_id)
    .fetch_all(pool)
    .await?;
    Ok(students)
}

/// Add students and raise `student_count` if the roster outgrows it.
pub async fn add_students(
    pool: &PgPool,
    booking_id: Uuid,
    students: &[NewStudent],
) -> Result<AddedStudents, BookingError> {
    validate_students(students).map_err(BookingError::Validation)?;
    let booking = get_booking(pool, booking_id).await?;
    booking.ensure_accepts_students()?;

    let mut tx = pool.begin().await?;

    let (max_students, price) = sqlx::query_as::<_, (i32, i64)>(
        r"SELECT p.max_students, p.price_per_student_cents
          FROM bookings b JOIN programs p ON p.id = b.program_id
          WHERE b.id = $1
          FOR UPDATE OF b",
    )
    .bind(booking_id)
    .fetch_one(tx.as_mut())
    .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM booking_students WHERE booking_id = $1")
        .bind(booking_id)
        .fetch_one(tx.as_mut())
        .await?;
    let total_students = existing + i64::try_from(students.len()).unwrap_or(i64::MAX);
    check_capacity(total_students, max_students)?;

    let mut added = Vec::with_capacity(students.len());
    for student in students {
        let row = sqlx::query_as::<_, BookingStudent>(&format!(
            r"INSERT INTO booking_students (booking_id, first_name, last_name, grade, parent_name,
                                            parent_email, parent_phone, medical_info, special_needs,
                                            check_in_code)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
              RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(booking_id)
        .bind(student.first_name.trim())
        .bind(student.last_name.trim())
        .bind(validation::non_blank(student.grade.as_deref()))
        .bind(student.parent_name.trim())
        .bind(student.parent_email.trim().to_ascii_lowercase())
        .bind(validation::non_blank(student.parent_phone.as_deref()))
        .bind(validation::non_blank(student.medical_info.as_deref()))
        .bind(validation::non_blank(student.special_needs.as_deref()))
        .bind(generate_check_in_code())
        .fetch_one(tx.as_mut())
        .await?;
        added.push(row);
    }

    let new_count = i32::try_from(total_students).unwrap_or(i32::MAX).max(booking.student_count);
    sqlx::query(
        "UPDATE bookings SET student_count = $2, total_cost_cents = $3, updated_at = now() WHERE id = $1",
    )
    .bind(booking_id)
    .bind(new_count)
    .bind(total_cost_cents(new_count, price))
    .execute(tx.as_mut())
    .await?;

    tx.commit().await?;
    Ok(AddedStudents { added_count: added.len(), total_students, students: added })
}

pub async fn booking_statistics(pool: &PgPool, booking_id: Uuid) -> Result<BookingStatistics, BookingError> {
    get_booking(pool, booking_id).await?;
    let (total_students, checked_in_students, signed) = sqlx::query_as::<_, (i64, i64, i64)>(
        r"SELECT
              (SELECT COUNT(*) FROM booking_students WHERE booking_id = $1),
              (SELECT COUNT(DISTINCT r.student_id)
                 FROM attendance_records r
                 JOIN attendance_sessions a ON a.id = r.session_id
                WHERE a.booking_id = $1 AND r.status <> 'expected'),
              (SELECT COUNT(*) FROM permission_slips WHERE booking_id = $1 AND signed_at IS NOT NULL)",
    )
    .bind(booking_id)
    .fetch_one(pool)
    .await?;
    Ok(statistics(total_students, checked_in_students, signed))
}

/// Every student on the roster needs a signed slip, whether or not the
/// slips have been issued yet.
#[must_use]
pub fn statistics(total_students: i64, checked_in_students: i64, signed: i64) -> BookingStatistics {
    BookingStatistics {
        total_students,
        checked_in_students,
        permission_slips_signed: signed,
        permission_slips_required: total_students,
        all_permission_slips_signed: signed >= total_students,
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Booking lifecycle events that notify the booking contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingNotice<'a> {
    Created,
    Confirmed,
    Cancelled { reason: Option<&'a str> },
    Completed,
}

/// Subject and paragraphs for a lifecycle notice.
#[must_use]
pub fn notice_content(booking: &Booking, notice: BookingNotice<'_>) -> (&'static str, Vec<String>) {
    let reference = booking.label();
    let program = &booking.program_title;
    match notice {
        BookingNotice::Created => (
            "Spark Program Booking Confirmation",
            vec![
                format!("We received booking request {reference} for {program}."),
                format!(
                    "{} students at {}. We will confirm the date shortly.",
                    booking.student_count, booking.school_name
                ),
            ],
        ),
        BookingNotice::Confirmed => {
            let when = match (booking.confirmed_date, booking.confirmed_time.as_deref()) {
                (Some(date), Some(time)) => format!("{date} at {time}"),
                (Some(date), None) => date.to_string(),
                _ => "the scheduled date".to_owned(),
            };
            let mut lines = vec![format!("Booking {reference} for {program} is confirmed for {when}.")];
            if let Some(due) = booking.payment_due_date {
                lines.push(format!("Payment is due by {due}."));
            }
            ("Spark Program Booking Confirmed", lines)
        }
        BookingNotice::Cancelled { reason } => (
            "Spark Program Booking Cancelled",
            vec![
                format!("Booking {reference} for {program} has been cancelled."),
                format!("Reason: {}", validation::non_blank(reason).unwrap_or("No reason provided")),
            ],
        ),
        BookingNotice::Completed => (
            "Spark Program Completed",
            vec![format!("Thank you for joining {program}. Booking {reference} is now complete.")],
        ),
    }
}

/// Email the booking contact. Never fails the caller.
pub async fn send_notice(mailer: &dyn Mailer, booking: &Booking, notice: BookingNotice<'_>) -> bool {
    let (subject, lines) = notice_content(booking, notice);
    let html = mail::render_notification(subject, &lines);
    mail::deliver(mailer, "booking_notice", booking.contact_email(), subject, &html).await
}

#[cfg(test)]
#[path = "booking_test.rs"]
mod tests;
