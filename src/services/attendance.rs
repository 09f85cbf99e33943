//! Attendance sessions and per-student check-in/out.
//!
//! DESIGN
//! ======
//! A session is one scheduled run of a confirmed booking. Both the session
//! and each student's record move forward through their states only:
//!
//! - session: scheduled -> preparing -> active -> completed
//! - record:  expected -> checked_in -> checked_out
//!
//! Records are created for every booking student when the session is
//! created and back-filled (`sync_roster`) for students added later, so
//! check-in never has to special-case a missing row.
//!
//! TRADE-OFFS
//! ==========
//! The attendance list is filtered in memory with `filter::ListFilter`. A
//! session holds at most one booking's roster (capped by program capacity),
//! so the working set is small.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::ValidationErrors;
use crate::filter::Searchable;
use crate::services::booking::UnknownStatus;
use crate::services::mail::{self, Mailer};
use crate::validation;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("attendance session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),
    #[error("Attendance sessions can only be scheduled for confirmed bookings")]
    BookingNotConfirmed,
    #[error("Student not found for this session")]
    StudentNotFound,
    #[error("{0}")]
    InvalidTransition(&'static str),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// STATUS MACHINES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Preparing,
    Active,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Preparing => "preparing",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Self::Scheduled),
            "preparing" => Some(Self::Preparing),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Expected,
    CheckedIn,
    CheckedOut,
}

impl AttendanceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expected => "expected",
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "expected" => Some(Self::Expected),
            "checked_in" => Some(Self::CheckedIn),
            "checked_out" => Some(Self::CheckedOut),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// Returns the conflict message when the student cannot be checked in.
    pub fn check_in(self) -> Result<Self, &'static str> {
        match self {
            Self::Expected => Ok(Self::CheckedIn),
            Self::CheckedIn => Err("Student is already checked in"),
            Self::CheckedOut => Err("Student has already checked out"),
        }
    }

    /// # Errors
    ///
    /// Returns the conflict message when the student cannot be checked out.
    pub fn check_out(self) -> Result<Self, &'static str> {
        match self {
            Self::CheckedIn => Ok(Self::CheckedOut),
            Self::Expected => Err("Student is not checked in"),
            Self::CheckedOut => Err("Student has already checked out"),
        }
    }
}

fn decode<T>(row: &PgRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.into(),
        source: Box::new(UnknownStatus(raw.clone())),
    })
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub booking_reference: Option<String>,
    pub program_title: String,
    pub school_name: String,
    pub session_date: Date,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub status: SessionStatus,
    pub materials_ready: bool,
    pub safety_briefing_completed: bool,
    pub emergency_contacts_verified: bool,
    pub total_students: i64,
    pub checked_in: i64,
    pub checked_out: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, PgRow> for AttendanceSession {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            booking_id: row.try_get("booking_id")?,
            booking_reference: row.try_get("booking_reference")?,
            program_title: row.try_get("program_title")?,
            school_name: row.try_get("school_name")?,
            session_date: row.try_get("session_date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            location: row.try_get("location")?,
            status: decode(row, "status", SessionStatus::parse)?,
            materials_ready: row.try_get("materials_ready")?,
            safety_briefing_completed: row.try_get("safety_briefing_completed")?,
            emergency_contacts_verified: row.try_get("emergency_contacts_verified")?,
            total_students: row.try_get("total_students")?,
            checked_in: row.try_get("checked_in")?,
            checked_out: row.try_get("checked_out")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl AttendanceSession {
    #[must_use]
    pub fn checklist_complete(&self) -> bool {
        self.materials_ready && self.safety_briefing_completed && self.emergency_contacts_verified
    }

    /// # Errors
    ///
    /// Returns the conflict message for a backwards or unready transition.
    pub fn ensure_transition(&self, next: SessionStatus) -> Result<(), &'static str> {
        if next <= self.status {
            return Err("Session status can only move forward");
        }
        match next {
            SessionStatus::Active if !self.checklist_complete() => {
                Err("Complete the readiness checklist before starting the session")
            }
            SessionStatus::Completed if self.status != SessionStatus::Active => {
                Err("Only active sessions can be completed")
            }
            _ => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns the conflict message unless students can be checked in/out.
    pub fn ensure_active(&self) -> Result<(), &'static str> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err("Attendance can only be recorded for active sessions")
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub parent_name: String,
    #[serde(skip)]
    pub parent_email: String,
    pub medical_info: Option<String>,
    pub special_needs: Option<String>,
    pub check_in_code: String,
    pub program_title: String,
    pub status: AttendanceStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub checked_in_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub checked_out_at: Option<OffsetDateTime>,
}

impl FromRow<'_, PgRow> for AttendanceEntry {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            student_id: row.try_get("student_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            grade: row.try_get("grade")?,
            parent_name: row.try_get("parent_name")?,
            parent_email: row.try_get("parent_email")?,
            medical_info: row.try_get("medical_info")?,
            special_needs: row.try_get("special_needs")?,
            check_in_code: row.try_get("check_in_code")?,
            program_title: row.try_get("program_title")?,
            status: decode(row, "status", AttendanceStatus::parse)?,
            checked_in_at: row.try_get("checked_in_at")?,
            checked_out_at: row.try_get("checked_out_at")?,
        })
    }
}

impl Searchable for AttendanceEntry {
    fn search_fields(&self) -> Vec<&str> {
        vec![&self.first_name, &self.last_name, &self.parent_name, &self.program_title]
    }

    fn tab_value(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
}

impl AttendanceEntry {
    #[must_use]
    pub fn student_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct AttendanceSummary {
    pub total: usize,
    pub expected: usize,
    pub checked_in: usize,
    pub checked_out: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewSession {
    pub booking_id: Uuid,
    /// Defaults to the booking's confirmed date.
    pub session_date: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
}

impl NewSession {
    /// # Errors
    ///
    /// Returns per-field messages for malformed dates, times, or location.
    pub fn validate(&self) -> Result<Option<Date>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let date = match validation::non_blank(self.session_date.as_deref()) {
            Some(raw) => {
                let parsed = validation::parse_date(raw);
                if parsed.is_none() {
                    errors.add("session_date", "The session date must be a valid date (YYYY-MM-DD).");
                }
                parsed
            }
            None => None,
        };
        validation::check_time_of_day(&mut errors, "start_time", &self.start_time);
        validation::check_time_of_day(&mut errors, "end_time", &self.end_time);
        let window = (
            validation::parse_time_of_day(&self.start_time),
            validation::parse_time_of_day(&self.end_time),
        );
        if let (Some(start), Some(end)) = window {
            if end <= start {
                errors.add("end_time", "The end time must be after the start time.");
            }
        }
        validation::check_length(&mut errors, "location", &self.location, 1, 255);
        errors.into_result().map(|()| date)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Checklist {
    pub materials_ready: Option<bool>,
    pub safety_briefing_completed: Option<bool>,
    pub emergency_contacts_verified: Option<bool>,
}

/// Identifies the student at a check-in desk: roster pick or scanned code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StudentRef {
    pub student_id: Option<Uuid>,
    pub code: Option<String>,
}

impl StudentRef {
    /// # Errors
    ///
    /// Returns a validation error when neither identifier is given.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if self.student_id.is_none() && validation::non_blank(self.code.as_deref()).is_none() {
            return Err(ValidationErrors::single("student_id", "A student id or check-in code is required."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub booking_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub date: Option<Date>,
}

// =============================================================================
// SUMMARY
// =============================================================================

/// (checked in + checked out) / total, as a percentage with one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn attendance_rate(checked_in: usize, checked_out: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (((checked_in + checked_out) as f64 / total as f64) * 1000.0).round() / 10.0
}

#[must_use]
pub fn summarize(entries: &[AttendanceEntry]) -> AttendanceSummary {
    let count = |status| entries.iter().filter(|e| e.status == status).count();
    let expected = count(AttendanceStatus::Expected);
    let checked_in = count(AttendanceStatus::CheckedIn);
    let checked_out = count(AttendanceStatus::CheckedOut);
    AttendanceSummary {
        total: entries.len(),
        expected,
        checked_in,
        checked_out,
        attendance_rate: attendance_rate(checked_in, checked_out, entries.len()),
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

const SESSION_SELECT: &str = r"SELECT
    a.id, a.booking_id, b.reference AS booking_reference, p.title AS program_title,
    s.name AS school_name, a.session_date, a.start_time, a.end_time, a.location, a.status,
    a.materials_ready, a.safety_briefing_completed, a.emergency_contacts_verified,
    (SELECT COUNT(*) FROM attendance_records r WHERE r.session_id = a.id) AS total_students,
    (SELECT COUNT(*) FROM attendance_records r WHERE r.session_id = a.id AND r.status = 'checked_in') AS checked_in,
    (SELECT COUNT(*) FROM attendance_records r WHERE r.session_id = a.id AND r.status = 'checked_out') AS checked_out,
    a.started_at, a.completed_at, a.created_at
    FROM attendance_sessions a
    JOIN bookings b ON b.id = a.booking_id
    JOIN programs p ON p.id = b.program_id
    JOIN schools s ON s.id = b.school_id";

pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<AttendanceSession, AttendanceError> {
    sqlx::query_as::<_, AttendanceSession>(&format!("{SESSION_SELECT} WHERE a.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AttendanceError::SessionNotFound(id))
}

/// Sessions ordered by date then start time.
pub async fn list_sessions(pool: &PgPool, filter: &SessionFilter) -> Result<Vec<AttendanceSession>, AttendanceError> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("{SESSION_SELECT} WHERE TRUE"));
    if let Some(id) = filter.booking_id {
        builder.push(" AND a.booking_id = ").push_bind(id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND a.status = ").push_bind(status.as_str());
    }
    if let Some(date) = filter.date {
        builder.push(" AND a.session_date = ").push_bind(date);
    }
    builder.push(" ORDER BY a.session_date, a.start_time, a.id");
    let sessions = builder.build_query_as::<AttendanceSession>().fetch_all(pool).await?;
    Ok(sessions)
}

pub async fn create_session(pool: &PgPool, input: &NewSession, created_by: Uuid) -> Result<AttendanceSession, AttendanceError> {
    let date = input.validate().map_err(AttendanceError::Validation)?;

    let mut tx = pool.begin().await?;
    let (status, confirmed_date): (String, Option<Date>) =
        sqlx::query_as("SELECT status, confirmed_date FROM bookings WHERE id = $1")
            .bind(input.booking_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or(AttendanceError::BookingNotFound(input.booking_id))?;
    if status != "confirmed" {
        return Err(AttendanceError::BookingNotConfirmed);
    }
    let Some(session_date) = date.or(confirmed_date) else {
        return Err(AttendanceError::Validation(ValidationErrors::single(
            "session_date",
            "The session date field is required.",
        )));
    };

    let id: Uuid = sqlx::query_scalar(
        r"INSERT INTO attendance_sessions (booking_id, session_date, start_time, end_time, location, created_by)
          VALUES ($1, $2, $3, $4, $5, $6)
          RETURNING id",
    )
    .bind(input.booking_id)
    .bind(session_date)
    .bind(input.start_time.trim())
    .bind(input.end_time.trim())
    .bind(input.location.trim())
    .bind(created_by)
    .fetch_one(tx.as_mut())
    .await?;

    sqlx::query(
        r"INSERT INTO attendance_records (session_id, student_id)
          SELECT $1, st.id FROM booking_students st WHERE st.booking_id = $2",
    )
    .bind(id)
    .bind(input.booking_id)
    .execute(tx.as_mut())
    .await?;

    tx.commit().await?;
    get_session(pool, id).await
}

/// Update any subset of the readiness checklist.
pub async fn update_checklist(pool: &PgPool, id: Uuid, checklist: Checklist) -> Result<AttendanceSession, AttendanceError> {
    let session = get_session(pool, id).await?;
    if session.status == SessionStatus::Completed {
        return Err(AttendanceError::InvalidTransition("Completed sessions cannot be changed"));
    }
    sqlx::query(
        r"UPDATE attendance_sessions
          SET materials_ready = COALESCE($2, materials_ready),
              safety_briefing_completed = COALESCE($3, safety_briefing_completed),
              emergency_contacts_verified = COALESCE($4, emergency_contacts_verified)
          WHERE id = $1",
    )
    .bind(id)
    .bind(checklist.materials_ready)
    .bind(checklist.safety_briefing_completed)
    .bind(checklist.emergency_contacts_verified)
    .execute(pool)
    .await?;
    get_session(pool, id).await
}

pub async fn transition_session(pool: &PgPool, id: Uuid, next: SessionStatus) -> Result<AttendanceSession, AttendanceError> {
    let session = get_session(pool, id).await?;
    session
        .ensure_transition(next)
        .map_err(AttendanceError::InvalidTransition)?;

    let result = sqlx::query(
        r"UPDATE attendance_sessions
          SET status = $2,
              started_at = CASE WHEN $2 = 'active' THEN now() ELSE started_at END,
              completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END
          WHERE id = $1 AND status = $3",
    )
    .bind(id)
    .bind(next.as_str())
    .bind(session.status.as_str())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AttendanceError::InvalidTransition("Session status changed concurrently"));
    }
    tracing::info!(session_id = %id, from = session.status.as_str(), to = next.as_str(), "attendance session transitioned");
    get_session(pool, id).await
}

// =============================================================================
// RECORDS
// =============================================================================

const ENTRY_SELECT: &str = r"SELECT
    r.id, r.session_id, r.student_id, st.first_name, st.last_name, st.grade, st.parent_name,
    st.parent_email, st.medical_info, st.special_needs, st.check_in_code, p.title AS program_title,
    r.status, r.checked_in_at, r.checked_out_at
    FROM attendance_records r
    JOIN booking_students st ON st.id = r.student_id
    JOIN attendance_sessions a ON a.id = r.session_id
    JOIN bookings b ON b.id = a.booking_id
    JOIN programs p ON p.id = b.program_id";

/// Create expected records for students added to the booking after the
/// session was scheduled.
async fn sync_roster(pool: &PgPool, session_id: Uuid) -> Result<(), AttendanceError> {
    sqlx::query(
        r"INSERT INTO attendance_records (session_id, student_id)
          SELECT a.id, st.id
          FROM attendance_sessions a
          JOIN booking_students st ON st.booking_id = a.booking_id
          WHERE a.id = $1
          ON CONFLICT (session_id, student_id) DO NOTHING",
    )
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records ordered by student last then first name. Without a session,
/// every record on active or preparing sessions is returned.
pub async fn list_entries(pool: &PgPool, session_id: Option<Uuid>) -> Result<Vec<AttendanceEntry>, AttendanceError> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("{ENTRY_SELECT} WHERE TRUE"));
    if let Some(id) = session_id {
        get_session(pool, id).await?;
        sync_roster(pool, id).await?;
        builder.push(" AND r.session_id = ").push_bind(id);
    } else {
        builder.push(" AND a.status IN ('preparing', 'active')");
    }
    builder.push(" ORDER BY st.last_name, st.first_name, r.id");
    let entries = builder.build_query_as::<AttendanceEntry>().fetch_all(pool).await?;
    Ok(entries)
}

async fn find_entry(pool: &PgPool, session_id: Uuid, student: &StudentRef) -> Result<AttendanceEntry, AttendanceError> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("{ENTRY_SELECT} WHERE r.session_id = "));
    builder.push_bind(session_id);
    if let Some(id) = student.student_id {
        builder.push(" AND r.student_id = ").push_bind(id);
    } else if let Some(code) = validation::non_blank(student.code.as_deref()) {
        builder
            .push(" AND st.check_in_code = ")
            .push_bind(code.to_ascii_uppercase());
    }
    builder
        .build_query_as::<AttendanceEntry>()
        .fetch_optional(pool)
        .await?
        .ok_or(AttendanceError::StudentNotFound)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    CheckIn,
    CheckOut,
}

/// Check a student in or out of an active session.
pub async fn record_movement(
    pool: &PgPool,
    session_id: Uuid,
    student: &StudentRef,
    movement: Movement,
    staff_id: Uuid,
) -> Result<AttendanceEntry, AttendanceError> {
    student.validate().map_err(AttendanceError::Validation)?;
    let session = get_session(pool, session_id).await?;
    session.ensure_active().map_err(AttendanceError::InvalidTransition)?;
    sync_roster(pool, session_id).await?;

    let entry = find_entry(pool, session_id, student).await?;
    let next = match movement {
        Movement::CheckIn => entry.status.check_in(),
        Movement::CheckOut => entry.status.check_out(),
    }
    .map_err(AttendanceError::InvalidTransition)?;

    let sql = match movement {
        Movement::CheckIn => {
            "UPDATE attendance_records SET status = $2, checked_in_at = now(), checked_in_by = $3 WHERE id = $1 AND status = $4"
        }
        Movement::CheckOut => {
            "UPDATE attendance_records SET status = $2, checked_out_at = now(), checked_out_by = $3 WHERE id = $1 AND status = $4"
        }
    };
    let result = sqlx::query(sql)
        .bind(entry.id)
        .bind(next.as_str())
        .bind(staff_id)
        .bind(entry.status.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AttendanceError::InvalidTransition("Attendance changed concurrently"));
    }

    find_entry(pool, session_id, &StudentRef { student_id: Some(entry.student_id), code: None }).await
}

// =============================================================================
// PARENT NOTICES
// =============================================================================

#[must_use]
pub fn movement_notice(entry: &AttendanceEntry, movement: Movement) -> (String, Vec<String>) {
    let name = entry.student_name();
    let (verb, at) = match movement {
        Movement::CheckIn => ("checked in to", entry.checked_in_at),
        Movement::CheckOut => ("checked out from", entry.checked_out_at),
    };
    let when = at.map_or_else(String::new, |t| format!(" at {:02}:{:02} UTC", t.hour(), t.minute()));
    let subject = match movement {
        Movement::CheckIn => format!("{name} has arrived - {}", entry.program_title),
        Movement::CheckOut => format!("{name} has been checked out - {}", entry.program_title),
    };
    (
        subject,
        vec![
            format!("Dear {},", entry.parent_name),
            format!("{name} was {verb} {}{when}.", entry.program_title),
        ],
    )
}

pub async fn notify_parent(mailer: &dyn Mailer, entry: &AttendanceEntry, movement: Movement) -> bool {
    let (subject, lines) = movement_notice(entry, movement);
    let html = mail::render_notification(&subject, &lines);
    let event = match movement {
        Movement::CheckIn => "attendance_check_in",
        Movement::CheckOut => "attendance_check_out",
    };
    mail::deliver(mailer, event, &entry.parent_email, &subject, &html).await
}

#[cfg(test)]
#[path = "attendance_test.rs"]
mod tests;
