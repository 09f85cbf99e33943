//! Permission slips: per-student parental consent for a confirmed booking.
//!
//! DESIGN
//! ======
//! Each slip carries a random 64-char access token; the token in the
//! emailed link is the parent's only credential, so public lookups go by
//! token and never by id. Signing is a single guarded `UPDATE ... WHERE
//! signed_at IS NULL` so a slip can be signed exactly once.
//!
//! Reminders are throttled per slip (`MAX_REMINDERS`, `REMINDER_INTERVAL`)
//! and counted only when the mailer accepted the message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::Config;
use crate::envelope::PageParams;
use crate::error::ValidationErrors;
use crate::filter;
use crate::services::email_auth::normalize_email;
use crate::services::mail::{self, Mailer};
use crate::services::session::generate_token;
use crate::validation;

pub const DEFAULT_PER_PAGE: u64 = 15;
pub const MAX_REMINDERS: i32 = 3;
pub const REMINDER_INTERVAL: Duration = Duration::hours(24);
/// Unsigned slips become overdue this many days before the event.
pub const OVERDUE_WINDOW_DAYS: i64 = 3;
const MAX_SIGNATURE_LEN: usize = 200_000;

const SLIP_SELECT: &str = r"SELECT
    ps.id, ps.booking_id, b.reference AS booking_reference, b.school_id,
    s.name AS school_name, p.title AS program_title, b.confirmed_date AS event_date,
    b.confirmed_time AS event_time, ps.student_id, st.first_name AS student_first_name,
    st.last_name AS student_last_name, ps.parent_name, ps.parent_email, ps.parent_phone,
    ps.access_token, ps.signed_at, ps.signer_ip, ps.photo_permission, ps.emergency_contacts,
    ps.medical_info, ps.special_instructions, ps.reminder_count, ps.last_reminder_at,
    ps.created_at";

const SLIP_FROM: &str = r"
    FROM permission_slips ps
    JOIN bookings b ON b.id = ps.booking_id
    JOIN schools s ON s.id = b.school_id
    JOIN programs p ON p.id = b.program_id
    JOIN booking_students st ON st.id = ps.student_id";

#[derive(Debug, thiserror::Error)]
pub enum SlipError {
    #[error("permission slip not found")]
    NotFound,
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),
    #[error("Permission slips can only be created for confirmed bookings")]
    BookingNotConfirmed,
    #[error("Permission slip is already signed")]
    AlreadySigned,
    #[error("Signed permission slips cannot be deleted")]
    SignedSlipLocked,
    #[error("{0}")]
    ReminderNotAllowed(&'static str),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PermissionSlip {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub booking_reference: Option<String>,
    pub school_id: Uuid,
    pub school_name: String,
    pub program_title: String,
    pub event_date: Option<Date>,
    pub event_time: Option<String>,
    pub student_id: Uuid,
    pub student_first_name: String,
    pub student_last_name: String,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: Option<String>,
    #[serde(skip)]
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub signed_at: Option<OffsetDateTime>,
    pub signer_ip: Option<String>,
    pub photo_permission: bool,
    pub emergency_contacts: Value,
    pub medical_info: Option<String>,
    pub special_instructions: Option<String>,
    pub reminder_count: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_reminder_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A slip plus the derived flags clients render.
#[derive(Debug, Clone, Serialize)]
pub struct SlipView {
    #[serde(flatten)]
    pub slip: PermissionSlip,
    pub student_name: String,
    pub is_signed: bool,
    pub is_overdue: bool,
    pub can_send_reminder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipStatus {
    Signed,
    Unsigned,
    Overdue,
}

impl SlipStatus {
    /// Parse a status tab; `"all"` or anything unknown means no filter.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match filter::normalize_tab(raw)? {
            "signed" => Some(Self::Signed),
            "unsigned" => Some(Self::Unsigned),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlipFilter {
    pub booking_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub status: Option<SlipStatus>,
    pub search: Option<String>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignSlip {
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: Option<String>,
    pub signature: String,
    #[serde(default)]
    pub photo_permission: bool,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
    pub medical_info: Option<String>,
    pub special_instructions: Option<String>,
}

impl SignSlip {
    /// # Errors
    ///
    /// Returns per-field messages for missing signer details or signature.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validation::check_length(&mut errors, "parent_name", &self.parent_name, 1, 255);
        if normalize_email(&self.parent_email).is_none() {
            errors.add("parent_email", "The parent email must be a valid email address.");
        }
        validation::check_length(&mut errors, "signature", &self.signature, 1, MAX_SIGNATURE_LEN);
        for (i, contact) in self.emergency_contacts.iter().enumerate() {
            if contact.name.trim().is_empty() {
                errors.add(&format!("emergency_contacts.{i}.name"), "The contact name is required.");
            }
            if contact.phone.trim().is_empty() {
                errors.add(&format!("emergency_contacts.{i}.phone"), "The contact phone is required.");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlipStatistics {
    pub total: i64,
    pub signed: i64,
    pub unsigned: i64,
    pub overdue: i64,
    pub completion_rate: f64,
    pub overdue_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReminderFailure {
    pub slip_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BulkReminderResult {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ReminderFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOutcome {
    pub delivered: bool,
    pub slip: SlipView,
}

// =============================================================================
// RULES
// =============================================================================

/// Last event date at which an unsigned slip counts as overdue today.
#[must_use]
pub fn overdue_cutoff(today: Date) -> Date {
    today.saturating_add(Duration::days(OVERDUE_WINDOW_DAYS))
}

/// Percentage with two decimals; 0 when `total` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10_000.0).round() / 100.0
}

/// "in N days", "today", or "(event has passed)".
#[must_use]
pub fn days_until_text(event_date: Option<Date>, today: Date) -> String {
    let Some(date) = event_date else {
        return "on a date to be confirmed".to_owned();
    };
    match (date - today).whole_days() {
        d if d < 0 => "(event has passed)".to_owned(),
        0 => "today".to_owned(),
        1 => "in 1 day".to_owned(),
        d => format!("in {d} days"),
    }
}

impl PermissionSlip {
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signed_at.is_some()
    }

    #[must_use]
    pub fn is_overdue(&self, today: Date) -> bool {
        !self.is_signed() && self.event_date.is_some_and(|d| d <= overdue_cutoff(today))
    }

    /// # Errors
    ///
    /// Returns the reason a reminder may not be sent right now.
    pub fn check_reminder_allowed(&self, now: OffsetDateTime) -> Result<(), &'static str> {
        if self.is_signed() {
            return Err("Permission slip is already signed");
        }
        if self.reminder_count >= MAX_REMINDERS {
            return Err("Maximum number of reminders already sent");
        }
        if self.last_reminder_at.is_some_and(|at| now - at < REMINDER_INTERVAL) {
            return Err("A reminder was sent less than 24 hours ago");
        }
        Ok(())
    }

    #[must_use]
    pub fn student_name(&self) -> String {
        format!("{} {}", self.student_first_name, self.student_last_name)
    }

    /// Derive display flags. `signing_url` is only included for staff views.
    #[must_use]
    pub fn view(self, now: OffsetDateTime, signing_url: Option<String>) -> SlipView {
        let today = now.date();
        SlipView {
            student_name: self.student_name(),
            is_signed: self.is_signed(),
            is_overdue: self.is_overdue(today),
            can_send_reminder: self.check_reminder_allowed(now).is_ok(),
            signing_url,
            slip: self,
        }
    }
}

/// Staff view with the signing link attached.
#[must_use]
pub fn staff_view(slip: PermissionSlip, config: &Config) -> SlipView {
    let url = config.signing_url(&slip.access_token);
    slip.view(OffsetDateTime::now_utc(), Some(url))
}

// =============================================================================
// QUERIES
// =============================================================================

pub async fn get_slip(pool: &PgPool, id: Uuid) -> Result<PermissionSlip, SlipError> {
    sqlx::query_as::<_, PermissionSlip>(&format!("{SLIP_SELECT} {SLIP_FROM} WHERE ps.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(SlipError::NotFound)
}

pub async fn get_slip_by_token(pool: &PgPool, token: &str) -> Result<PermissionSlip, SlipError> {
    sqlx::query_as::<_, PermissionSlip>(&format!("{SLIP_SELECT} {SLIP_FROM} WHERE ps.access_token = $1"))
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(SlipError::NotFound)
}

/// Newest first.
pub async fn list_slips(
    pool: &PgPool,
    filter: &SlipFilter,
    params: PageParams,
    today: Date,
) -> Result<(Vec<PermissionSlip>, u64), SlipError> {
    let (limit, offset) = params.limit_offset(DEFAULT_PER_PAGE);

    let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) {SLIP_FROM} WHERE TRUE"));
    push_filters(&mut count, filter, today);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut rows = QueryBuilder::<Postgres>::new(format!("{SLIP_SELECT} {SLIP_FROM} WHERE TRUE"));
    push_filters(&mut rows, filter, today);
    rows.push(" ORDER BY ps.created_at DESC, ps.id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let slips = rows.build_query_as::<PermissionSlip>().fetch_all(pool).await?;

    Ok((slips, u64::try_from(total).unwrap_or(0)))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &SlipFilter, today: Date) {
    if let Some(id) = filter.booking_id {
        builder.push(" AND ps.booking_id = ").push_bind(id);
    }
    if let Some(id) = filter.school_id {
        builder.push(" AND b.school_id = ").push_bind(id);
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND b.confirmed_date >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND b.confirmed_date <= ").push_bind(to);
    }
    match filter.status {
        Some(SlipStatus::Signed) => {
            builder.push(" AND ps.signed_at IS NOT NULL");
        }
        Some(SlipStatus::Unsigned) => {
            builder.push(" AND ps.signed_at IS NULL");
        }
        Some(SlipStatus::Overdue) => {
            push_overdue(builder, today);
        }
        None => {}
    }
    if let Some(search) = filter::normalize_search(filter.search.as_deref()) {
        let pattern = filter::like_pattern(search);
        builder
            .push(" AND (ps.parent_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR ps.parent_email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR st.first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR st.last_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_overdue(builder: &mut QueryBuilder<'_, Postgres>, today: Date) {
    builder
        .push(" AND ps.signed_at IS NULL AND b.confirmed_date IS NOT NULL AND b.confirmed_date <= ")
        .push_bind(overdue_cutoff(today));
}

pub async fn slip_statistics(pool: &PgPool, filter: &SlipFilter, today: Date) -> Result<SlipStatistics, SlipError> {
    let scope = SlipFilter { status: None, search: None, ..filter.clone() };

    let mut builder = QueryBuilder::<Postgres>::new(
        r"SELECT COUNT(*),
                 COUNT(*) FILTER (WHERE ps.signed_at IS NOT NULL),
                 COUNT(*) FILTER (WHERE ps.signed_at IS NULL AND b.confirmed_date IS NOT NULL AND b.confirmed_date <= ",
    );
    builder.push_bind(overdue_cutoff(today));
    builder.push(format!(") {SLIP_FROM} WHERE TRUE"));
    push_filters(&mut builder, &scope, today);
    let (total, signed, overdue) = builder
        .build_query_as::<(i64, i64, i64)>()
        .fetch_one(pool)
        .await?;

    Ok(statistics(total, signed, overdue))
}

#[must_use]
pub fn statistics(total: i64, signed: i64, overdue: i64) -> SlipStatistics {
    SlipStatistics {
        total,
        signed,
        unsigned: total - signed,
        overdue,
        completion_rate: rate(signed, total),
        overdue_rate: rate(overdue, total),
    }
}

/// Unsigned slips for events within `days_before` days that are due a reminder.
pub async fn slips_requiring_reminders(
    pool: &PgPool,
    days_before: i64,
    today: Date,
) -> Result<Vec<PermissionSlip>, SlipError> {
    let slips = sqlx::query_as::<_, PermissionSlip>(&format!(
        r"{SLIP_SELECT} {SLIP_FROM}
          WHERE ps.signed_at IS NULL
            AND b.confirmed_date IS NOT NULL
            AND b.confirmed_date <= $1
            AND ps.reminder_count < $2
            AND (ps.last_reminder_at IS NULL OR ps.last_reminder_at < now() - INTERVAL '24 hours')
          ORDER BY b.confirmed_date, ps.id"
    ))
    .bind(today.saturating_add(Duration::days(days_before.max(0))))
    .bind(MAX_REMINDERS)
    .fetch_all(pool)
    .await?;
    Ok(slips)
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Create one slip per student that does not have one yet.
pub async fn create_slips_for_booking(pool: &PgPool, booking_id: Uuid) -> Result<Vec<PermissionSlip>, SlipError> {
    let mut tx = pool.begin().await?;

    let status: String = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(booking_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(SlipError::BookingNotFound(booking_id))?;
    if status != "confirmed" {
        return Err(SlipError::BookingNotConfirmed);
    }

    let students = sqlx::query_as::<_, (Uuid, String, String, Option<String>, Option<String>)>(
        r"SELECT st.id, st.parent_name, st.parent_email, st.parent_phone, st.medical_info
          FROM booking_students st
          WHERE st.booking_id = $1
            AND NOT EXISTS (SELECT 1 FROM permission_slips ps WHERE ps.student_id = st.id)
          ORDER BY st.last_name, st.first_name, st.id",
    )
    .bind(booking_id)
    .fetch_all(tx.as_mut())
    .await?;

    let mut ids = Vec::with_capacity(students.len());
    for (student_id, parent_name, parent_email, parent_phone, medical_info) in students {
        let id: Uuid = sqlx::query_scalar(
            r"INSERT INTO permission_slips (booking_id, student_id, parent_name, parent_email,
                                            parent_phone, medical_info, access_token)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              RETURNING id",
        )
        .bind(booking_id)
        .bind(student_id)
        .bind(parent_name)
        .bind(parent_email)
        .bind(parent_phone)
        .bind(medical_info)
        .bind(generate_token())
        .fetch_one(tx.as_mut())
        .await?;
        ids.push(id);
    }

    tx.commit().await?;

    let created = sqlx::query_as::<_, PermissionSlip>(&format!(
        "{SLIP_SELECT} {SLIP_FROM} WHERE ps.id = ANY($1) ORDER BY st.last_name, st.first_name, ps.id"
    ))
    .bind(&ids)
    .fetch_all(pool)
    .await?;
    Ok(created)
}

/// Sign by access token. The second signature on a slip is rejected.
pub async fn sign_slip(pool: &PgPool, token: &str, input: &SignSlip, ip: Option<&str>) -> Result<PermissionSlip, SlipError> {
    input.validate().map_err(SlipError::Validation)?;
    let contacts = serde_json::to_value(&input.emergency_contacts).unwrap_or(Value::Array(Vec::new()));

    let signed = sqlx::query_scalar::<_, Uuid>(
        r"UPDATE permission_slips
          SET parent_name = $2, parent_email = $3, parent_phone = $4, signature = $5,
              photo_permission = $6, emergency_contacts = $7,
              medical_info = COALESCE($8, medical_info), special_instructions = $9,
              signed_at = now(), signer_ip = $10
          WHERE access_token = $1 AND signed_at IS NULL
          RETURNING id",
    )
    .bind(token)
    .bind(input.parent_name.trim())
    .bind(input.parent_email.trim().to_ascii_lowercase())
    .bind(validation::non_blank(input.parent_phone.as_deref()))
    .bind(&input.signature)
    .bind(input.photo_permission)
    .bind(contacts)
    .bind(validation::non_blank(input.medical_info.as_deref()))
    .bind(validation::non_blank(input.special_instructions.as_deref()))
    .bind(ip)
    .fetch_optional(pool)
    .await?;

    match signed {
        Some(id) => get_slip(pool, id).await,
        None => {
            let existing = get_slip_by_token(pool, token).await?;
            if existing.is_signed() {
                Err(SlipError::AlreadySigned)
            } else {
                Err(SlipError::NotFound)
            }
        }
    }
}

pub async fn delete_slip(pool: &PgPool, id: Uuid) -> Result<(), SlipError> {
    let slip = get_slip(pool, id).await?;
    if slip.is_signed() {
        return Err(SlipError::SignedSlipLocked);
    }
    let result = sqlx::query("DELETE FROM permission_slips WHERE id = $1 AND signed_at IS NULL")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SlipError::SignedSlipLocked);
    }
    Ok(())
}

/// Take one reminder slot in a single guarded update, so concurrent senders
/// cannot exceed the cap or the interval. `false` when the slot is not free.
async fn claim_reminder(pool: &PgPool, id: Uuid) -> Result<bool, SlipError> {
    let interval_hours = i32::try_from(REMINDER_INTERVAL.whole_hours()).unwrap_or(i32::MAX);
    let result = sqlx::query(
        r"UPDATE permission_slips
          SET reminder_count = reminder_count + 1, last_reminder_at = now()
          WHERE id = $1
            AND signed_at IS NULL
            AND reminder_count < $2
            AND (last_reminder_at IS NULL OR last_reminder_at <= now() - make_interval(hours => $3))",
    )
    .bind(id)
    .bind(MAX_REMINDERS)
    .bind(interval_hours)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Give a claimed slot back after the mailer refused the message.
async fn release_reminder(pool: &PgPool, id: Uuid, previous_at: Option<OffsetDateTime>) -> Result<(), SlipError> {
    sqlx::query(
        r"UPDATE permission_slips
          SET reminder_count = GREATEST(reminder_count - 1, 0), last_reminder_at = $2
          WHERE id = $1",
    )
    .bind(id)
    .bind(previous_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReminderAttempt {
    Delivered,
    Refused(&'static str),
    Undelivered,
}

/// Claim, send, and release on failure. Only delivered reminders stay counted.
async fn remind(pool: &PgPool, mailer: &dyn Mailer, config: &Config, slip: &PermissionSlip) -> Result<ReminderAttempt, SlipError> {
    if let Err(reason) = slip.check_reminder_allowed(OffsetDateTime::now_utc()) {
        return Ok(ReminderAttempt::Refused(reason));
    }
    if !claim_reminder(pool, slip.id).await? {
        let current = get_slip(pool, slip.id).await?;
        let reason = current
            .check_reminder_allowed(OffsetDateTime::now_utc())
            .err()
            .unwrap_or("A reminder is already being sent");
        return Ok(ReminderAttempt::Refused(reason));
    }
    if send_slip_email(mailer, config, slip, SlipEmail::Reminder).await {
        Ok(ReminderAttempt::Delivered)
    } else {
        release_reminder(pool, slip.id, slip.last_reminder_at).await?;
        Ok(ReminderAttempt::Undelivered)
    }
}

/// Send one reminder if the throttle allows it.
pub async fn send_reminder(
    pool: &PgPool,
    mailer: &dyn Mailer,
    config: &Config,
    id: Uuid,
) -> Result<ReminderOutcome, SlipError> {
    let slip = get_slip(pool, id).await?;
    let delivered = match remind(pool, mailer, config, &slip).await? {
        ReminderAttempt::Delivered => true,
        ReminderAttempt::Undelivered => false,
        ReminderAttempt::Refused(reason) => return Err(SlipError::ReminderNotAllowed(reason)),
    };
    let slip = get_slip(pool, id).await?;
    Ok(ReminderOutcome { delivered, slip: staff_view(slip, config) })
}

/// Remind every listed slip; throttled or signed slips are skipped.
pub async fn send_bulk_reminders(
    pool: &PgPool,
    mailer: &dyn Mailer,
    config: &Config,
    ids: &[Uuid],
) -> Result<BulkReminderResult, SlipError> {
    let slips = sqlx::query_as::<_, PermissionSlip>(&format!(
        "{SLIP_SELECT} {SLIP_FROM} WHERE ps.id = ANY($1) ORDER BY ps.id"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut result = BulkReminderResult::default();
    for id in ids {
        if !slips.iter().any(|s| s.id == *id) {
            result.skipped += 1;
            result.errors.push(ReminderFailure { slip_id: *id, error: "Permission slip not found".into() });
        }
    }
    for slip in &slips {
        match remind(pool, mailer, config, slip).await? {
            ReminderAttempt::Delivered => result.sent += 1,
            ReminderAttempt::Refused(_) => result.skipped += 1,
            ReminderAttempt::Undelivered => {
                result.failed += 1;
                result.errors.push(ReminderFailure { slip_id: slip.id, error: "Email delivery failed".into() });
            }
        }
    }
    Ok(result)
}

// =============================================================================
// EMAIL
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipEmail {
    SigningRequest,
    Reminder,
    SignedConfirmation,
}

/// Subject and paragraphs for a slip email.
#[must_use]
pub fn slip_email_content(slip: &PermissionSlip, kind: SlipEmail, signing_url: &str, today: Date) -> (String, Vec<String>) {
    let program = &slip.program_title;
    let student = slip.student_name();
    let event_date = slip
        .event_date
        .map_or_else(|| "a date to be confirmed".to_owned(), |d| d.to_string());
    let greeting = format!("Dear {},", slip.parent_name);
    match kind {
        SlipEmail::SigningRequest => (
            format!("Permission Slip Required - {program}"),
            vec![
                greeting,
                format!(
                    "Please sign the permission slip for {student} to attend {program} with {} on {event_date}.",
                    slip.school_name
                ),
                format!("Sign online: {signing_url}"),
            ],
        ),
        SlipEmail::Reminder => (
            format!("Reminder: Permission Slip Required - {program}"),
            vec![
                greeting,
                format!(
                    "We still need your signature for {student}. {program} is {}.",
                    days_until_text(slip.event_date, today)
                ),
                format!("Sign online: {signing_url}"),
            ],
        ),
        SlipEmail::SignedConfirmation => (
            format!("Permission Slip Signed - {program}"),
            vec![format!(
                "Thank you for signing the permission slip for {student}. Your child is now registered for the {program} program on {event_date}."
            )],
        ),
    }
}

/// Email the parent. Returns whether the mailer accepted the message.
pub async fn send_slip_email(mailer: &dyn Mailer, config: &Config, slip: &PermissionSlip, kind: SlipEmail) -> bool {
    let url = config.signing_url(&slip.access_token);
    let (subject, lines) = slip_email_content(slip, kind, &url, validation::today());
    let html = mail::render_notification(&subject, &lines);
    let event = match kind {
        SlipEmail::SigningRequest => "permission_slip_request",
        SlipEmail::Reminder => "permission_slip_reminder",
        SlipEmail::SignedConfirmation => "permission_slip_signed",
    };
    mail::deliver(mailer, event, &slip.parent_email, &subject, &html).await
}

#[cfg(test)]
#[path = "permission_slip_test.rs"]
mod tests;
