//! Direct messages between users.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::envelope::PageParams;
use crate::error::ValidationErrors;

pub const DEFAULT_PER_PAGE: u64 = 30;
pub const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("recipient not found: {0}")]
    RecipientNotFound(Uuid),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DirectMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One row per conversation partner.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub partner_id: Uuid,
    pub partner_name: String,
    pub partner_role: String,
    pub last_message: String,
    pub last_sender_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub last_message_at: OffsetDateTime,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewMessage {
    pub recipient_id: Uuid,
    pub body: String,
}

/// Body trimmed, non-empty, at most `MAX_BODY_CHARS`; never to self.
///
/// # Errors
///
/// Returns per-field messages for a bad body or recipient.
pub fn validate_message(sender_id: Uuid, input: &NewMessage) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let len = input.body.trim().chars().count();
    if len == 0 {
        errors.add("body", "The message body field is required.");
    } else if len > MAX_BODY_CHARS {
        errors.add("body", format!("The message body may not be greater than {MAX_BODY_CHARS} characters."));
    }
    if input.recipient_id == sender_id {
        errors.add("recipient_id", "You cannot send a message to yourself.");
    }
    errors.into_result()
}

pub async fn send_message(pool: &PgPool, sender_id: Uuid, input: &NewMessage) -> Result<DirectMessage, MessageError> {
    validate_message(sender_id, input).map_err(MessageError::Validation)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
        .bind(input.recipient_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(MessageError::RecipientNotFound(input.recipient_id));
    }

    let message = sqlx::query_as::<_, DirectMessage>(
        r"INSERT INTO direct_messages (sender_id, recipient_id, body)
          VALUES ($1, $2, $3)
          RETURNING id, sender_id, recipient_id, body, read_at, created_at",
    )
    .bind(sender_id)
    .bind(input.recipient_id)
    .bind(input.body.trim())
    .fetch_one(pool)
    .await?;
    Ok(message)
}

/// Messages exchanged with `partner_id`, newest first.
pub async fn conversation(
    pool: &PgPool,
    user_id: Uuid,
    partner_id: Uuid,
    params: PageParams,
) -> Result<(Vec<DirectMessage>, u64), MessageError> {
    let (limit, offset) = params.limit_offset(DEFAULT_PER_PAGE);

    let total: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM direct_messages
          WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)",
    )
    .bind(user_id)
    .bind(partner_id)
    .fetch_one(pool)
    .await?;

    let messages = sqlx::query_as::<_, DirectMessage>(
        r"SELECT id, sender_id, recipient_id, body, read_at, created_at
          FROM direct_messages
          WHERE (sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)
          ORDER BY created_at DESC, id DESC
          LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(partner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((messages, u64::try_from(total).unwrap_or(0)))
}

/// Latest message per partner, most recent conversation first.
pub async fn conversations(pool: &PgPool, user_id: Uuid) -> Result<Vec<Conversation>, MessageError> {
    let rows = sqlx::query_as::<_, Conversation>(
        r"WITH mine AS (
              SELECT dm.*,
                     CASE WHEN dm.sender_id = $1 THEN dm.recipient_id ELSE dm.sender_id END AS partner_id
              FROM direct_messages dm
              WHERE dm.sender_id = $1 OR dm.recipient_id = $1
          ),
          latest AS (
              SELECT DISTINCT ON (partner_id) partner_id, body, sender_id, created_at
              FROM mine
              ORDER BY partner_id, created_at DESC, id DESC
          )
          SELECT l.partner_id, u.name AS partner_name, u.role AS partner_role,
                 l.body AS last_message, l.sender_id AS last_sender_id,
                 l.created_at AS last_message_at,
                 (SELECT COUNT(*) FROM mine m
                   WHERE m.partner_id = l.partner_id AND m.recipient_id = $1 AND m.read_at IS NULL) AS unread_count
          FROM latest l
          JOIN users u ON u.id = l.partner_id
          ORDER BY l.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mark every message from `partner_id` to `user_id` read. Returns the count.
pub async fn mark_read(pool: &PgPool, user_id: Uuid, partner_id: Uuid) -> Result<u64, MessageError> {
    let result = sqlx::query(
        "UPDATE direct_messages SET read_at = now() WHERE recipient_id = $1 AND sender_id = $2 AND read_at IS NULL",
    )
    .bind(user_id)
    .bind(partner_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
