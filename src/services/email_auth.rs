//! Email access-code auth service.
//!
//! Creates and verifies short-lived six-character codes linked to an email.
//! Only the SHA-256 of a code is stored; a code is burned after
//! `MAX_FAILED_ATTEMPTS` wrong guesses.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::services::mail::{self, Mailer};
use crate::services::session::bytes_to_hex;

const CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_FAILED_ATTEMPTS: i32 = 5;
const ACCESS_CODE_SUBJECT: &str = "Your Spark access code";
const ACCESS_CODE_TEMPLATE: &str = include_str!("../../templates/access_code.html");

#[derive(Debug, thiserror::Error)]
pub enum EmailAuthError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid code")]
    InvalidCode,
    #[error("expired or incorrect code")]
    VerificationFailed,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let normalized = code.trim().to_ascii_uppercase();
    if normalized.len() != CODE_LEN || !normalized.bytes().all(|c| CODE_ALPHABET.contains(&c)) {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn generate_access_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET[idx])
        })
        .collect()
}

#[must_use]
pub fn hash_access_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

fn name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("user")
        .to_owned()
}

/// Upsert the user and replace any open code with a fresh one.
///
/// Returns the plaintext code so the caller can mail it.
pub async fn request_access_code(pool: &PgPool, email: &str) -> Result<String, EmailAuthError> {
    let email = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;
    let code = generate_access_code();

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO users (email, name) VALUES ($1, $2) ON CONFLICT (email) DO NOTHING")
        .bind(&email)
        .bind(name_from_email(&email))
        .execute(tx.as_mut())
        .await?;
    // At most one open code per address.
    sqlx::query("UPDATE email_login_codes SET consumed_at = now() WHERE email = $1 AND consumed_at IS NULL")
        .bind(&email)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("INSERT INTO email_login_codes (email, code_hash) VALUES ($1, $2)")
        .bind(&email)
        .bind(hash_access_code(&code))
        .execute(tx.as_mut())
        .await?;
    tx.commit().await?;

    Ok(code)
}

/// Outcome of comparing a submitted code against the open one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeCheck {
    Accept,
    Reject { burn: bool },
}

fn check_code(stored_hash: &str, submitted_hash: &str, attempts: i32) -> CodeCheck {
    if stored_hash == submitted_hash {
        CodeCheck::Accept
    } else {
        CodeCheck::Reject { burn: attempts + 1 >= MAX_FAILED_ATTEMPTS }
    }
}

/// Consume the newest open code for `email` and return the user id.
///
/// The open code row is locked for the duration of the check so concurrent
/// guesses are counted one at a time.
pub async fn verify_access_code(pool: &PgPool, email: &str, code: &str) -> Result<Uuid, EmailAuthError> {
    let email = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;
    let submitted = hash_access_code(&normalize_code(code).ok_or(EmailAuthError::InvalidCode)?);

    let mut tx = pool.begin().await?;
    let open = sqlx::query(
        r"SELECT id, code_hash, attempts
          FROM email_login_codes
          WHERE email = $1 AND consumed_at IS NULL AND expires_at > now()
          ORDER BY created_at DESC
          LIMIT 1
          FOR UPDATE",
    )
    .bind(&email)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(EmailAuthError::VerificationFailed)?;

    let code_id: Uuid = open.get("id");
    match check_code(open.get("code_hash"), &submitted, open.get("attempts")) {
        CodeCheck::Accept => {
            sqlx::query("UPDATE email_login_codes SET consumed_at = now() WHERE id = $1")
                .bind(code_id)
                .execute(tx.as_mut())
                .await?;
        }
        CodeCheck::Reject { burn } => {
            sqlx::query(
                r"UPDATE email_login_codes
                  SET attempts = attempts + 1,
                      consumed_at = CASE WHEN $2 THEN now() ELSE NULL END
                  WHERE id = $1",
            )
            .bind(code_id)
            .bind(burn)
            .execute(tx.as_mut())
            .await?;
            tx.commit().await?;
            return Err(EmailAuthError::VerificationFailed);
        }
    }

    let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(EmailAuthError::VerificationFailed)?;
    tx.commit().await?;
    Ok(user_id)
}

/// Mail the code. Delivery problems are logged, not returned.
pub async fn send_access_code_email(mailer: &dyn Mailer, to_email: &str, code: &str) -> bool {
    let html = render_access_code_template(to_email, code);
    mail::deliver(mailer, "access_code", to_email, ACCESS_CODE_SUBJECT, &html).await
}

#[must_use]
pub fn render_access_code_template(email: &str, code: &str) -> String {
    ACCESS_CODE_TEMPLATE
        .replace("{{EMAIL}}", &mail::escape_html(email))
        .replace("{{CODE}}", code)
}

#[cfg(test)]
#[path = "email_auth_test.rs"]
mod tests;
