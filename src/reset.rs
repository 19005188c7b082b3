//! Password reset with a one-time numeric code.
//!
//! A code is sent by mail and only its peppered digest is stored, one row per
//! email. Codes expire after 10 minutes and allow 5 wrong guesses. A new code
//! cannot be sent before the 60 seconds cooldown ends.
//!
//! Emails without an account get a row without digest, so that the cooldown
//! answers the same way whether the account exists or not.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres};

use crate::crypto::{Crypto, numeric_code};
use crate::error::{Result, ServerError};
use crate::mail::{MailManager, Template};
use crate::user::UserRepository;
use crate::validation;

pub const CODE_DIGITS: u32 = 6;
pub const CODE_LIFETIME_MINUTES: i64 = 10;
pub const MAX_ATTEMPTS: i32 = 5;
pub const RESEND_COOLDOWN_SECS: i64 = 60;

/// Stored reset request.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Ticket {
    pub email: String,
    pub code_hash: Option<String>,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

/// Why a code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Expired,
    TooManyAttempts,
    Mismatch,
}

impl Rejection {
    fn message(&self) -> &'static str {
        match self {
            Rejection::Expired => "Code has expired. Please request a new one.",
            Rejection::TooManyAttempts => {
                "Too many attempts. Please request a new code."
            },
            Rejection::Mismatch => "Invalid code. Please try again.",
        }
    }

    /// Whether the ticket is unusable after this rejection.
    fn burns_ticket(&self) -> bool {
        !matches!(self, Rejection::Mismatch)
    }
}

impl Ticket {
    /// Seconds left before another code may be sent.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> i64 {
        let ends = self.last_sent_at + Duration::seconds(RESEND_COOLDOWN_SECS);
        (ends - now).num_seconds().max(0)
    }

    /// Check a candidate digest.
    pub fn verify(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), Rejection> {
        if now >= self.expires_at {
            return Err(Rejection::Expired);
        }
        if self.attempts >= MAX_ATTEMPTS {
            return Err(Rejection::TooManyAttempts);
        }
        if self.code_hash.as_deref() != Some(digest) {
            return Err(Rejection::Mismatch);
        }
        Ok(())
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn invalid_code(message: &'static str) -> ServerError {
    ServerError::field("code", message)
}

/// Reset manager.
#[derive(Clone)]
pub struct PasswordReset {
    pool: Pool<Postgres>,
}

impl PasswordReset {
    /// Create a new [`PasswordReset`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn digest(crypto: &Crypto, email: &str, code: &str) -> String {
        crypto.hasher.digest(format!("{email}:{code}"))
    }

    async fn ticket(&self, email: &str) -> Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM password_resets WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    /// Send a new code. Returns the cooldown before the next one.
    ///
    /// Unknown emails get the same answer and nothing is sent. The cooldown
    /// starts only once the mail is handed to the queue.
    pub async fn issue(
        &self,
        crypto: &Crypto,
        mail: &MailManager,
        email: &str,
    ) -> Result<i64> {
        let email = normalize(email);
        if !validation::is_email(&email) {
            return Err(ServerError::field(
                "email",
                "Please enter a valid email address",
            ));
        }

        let now = Utc::now();
        let user = UserRepository::new(self.pool.clone())
            .find_by_email(&email)
            .await?;
        let code = user.as_ref().map(|_| numeric_code(CODE_DIGITS));

        let mut tx = self.pool.begin().await?;
        let started: Option<String> = sqlx::query_scalar(
            r#"INSERT INTO password_resets (email, code_hash, attempts, expires_at, last_sent_at)
                VALUES ($1, $2, 0, $3, $4)
                ON CONFLICT (email) DO UPDATE
                SET code_hash = EXCLUDED.code_hash, attempts = 0,
                    expires_at = EXCLUDED.expires_at, last_sent_at = EXCLUDED.last_sent_at
                WHERE password_resets.last_sent_at <= $5
                RETURNING email"#,
        )
        .bind(&email)
        .bind(code.as_ref().map(|code| Self::digest(crypto, &email, code)))
        .bind(now + Duration::minutes(CODE_LIFETIME_MINUTES))
        .bind(now)
        .bind(now - Duration::seconds(RESEND_COOLDOWN_SECS))
        .fetch_optional(&mut *tx)
        .await?;

        if started.is_none() {
            tx.rollback().await?;
            let remaining = self
                .ticket(&email)
                .await?
                .map(|ticket| ticket.cooldown_remaining(now))
                .unwrap_or(RESEND_COOLDOWN_SECS)
                .max(1);
            return Err(ServerError::Cooldown { remaining });
        }

        match (user, code) {
            (Some(user), Some(code)) => {
                // The row is rolled back when publishing fails.
                mail.publish_event(
                    Template::PasswordReset {
                        code,
                        expires_in_minutes: CODE_LIFETIME_MINUTES,
                    },
                    &user.email,
                    &user.full_name,
                )
                .await?;
                tx.commit().await?;

                tracing::info!(user_id = %user.id, "password reset code sent");
            },
            _ => {
                tx.commit().await?;
                tracing::debug!("reset requested for unknown email");
            },
        }

        Ok(RESEND_COOLDOWN_SECS)
    }

    /// Replace the password if `code` is valid.
    pub async fn confirm(
        &self,
        crypto: &Crypto,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        let email = normalize(email);
        if !validation::is_reset_code(code) {
            return Err(invalid_code("Please enter the 6-digit code"));
        }
        if new_password.chars().count() < validation::MIN_PASSWORD_LENGTH {
            return Err(ServerError::field(
                "newPassword",
                "Password must be at least 6 characters long",
            ));
        }

        let mut tx = self.pool.begin().await?;
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM password_resets WHERE email = $1 FOR UPDATE",
        )
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| invalid_code("Invalid or expired code. Please request a new one."))?;

        if let Err(rejection) =
            ticket.verify(&Self::digest(crypto, &email, code), Utc::now())
        {
            if rejection.burns_ticket() {
                sqlx::query("DELETE FROM password_resets WHERE email = $1")
                    .bind(&email)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(
                    "UPDATE password_resets SET attempts = attempts + 1 WHERE email = $1",
                )
                .bind(&email)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;

            tracing::debug!(?rejection, "reset code refused");
            return Err(invalid_code(rejection.message()));
        }

        let user = UserRepository::new(self.pool.clone())
            .find_by_email(&email)
            .await?
            .ok_or_else(|| invalid_code("Invalid or expired code. Please request a new one."))?;
        let hash = crypto.pwd.hash_password(new_password)?;

        UserRepository::update_password(&mut tx, user.id, &hash).await?;
        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, "password reset");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(now: DateTime<Utc>) -> Ticket {
        Ticket {
            email: "jane@acme.io".into(),
            code_hash: Some("digest".into()),
            attempts: 0,
            expires_at: now + Duration::minutes(CODE_LIFETIME_MINUTES),
            last_sent_at: now,
        }
    }

    #[test]
    fn test_cooldown() {
        let now = Utc::now();
        let ticket = ticket(now);

        assert_eq!(ticket.cooldown_remaining(now), 60);
        assert_eq!(ticket.cooldown_remaining(now + Duration::seconds(45)), 15);
        assert_eq!(ticket.cooldown_remaining(now + Duration::seconds(90)), 0);
    }

    #[test]
    fn test_verify() {
        let now = Utc::now();
        let ticket = ticket(now);

        assert_eq!(ticket.verify("digest", now), Ok(()));
        assert_eq!(ticket.verify("other", now), Err(Rejection::Mismatch));
        assert_eq!(
            ticket.verify("digest", now + Duration::minutes(11)),
            Err(Rejection::Expired)
        );

        let exhausted = Ticket {
            attempts: MAX_ATTEMPTS,
            ..ticket
        };
        assert_eq!(
            exhausted.verify("digest", now),
            Err(Rejection::TooManyAttempts)
        );
    }

    #[test]
    fn test_ticket_without_code_never_matches() {
        let now = Utc::now();
        let ticket = Ticket {
            code_hash: None,
            ..ticket(now)
        };
        assert_eq!(ticket.verify("digest", now), Err(Rejection::Mismatch));
    }

    #[test]
    fn test_only_mismatch_keeps_ticket() {
        assert!(!Rejection::Mismatch.burns_ticket());
        assert!(Rejection::Expired.burns_ticket());
        assert!(Rejection::TooManyAttempts.burns_ticket());
    }
}
