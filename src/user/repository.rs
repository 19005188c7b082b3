//! Handle database requests.

use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::user::User;

const USER_COLUMNS: &str = r#"id, email, password, full_name, role, phone, location, job_title,
    company, company_id, skills, education, work_experience, profile, created_at, updated_at"#;

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert [`User`] using an open transaction.
    pub async fn insert(conn: &mut PgConnection, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, email, password, full_name, role, phone, job_title, company, company_id, profile)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(&user.job_title)
        .bind(user.company)
        .bind(user.company_id)
        .bind(Json(&user.profile))
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Find user using `id` field.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("User"))
    }

    /// Find user using `email` field. Emails are stored lowercase.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Whether an account already uses `email`.
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(email.trim().to_lowercase())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Persist identity fields and the nested profile.
    ///
    /// Legacy flat columns are never written.
    pub async fn save_profile(&self, user: &User) -> Result<()> {
        Self::save_profile_with(&mut *self.pool.acquire().await?, user).await
    }

    /// Same as [`UserRepository::save_profile`], inside a transaction.
    pub async fn save_profile_with(
        conn: &mut PgConnection,
        user: &User,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE users
                SET full_name = $1, job_title = $2, profile = $3, updated_at = NOW()
                WHERE id = $4"#,
        )
        .bind(&user.full_name)
        .bind(&user.job_title)
        .bind(Json(&user.profile))
        .bind(user.id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Replace password hash.
    pub async fn update_password(
        conn: &mut PgConnection,
        user_id: Uuid,
        hash: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(hash)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Lock and load a user inside a transaction.
    pub async fn lock(conn: &mut PgConnection, user_id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(ServerError::NotFound("User"))
    }
}
