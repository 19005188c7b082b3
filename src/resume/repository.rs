//! Handle database requests.

use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::resume::{ParsedResume, ProcessingStatus, Resume, ResumeSummary};
use crate::upload::StoredFile;
use crate::user::{User, UserRepository};

#[derive(Clone)]
pub struct ResumeRepository {
    pool: Pool<Postgres>,
}

impl ResumeRepository {
    /// Create a new [`ResumeRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Make `file` the only active resume of `owner`.
    pub async fn replace_active(
        &self,
        owner: Uuid,
        file: &StoredFile,
    ) -> Result<Resume> {
        let mut tx = self.pool.begin().await?;
        let resume = Self::replace_active_with(&mut tx, owner, file).await?;
        tx.commit().await?;

        Ok(resume)
    }

    /// Same as [`ResumeRepository::replace_active`], inside a transaction.
    ///
    /// The owner row is locked until the transaction ends so two uploads
    /// from the same user are serialized.
    pub async fn replace_active_with(
        conn: &mut PgConnection,
        owner: Uuid,
        file: &StoredFile,
    ) -> Result<Resume> {
        let mut user = UserRepository::lock(&mut *conn, owner).await?;

        let deactivated = sqlx::query(
            r#"UPDATE resumes SET is_active = FALSE, updated_at = NOW()
                WHERE user_id = $1 AND is_active"#,
        )
        .bind(owner)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let resume = sqlx::query_as::<_, Resume>(
            r#"INSERT INTO resumes (id, user_id, filename, original_name, url, size, mime_type, processing_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&file.filename)
        .bind(&file.original_name)
        .bind(&file.url)
        .bind(file.size as i64)
        .bind(file.mime_type)
        .bind(ProcessingStatus::Completed.as_str())
        .fetch_one(&mut *conn)
        .await?;

        user.profile.current_resume_id = Some(resume.id);
        user.profile.resume = Some(ResumeSummary::from(&resume));
        UserRepository::save_profile_with(&mut *conn, &user).await?;

        tracing::info!(
            user_id = %owner,
            resume_id = %resume.id,
            deactivated,
            "resume uploaded"
        );

        Ok(resume)
    }

    /// Store parsed data on the latest resume and merge it onto the profile.
    pub async fn save_parsed_data(
        &self,
        owner: Uuid,
        parsed: &ParsedResume,
    ) -> Result<(Resume, User)> {
        let mut tx = self.pool.begin().await?;
        let mut user = UserRepository::lock(&mut tx, owner).await?;

        // An existing row always bumps its version.
        let resume = sqlx::query_as::<_, Resume>(
            r#"UPDATE resumes
                SET parsed_data = $1, version = version + 1, updated_at = NOW()
                WHERE id = (
                    SELECT id FROM resumes WHERE user_id = $2
                    ORDER BY uploaded_at DESC LIMIT 1
                )
                RETURNING *"#,
        )
        .bind(Json(parsed))
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServerError::NotFound("Resume"))?;

        user.merge_parsed(parsed);
        UserRepository::save_profile_with(&mut tx, &user).await?;

        tx.commit().await?;

        tracing::debug!(resume_id = %resume.id, version = resume.version, "parsed data saved");

        Ok((resume, user))
    }

    /// Find a resume owned by `owner`.
    pub async fn find_owned(&self, id: Uuid, owner: Uuid) -> Result<Resume> {
        sqlx::query_as::<_, Resume>(
            "SELECT * FROM resumes WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("Resume"))
    }

    /// Active resume pointed by the owner profile.
    pub async fn current(&self, owner: &User) -> Result<Resume> {
        let id = owner
            .profile
            .current_resume_id
            .ok_or(ServerError::NotFound("Resume"))?;

        let resume = self.find_owned(id, owner.id).await?;
        if !resume.is_active {
            return Err(ServerError::NotFound("Resume"));
        }
        Ok(resume)
    }

    /// Every resume of `owner`, newest first.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<Resume>> {
        let resumes = sqlx::query_as::<_, Resume>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(resumes)
    }

    /// Deactivate a resume. The owner pointer is cleared only when it
    /// targets this resume.
    ///
    /// Returns whether the pointer was cleared.
    pub async fn deactivate(&self, resume: &Resume) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut user = UserRepository::lock(&mut tx, resume.user_id).await?;

        sqlx::query(
            "UPDATE resumes SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(resume.id)
        .execute(&mut *tx)
        .await?;

        let was_current = user.profile.current_resume_id == Some(resume.id);
        if was_current {
            user.profile.current_resume_id = None;
            user.profile.resume = None;
            UserRepository::save_profile_with(&mut tx, &user).await?;
        }

        tx.commit().await?;

        Ok(was_current)
    }
}
