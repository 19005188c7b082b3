//! Handle database requests.

use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::application::{Application, ApplicationStatus, Job, TimelineEntry};
use crate::error::{Result, ServerError};
use crate::notification::{
    NewNotification, NotificationRepository, NotificationType, Priority,
};
use crate::resume::ResumeRepository;
use crate::upload::StoredFile;
use crate::user::Role;

const WITH_JOB: &str = r#"SELECT a.*, j.title AS job_title, j.company_id
    FROM applications a JOIN jobs j ON j.id = a.job_id"#;

/// Resume attached to a new application.
#[derive(Debug, Clone, Copy)]
pub enum ResumeSource<'a> {
    /// Resume the applicant already has.
    Existing(Uuid),
    /// File stored for this submission. It becomes the active resume only
    /// if the application is saved.
    Upload(&'a StoredFile),
}

/// New application.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: Uuid,
    pub applicant_id: Uuid,
    pub applicant_name: String,
    pub cover_letter: Option<String>,
}

#[derive(Clone)]
pub struct ApplicationRepository {
    pool: Pool<Postgres>,
}

impl ApplicationRepository {
    /// Create a new [`ApplicationRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Find an open job.
    pub async fn open_job(&self, id: Uuid) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .filter(Job::is_open)
            .ok_or(ServerError::NotFound("Job"))
    }

    /// Find an application using `id` field.
    pub async fn find(&self, id: Uuid) -> Result<Application> {
        sqlx::query_as::<_, Application>(&format!("{WITH_JOB} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("Application"))
    }

    async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Application> {
        sqlx::query_as::<_, Application>(&format!(
            "{WITH_JOB} WHERE a.id = $1 FOR UPDATE OF a"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(ServerError::NotFound("Application"))
    }

    /// Create an application and tell the company HR team.
    ///
    /// An uploaded resume replaces the active one in the same transaction,
    /// so a refused application leaves the profile untouched.
    pub async fn submit(
        &self,
        job: &Job,
        submission: Submission,
        resume: ResumeSource<'_>,
    ) -> Result<Application> {
        let mut tx = self.pool.begin().await?;
        let resume_id = match resume {
            ResumeSource::Existing(id) => id,
            ResumeSource::Upload(file) => {
                ResumeRepository::replace_active_with(
                    &mut tx,
                    submission.applicant_id,
                    file,
                )
                .await?
                .id
            },
        };
        let timeline = vec![TimelineEntry::now(
            ApplicationStatus::Pending,
            submission.applicant_id,
            None,
        )];

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"INSERT INTO applications (id, job_id, applicant_id, resume_id, cover_letter, status, timeline)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (job_id, applicant_id) DO NOTHING
                RETURNING id"#,
        )
        .bind(Uuid::new_v4())
        .bind(job.id)
        .bind(submission.applicant_id)
        .bind(resume_id)
        .bind(&submission.cover_letter)
        .bind(ApplicationStatus::Pending.as_str())
        .bind(Json(&timeline))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = inserted else {
            return Err(ServerError::Conflict {
                field: "jobId",
                message: "You have already applied for this job".into(),
            });
        };

        let notification =
            NewNotification::to_company(job.company_id, Role::Hr, NotificationType::ApplicationSubmitted)
                .title("New application")
                .message(format!(
                    "{} applied for {}.",
                    submission.applicant_name, job.title
                ))
                .action_url(format!("/applications/{id}"))
                .entity("application", id);
        NotificationRepository::create(&mut *tx, &notification).await?;

        let application = Self::lock(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(application_id = %id, job_id = %job.id, "application submitted");

        Ok(application)
    }

    /// Applications of one applicant, newest first.
    pub async fn list_for_applicant(
        &self,
        applicant: Uuid,
        status: Option<ApplicationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Application>, i64)> {
        let status = status.map(|s| s.as_str());

        let items = sqlx::query_as::<_, Application>(&format!(
            r#"{WITH_JOB}
                WHERE a.applicant_id = $1 AND ($2::TEXT IS NULL OR a.status = $2)
                ORDER BY a.created_at DESC LIMIT $3 OFFSET $4"#
        ))
        .bind(applicant)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM applications
                WHERE applicant_id = $1 AND ($2::TEXT IS NULL OR status = $2)"#,
        )
        .bind(applicant)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((items, total))
    }

    /// Withdraw an application owned by `applicant`.
    pub async fn withdraw(&self, id: Uuid, applicant: Uuid) -> Result<Application> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock(&mut tx, id).await?;
        if current.applicant_id != applicant {
            return Err(ServerError::NotFound("Application"));
        }

        let next = current.status.withdraw()?;
        let entry = TimelineEntry::now(next, applicant, None);
        Self::push_status(&mut tx, id, &entry).await?;

        if let Some(company_id) = current.company_id {
            let notification = NewNotification::to_company(
                company_id,
                Role::Hr,
                NotificationType::ApplicationWithdrawn,
            )
            .title("Application withdrawn")
            .message(format!(
                "An applicant withdrew from {}.",
                current.job_title.as_deref().unwrap_or("a job")
            ))
            .action_url(format!("/applications/{id}"))
            .entity("application", id)
            .priority(Priority::Low);
            NotificationRepository::create(&mut *tx, &notification).await?;
        }

        let application = Self::lock(&mut tx, id).await?;
        tx.commit().await?;

        Ok(application)
    }

    /// Move an application to `status` on behalf of its company.
    pub async fn change_status(
        &self,
        id: Uuid,
        company_id: Uuid,
        actor: Uuid,
        status: ApplicationStatus,
        note: Option<String>,
    ) -> Result<Application> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock(&mut tx, id).await?;
        if current.company_id != Some(company_id) {
            return Err(ServerError::Forbidden(
                "Application belongs to another company.",
            ));
        }

        let next = current.status.review(status)?;
        let entry = TimelineEntry::now(next, actor, note);
        Self::push_status(&mut tx, id, &entry).await?;

        let (kind, priority) = match next {
            ApplicationStatus::Interview => {
                (NotificationType::InterviewScheduled, Priority::High)
            },
            ApplicationStatus::Offered | ApplicationStatus::Hired => {
                (NotificationType::ApplicationStatusChanged, Priority::High)
            },
            _ => (NotificationType::ApplicationStatusChanged, Priority::Medium),
        };
        let notification = NewNotification::to_user(current.applicant_id, kind)
            .title("Application update")
            .message(format!(
                "Your application for {} is now {next}.",
                current.job_title.as_deref().unwrap_or("a job")
            ))
            .action_url(format!("/applications/{id}"))
            .entity("application", id)
            .priority(priority);
        NotificationRepository::create(&mut *tx, &notification).await?;

        let application = Self::lock(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(application_id = %id, status = %next, "application status changed");

        Ok(application)
    }

    async fn push_status(
        conn: &mut PgConnection,
        id: Uuid,
        entry: &TimelineEntry,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE applications
                SET status = $1, timeline = timeline || $2, updated_at = NOW()
                WHERE id = $3"#,
        )
        .bind(entry.status.as_str())
        .bind(Json([entry]))
        .bind(id)
        .execute(conn)
        .await?;

        Ok(())
    }
}
