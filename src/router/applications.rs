//! Job applications.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::application::{
    Application, ApplicationRepository, ApplicationStatus, ResumeSource,
    Submission,
};
use crate::error::{Result, ServerError};
use crate::middleware::AuthUser;
use crate::resume::ResumeRepository;
use crate::router::{PageQuery, Paginated, Pagination, Success, Valid, ValidQuery, parse_id};
use crate::upload::{IncomingFile, UploadKind};
use crate::user::{Role, User};

const MAX_COVER_LETTER_LENGTH: usize = 5000;

/// Status filter read next to [`PageQuery`].
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StatusQuery {
    status: Option<ApplicationStatus>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StatusChange {
    status: ApplicationStatus,
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters long."))]
    note: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit))
        .route("/my-applications", get(my_applications))
        .route("/{id}", get(get_one))
        .route("/{id}/withdraw", put(withdraw))
        .route("/{id}/status", put(change_status))
}

fn repo(state: &AppState) -> ApplicationRepository {
    ApplicationRepository::new(state.db.postgres.clone())
}

#[derive(Debug, Default)]
struct SubmissionForm {
    job_id: Option<String>,
    cover_letter: Option<String>,
    resume: Option<IncomingFile>,
}

async fn read_submission(mut multipart: Multipart) -> Result<SubmissionForm> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "jobId" => form.job_id = Some(field.text().await?),
            "coverLetter" => form.cover_letter = Some(field.text().await?),
            name if name == UploadKind::Resume.field_name() => {
                if form.resume.is_some() {
                    return Err(ServerError::field(
                        "resume",
                        "Only one resume can be uploaded at a time.",
                    ));
                }
                form.resume = Some(IncomingFile::from_field(field).await?);
            },
            _ => {},
        }
    }

    Ok(form)
}

async fn submit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<Success<Application>> {
    auth.require(&[Role::Applicant])?;

    let form = read_submission(multipart).await?;
    let job_id = match form.job_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => parse_id(id, "jobId")?,
        _ => return Err(ServerError::field("jobId", "Job is required")),
    };
    let cover_letter = form
        .cover_letter
        .map(|letter| letter.trim().to_owned())
        .filter(|letter| !letter.is_empty());
    if cover_letter
        .as_ref()
        .is_some_and(|letter| letter.chars().count() > MAX_COVER_LETTER_LENGTH)
    {
        return Err(ServerError::field(
            "coverLetter",
            "Cover letter must be at most 5000 characters long.",
        ));
    }

    let applications = repo(&state);
    let job = applications.open_job(job_id).await?;

    let submission = Submission {
        job_id: job.id,
        applicant_id: user.id,
        applicant_name: user.full_name.clone(),
        cover_letter,
    };

    let application = match &form.resume {
        Some(file) => {
            let stored = state.uploads.store(UploadKind::Resume, file).await?;
            let submitted = applications
                .submit(&job, submission, ResumeSource::Upload(&stored))
                .await;
            if submitted.is_err() {
                state
                    .uploads
                    .remove(UploadKind::Resume, &stored.filename)
                    .await;
            }
            submitted?
        },
        None => {
            let resume = match ResumeRepository::new(state.db.postgres.clone())
                .current(&user)
                .await
            {
                Ok(resume) => resume,
                Err(ServerError::NotFound(_)) => {
                    return Err(ServerError::field(
                        "resume",
                        "Please upload a resume before applying.",
                    ));
                },
                Err(err) => return Err(err),
            };
            applications
                .submit(&job, submission, ResumeSource::Existing(resume.id))
                .await?
        },
    };
    metrics::counter!("applications_submitted_total").increment(1);

    Ok(Success::data(application)
        .message("Application submitted successfully")
        .status(StatusCode::CREATED))
}

async fn my_applications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ValidQuery(page): ValidQuery<PageQuery>,
    ValidQuery(filter): ValidQuery<StatusQuery>,
) -> Result<Success<Paginated<Application>>> {
    let (items, total) = repo(&state)
        .list_for_applicant(
            auth.id,
            filter.status,
            i64::from(page.limit()),
            page.offset(),
        )
        .await?;

    Ok(Success::data(Paginated {
        items,
        pagination: Pagination::new(&page, total),
    }))
}

/// Whether `auth` may read `application`.
fn can_read(auth: &AuthUser, application: &Application) -> bool {
    application.applicant_id == auth.id
        || (auth.role.is_employer()
            && auth.company_id.is_some()
            && auth.company_id == application.company_id)
}

async fn get_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Success<Application>> {
    let id = parse_id(&id, "id")?;
    let application = repo(&state).find(id).await?;

    // Others get the same answer as for a missing application.
    if !can_read(&auth, &application) {
        return Err(ServerError::NotFound("Application"));
    }

    Ok(Success::data(application))
}

async fn withdraw(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Success<Application>> {
    auth.require(&[Role::Applicant])?;
    let id: Uuid = parse_id(&id, "id")?;

    let application = repo(&state).withdraw(id, auth.id).await?;
    Ok(Success::data(application).message("Application withdrawn"))
}

async fn change_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Valid(body): Valid<StatusChange>,
) -> Result<Success<Application>> {
    let company_id = auth.employer()?;
    let id = parse_id(&id, "id")?;

    let application = repo(&state)
        .change_status(id, company_id, auth.id, body.status, body.note)
        .await?;
    Ok(Success::data(application).message("Application status updated"))
}
