//! Resume upload and history.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use serde_json::json;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::AuthUser;
use crate::resume::{ParsedResume, Resume, ResumeRepository, ResumeSummary};
use crate::router::{Success, Valid, parse_id};
use crate::upload::{IncomingFile, UploadError, UploadKind};
use crate::user::ProfileView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/upload", post(upload))
        .route("/parsed-data", post(save_parsed_data))
        .route("/{id}", delete(delete_one))
}

fn repo(state: &AppState) -> ResumeRepository {
    ResumeRepository::new(state.db.postgres.clone())
}

/// Read the single `resume` part of a multipart body.
pub(crate) async fn single_resume(
    multipart: &mut Multipart,
) -> Result<Option<IncomingFile>> {
    let mut resume = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UploadKind::Resume.field_name()) {
            if resume.is_some() {
                return Err(ServerError::field(
                    "resume",
                    "Only one resume can be uploaded at a time.",
                ));
            }
            resume = Some(IncomingFile::from_field(field).await?);
        }
    }

    Ok(resume)
}

/// Store a resume file and make it the active one.
///
/// The file is removed again when the database rejects it.
async fn store_resume(
    state: &AppState,
    owner: uuid::Uuid,
    file: &IncomingFile,
) -> Result<Resume> {
    let stored = state.uploads.store(UploadKind::Resume, file).await?;

    match repo(state).replace_active(owner, &stored).await {
        Ok(resume) => Ok(resume),
        Err(err) => {
            state
                .uploads
                .remove(UploadKind::Resume, &stored.filename)
                .await;
            Err(err)
        },
    }
}

async fn upload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Success<ResumeSummary>> {
    let file = single_resume(&mut multipart)
        .await?
        .ok_or(UploadError::MissingFile(UploadKind::Resume))?;

    let resume = store_resume(&state, auth.id, &file).await?;
    metrics::counter!("resumes_uploaded_total").increment(1);

    Ok(Success::data(ResumeSummary::from(&resume))
        .message("Resume uploaded successfully")
        .status(StatusCode::CREATED))
}

async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Success<Vec<Resume>>> {
    Ok(Success::data(repo(&state).list(auth.id).await?))
}

async fn delete_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Success<serde_json::Value>> {
    let id = parse_id(&id, "id")?;
    let resumes = repo(&state);
    let resume = resumes.find_owned(id, auth.id).await?;

    let was_current = resumes.deactivate(&resume).await?;
    state
        .uploads
        .remove(UploadKind::Resume, &resume.filename)
        .await;

    Ok(Success::data(json!({ "id": id, "wasCurrent": was_current }))
        .message("Resume deleted successfully"))
}

async fn save_parsed_data(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Valid(parsed): Valid<ParsedResume>,
) -> Result<Success<serde_json::Value>> {
    let (resume, user) = repo(&state).save_parsed_data(auth.id, &parsed).await?;

    Ok(Success::data(json!({
        "resume": resume,
        "profile": ProfileView::from_user(&user),
    }))
    .message("Parsed resume data saved"))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};
    use uuid::Uuid;

    use crate::*;

    const APPLICANT: &str = "00000000-0000-0000-0000-0000000000b3";

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn token(state: &AppState) -> Option<String> {
        Some(state.token.create(APPLICANT).unwrap())
    }

    fn pdf(name: &str, size: usize) -> Part {
        Part::file("resume", name, "application/pdf", vec![b'%'; size])
    }

    async fn upload(state: &AppState, name: &str) -> Uuid {
        let response = make_multipart_request(
            app(state.clone()),
            Method::POST,
            "/api/resumes/upload",
            token(state),
            vec![pdf(name, 1024 * 1024)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json(response).await;
        assert_eq!(body["data"]["originalName"], name);
        Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap()
    }

    async fn pointer(state: &AppState) -> Option<Uuid> {
        let profile: serde_json::Value =
            sqlx::query_scalar("SELECT profile FROM users WHERE id = $1::uuid")
                .bind(APPLICANT)
                .fetch_one(&state.db.postgres)
                .await
                .unwrap();
        profile["currentResumeId"]
            .as_str()
            .map(|id| Uuid::parse_str(id).unwrap())
    }

    async fn active(state: &AppState) -> Vec<Uuid> {
        sqlx::query_scalar("SELECT id FROM resumes WHERE user_id = $1::uuid AND is_active")
            .bind(APPLICANT)
            .fetch_all(&state.db.postgres)
            .await
            .unwrap()
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_second_upload_replaces_first(pool: Pool<Postgres>) {
        let state = router::state(pool);

        let a = upload(&state, "a.pdf").await;
        assert_eq!(pointer(&state).await, Some(a));

        let b = upload(&state, "b.pdf").await;
        assert_eq!(pointer(&state).await, Some(b));
        assert_eq!(active(&state).await, vec![b]);
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_delete_keeps_pointer_unless_current(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let a = upload(&state, "a.pdf").await;
        let b = upload(&state, "b.pdf").await;
        let file_of = |id: Uuid| {
            let pool = state.db.postgres.clone();
            let uploads = state.uploads.clone();
            async move {
                let filename: String =
                    sqlx::query_scalar("SELECT filename FROM resumes WHERE id = $1")
                        .bind(id)
                        .fetch_one(&pool)
                        .await
                        .unwrap();
                uploads.path(upload::UploadKind::Resume, &filename)
            }
        };
        let (file_a, file_b) = (file_of(a).await, file_of(b).await);

        let response = make_request(
            app.clone(),
            Method::DELETE,
            &format!("/api/resumes/{a}"),
            token(&state),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["data"]["wasCurrent"], false);
        assert_eq!(pointer(&state).await, Some(b));
        assert!(!file_a.exists());
        assert!(file_b.exists());

        let response = make_request(
            app.clone(),
            Method::GET,
            "/api/profile/resume",
            token(&state),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/pdf"
        );

        let response = make_request(
            app.clone(),
            Method::DELETE,
            "/api/profile/resume",
            token(&state),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(pointer(&state).await, None);
        assert!(active(&state).await.is_empty());
        assert!(!file_b.exists());

        let response = make_request(
            app,
            Method::GET,
            "/api/profile/resume",
            token(&state),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_upload_rejections(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/api/resumes/upload",
            token(&state),
            vec![Part::text("note", "no file")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "resume");

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/api/resumes/upload",
            token(&state),
            vec![Part::file("resume", "cv.txt", "text/plain", b"hello".to_vec())],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_multipart_request(
            app,
            Method::POST,
            "/api/resumes/upload",
            token(&state),
            vec![pdf("big.pdf", config::DEFAULT_MAX_FILE_SIZE + 1)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(active(&state).await.is_empty());
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_parsed_data_merge(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/resumes/parsed-data",
            token(&state),
            json!({ "skills": ["Kotlin"] }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        upload(&state, "a.pdf").await;

        let response = make_request(
            app,
            Method::POST,
            "/api/resumes/parsed-data",
            token(&state),
            json!({ "name": "", "location": "Nantes", "skills": ["Kotlin"] }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["data"]["resume"]["version"], 2);
        assert_eq!(body["data"]["profile"]["fullName"], "Alice Martin");
        assert_eq!(body["data"]["profile"]["location"], "Nantes");
        assert_eq!(body["data"]["profile"]["skills"], json!(["Kotlin"]));
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_cannot_delete_foreign_resume(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let a = upload(&state, "a.pdf").await;

        let response = make_request(
            app(state.clone()),
            Method::DELETE,
            &format!("/api/resumes/{a}"),
            Some(state.token.create("00000000-0000-0000-0000-0000000000b2").unwrap()),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(active(&state).await, vec![a]);
    }
}
