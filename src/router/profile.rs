//! Applicant and admin profiles.

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::company::{CompanyRepository, CompanySummary};
use crate::error::{Result, ServerError};
use crate::middleware::AuthUser;
use crate::resume::ResumeRepository;
use crate::router::{Success, Valid};
use crate::upload::{IncomingFile, UploadError, UploadKind};
use crate::user::{Avatar, ProfileUpdate, ProfileView, Role, User, UserRepository};

/// Avatar sent as JSON.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AvatarBody {
    #[validate(length(min = 1, message = "Please provide an avatar."))]
    avatar: String,
}

/// Routes under `/api/profile`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).put(update_profile))
        .route("/resume", get(current_resume).delete(delete_current_resume))
}

/// Routes under `/api/admin/profile`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_admin_profile).put(update_admin_profile))
        .route("/avatar", post(upload_avatar))
}

async fn get_profile(
    Extension(user): Extension<User>,
) -> Result<Success<ProfileView>> {
    Ok(Success::data(ProfileView::from_user(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<ProfileUpdate>,
) -> Result<Success<ProfileView>> {
    body.apply(&mut user)?;
    UserRepository::new(state.db.postgres.clone())
        .save_profile(&user)
        .await?;

    Ok(Success::data(ProfileView::from_user(&user))
        .message("Profile updated successfully"))
}

/// Send the current resume file.
async fn current_resume(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Response> {
    let resume = ResumeRepository::new(state.db.postgres.clone())
        .current(&user)
        .await?;

    let path = state.uploads.path(UploadKind::Resume, &resume.filename);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(resume_id = %resume.id, "resume file missing on disk");
            return Err(ServerError::NotFound("Resume file"));
        },
        Err(err) => return Err(err.into()),
    };

    Response::builder()
        .header(header::CONTENT_TYPE, &resume.mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "inline; filename=\"{}\"",
                resume.original_name.replace('"', "")
            ),
        )
        .body(Body::from(data))
        .map_err(|err| ServerError::internal("cannot build resume response", err))
}

async fn delete_current_resume(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Success<()>> {
    let resumes = ResumeRepository::new(state.db.postgres.clone());
    let resume = resumes.current(&user).await?;

    resumes.deactivate(&resume).await?;
    state
        .uploads
        .remove(UploadKind::Resume, &resume.filename)
        .await;

    Ok(Success::empty("Resume deleted successfully"))
}

async fn company_of(state: &AppState, user: &User) -> Result<Option<CompanySummary>> {
    let Some(id) = user.company_ref() else {
        return Ok(None);
    };

    match CompanyRepository::new(state.db.postgres.clone())
        .find_by_id(id)
        .await
    {
        Ok(company) => Ok(Some(company.into())),
        Err(ServerError::NotFound(_)) => {
            tracing::warn!(user_id = %user.id, company_id = %id, "stale company reference");
            Ok(None)
        },
        Err(err) => Err(err),
    }
}

async fn admin_view(state: &AppState, user: &User) -> Result<ProfileView> {
    Ok(ProfileView::from_user(user).with_company(company_of(state, user).await?))
}

async fn get_admin_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(user): Extension<User>,
) -> Result<Success<ProfileView>> {
    auth.require(&[Role::Admin, Role::Hr])?;
    Ok(Success::data(admin_view(&state, &user).await?))
}

async fn update_admin_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<ProfileUpdate>,
) -> Result<Success<ProfileView>> {
    auth.require(&[Role::Admin, Role::Hr])?;

    body.apply(&mut user)?;
    UserRepository::new(state.db.postgres.clone())
        .save_profile(&user)
        .await?;

    Ok(Success::data(admin_view(&state, &user).await?)
        .message("Profile updated successfully"))
}

/// Turn an uploaded picture into an inline avatar.
///
/// The file is only kept, and referenced by name, when it cannot be read back.
async fn avatar_from_file(state: &AppState, file: &IncomingFile) -> Result<Avatar> {
    let stored = state.uploads.store(UploadKind::ProfilePicture, file).await?;

    match tokio::fs::read(&stored.path).await {
        Ok(bytes) => {
            let avatar = Avatar::from_bytes(stored.mime_type, &bytes);
            state
                .uploads
                .remove(UploadKind::ProfilePicture, &stored.filename)
                .await;
            Ok(avatar?)
        },
        Err(err) => {
            tracing::warn!(error = %err, filename = %stored.filename, "avatar kept on disk");
            Ok(Avatar::Path {
                path: stored.filename,
            })
        },
    }
}

async fn read_avatar(state: &AppState, req: Request) -> Result<Avatar> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;

        while let Some(field) = multipart.next_field().await? {
            if field.name() == Some(UploadKind::ProfilePicture.field_name()) {
                let file = IncomingFile::from_field(field).await?;
                return avatar_from_file(state, &file).await;
            }
        }
        return Err(UploadError::MissingFile(UploadKind::ProfilePicture).into());
    }

    let Valid(body) = Valid::<AvatarBody>::from_request(req, state).await?;
    Ok(Avatar::from_data_uri(&body.avatar)?)
}

async fn upload_avatar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(mut user): Extension<User>,
    req: Request,
) -> Result<Success<ProfileView>> {
    auth.require(&[Role::Admin, Role::Hr])?;

    let avatar = read_avatar(&state, req).await?;
    user.profile.avatar = Some(avatar);
    UserRepository::new(state.db.postgres.clone())
        .save_profile(&user)
        .await?;

    tracing::debug!(user_id = %user.id, "avatar updated");

    Ok(Success::data(admin_view(&state, &user).await?)
        .message("Avatar updated successfully"))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::*;

    const ADMIN: &str = "00000000-0000-0000-0000-0000000000b1";
    const HR: &str = "00000000-0000-0000-0000-0000000000b2";
    const APPLICANT: &str = "00000000-0000-0000-0000-0000000000b3";
    const COMPANY: &str = "00000000-0000-0000-0000-0000000000c1";

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn token(state: &AppState, id: &str) -> Option<String> {
        Some(state.token.create(id).unwrap())
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_legacy_profile_is_merged(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            app,
            Method::GET,
            "/api/profile",
            token(&state, APPLICANT),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["data"]["location"], "Lyon");
        assert_eq!(body["data"]["skills"], json!(["Rust", "SQL"]));
        assert_eq!(body["data"]["education"][0]["degree"], "B.Tech in CS");
        assert_eq!(body["data"]["experience"][0]["title"], "Developer");
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_update_writes_nested_shape(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::PUT,
            "/api/profile",
            token(&state, APPLICANT),
            json!({
                "headline": "Backend engineer",
                "skills": ["Rust", " rust ", "Go"],
                "education": [{ "degree": "M.Sc in Computer Science", "institution": "INSA", "year": "2020" }],
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["data"]["skills"], json!(["Rust", "Go"]));
        assert_eq!(body["data"]["education"][0]["degree"], "M.Sc in Computer Science");

        let (profile, legacy): (serde_json::Value, serde_json::Value) = sqlx::query_as(
            "SELECT profile, skills FROM users WHERE id = $1::uuid",
        )
        .bind(APPLICANT)
        .fetch_one(&state.db.postgres)
        .await
        .unwrap();
        assert_eq!(profile["educationEntries"][0]["qualification"], "M.Sc");
        assert_eq!(profile["educationEntries"][0]["fieldOfStudy"], "Computer Science");
        assert_eq!(legacy, json!(["Rust", "SQL"]));

        let response = make_request(
            app,
            Method::PUT,
            "/api/profile",
            token(&state, APPLICANT),
            json!({ "fullName": "Jo" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "fullName");
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_admin_profile(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::GET,
            "/api/admin/profile",
            token(&state, HR),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["data"]["companyId"], COMPANY);
        assert_eq!(body["data"]["company"]["name"], "Acme Corp");

        let response = make_request(
            app,
            Method::GET,
            "/api/admin/profile",
            token(&state, APPLICANT),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_avatar_json(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG"));

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/admin/profile/avatar",
            token(&state, ADMIN),
            json!({ "avatar": uri }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["data"]["avatar"], uri);

        let response = make_request(
            app,
            Method::POST,
            "/api/admin/profile/avatar",
            token(&state, ADMIN),
            json!({ "avatar": "data:text/plain;base64,aGVsbG8=" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "avatar");
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_avatar_multipart(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_multipart_request(
            app,
            Method::POST,
            "/api/admin/profile/avatar",
            token(&state, ADMIN),
            vec![Part::file("avatar", "me.png", "image/png", b"\x89PNG".to_vec())],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let avatar = body["data"]["avatar"].as_str().unwrap();
        assert!(avatar.starts_with("data:image/png;base64,"));

        // The temporary file is gone.
        let folder = state.uploads.root().join("profile-pictures");
        assert_eq!(std::fs::read_dir(folder).unwrap().count(), 0);
    }
}
