//! Login, company onboarding and password reset.

use axum::Router;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::company::{Company, CompanyRepository};
use crate::error::{Result, ServerError};
use crate::mail::Template;
use crate::registration::{self, CompanyForm};
use crate::reset::PasswordReset;
use crate::router::{Success, Valid};
use crate::upload::{IncomingFile, UploadKind};
use crate::user::{ProfileView, Role, User, UserRepository};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Login {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckName {
    #[validate(length(min = 1, max = 100, message = "Company name is required"))]
    company_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[serde(default)]
    resend: bool,
    code: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub token: String,
    pub company_id: Uuid,
    pub user_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/company/check-name", post(check_name))
        .route("/company/register", post(register))
        .route("/reset-password", post(reset_password))
}

/// Handler to log a user in.
async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<Login>,
) -> Result<Success<serde_json::Value>> {
    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_email(&body.email)
        .await?;

    // Same answer for unknown emails and wrong passwords.
    let Some(user) = user else {
        return Err(ServerError::field("password", "Invalid email or password."));
    };
    state.crypto.pwd.verify_password(&body.password, &user.password)?;

    let token = state.token.create(&user.id.to_string())?;
    tracing::info!(user_id = %user.id, role = %user.role, "user logged in");

    Ok(Success::data(json!({
        "token": token,
        "user": ProfileView::from_user(&user),
    }))
    .message("Login successful"))
}

/// Handler telling whether a company name is free.
async fn check_name(
    State(state): State<AppState>,
    Valid(body): Valid<CheckName>,
) -> Result<Success<()>> {
    if CompanyRepository::new(state.db.postgres.clone())
        .name_taken(&body.company_name)
        .await?
    {
        return Err(name_taken());
    }

    Ok(Success::empty("Company name is available"))
}

fn name_taken() -> ServerError {
    ServerError::Conflict {
        field: "companyName",
        message: "Company name is already registered".into(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

async fn read_registration(
    mut multipart: Multipart,
) -> Result<(CompanyForm, Option<IncomingFile>)> {
    let mut form = CompanyForm::default();
    let mut logo = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();

        if name == UploadKind::CompanyLogo.field_name() {
            if logo.is_some() {
                return Err(ServerError::field("logo", "Only one logo can be uploaded."));
            }
            logo = Some(IncomingFile::from_field(field).await?);
        } else {
            let value = field.text().await?;
            if !form.set(&name, value) {
                tracing::trace!(field = name, "ignored registration field");
            }
        }
    }

    Ok((form, logo))
}

/// Handler to register a company and its first administrator.
async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Success<Registered>> {
    let (form, logo) = read_registration(multipart).await?;

    let issues = registration::check_all(&form);
    if !issues.is_empty() {
        return Err(registration::into_validation(&issues).into());
    }

    let companies = CompanyRepository::new(state.db.postgres.clone());
    let users = UserRepository::new(state.db.postgres.clone());
    if companies.name_taken(&form.company_name).await? {
        return Err(name_taken());
    }
    if users.email_exists(&form.admin_email).await? {
        return Err(ServerError::Conflict {
            field: "adminEmail",
            message: "An account with this email already exists".into(),
        });
    }

    let logo = match &logo {
        Some(file) => {
            Some(state.uploads.store(UploadKind::CompanyLogo, file).await?)
        },
        None => None,
    };

    let company = Company {
        id: Uuid::new_v4(),
        name: form.company_name.trim().to_owned(),
        email: form.company_email.trim().to_lowercase(),
        phone: form.company_phone.trim().to_owned(),
        website: non_empty(&form.website),
        industry: form.industry.trim().to_owned(),
        size: form.company_size.trim().to_owned(),
        address: non_empty(&form.address),
        city: non_empty(&form.city),
        country: non_empty(&form.country),
        description: non_empty(&form.description),
        logo: logo.as_ref().map(|file| file.filename.clone()),
        created_at: chrono::Utc::now(),
    };
    let admin = User {
        id: Uuid::new_v4(),
        email: form.admin_email.trim().to_lowercase(),
        password: state.crypto.pwd.hash_password(&form.admin_password)?,
        full_name: form.admin_name.trim().to_owned(),
        role: Role::Admin,
        phone: non_empty(&form.admin_phone),
        job_title: non_empty(&form.job_title),
        company: Some(company.id),
        company_id: Some(company.id),
        ..Default::default()
    };

    let created = async {
        let mut tx = state.db.postgres.begin().await?;
        CompanyRepository::insert(&mut tx, &company).await?;
        UserRepository::insert(&mut tx, &admin).await?;
        tx.commit().await?;
        Ok::<_, ServerError>(())
    }
    .await;

    if let Err(err) = created {
        if let Some(file) = &logo {
            state
                .uploads
                .remove(UploadKind::CompanyLogo, &file.filename)
                .await;
        }
        return Err(err);
    }

    tracing::info!(company_id = %company.id, user_id = %admin.id, "company registered");

    if let Err(err) = state
        .mail
        .publish_event(
            Template::CompanyWelcome {
                company: company.name.clone(),
            },
            &admin.email,
            &admin.full_name,
        )
        .await
    {
        tracing::error!(error = %err, company_id = %company.id, "welcome mail not sent");
    }

    Ok(Success::data(Registered {
        token: state.token.create(&admin.id.to_string())?,
        company_id: company.id,
        user_id: admin.id,
    })
    .message("Company registered successfully")
    .status(StatusCode::CREATED))
}

/// Handler to request, resend or confirm a reset code.
async fn reset_password(
    State(state): State<AppState>,
    Valid(body): Valid<ResetRequest>,
) -> Result<Success<serde_json::Value>> {
    let resets = PasswordReset::new(state.db.postgres.clone());

    if body.code.is_some() || body.new_password.is_some() {
        resets
            .confirm(
                &state.crypto,
                &body.email,
                body.code.as_deref().unwrap_or_default(),
                body.new_password.as_deref().unwrap_or_default(),
            )
            .await?;

        return Ok(Success::data(json!({}))
            .message("Password has been reset successfully"));
    }

    let cooldown = resets.issue(&state.crypto, &state.mail, &body.email).await?;
    let message = if body.resend {
        "A new code has been sent if an account exists for this email"
    } else {
        "A reset code has been sent if an account exists for this email"
    };

    Ok(Success::data(json!({ "resendCooldownSec": cooldown })).message(message))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::*;

    const ADMIN_EMAIL: &str = "admin@acme.io";

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn set_password(state: &AppState, email: &str, password: &str) {
        let hash = state.crypto.pwd.hash_password(password).unwrap();
        sqlx::query("UPDATE users SET password = $1 WHERE email = $2")
            .bind(hash)
            .bind(email)
            .execute(&state.db.postgres)
            .await
            .unwrap();
    }

    fn registration(name: &str, email: &str) -> Vec<Part> {
        [
            ("companyName", name),
            ("companyEmail", "contact@globex.io"),
            ("companyPhone", "+33 6 12 34 56 78"),
            ("industry", "Manufacturing"),
            ("companySize", "51-200"),
            ("country", "France"),
            ("adminName", "Hank Scorpio"),
            ("adminEmail", email),
            ("adminPassword", "Abc123"),
        ]
        .into_iter()
        .map(|(name, value)| Part::text(name, value))
        .collect()
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_login(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());
        set_password(&state, ADMIN_EMAIL, "Abc123").await;

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "Admin@Acme.io", "password": "Abc123" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let token = body["data"]["token"].as_str().unwrap();
        let claims = state.token.decode(token).unwrap();
        assert_eq!(body["data"]["user"]["id"], claims.sub);
        assert_eq!(body["data"]["user"]["role"], "admin");

        let response = make_request(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "Wrong1" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["message"], "Invalid email or password.");
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql"))]
    async fn test_check_name(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/company/check-name",
            None,
            json!({ "companyName": "ACME CORP" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "companyName");

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/company/check-name",
            None,
            json!({ "companyName": "" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["field"], "companyName");
        assert_eq!(body["message"], "Company name is required");

        let response = make_request(
            app,
            Method::POST,
            "/api/auth/company/check-name",
            None,
            json!({ "companyName": "Globex" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_register_company(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let mut parts = registration("Globex", "hank@globex.io");
        parts.push(Part::file("logo", "logo.png", "image/png", vec![0x89, b'P', b'N', b'G']));

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/api/auth/company/register",
            None,
            parts,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json(response).await;
        let user_id = body["data"]["userId"].as_str().unwrap();
        let company_id = body["data"]["companyId"].as_str().unwrap();
        let claims = state.token.decode(body["data"]["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.sub, user_id);

        let (role, company, legacy): (String, uuid::Uuid, uuid::Uuid) = sqlx::query_as(
            "SELECT role, company_id, company FROM users WHERE id = $1::uuid",
        )
        .bind(user_id)
        .fetch_one(&state.db.postgres)
        .await
        .unwrap();
        assert_eq!(role, "admin");
        assert_eq!(company.to_string(), company_id);
        assert_eq!(legacy, company);

        let logo: Option<String> =
            sqlx::query_scalar("SELECT logo FROM companies WHERE id = $1::uuid")
                .bind(company_id)
                .fetch_one(&state.db.postgres)
                .await
                .unwrap();
        let logo = logo.unwrap();
        assert!(state.uploads.path(upload::UploadKind::CompanyLogo, &logo).exists());

        // Same name, other casing.
        let response = make_multipart_request(
            app,
            Method::POST,
            "/api/auth/company/register",
            None,
            registration("GLOBEX", "other@globex.io"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "companyName");
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_register_rejections(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_multipart_request(
            app.clone(),
            Method::POST,
            "/api/auth/company/register",
            None,
            registration("Globex", ADMIN_EMAIL),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["field"], "adminEmail");

        let mut parts = registration("Globex", "hank@globex.io");
        parts.retain(|part| part.name() != "adminPassword");
        parts.push(Part::text("adminPassword", "abc123"));
        let response = make_multipart_request(
            app,
            Method::POST,
            "/api/auth/company/register",
            None,
            parts,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["field"], "adminPassword");
        assert!(body["message"].as_str().unwrap().contains("uppercase"));

        let companies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .fetch_one(&state.db.postgres)
            .await
            .unwrap();
        assert_eq!(companies, 2);
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_reset_password(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": ADMIN_EMAIL }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["data"]["resendCooldownSec"], 60);

        // Resend inside the cooldown.
        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": ADMIN_EMAIL, "resend": true }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let remaining = json(response).await["data"]["resendCooldownSec"]
            .as_i64()
            .unwrap();
        assert!((1..=60).contains(&remaining));

        // Replace the emailed code with a known one.
        let digest = state.crypto.hasher.digest(format!("{ADMIN_EMAIL}:123456"));
        sqlx::query("UPDATE password_resets SET code_hash = $1 WHERE email = $2")
            .bind(digest)
            .bind(ADMIN_EMAIL)
            .execute(&state.db.postgres)
            .await
            .unwrap();

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": ADMIN_EMAIL, "code": "12345", "newPassword": "Xyz789" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["message"], "Please enter the 6-digit code");

        let response = make_request(
            app.clone(),
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": ADMIN_EMAIL, "code": "123456", "newPassword": "Xyz789" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "Xyz789" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn request_code(app: axum::Router, email: &str) -> StatusCode {
        make_request(
            app,
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": email }).to_string(),
        )
        .await
        .status()
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_reset_cooldown_ignores_account_existence(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let mut statuses = Vec::new();
        for email in [ADMIN_EMAIL, "nobody@nowhere.io"] {
            let first = request_code(app.clone(), email).await;
            let second = request_code(app.clone(), email).await;
            statuses.push((first, second));
        }
        assert_eq!(statuses[0], (StatusCode::OK, StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(statuses[0], statuses[1]);

        let digest: Option<String> = sqlx::query_scalar(
            "SELECT code_hash FROM password_resets WHERE email = 'nobody@nowhere.io'",
        )
        .fetch_one(&state.db.postgres)
        .await
        .unwrap();
        assert!(digest.is_none());
    }

    #[sqlx::test(fixtures("../../fixtures/companies.sql", "../../fixtures/users.sql"))]
    async fn test_reset_mail_failure_starts_no_cooldown(pool: Pool<Postgres>) {
        let mut state = router::state(pool);
        state.mail = mail::MailManager::unreachable();

        let status = request_code(app(state.clone()), ADMIN_EMAIL).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_resets")
            .fetch_one(&state.db.postgres)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        state.mail = mail::MailManager::default();
        let status = request_code(app(state), ADMIN_EMAIL).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test]
    async fn test_reset_unknown_email(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response = make_request(
            app,
            Method::POST,
            "/api/auth/reset-password",
            None,
            json!({ "email": "nobody@nowhere.io" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["data"]["resendCooldownSec"], 60);
    }
}
