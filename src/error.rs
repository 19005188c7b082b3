//! Error handler for HireWise.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::config::Environment;

pub type Result<T> = std::result::Result<T, ServerError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const UNIQUE_VIOLATION: &str = "23505";

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(true);

/// Decide once, at start, whether 500 responses carry error details.
pub fn set_environment(env: Environment) {
    EXPOSE_DETAILS.store(env.exposes_details(), Ordering::Relaxed);
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing form data")]
    ParsingForm(BoxError),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Upload(#[from] crate::upload::UploadError),

    #[error("{message}")]
    Conflict {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Please wait {remaining} seconds before requesting a new code.")]
    Cooldown { remaining: i64 },

    #[error("database is not available")]
    Unavailable,

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Mail(#[from] lapin::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<BoxError>,
    },
}

impl ServerError {
    /// Wrap any error as an internal one.
    pub fn internal<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Build a single-field validation error.
    pub fn field(
        field: &'static str,
        message: impl Into<std::borrow::Cow<'static, str>>,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(
            field,
            ValidationError::new("invalid").with_message(message.into()),
        );
        Self::Validation(errors)
    }
}

/// Structure for error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    success: bool,
    #[serde(skip)]
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `message` field.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.into();
        self
    }

    /// Point the error to a specific input.
    pub fn field(mut self, field: &str) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach extra data to the error.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add internal details, outside production.
    pub fn details(mut self, description: &str) -> Self {
        if EXPOSE_DETAILS.load(Ordering::Relaxed) {
            self.detail = Some(description.into());
        }
        self
    }

    /// Automatically add errors field, message becomes the first error.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        let errors = parse_validation_errors(errors);
        if let Some(first) = errors.first() {
            self.message = first.message.clone();
            self.field = Some(first.field.clone());
        }
        self.errors = Some(errors);
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            success: false,
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Internal server error.".to_owned(),
            field: None,
            errors: None,
            data: None,
            detail: None,
        }
    }
}

/// One invalid input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Wire name of a struct field: `full_name` becomes `fullName`.
fn camel_case(field: &str) -> String {
    let mut parts = field.split('_').filter(|part| !part.is_empty());
    let mut name = parts.next().unwrap_or_default().to_owned();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut errors: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            let field = camel_case(field);
            issues.iter().map(move |issue| FieldError {
                field: field.clone(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {field}.")),
            })
        })
        .collect();
    errors.sort_by(|a, b| a.field.cmp(&b.field));
    errors
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .message(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::ParsingForm(err) => response
                .message("Request body could not be parsed.")
                .details(&err.to_string()),

            ServerError::Json(err) => response
                .message("Invalid JSON body.")
                .details(&err.body_text()),

            ServerError::Query(err) => response
                .message("Invalid query string.")
                .details(&err.body_text()),

            ServerError::Multipart(err) => response
                .message("Invalid multipart body.")
                .status(err.status())
                .details(&err.body_text()),

            ServerError::Upload(err) => response.field(err.field()),

            ServerError::Conflict { field, .. } => response.field(field),

            ServerError::NotFound(_) => response.status(StatusCode::NOT_FOUND),

            ServerError::Unauthorized | ServerError::Token(_) => response
                .message("Missing, invalid or expired token.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden(_) => response.status(StatusCode::FORBIDDEN),

            ServerError::Cooldown { remaining } => response
                .status(StatusCode::TOO_MANY_REQUESTS)
                .data(serde_json::json!({ "resendCooldownSec": remaining })),

            ServerError::Unavailable => response
                .message("Service temporarily unavailable.")
                .status(StatusCode::SERVICE_UNAVAILABLE),

            ServerError::Sql(err)
                if err
                    .as_database_error()
                    .and_then(|e| e.code())
                    .is_some_and(|code| code == UNIQUE_VIOLATION) =>
            {
                response.message("Resource already exists.")
            },

            ServerError::Sql(SQLxError::RowNotFound) => response
                .message("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Sql(SQLxError::PoolTimedOut | SQLxError::PoolClosed) => {
                tracing::error!(error = %self, "database pool exhausted");
                response
                    .message("Service temporarily unavailable.")
                    .status(StatusCode::SERVICE_UNAVAILABLE)
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default().details(details)
            },

            ServerError::Sql(_)
            | ServerError::Crypto(_)
            | ServerError::Io(_)
            | ServerError::Mail(_)
            | ServerError::Serialization(_) => {
                tracing::error!(error = %self, "server returned 500 status");
                ResponseError::default().details(&self.to_string())
            },

            ServerError::BadRequest(_) => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "success": false,
                "message": "Internal server error.",
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_shape() {
        let response =
            ServerError::field("companyName", "Company name is required")
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Company name is required");
        assert_eq!(body["field"], "companyName");
        assert_eq!(body["errors"][0]["field"], "companyName");
    }

    #[tokio::test]
    async fn test_validation_fields_use_wire_names() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "full_name",
            ValidationError::new("length").with_message("Name is required".into()),
        );
        errors.add(
            "jobTitle",
            ValidationError::new("length").with_message("Too long".into()),
        );

        let body = body(ServerError::Validation(errors).into_response()).await;
        assert_eq!(body["errors"][0]["field"], "fullName");
        assert_eq!(body["errors"][1]["field"], "jobTitle");
        assert_eq!(body["field"], "fullName");

        assert_eq!(camel_case("company_name"), "companyName");
        assert_eq!(camel_case("email"), "email");
    }

    #[tokio::test]
    async fn test_conflict_carries_field() {
        let response = ServerError::Conflict {
            field: "companyName",
            message: "Company name is already registered".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body(response).await;
        assert_eq!(body["field"], "companyName");
        assert_eq!(body["message"], "Company name is already registered");
    }

    #[tokio::test]
    async fn test_status_codes() {
        assert_eq!(
            ServerError::NotFound("Notification").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Forbidden("Access denied").into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServerError::Unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Sql(SQLxError::RowNotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let response = ServerError::Sql(SQLxError::Protocol("boom".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body(response).await;
        assert_eq!(body["message"], "Internal server error.");
    }

    #[tokio::test]
    async fn test_cooldown_reports_remaining() {
        let response = ServerError::Cooldown { remaining: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body(response).await;
        assert_eq!(body["data"]["resendCooldownSec"], 42);
    }
}
