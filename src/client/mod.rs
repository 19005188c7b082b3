//! Client side of the signup and password reset flows.
//!
//! Wizards talk to the API through [`ApiClient`]; [`HttpClient`] is the
//! `reqwest` implementation used against a running server.

pub mod reset;
pub mod signup;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Base URL used when `HIREWISE_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        field: Option<String>,
        errors: Vec<FieldError>,
        data: Option<serde_json::Value>,
    },
}

impl ClientError {
    /// Whether the server was never reached.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Every field blamed by the server.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            ClientError::Network(_) => Vec::new(),
            ClientError::Api {
                message,
                field,
                errors,
                ..
            } => {
                let mut all = errors.clone();
                if let Some(field) = field {
                    if !all.iter().any(|e| &e.field == field) {
                        all.push(FieldError {
                            field: field.clone(),
                            message: message.clone(),
                        });
                    }
                }
                all
            },
        }
    }
}

/// Error attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Response envelope shared by every route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub success: bool,
    pub message: Option<String>,
    pub field: Option<String>,
    pub errors: Vec<FieldError>,
    pub data: Option<serde_json::Value>,
}

/// Where a wizard request stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// File picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Body of `POST /api/auth/reset-password`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPayload {
    pub email: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub resend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

/// Calls the wizards need.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn check_company_name(&self, name: &str) -> Result<Envelope>;

    async fn register_company(
        &self,
        parts: Vec<(&'static str, String)>,
        logo: Option<LocalFile>,
    ) -> Result<Envelope>;

    async fn reset_password(&self, payload: &ResetPayload) -> Result<Envelope>;
}

/// HTTP implementation of [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: String,
}

impl HttpClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Client for `HIREWISE_API_URL`, or the local default.
    pub fn from_env() -> Self {
        let base = std::env::var("HIREWISE_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        Self::new(base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn read(response: reqwest::Response) -> Result<Envelope> {
        let status = response.status();
        let envelope = response.json::<Envelope>().await.unwrap_or_else(|err| {
            tracing::debug!(error = %err, %status, "response is not an envelope");
            Envelope::default()
        });

        if status.is_success() && envelope.success {
            return Ok(envelope);
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message: envelope
                .message
                .unwrap_or_else(|| "Something went wrong. Please try again.".into()),
            field: envelope.field,
            errors: envelope.errors,
            data: envelope.data,
        })
    }
}

#[async_trait]
impl ApiClient for HttpClient {
    async fn check_company_name(&self, name: &str) -> Result<Envelope> {
        let response = self
            .client
            .post(self.url("/api/auth/company/check-name"))
            .json(&serde_json::json!({ "companyName": name }))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn register_company(
        &self,
        parts: Vec<(&'static str, String)>,
        logo: Option<LocalFile>,
    ) -> Result<Envelope> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in parts {
            form = form.text(name, value);
        }
        if let Some(logo) = logo {
            let part = reqwest::multipart::Part::bytes(logo.data)
                .file_name(logo.filename)
                .mime_str(&logo.content_type)?;
            form = form.part("logo", part);
        }

        let response = self
            .client
            .post(self.url("/api/auth/company/register"))
            .multipart(form)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn reset_password(&self, payload: &ResetPayload) -> Result<Envelope> {
        let response = self
            .client
            .post(self.url("/api/auth/reset-password"))
            .json(payload)
            .send()
            .await?;
        Self::read(response).await
    }
}
