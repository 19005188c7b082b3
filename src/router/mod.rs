//! HTTP API.
pub mod applications;
pub mod auth;
pub mod notifications;
pub mod profile;
pub mod resumes;
pub mod status;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Result, ServerError};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// JSON body checked with [`validator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Query string checked with [`validator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        value.validate()?;
        Ok(ValidQuery(value))
    }
}

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> Success<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl Success<()> {
    /// Envelope without data.
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (self.status, Json(&self)).into_response()
    }
}

/// Offset pagination query.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1, message = "Page must be greater than 0."))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100."))]
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }
}

/// Pagination block sent next to a page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(query: &PageQuery, total: i64) -> Self {
        let limit = query.limit();
        Self {
            page: query.page(),
            limit,
            total,
            pages: (total + i64::from(limit) - 1) / i64::from(limit),
        }
    }
}

/// Page of items.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Parse an identifier taken from the path or the body.
pub fn parse_id(raw: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServerError::field(field, "Invalid identifier format."))
}

/// Application state backed by `pool`, for handler tests.
#[cfg(test)]
pub fn state(pool: sqlx::PgPool) -> crate::AppState {
    use std::sync::Arc;

    let config = crate::config::Configuration::default();
    let argon2 = crate::config::Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    };
    let uploads_root =
        std::env::temp_dir().join(format!("hirewise-{}", Uuid::new_v4()));
    for kind in crate::upload::UploadKind::ALL {
        std::fs::create_dir_all(uploads_root.join(kind.directory()))
            .expect("cannot create uploads directory");
    }

    crate::AppState {
        config: Arc::new(config),
        db: crate::database::Database::from_pool(pool),
        crypto: Arc::new(
            crate::crypto::Crypto::new(Some(argon2), "pepper")
                .expect("cannot build crypto"),
        ),
        token: crate::token::TokenManager::new("test-secret", 3600)
            .expect("cannot build token manager"),
        mail: crate::mail::MailManager::default(),
        uploads: crate::upload::Uploads::new(
            uploads_root,
            crate::config::DEFAULT_MAX_FILE_SIZE,
        ),
        metrics: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let query = PageQuery {
            page: Some(3),
            limit: Some(10),
        };
        assert_eq!(query.offset(), 20);
        assert_eq!(
            Pagination::new(&query, 21),
            Pagination {
                page: 3,
                limit: 10,
                total: 21,
                pages: 3
            }
        );

        let defaults = PageQuery::default();
        assert_eq!(defaults.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(defaults.offset(), 0);
        assert_eq!(Pagination::new(&defaults, 0).pages, 0);
    }

    #[test]
    fn test_page_bounds() {
        let too_big = PageQuery {
            page: Some(1),
            limit: Some(101),
        };
        assert!(too_big.validate().is_err());
        assert!(PageQuery {
            page: Some(0),
            limit: None
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("not-an-id", "id").is_err());
        assert_eq!(
            parse_id(" 00000000-0000-0000-0000-0000000000e1 ", "id").unwrap(),
            Uuid::parse_str("00000000-0000-0000-0000-0000000000e1").unwrap()
        );
    }
}
