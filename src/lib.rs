//! HireWise is a recruitment platform API: company onboarding, profiles,
//! resumes, job applications and notifications.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod crypto;
mod database;
mod mail;
mod middleware;
mod reset;
mod router;
mod token;
mod upload;

pub mod application;
pub mod client;
pub mod company;
pub mod config;
pub mod error;
pub mod notification;
pub mod registration;
pub mod resume;
pub mod telemetry;
pub mod user;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// Room left for multipart headers and text fields next to a file.
const BODY_OVERHEAD: usize = 1024 * 1024;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<String>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// One part of a multipart test body.
#[cfg(test)]
pub enum Part {
    Text(String, String),
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

#[cfg(test)]
impl Part {
    pub fn text(name: &str, value: &str) -> Self {
        Part::Text(name.into(), value.into())
    }

    pub fn file(name: &str, filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        Part::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Part::Text(name, _) | Part::File { name, .. } => name,
        }
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_multipart_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<String>,
    parts: Vec<Part>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "hirewise-test-boundary";

    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            },
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            },
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut request = Request::builder().method(method).uri(path).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub token: token::TokenManager,
    pub mail: mail::MailManager,
    pub uploads: upload::Uploads,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let auth = AxumMiddleware::from_fn_with_state(state.clone(), middleware::auth);
    let protected = Router::new()
        .nest("/notifications", router::notifications::router())
        .nest("/profile", router::profile::router())
        .nest("/admin/profile", router::profile::admin_router())
        .nest("/resumes", router::resumes::router())
        .nest("/applications", router::applications::router())
        .route_layer(auth);

    let api = Router::new()
        .nest("/auth", router::auth::router())
        .merge(protected);

    let uploads = ServeDir::new(state.uploads.root());
    let body_limit = state.uploads.max_file_size() + BODY_OVERHEAD;

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(telemetry::metrics))
        .nest("/api", api)
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;
    error::set_environment(config.environment);

    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file");
        std::process::exit(1);
    };
    let db = database::Database::new(postgres).await?;

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let pepper = std::env::var("PEPPER").unwrap_or_else(|_| {
        tracing::warn!("missing `PEPPER` environnement variable, reset codes use the JWT secret");
        config.token.secret.clone()
    });
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), pepper)?);

    // handle jwt.
    let token =
        token::TokenManager::new(&config.token.secret, config.token.lifetime)?;

    // handle mail sender.
    let mail = if let Some(cfg) = &config.mail {
        mail::MailManager::new(cfg).await?
    } else {
        tracing::warn!("missing `mail` entry on `config.yaml` file, mails are dropped");
        mail::MailManager::default()
    };

    let uploads = upload::Uploads::new(
        &config.uploads.directory,
        config.uploads.max_file_size,
    );
    uploads.ensure_dirs().await?;

    Ok(AppState {
        config,
        db,
        crypto,
        token,
        mail,
        uploads,
        metrics,
    })
}
