//! Public instance status, for front-end identification.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::Configuration;

/// Structured status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    name: String,
    version: String,
    url: String,
    max_file_size: usize,
}

/// Public server status.
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: if config.name.is_empty() {
            env!("CARGO_CRATE_NAME").into()
        } else {
            config.name.clone()
        },
        version: config.version().to_owned(),
        url: config.url.clone(),
        max_file_size: config.uploads.max_file_size,
    })
}
