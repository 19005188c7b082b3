//! Notification feed and read state.

use axum::extract::{Path, State};
use axum::routing::{delete, get, patch};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::AuthUser;
use crate::notification::{Notification, NotificationRepository, StatusFilter};
use crate::router::{
    PageQuery, Paginated, Pagination, Success, Valid, ValidQuery, parse_id,
};

/// Read-state filter read next to [`PageQuery`].
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StatusQuery {
    #[serde(default)]
    status: StatusFilter,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BulkDelete {
    #[validate(length(min = 1, message = "Please provide at least one notification id."))]
    ids: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).delete(bulk_delete))
        .route("/unread-count", get(unread_count))
        .route("/read-all", patch(mark_all))
        .route("/{id}/read", patch(mark_one))
        .route("/{id}", delete(delete_one))
}

fn repo(state: &AppState) -> NotificationRepository {
    NotificationRepository::new(state.db.postgres.clone())
}

async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ValidQuery(page): ValidQuery<PageQuery>,
    ValidQuery(filter): ValidQuery<StatusQuery>,
) -> Result<Success<Paginated<Notification>>> {
    let (items, total) = repo(&state)
        .list(
            &auth.requester(),
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

async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Success<serde_json::Value>> {
    let count = repo(&state).unread_count(&auth.requester()).await?;
    Ok(Success::data(json!({ "count": count })))
}

async fn mark_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Success<Notification>> {
    let id = parse_id(&id, "id")?;
    let notification = repo(&state)
        .mark_one(id, &auth.requester())
        .await?
        .ok_or(ServerError::NotFound("Notification"))?;

    Ok(Success::data(notification))
}

async fn mark_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Success<serde_json::Value>> {
    let modified = repo(&state).mark_all(&auth.requester()).await?;
    Ok(Success::data(json!({ "modified": modified }))
        .message("All notifications marked as read"))
}

async fn delete_one(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Success<serde_json::Value>> {
    let id = parse_id(&id, "id")?;
    if !repo(&state).delete(id, &auth.requester()).await? {
        return Err(ServerError::NotFound("Notification"));
    }

    Ok(Success::data(json!({ "_id": id })).message("Notification deleted"))
}

async fn bulk_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Valid(body): Valid<BulkDelete>,
) -> Result<Success<serde_json::Value>> {
    let ids = body
        .ids
        .iter()
        .map(|id| parse_id(id, "ids"))
        .collect::<Result<Vec<_>>>()?;

    let deleted = repo(&state).bulk_delete(&ids, &auth.requester()).await?;
    Ok(Success::data(json!({ "deleted": deleted })))
}
