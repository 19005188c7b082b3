//! Handle database requests.
//!
//! Every statement scoped to a requester goes through [`ACCESS_FILTER`], with
//! `$1` the user id, `$2` the company id and `$3` the role.

use sqlx::types::Json;
use sqlx::{PgExecutor, Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::notification::{NewNotification, Notification, Requester, StatusFilter};

const ACCESS_FILTER: &str =
    "(user_id = $1 OR (company_id = $2 AND role = $3))";

fn read_filter(status: StatusFilter) -> &'static str {
    match status {
        StatusFilter::All => "",
        StatusFilter::Unread => " AND NOT read",
        StatusFilter::Read => " AND read",
    }
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: Pool<Postgres>,
}

impl NotificationRepository {
    /// Create a new [`NotificationRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Newest first page of accessible notifications and their total.
    pub async fn list(
        &self,
        requester: &Requester,
        status: StatusFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64)> {
        let filter = format!("{ACCESS_FILTER}{}", read_filter(status));

        let items = sqlx::query_as::<_, Notification>(&format!(
            r#"SELECT * FROM notifications WHERE {filter}
                ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"#
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications WHERE {filter}"
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok((items, total))
    }

    /// Count unread accessible notifications.
    pub async fn unread_count(&self, requester: &Requester) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications WHERE {ACCESS_FILTER} AND NOT read"
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Mark one notification read.
    ///
    /// `read_at` keeps its first value when the notification is already read.
    pub async fn mark_one(
        &self,
        id: Uuid,
        requester: &Requester,
    ) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"UPDATE notifications
                SET read = TRUE, read_at = COALESCE(read_at, NOW())
                WHERE id = $4 AND {ACCESS_FILTER}
                RETURNING *"#
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Mark every unread accessible notification read.
    pub async fn mark_all(&self, requester: &Requester) -> Result<u64> {
        let modified = sqlx::query(&format!(
            r#"UPDATE notifications SET read = TRUE, read_at = NOW()
                WHERE {ACCESS_FILTER} AND NOT read"#
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(modified)
    }

    /// Delete one accessible notification.
    pub async fn delete(&self, id: Uuid, requester: &Requester) -> Result<bool> {
        let deleted = sqlx::query(&format!(
            "DELETE FROM notifications WHERE id = $4 AND {ACCESS_FILTER}"
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted == 1)
    }

    /// Delete every accessible notification among `ids`.
    pub async fn bulk_delete(
        &self,
        ids: &[Uuid],
        requester: &Requester,
    ) -> Result<u64> {
        let deleted = sqlx::query(&format!(
            "DELETE FROM notifications WHERE id = ANY($4) AND {ACCESS_FILTER}"
        ))
        .bind(requester.id)
        .bind(requester.company_id)
        .bind(requester.role.as_str())
        .bind(ids)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }

    /// Insert a notification, unread.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        new: &NewNotification,
    ) -> Result<Notification> {
        new.check()?;

        let notification = sqlx::query_as::<_, Notification>(
            r#"INSERT INTO notifications (id, user_id, company_id, role, type, title, message, action_url, entity, priority)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.company_id)
        .bind(new.role.map(|r| r.as_str()))
        .bind(new.kind.as_str())
        .bind(new.title.trim())
        .bind(new.message.trim())
        .bind(&new.action_url)
        .bind(new.entity.as_ref().map(Json))
        .bind(new.priority.as_str())
        .fetch_one(executor)
        .await?;

        tracing::debug!(
            notification_id = %notification.id,
            kind = new.kind.as_str(),
            "notification created"
        );

        Ok(notification)
    }

    /// Remove read notifications whose `read_at` is older than `before`.
    pub async fn purge_read_before(
        &self,
        before: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM notifications WHERE read AND read_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::{Pool, Postgres};

    use super::*;
    use crate::user::Role;

    fn hr() -> Requester {
        Requester {
            id: Uuid::parse_str("00000000-0000-0000-0000-0000000000b2").unwrap(),
            company_id: Some(
                Uuid::parse_str("00000000-0000-0000-0000-0000000000c1").unwrap(),
            ),
            role: Role::Hr,
        }
    }

    #[sqlx::test(fixtures(
        "../../fixtures/companies.sql",
        "../../fixtures/users.sql",
        "../../fixtures/notifications.sql"
    ))]
    async fn test_broadcast_visibility(pool: Pool<Postgres>) {
        let repo = NotificationRepository::new(pool);
        let hr = hr();

        let (items, total) =
            repo.list(&hr, StatusFilter::Unread, 20, 0).await.unwrap();
        assert_eq!(total, items.len() as i64);
        assert!(items.iter().any(|n| n.user_id.is_none()));

        // Same company, other role.
        let admin = Requester {
            id: Uuid::parse_str("00000000-0000-0000-0000-0000000000b1").unwrap(),
            role: Role::Admin,
            ..hr
        };
        let (items, _) =
            repo.list(&admin, StatusFilter::All, 20, 0).await.unwrap();
        assert!(items.iter().all(|n| n.role.as_deref() != Some("hr")
            || n.user_id == Some(admin.id)));

        // Other company, same role.
        let outsider = Requester {
            id: Uuid::new_v4(),
            company_id: Some(Uuid::new_v4()),
            role: Role::Hr,
        };
        assert_eq!(repo.unread_count(&outsider).await.unwrap(), 0);
    }

    #[sqlx::test(fixtures(
        "../../fixtures/companies.sql",
        "../../fixtures/users.sql",
        "../../fixtures/notifications.sql"
    ))]
    async fn test_mark_one_is_idempotent(pool: Pool<Postgres>) {
        let repo = NotificationRepository::new(pool);
        let hr = hr();
        let id =
            Uuid::parse_str("00000000-0000-0000-0000-0000000000e1").unwrap();

        let first = repo.mark_one(id, &hr).await.unwrap().unwrap();
        assert!(first.read);
        let read_at = first.read_at.unwrap();

        let second = repo.mark_one(id, &hr).await.unwrap().unwrap();
        assert!(second.read);
        assert_eq!(second.read_at, Some(read_at));
    }

    #[sqlx::test(fixtures(
        "../../fixtures/companies.sql",
        "../../fixtures/users.sql",
        "../../fixtures/notifications.sql"
    ))]
    async fn test_mark_all_then_nothing_left(pool: Pool<Postgres>) {
        let repo = NotificationRepository::new(pool);
        let hr = hr();

        let before = repo.unread_count(&hr).await.unwrap();
        assert!(before > 0);
        assert_eq!(repo.mark_all(&hr).await.unwrap(), before as u64);
        assert_eq!(repo.mark_all(&hr).await.unwrap(), 0);
        assert_eq!(repo.unread_count(&hr).await.unwrap(), 0);

        let (items, _) = repo.list(&hr, StatusFilter::Read, 100, 0).await.unwrap();
        assert!(items.iter().all(|n| n.read && n.read_at.is_some()));
    }

    #[sqlx::test(fixtures(
        "../../fixtures/companies.sql",
        "../../fixtures/users.sql",
        "../../fixtures/notifications.sql"
    ))]
    async fn test_purge_keeps_unread(pool: Pool<Postgres>) {
        let repo = NotificationRepository::new(pool.clone());

        let removed = repo
            .purge_read_before(chrono::Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE NOT read",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(unread > 0);
    }

    #[sqlx::test(fixtures(
        "../../fixtures/companies.sql",
        "../../fixtures/users.sql"
    ))]
    async fn test_create_requires_target(pool: Pool<Postgres>) {
        let orphan = NewNotification {
            title: "Hi".into(),
            message: "There".into(),
            ..Default::default()
        };
        assert!(NotificationRepository::create(&pool, &orphan).await.is_err());

        let broadcast = NewNotification::to_company(
            hr().company_id.unwrap(),
            Role::Hr,
            crate::notification::NotificationType::System,
        )
        .title("Maintenance")
        .message("Tonight at 10pm.");
        let created =
            NotificationRepository::create(&pool, &broadcast).await.unwrap();
        assert!(!created.read);
        assert_eq!(created.read_at, None);
        assert_eq!(created.role.as_deref(), Some("hr"));
    }
}
