//! In-app notifications.
//!
//! A notification targets one user, or every user holding a role inside a
//! company (broadcast). Both targets may be set, in which case both audiences
//! see it. `read_at` is set exactly when `read` is true, and read
//! notifications are removed 30 days after `read_at` by [`sweeper`].

mod repository;
pub mod sweeper;

pub use repository::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::user::Role;

/// Kind of event a notification reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationSubmitted,
    ApplicationStatusChanged,
    ApplicationWithdrawn,
    InterviewScheduled,
    JobPosted,
    ProfileViewed,
    #[default]
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ApplicationSubmitted => "application_submitted",
            NotificationType::ApplicationStatusChanged => {
                "application_status_changed"
            },
            NotificationType::ApplicationWithdrawn => "application_withdrawn",
            NotificationType::InterviewScheduled => "interview_scheduled",
            NotificationType::JobPosted => "job_posted",
            NotificationType::ProfileViewed => "profile_viewed",
            NotificationType::System => "system",
        }
    }
}

impl TryFrom<String> for NotificationType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        serde_json::from_value(serde_json::Value::String(value))
            .map_err(|err| err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority `{other}`")),
        }
    }
}

/// Object a notification is about.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// Notification as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub role: Option<String>,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[sqlx(json(nullable))]
    pub entity: Option<Entity>,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub read: bool,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Identity used by the access filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requester {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub role: Role,
}

/// Read-state filter of a listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Unread,
    Read,
}

/// Notification to create.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub role: Option<Role>,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub entity: Option<Entity>,
    pub priority: Priority,
}

impl NewNotification {
    /// Personal notification.
    pub fn to_user(user_id: Uuid, kind: NotificationType) -> Self {
        Self {
            user_id: Some(user_id),
            kind,
            ..Default::default()
        }
    }

    /// Broadcast to every `role` member of a company.
    pub fn to_company(company_id: Uuid, role: Role, kind: NotificationType) -> Self {
        Self {
            company_id: Some(company_id),
            role: Some(role),
            kind,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn entity(mut self, kind: &str, id: impl ToString) -> Self {
        self.entity = Some(Entity {
            kind: kind.to_owned(),
            id: id.to_string(),
            extra: serde_json::Value::Null,
        });
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// A notification must reach someone.
    pub fn check(&self) -> Result<()> {
        let broadcast = self.company_id.is_some() && self.role.is_some();
        if self.user_id.is_none() && !broadcast {
            return Err(ServerError::field(
                "user",
                "Notification needs a user or a company and role target.",
            ));
        }
        if self.title.trim().is_empty() {
            return Err(ServerError::field("title", "Title is required."));
        }
        if self.message.trim().is_empty() {
            return Err(ServerError::field("message", "Message is required."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_required() {
        let orphan = NewNotification {
            kind: NotificationType::System,
            title: "Hello".into(),
            message: "World".into(),
            ..Default::default()
        };
        assert!(orphan.check().is_err());

        // Company without role is not a broadcast.
        let half = NewNotification {
            company_id: Some(Uuid::new_v4()),
            ..orphan.clone()
        };
        assert!(half.check().is_err());

        let broadcast =
            NewNotification::to_company(Uuid::new_v4(), Role::Hr, NotificationType::JobPosted)
                .title("New job")
                .message("A job was posted.");
        assert!(broadcast.check().is_ok());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(
            NotificationType::try_from("interview_scheduled".to_string()),
            Ok(NotificationType::InterviewScheduled)
        );
        assert!(NotificationType::try_from("unknown".to_string()).is_err());
        assert_eq!(
            NotificationType::ApplicationStatusChanged.as_str(),
            "application_status_changed"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let now = chrono::Utc::now();
        let notification = Notification {
            id: Uuid::nil(),
            user_id: None,
            company_id: Some(Uuid::nil()),
            role: Some("hr".into()),
            kind: NotificationType::ApplicationSubmitted,
            title: "New application".into(),
            message: "Jane applied.".into(),
            action_url: None,
            entity: None,
            priority: Priority::High,
            read: true,
            read_at: Some(now),
            created_at: now,
        };

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["_id"], Uuid::nil().to_string());
        assert_eq!(json["type"], "application_submitted");
        assert_eq!(json["priority"], "high");
        assert!(json["readAt"].is_string());
    }
}
