//! Job applications and their status timeline.

mod repository;

pub use repository::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Application status. `Hired`, `Rejected` and `Withdrawn` are final.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Reviewing,
    Shortlisted,
    Interview,
    Offered,
    Hired,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewing => "reviewing",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Offered => "offered",
            ApplicationStatus::Hired => "hired",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Hired
                | ApplicationStatus::Rejected
                | ApplicationStatus::Withdrawn
        )
    }

    /// Status change requested by the hiring company.
    pub fn review(self, next: ApplicationStatus) -> Result<ApplicationStatus> {
        if self.is_final() {
            return Err(ServerError::field(
                "status",
                "Application status can no longer change.",
            ));
        }
        if next == ApplicationStatus::Withdrawn {
            return Err(ServerError::field(
                "status",
                "Only the applicant can withdraw an application.",
            ));
        }
        if next == self {
            return Err(ServerError::field(
                "status",
                "Application already has this status.",
            ));
        }
        Ok(next)
    }

    /// Withdrawal requested by the applicant.
    pub fn withdraw(self) -> Result<ApplicationStatus> {
        if self.is_final() {
            return Err(ServerError::field(
                "status",
                "This application cannot be withdrawn.",
            ));
        }
        Ok(ApplicationStatus::Withdrawn)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ApplicationStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        serde_json::from_value(serde_json::Value::String(value))
            .map_err(|err| err.to_string())
    }
}

/// One step of the application history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub status: ApplicationStatus,
    pub note: Option<String>,
    pub changed_by: Uuid,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl TimelineEntry {
    pub fn now(status: ApplicationStatus, changed_by: Uuid, note: Option<String>) -> Self {
        Self {
            status,
            note: note.filter(|n| !n.trim().is_empty()),
            changed_by,
            at: chrono::Utc::now(),
        }
    }
}

/// Application as saved on database, with its job title and company.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub job_id: Uuid,
    pub applicant_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub cover_letter: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    #[sqlx(json)]
    pub timeline: Vec<TimelineEntry>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[sqlx(default)]
    pub job_title: Option<String>,
    #[sqlx(default)]
    pub company_id: Option<Uuid>,
}

/// Job an application points to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub location: Option<String>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Job {
    pub fn is_open(&self) -> bool {
        self.status == "open"
    }
}
