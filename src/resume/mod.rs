//! Resumes uploaded by applicants.
//!
//! A user owns any number of resumes but at most one is active. Resumes are
//! never hard-deleted, only deactivated.

mod repository;

pub use repository::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::user::{EducationView, ExperienceView};

/// Resume processing state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for ProcessingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status `{other}`")),
        }
    }
}

/// Data extracted from a resume by the client or an external parser.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedResume {
    #[validate(length(max = 100, message = "Name must be at most 100 characters long."))]
    pub name: Option<String>,
    #[validate(length(max = 254, message = "Email must be at most 254 characters long."))]
    pub email: Option<String>,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters long."))]
    pub phone: Option<String>,
    #[validate(length(max = 120, message = "Location must be at most 120 characters long."))]
    pub location: Option<String>,
    #[validate(length(max = 100, message = "At most 100 skills are allowed."))]
    pub skills: Vec<String>,
    pub education: Vec<EducationView>,
    pub work_experience: Vec<ExperienceView>,
    pub raw_text: Option<String>,
}

/// Resume as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub size: i64,
    pub mime_type: String,
    #[sqlx(json(nullable))]
    pub parsed_data: Option<ParsedResume>,
    #[sqlx(try_from = "String")]
    pub processing_status: ProcessingStatus,
    pub version: i32,
    pub is_active: bool,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Public fields of a resume, also cached on the owner profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSummary {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub size: i64,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Resume> for ResumeSummary {
    fn from(resume: &Resume) -> Self {
        Self {
            id: resume.id,
            filename: resume.filename.clone(),
            original_name: resume.original_name.clone(),
            url: resume.url.clone(),
            size: resume.size,
            uploaded_at: resume.uploaded_at,
        }
    }
}
