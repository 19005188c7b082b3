mod profile;
mod repository;

pub use profile::*;
pub use repository::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Applicant,
    Hr,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Applicant => "applicant",
            Role::Hr => "hr",
            Role::Admin => "admin",
        }
    }

    /// Whether the role acts on behalf of a company.
    pub fn is_employer(&self) -> bool {
        matches!(self, Role::Hr | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "applicant" => Ok(Role::Applicant),
            "hr" => Ok(Role::Hr),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// User as saved on database.
///
/// `phone`, `location`, `skills`, `education` and `work_experience` are the
/// legacy flat shape. Current data lives in `profile`; see [`ProfileView`]
/// for how both are merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<Uuid>,
    pub company_id: Option<Uuid>,
    #[sqlx(json)]
    pub skills: Vec<String>,
    #[sqlx(json)]
    pub education: Vec<LegacyEducation>,
    #[sqlx(json)]
    pub work_experience: Vec<LegacyExperience>,
    #[sqlx(json)]
    pub profile: Profile,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    /// Company the user belongs to. `company_id` is preferred, `company` is
    /// the older column.
    pub fn company_ref(&self) -> Option<Uuid> {
        self.company_id.or(self.company)
    }
}
