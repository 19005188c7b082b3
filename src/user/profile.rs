//! Profile shapes and the adapter between them.
//!
//! Users carry two generations of the same data: flat legacy columns
//! (`education` holding display strings, top-level `phone`...) and the nested
//! `profile` document. Reads go through [`ProfileView::from_user`], which
//! prefers the nested shape and falls back on the legacy one when the nested
//! value is empty. Writes only ever touch the nested shape.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::company::CompanySummary;
use crate::error::ServerError;
use crate::resume::{ParsedResume, ResumeSummary};
use crate::user::{Role, User};

/// 5 MiB once decoded.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
const AVATAR_MIMES: [&str; 5] =
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];
const DEGREE_SEPARATOR: &str = " in ";
const POSITION_SEPARATOR: &str = " at ";
const DURATION_SEPARATOR: &str = " - ";
const PRESENT: &str = "Present";

/// Nested profile document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Vec<String>,
    pub education_entries: Vec<EducationEntry>,
    pub work_experience_entries: Vec<WorkExperienceEntry>,
    pub avatar: Option<Avatar>,
    pub current_resume_id: Option<Uuid>,
    /// Denormalized copy of the current resume.
    pub resume: Option<ResumeSummary>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationEntry {
    pub qualification: String,
    pub field_of_study: String,
    pub institution: String,
    pub start_year: Option<String>,
    pub end_year: Option<String>,
    pub grade: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkExperienceEntry {
    pub job_title: String,
    pub company: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub current: bool,
    pub description: Option<String>,
}

/// Legacy flat education item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyEducation {
    pub degree: String,
    pub institution: String,
    pub year: Option<String>,
}

/// Legacy flat work experience item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyExperience {
    pub title: String,
    pub company: String,
    pub duration: Option<String>,
    pub description: Option<String>,
}

/// Education as displayed by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationView {
    /// "B.Tech in Computer Science".
    pub degree: String,
    pub institution: String,
    pub year: Option<String>,
    pub grade: Option<String>,
}

/// Work experience as displayed by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceView {
    pub title: String,
    pub company: String,
    /// "2020 - Present".
    pub duration: Option<String>,
    pub description: Option<String>,
}

/// Split a display degree on the first " in ".
///
/// Strings without the separator keep everything as qualification.
pub fn split_degree(degree: &str) -> (String, String) {
    match degree.trim().split_once(DEGREE_SEPARATOR) {
        Some((qualification, field)) => {
            (qualification.trim().to_owned(), field.trim().to_owned())
        },
        None => (degree.trim().to_owned(), String::new()),
    }
}

fn join_degree(qualification: &str, field: &str) -> String {
    if field.is_empty() {
        qualification.to_owned()
    } else {
        format!("{qualification}{DEGREE_SEPARATOR}{field}")
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl From<&EducationEntry> for EducationView {
    fn from(entry: &EducationEntry) -> Self {
        Self {
            degree: join_degree(&entry.qualification, &entry.field_of_study),
            institution: entry.institution.clone(),
            year: entry.end_year.clone().or_else(|| entry.start_year.clone()),
            grade: entry.grade.clone(),
        }
    }
}

impl From<&EducationView> for EducationEntry {
    fn from(view: &EducationView) -> Self {
        let (qualification, field_of_study) = split_degree(&view.degree);
        Self {
            qualification,
            field_of_study,
            institution: view.institution.trim().to_owned(),
            start_year: None,
            end_year: non_empty(view.year.as_deref()),
            grade: non_empty(view.grade.as_deref()),
        }
    }
}

impl From<&LegacyEducation> for EducationView {
    fn from(legacy: &LegacyEducation) -> Self {
        Self {
            degree: legacy.degree.clone(),
            institution: legacy.institution.clone(),
            year: legacy.year.clone(),
            grade: None,
        }
    }
}

impl From<&WorkExperienceEntry> for ExperienceView {
    fn from(entry: &WorkExperienceEntry) -> Self {
        let end = if entry.current {
            Some(PRESENT.to_owned())
        } else {
            entry.end_date.clone()
        };
        let duration = match (&entry.start_date, end) {
            (Some(start), Some(end)) => Some(format!("{start}{DURATION_SEPARATOR}{end}")),
            (Some(start), None) => Some(start.clone()),
            (None, end) => end,
        };

        Self {
            title: entry.job_title.clone(),
            company: entry.company.clone(),
            duration,
            description: entry.description.clone(),
        }
    }
}

impl From<&ExperienceView> for WorkExperienceEntry {
    fn from(view: &ExperienceView) -> Self {
        let (job_title, company) = if view.company.trim().is_empty() {
            match view.title.split_once(POSITION_SEPARATOR) {
                Some((title, company)) => {
                    (title.trim().to_owned(), company.trim().to_owned())
                },
                None => (view.title.trim().to_owned(), String::new()),
            }
        } else {
            (view.title.trim().to_owned(), view.company.trim().to_owned())
        };

        let (start_date, end_date) = match non_empty(view.duration.as_deref()) {
            Some(duration) => match duration.split_once(DURATION_SEPARATOR) {
                Some((start, end)) => (non_empty(Some(start)), non_empty(Some(end))),
                None => (Some(duration), None),
            },
            None => (None, None),
        };
        let current = end_date
            .as_deref()
            .is_some_and(|end| end.eq_ignore_ascii_case(PRESENT));

        Self {
            job_title,
            company,
            start_date,
            end_date: if current { None } else { end_date },
            current,
            description: non_empty(view.description.as_deref()),
        }
    }
}

impl From<&LegacyExperience> for ExperienceView {
    fn from(legacy: &LegacyExperience) -> Self {
        Self {
            title: legacy.title.clone(),
            company: legacy.company.clone(),
            duration: legacy.duration.clone(),
            description: legacy.description.clone(),
        }
    }
}

/// Avatar storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Avatar {
    /// Image kept inline, base64 encoded.
    Inline { mime: String, data: String },
    /// Bare filename under the profile pictures folder.
    Path { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AvatarError {
    #[error("Avatar must be a base64 data URI.")]
    NotDataUri,
    #[error("Avatar must be a JPEG, PNG, GIF or WEBP image.")]
    UnsupportedType,
    #[error("Avatar is not valid base64.")]
    InvalidEncoding,
    #[error("Avatar is too large. Maximum size is 5MB.")]
    TooLarge,
}

impl From<AvatarError> for ServerError {
    fn from(err: AvatarError) -> Self {
        ServerError::field("avatar", err.to_string())
    }
}

impl Avatar {
    /// Parse a `data:image/png;base64,...` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, AvatarError> {
        let rest = uri.trim().strip_prefix("data:").ok_or(AvatarError::NotDataUri)?;
        let (mime, data) = rest
            .split_once(";base64,")
            .ok_or(AvatarError::NotDataUri)?;
        let mime = mime.to_ascii_lowercase();

        if !AVATAR_MIMES.contains(&mime.as_str()) {
            return Err(AvatarError::UnsupportedType);
        }

        // Reject on the encoded length first, decoding 5 MiB is cheap but
        // decoding an arbitrary body is not.
        if data.len() / 4 * 3 > MAX_AVATAR_BYTES + 3 {
            return Err(AvatarError::TooLarge);
        }
        let decoded = STANDARD
            .decode(data)
            .map_err(|_| AvatarError::InvalidEncoding)?;

        Self::from_bytes(&mime, &decoded)
    }

    /// Inline raw image bytes.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Result<Self, AvatarError> {
        if !AVATAR_MIMES.contains(&mime) {
            return Err(AvatarError::UnsupportedType);
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(AvatarError::TooLarge);
        }

        Ok(Avatar::Inline {
            mime: mime.to_owned(),
            data: STANDARD.encode(bytes),
        })
    }

    /// Value sent to clients: a data URI or a public path.
    pub fn public(&self) -> String {
        match self {
            Avatar::Inline { mime, data } => format!("data:{mime};base64,{data}"),
            Avatar::Path { path } => format!("/uploads/profile-pictures/{path}"),
        }
    }
}

/// Flattened profile sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub job_title: Option<String>,
    pub skills: Vec<String>,
    pub education: Vec<EducationView>,
    pub experience: Vec<ExperienceView>,
    pub avatar: Option<String>,
    pub current_resume_id: Option<Uuid>,
    pub resume: Option<ResumeSummary>,
    pub company_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanySummary>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProfileView {
    /// Merge legacy and nested shapes, nested first.
    pub fn from_user(user: &User) -> Self {
        let profile = &user.profile;

        let education = if profile.education_entries.is_empty() {
            user.education.iter().map(EducationView::from).collect()
        } else {
            profile.education_entries.iter().map(EducationView::from).collect()
        };
        let experience = if profile.work_experience_entries.is_empty() {
            user.work_experience.iter().map(ExperienceView::from).collect()
        } else {
            profile
                .work_experience_entries
                .iter()
                .map(ExperienceView::from)
                .collect()
        };
        let skills = if profile.skills.is_empty() {
            user.skills.clone()
        } else {
            profile.skills.clone()
        };

        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            phone: non_empty(profile.phone.as_deref())
                .or_else(|| non_empty(user.phone.as_deref())),
            location: non_empty(profile.location.as_deref())
                .or_else(|| non_empty(user.location.as_deref())),
            headline: profile.headline.clone(),
            bio: profile.bio.clone(),
            job_title: user.job_title.clone(),
            skills,
            education,
            experience,
            avatar: profile.avatar.as_ref().map(Avatar::public),
            current_resume_id: profile.current_resume_id,
            resume: profile.resume.clone(),
            company_id: user.company_ref(),
            company: None,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    /// Attach company details (admin view).
    pub fn with_company(mut self, company: Option<CompanySummary>) -> Self {
        self.company = company;
        self
    }
}

/// Profile update sent by clients. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(custom(
        function = "crate::validation::validate_full_name",
        message = "Please enter your full name."
    ))]
    pub full_name: Option<String>,
    #[validate(custom(
        function = "crate::validation::validate_phone",
        message = "Please enter a valid phone number."
    ))]
    pub phone: Option<String>,
    #[validate(length(max = 120, message = "Location must be at most 120 characters long."))]
    pub location: Option<String>,
    #[validate(length(max = 120, message = "Headline must be at most 120 characters long."))]
    pub headline: Option<String>,
    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters long."))]
    pub bio: Option<String>,
    #[validate(length(max = 100, message = "Job title must be at most 100 characters long."))]
    pub job_title: Option<String>,
    #[validate(length(max = 100, message = "At most 100 skills are allowed."))]
    pub skills: Option<Vec<String>>,
    pub education: Option<Vec<EducationView>>,
    pub experience: Option<Vec<ExperienceView>>,
    /// Data URI. An empty string removes the avatar.
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    /// Apply on a user. Only the nested profile and identity fields change.
    pub fn apply(self, user: &mut User) -> Result<(), AvatarError> {
        if let Some(full_name) = non_empty(self.full_name.as_deref()) {
            user.full_name = full_name;
        }
        if let Some(job_title) = self.job_title {
            user.job_title = non_empty(Some(&job_title));
        }

        let profile = &mut user.profile;
        if let Some(phone) = self.phone {
            profile.phone = non_empty(Some(&phone));
        }
        if let Some(location) = self.location {
            profile.location = non_empty(Some(&location));
        }
        if let Some(headline) = self.headline {
            profile.headline = non_empty(Some(&headline));
        }
        if let Some(bio) = self.bio {
            profile.bio = non_empty(Some(&bio));
        }
        if let Some(skills) = self.skills {
            profile.skills = clean_skills(skills);
        }
        if let Some(education) = self.education {
            profile.education_entries = education
                .iter()
                .filter(|e| !e.degree.trim().is_empty() || !e.institution.trim().is_empty())
                .map(EducationEntry::from)
                .collect();
        }
        if let Some(experience) = self.experience {
            profile.work_experience_entries = experience
                .iter()
                .filter(|e| !e.title.trim().is_empty() || !e.company.trim().is_empty())
                .map(WorkExperienceEntry::from)
                .collect();
        }
        if let Some(avatar) = self.avatar {
            profile.avatar = if avatar.trim().is_empty() {
                None
            } else {
                Some(Avatar::from_data_uri(&avatar)?)
            };
        }

        Ok(())
    }
}

fn clean_skills(skills: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        let skill = skill.trim();
        if !skill.is_empty()
            && !cleaned.iter().any(|s| s.eq_ignore_ascii_case(skill))
        {
            cleaned.push(skill.to_owned());
        }
    }
    cleaned
}

impl User {
    /// Copy parsed resume fields onto the profile.
    ///
    /// Empty or absent values never overwrite existing data.
    pub fn merge_parsed(&mut self, parsed: &ParsedResume) {
        if let Some(name) = non_empty(parsed.name.as_deref()) {
            self.full_name = name;
        }

        let profile = &mut self.profile;
        if let Some(phone) = non_empty(parsed.phone.as_deref()) {
            profile.phone = Some(phone);
        }
        if let Some(location) = non_empty(parsed.location.as_deref()) {
            profile.location = Some(location);
        }

        let skills = clean_skills(parsed.skills.clone());
        if !skills.is_empty() {
            profile.skills = skills;
        }

        let education: Vec<EducationEntry> = parsed
            .education
            .iter()
            .filter(|e| !e.degree.trim().is_empty())
            .map(EducationEntry::from)
            .collect();
        if !education.is_empty() {
            profile.education_entries = education;
        }

        let experience: Vec<WorkExperienceEntry> = parsed
            .work_experience
            .iter()
            .filter(|e| !e.title.trim().is_empty())
            .map(WorkExperienceEntry::from)
            .collect();
        if !experience.is_empty() {
            profile.work_experience_entries = experience;
        }
    }
}
