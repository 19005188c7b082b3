//! Company registration form and its rules.
//!
//! The API and the signup wizard both check a [`CompanyForm`] with
//! [`check_step`], so a form accepted by the wizard is accepted by the API.

use serde::{Deserialize, Serialize};
use validator::{ValidationError, ValidationErrors};

use crate::validation::{self, is_email, is_phone, is_url};

pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_NAME_LENGTH: usize = 100;

/// Wizard step owning a set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Organization,
    AdminAccount,
    AdditionalInfo,
}

impl Step {
    pub const ALL: [Step; 3] =
        [Step::Organization, Step::AdminAccount, Step::AdditionalInfo];

    pub fn next(&self) -> Option<Step> {
        match self {
            Step::Organization => Some(Step::AdminAccount),
            Step::AdminAccount => Some(Step::AdditionalInfo),
            Step::AdditionalInfo => None,
        }
    }

    pub fn previous(&self) -> Option<Step> {
        match self {
            Step::Organization => None,
            Step::AdminAccount => Some(Step::Organization),
            Step::AdditionalInfo => Some(Step::AdminAccount),
        }
    }

    /// Fields entered on this step.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Step::Organization => &[
                "companyName",
                "companyEmail",
                "companyPhone",
                "website",
                "industry",
                "companySize",
            ],
            Step::AdminAccount => &[
                "adminName",
                "adminEmail",
                "adminPassword",
                "confirmPassword",
                "adminPhone",
                "jobTitle",
            ],
            Step::AdditionalInfo => {
                &["address", "city", "country", "description", "logo"]
            },
        }
    }

    /// Step where `field` is entered.
    pub fn owning(field: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.fields().contains(&field))
    }
}

/// Text fields of the registration form, as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyForm {
    pub company_name: String,
    pub company_email: String,
    pub company_phone: String,
    pub website: String,
    pub industry: String,
    pub company_size: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub description: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_phone: String,
    pub job_title: String,
}

/// One failed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issue {
    pub field: &'static str,
    pub message: &'static str,
}

fn issue(field: &'static str, message: &'static str) -> Issue {
    Issue { field, message }
}

impl CompanyForm {
    /// Multipart text parts: required ones always, optional ones when set.
    pub fn parts(&self) -> Vec<(&'static str, String)> {
        let required = [
            ("companyName", &self.company_name),
            ("companyEmail", &self.company_email),
            ("companyPhone", &self.company_phone),
            ("industry", &self.industry),
            ("companySize", &self.company_size),
            ("adminName", &self.admin_name),
            ("adminEmail", &self.admin_email),
            ("adminPassword", &self.admin_password),
        ];
        let optional = [
            ("website", &self.website),
            ("address", &self.address),
            ("city", &self.city),
            ("country", &self.country),
            ("description", &self.description),
            ("adminPhone", &self.admin_phone),
            ("jobTitle", &self.job_title),
        ];

        let mut parts: Vec<(&'static str, String)> = required
            .into_iter()
            .map(|(name, value)| (name, value.trim().to_owned()))
            .collect();
        parts.extend(
            optional
                .into_iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(name, value)| (name, value.trim().to_owned())),
        );
        // Passwords are sent as typed.
        if let Some(part) = parts.iter_mut().find(|(name, _)| *name == "adminPassword") {
            part.1 = self.admin_password.clone();
        }
        parts
    }

    /// Set a text field from its wire name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "companyName" => &mut self.company_name,
            "companyEmail" => &mut self.company_email,
            "companyPhone" => &mut self.company_phone,
            "website" => &mut self.website,
            "industry" => &mut self.industry,
            "companySize" => &mut self.company_size,
            "address" => &mut self.address,
            "city" => &mut self.city,
            "country" => &mut self.country,
            "description" => &mut self.description,
            "adminName" => &mut self.admin_name,
            "adminEmail" => &mut self.admin_email,
            "adminPassword" => &mut self.admin_password,
            "adminPhone" => &mut self.admin_phone,
            "jobTitle" => &mut self.job_title,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Check the fields of one step.
///
/// Password confirmation is not part of the form and is left to callers.
pub fn check_step(step: Step, form: &CompanyForm) -> Vec<Issue> {
    let mut issues = Vec::new();

    match step {
        Step::Organization => {
            let name = form.company_name.trim();
            if name.is_empty() {
                issues.push(issue("companyName", "Company name is required"));
            } else if name.chars().count() < 2 {
                issues.push(issue(
                    "companyName",
                    "Company name must be at least 2 characters",
                ));
            } else if name.chars().count() > MAX_NAME_LENGTH {
                issues.push(issue(
                    "companyName",
                    "Company name must be at most 100 characters",
                ));
            }

            if form.company_email.trim().is_empty() {
                issues.push(issue("companyEmail", "Company email is required"));
            } else if !is_email(&form.company_email) {
                issues.push(issue(
                    "companyEmail",
                    "Please enter a valid email address",
                ));
            }

            if form.company_phone.trim().is_empty() {
                issues.push(issue("companyPhone", "Company phone is required"));
            } else if !is_phone(&form.company_phone) {
                issues.push(issue(
                    "companyPhone",
                    "Please enter a valid phone number",
                ));
            }

            if !form.website.trim().is_empty() && !is_url(&form.website) {
                issues.push(issue("website", "Please enter a valid website URL"));
            }
            if form.industry.trim().is_empty() {
                issues.push(issue("industry", "Industry is required"));
            }
            if form.company_size.trim().is_empty() {
                issues.push(issue("companySize", "Company size is required"));
            }
        },
        Step::AdminAccount => {
            if let Err(message) = validation::full_name(&form.admin_name) {
                issues.push(issue("adminName", message));
            }

            if form.admin_email.trim().is_empty() {
                issues.push(issue("adminEmail", "Email is required"));
            } else if !is_email(&form.admin_email) {
                issues.push(issue(
                    "adminEmail",
                    "Please enter a valid email address",
                ));
            }

            if form.admin_password.is_empty() {
                issues.push(issue("adminPassword", "Password is required"));
            } else if let Err(message) =
                validation::password_strength(&form.admin_password)
            {
                issues.push(issue("adminPassword", message));
            }

            if !form.admin_phone.trim().is_empty() && !is_phone(&form.admin_phone) {
                issues.push(issue(
                    "adminPhone",
                    "Please enter a valid phone number",
                ));
            }
            if form.job_title.trim().chars().count() > MAX_NAME_LENGTH {
                issues.push(issue(
                    "jobTitle",
                    "Job title must be at most 100 characters",
                ));
            }
        },
        Step::AdditionalInfo => {
            if form.description.trim().chars().count() > MAX_DESCRIPTION_LENGTH {
                issues.push(issue(
                    "description",
                    "Description must be at most 1000 characters",
                ));
            }
            for (field, value) in [
                ("address", &form.address),
                ("city", &form.city),
                ("country", &form.country),
            ] {
                if value.trim().chars().count() > MAX_NAME_LENGTH * 2 {
                    issues.push(issue(field, "This field is too long"));
                }
            }
        },
    }

    issues
}

/// Check every step.
pub fn check_all(form: &CompanyForm) -> Vec<Issue> {
    Step::ALL
        .into_iter()
        .flat_map(|step| check_step(step, form))
        .collect()
}

/// Convert issues for the API error envelope.
pub fn into_validation(issues: &[Issue]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for issue in issues {
        errors.add(
            issue.field,
            ValidationError::new("invalid").with_message(issue.message.into()),
        );
    }
    errors
}
