//! Three step company signup wizard.

use std::time::{Duration, Instant};

use serde::Deserialize;
use uuid::Uuid;

use crate::client::{ApiClient, ClientError, FieldError, LocalFile, RequestState};
use crate::registration::{CompanyForm, Step, check_step};

/// Minimum delay between a step change and a submission.
pub const SUBMIT_COOLDOWN: Duration = Duration::from_millis(500);

/// Data kept across steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub company: CompanyForm,
    pub confirm_password: String,
    pub logo: Option<LocalFile>,
}

/// Created account, as answered by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub token: String,
    pub company_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("a request is already running")]
    Busy,
    #[error("registration is sent from the last step")]
    WrongStep,
    #[error("some fields are invalid")]
    Invalid,
    #[error("unexpected response from server")]
    Response,
    #[error(transparent)]
    Api(#[from] ClientError),
}

pub struct SignupWizard<C> {
    client: C,
    step: Step,
    pub form: SignupForm,
    errors: Vec<FieldError>,
    state: RequestState,
    last_transition: Option<Instant>,
    cooldown: Duration,
}

impl<C: ApiClient> SignupWizard<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            step: Step::Organization,
            form: SignupForm::default(),
            errors: Vec::new(),
            state: RequestState::Idle,
            last_transition: None,
            cooldown: SUBMIT_COOLDOWN,
        }
    }

    /// Override [`SUBMIT_COOLDOWN`].
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Error shown under `field`, if any.
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn move_to(&mut self, step: Step) {
        self.step = step;
        self.last_transition = Some(Instant::now());
    }

    fn validate(&mut self, step: Step) -> bool {
        self.errors = check_step(step, &self.form.company)
            .into_iter()
            .map(|issue| FieldError {
                field: issue.field.into(),
                message: issue.message.into(),
            })
            .collect();

        if step == Step::AdminAccount {
            if self.form.confirm_password.is_empty() {
                self.errors.push(FieldError {
                    field: "confirmPassword".into(),
                    message: "Please confirm your password".into(),
                });
            } else if self.form.confirm_password != self.form.company.admin_password {
                self.errors.push(FieldError {
                    field: "confirmPassword".into(),
                    message: "Passwords do not match".into(),
                });
            }
        }

        self.errors.is_empty()
    }

    /// Validate the current step and move forward.
    ///
    /// From the first step the company name is checked with the API. Only an
    /// answer from the server can block; a network failure lets the user go
    /// on and the name is checked again on registration.
    pub async fn next(&mut self) -> bool {
        if self.state == RequestState::Submitting || !self.validate(self.step) {
            return false;
        }

        if self.step == Step::Organization {
            match self
                .client
                .check_company_name(self.form.company.company_name.trim())
                .await
            {
                Ok(_) => {},
                Err(err) if err.is_network() => {
                    tracing::warn!(error = %err, "company name check unavailable");
                },
                Err(err) => {
                    self.errors = err.field_errors();
                    if self.errors.is_empty() {
                        self.errors.push(FieldError {
                            field: "companyName".into(),
                            message: err.to_string(),
                        });
                    }
                    return false;
                },
            }
        }

        match self.step.next() {
            Some(step) => {
                self.move_to(step);
                true
            },
            None => false,
        }
    }

    /// Go one step back. Data is kept.
    pub fn back(&mut self) -> bool {
        match self.step.previous() {
            Some(step) if self.state != RequestState::Submitting => {
                self.errors.clear();
                self.move_to(step);
                true
            },
            _ => false,
        }
    }

    /// Jump to an earlier step.
    pub fn go_to(&mut self, step: Step) -> bool {
        if step > self.step || self.state == RequestState::Submitting {
            return false;
        }
        self.errors.clear();
        self.move_to(step);
        true
    }

    /// Send the registration.
    ///
    /// On a field error from the server the wizard moves to the step owning
    /// that field.
    pub async fn submit(&mut self) -> Result<Registration, SignupError> {
        if self.step != Step::AdditionalInfo {
            return Err(SignupError::WrongStep);
        }
        if self.state == RequestState::Submitting
            || self
                .last_transition
                .is_some_and(|at| at.elapsed() < self.cooldown)
        {
            return Err(SignupError::Busy);
        }
        if !self.validate(Step::AdditionalInfo) {
            return Err(SignupError::Invalid);
        }

        self.state = RequestState::Submitting;
        let result = self
            .client
            .register_company(self.form.company.parts(), self.form.logo.clone())
            .await;

        match result {
            Ok(envelope) => {
                let registration = envelope
                    .data
                    .and_then(|data| serde_json::from_value::<Registration>(data).ok());
                match registration {
                    Some(registration) => {
                        self.state = RequestState::Succeeded;
                        Ok(registration)
                    },
                    None => {
                        self.state = RequestState::Failed;
                        Err(SignupError::Response)
                    },
                }
            },
            Err(err) => {
                self.state = RequestState::Failed;
                self.errors = err.field_errors();

                let owner = self
                    .errors
                    .iter()
                    .filter_map(|e| Step::owning(&e.field))
                    .min();
                if let Some(step) = owner {
                    self.move_to(step);
                }

                Err(err.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Envelope;
    use crate::client::fake::{Call, FakeApi, api_error};

    fn filled() -> SignupForm {
        SignupForm {
            company: CompanyForm {
                company_name: "Globex".into(),
                company_email: "contact@globex.io".into(),
                company_phone: "+33 6 12 34 56 78".into(),
                industry: "Manufacturing".into(),
                company_size: "51-200".into(),
                admin_name: "Hank Scorpio".into(),
                admin_email: "hank@globex.io".into(),
                admin_password: "Abc123".into(),
                city: "Paris".into(),
                ..Default::default()
            },
            confirm_password: "Abc123".into(),
            logo: None,
        }
    }

    async fn at_last_step(api: FakeApi) -> SignupWizard<FakeApi> {
        let mut wizard = SignupWizard::new(api).with_cooldown(Duration::ZERO);
        wizard.form = filled();
        assert!(wizard.next().await);
        assert!(wizard.next().await);
        assert_eq!(wizard.step(), Step::AdditionalInfo);
        wizard
    }

    #[tokio::test]
    async fn test_empty_name_blocks_without_network() {
        let mut wizard = SignupWizard::new(FakeApi::default());

        assert!(!wizard.next().await);
        assert_eq!(wizard.step(), Step::Organization);
        assert_eq!(wizard.error("companyName"), Some("Company name is required"));
        assert!(wizard.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_taken_name_blocks() {
        let api = FakeApi::default().answer(Err(api_error(
            400,
            Some("companyName"),
            "Company name is already registered",
        )));
        let mut wizard = SignupWizard::new(api);
        wizard.form = filled();

        assert!(!wizard.next().await);
        assert_eq!(
            wizard.error("companyName"),
            Some("Company name is already registered")
        );
    }

    #[tokio::test]
    async fn test_password_rules() {
        let mut wizard = SignupWizard::new(FakeApi::default());
        wizard.form = filled();
        assert!(wizard.next().await);

        wizard.form.company.admin_password = "abc123".into();
        wizard.form.confirm_password = "abc123".into();
        assert!(!wizard.next().await);
        assert!(wizard.error("adminPassword").unwrap().contains("uppercase"));

        wizard.form.company.admin_password = "Abc123".into();
        wizard.form.confirm_password = "Abc124".into();
        assert!(!wizard.next().await);
        assert_eq!(wizard.error("confirmPassword"), Some("Passwords do not match"));

        wizard.form.confirm_password = "Abc123".into();
        assert!(wizard.next().await);
    }

    #[tokio::test]
    async fn test_navigation_keeps_data() {
        let mut wizard = at_last_step(FakeApi::default()).await;

        assert!(wizard.go_to(Step::Organization));
        assert_eq!(wizard.form.company.admin_email, "hank@globex.io");
        assert!(!wizard.go_to(Step::AdminAccount));
        assert!(!wizard.back());
    }

    #[tokio::test]
    async fn test_submit_only_from_last_step() {
        let mut wizard = SignupWizard::new(FakeApi::default());
        wizard.form = filled();

        assert!(matches!(wizard.submit().await, Err(SignupError::WrongStep)));
    }

    #[tokio::test]
    async fn test_submit_cooldown() {
        let mut wizard = SignupWizard::new(FakeApi::default());
        wizard.form = filled();
        assert!(wizard.next().await);
        assert!(wizard.next().await);

        assert!(matches!(wizard.submit().await, Err(SignupError::Busy)));
        assert_eq!(wizard.state(), RequestState::Idle);
    }

    #[tokio::test]
    async fn test_submit_sends_optional_fields_when_set() {
        let company = Uuid::new_v4();
        let user = Uuid::new_v4();
        let api = FakeApi::default()
            .answer(Ok(Envelope::default()))
            .answer(Ok(Envelope {
                success: true,
                data: Some(serde_json::json!({
                    "token": "jwt",
                    "companyId": company,
                    "userId": user,
                })),
                ..Default::default()
            }));
        let mut wizard = at_last_step(api).await;
        wizard.form.logo = Some(LocalFile {
            filename: "logo.png".into(),
            content_type: "image/png".into(),
            data: vec![1, 2, 3],
        });

        let registration = wizard.submit().await.unwrap();
        assert_eq!(registration.company_id, company);
        assert_eq!(wizard.state(), RequestState::Succeeded);

        let Some(Call::Register(parts, logo)) = wizard.client.calls().pop() else {
            panic!("registration was not sent");
        };
        let names: Vec<&str> = parts.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"city"));
        assert!(!names.contains(&"website"));
        assert!(!names.contains(&"confirmPassword"));
        assert_eq!(logo.as_deref(), Some("logo.png"));
    }

    #[tokio::test]
    async fn test_server_error_moves_to_owning_step() {
        let api = FakeApi::default().answer(Ok(Envelope::default())).answer(Err(
            api_error(
                400,
                Some("adminEmail"),
                "An account with this email already exists",
            ),
        ));
        let mut wizard = at_last_step(api).await;

        assert!(wizard.submit().await.is_err());
        assert_eq!(wizard.state(), RequestState::Failed);
        assert_eq!(wizard.step(), Step::AdminAccount);
        assert_eq!(
            wizard.error("adminEmail"),
            Some("An account with this email already exists")
        );
        assert_eq!(wizard.form.company.company_name, "Globex");
    }
}
