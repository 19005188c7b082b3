//! Two step password reset: request a code, then confirm it with a new
//! password.

use std::fmt;
use std::time::Duration;

use crate::client::{ApiClient, ClientError, RequestState, ResetPayload};
use crate::validation::{MIN_PASSWORD_LENGTH, is_email};

pub const CODE_LENGTH: usize = 6;
/// Cooldown used when the server does not send one.
pub const DEFAULT_COOLDOWN_SECS: u32 = 60;
/// Delay before going back to sign-in after a successful reset.
pub const REDIRECT_DELAY: Duration = Duration::from_secs(2);
pub const SIGN_IN_PATH: &str = "/signin";

/// Resend countdown, ticked once per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    remaining: u32,
}

impl Cooldown {
    pub fn new(seconds: u32) -> Self {
        Self { remaining: seconds }
    }

    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Resend is allowed.
    pub fn is_over(&self) -> bool {
        self.remaining == 0
    }
}

impl fmt::Display for Cooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

/// Six single-digit cells with a focused cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeInput {
    cells: [Option<char>; CODE_LENGTH],
    focus: usize,
}

impl CodeInput {
    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn cell(&self, index: usize) -> Option<char> {
        self.cells.get(index).copied().flatten()
    }

    /// Type into `index`. Non-digits are ignored; a digit moves focus to the
    /// next cell.
    pub fn input(&mut self, index: usize, c: char) {
        if index >= CODE_LENGTH || !c.is_ascii_digit() {
            return;
        }
        self.cells[index] = Some(c);
        self.focus = (index + 1).min(CODE_LENGTH - 1);
    }

    /// Backspace on `index`. An empty cell hands focus to, and clears, the
    /// previous one.
    pub fn backspace(&mut self, index: usize) {
        if index >= CODE_LENGTH {
            return;
        }
        if self.cells[index].take().is_some() {
            self.focus = index;
        } else if index > 0 {
            self.cells[index - 1] = None;
            self.focus = index - 1;
        }
    }

    /// Fill from a pasted string, keeping its digits.
    pub fn paste(&mut self, text: &str) {
        for (index, c) in text
            .chars()
            .filter(char::is_ascii_digit)
            .take(CODE_LENGTH)
            .enumerate()
        {
            self.input(index, c);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Digits typed so far, in order.
    pub fn code(&self) -> String {
        self.cells.iter().flatten().collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    RequestCode,
    ConfirmCode,
}

/// Navigation asked once the password is changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub to: &'static str,
    pub after: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("a request is already running")]
    Busy,
    #[error("please wait {0} before requesting a new code")]
    Cooldown(Cooldown),
    #[error(transparent)]
    Api(#[from] ClientError),
}

pub struct ResetWizard<C> {
    client: C,
    stage: Stage,
    pub email: String,
    pub code: CodeInput,
    pub new_password: String,
    pub confirm_password: String,
    cooldown: Cooldown,
    state: RequestState,
    error: Option<String>,
}

fn cooldown_from(data: Option<&serde_json::Value>) -> Option<Cooldown> {
    data.and_then(|d| d.get("resendCooldownSec"))
        .and_then(serde_json::Value::as_u64)
        .map(|secs| Cooldown::new(u32::try_from(secs).unwrap_or(u32::MAX)))
}

impl<C: ApiClient> ResetWizard<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            stage: Stage::RequestCode,
            email: String::new(),
            code: CodeInput::default(),
            new_password: String::new(),
            confirm_password: String::new(),
            cooldown: Cooldown::default(),
            state: RequestState::Idle,
            error: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn cooldown(&self) -> Cooldown {
        self.cooldown
    }

    /// Message shown above the form.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// One second elapsed.
    pub fn tick(&mut self) {
        self.cooldown.tick();
    }

    fn fail(&mut self, err: ResetError) -> ResetError {
        self.error = Some(err.to_string());
        err
    }

    async fn send(&mut self, payload: ResetPayload) -> Result<Option<serde_json::Value>, ResetError> {
        if self.state == RequestState::Submitting {
            return Err(ResetError::Busy);
        }

        self.state = RequestState::Submitting;
        self.error = None;
        match self.client.reset_password(&payload).await {
            Ok(envelope) => {
                self.state = RequestState::Succeeded;
                Ok(envelope.data)
            },
            Err(err) => {
                self.state = RequestState::Failed;
                if let ClientError::Api { data, .. } = &err {
                    if let Some(cooldown) = cooldown_from(data.as_ref()) {
                        self.cooldown = cooldown;
                    }
                }
                Err(self.fail(err.into()))
            },
        }
    }

    /// Ask for a code and move to the confirmation step.
    pub async fn request_code(&mut self) -> Result<(), ResetError> {
        let email = self.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(self.fail(ResetError::Invalid("Email is required")));
        }
        if !is_email(&email) {
            return Err(self.fail(ResetError::Invalid(
                "Please enter a valid email address",
            )));
        }

        let data = self
            .send(ResetPayload {
                email,
                ..Default::default()
            })
            .await?;

        self.cooldown = cooldown_from(data.as_ref())
            .unwrap_or(Cooldown::new(DEFAULT_COOLDOWN_SECS));
        self.code.clear();
        self.stage = Stage::ConfirmCode;
        Ok(())
    }

    /// Ask for a new code once the countdown reached zero.
    pub async fn resend(&mut self) -> Result<(), ResetError> {
        if !self.cooldown.is_over() {
            return Err(self.fail(ResetError::Cooldown(self.cooldown)));
        }

        let data = self
            .send(ResetPayload {
                email: self.email.trim().to_lowercase(),
                resend: true,
                ..Default::default()
            })
            .await?;

        self.cooldown = cooldown_from(data.as_ref())
            .unwrap_or(Cooldown::new(DEFAULT_COOLDOWN_SECS));
        self.code.clear();
        Ok(())
    }

    /// Back to the email step.
    pub fn change_email(&mut self) {
        if self.state != RequestState::Submitting {
            self.stage = Stage::RequestCode;
            self.code.clear();
            self.error = None;
        }
    }

    /// Send the code with the new password.
    pub async fn confirm(&mut self) -> Result<Redirect, ResetError> {
        if !self.code.is_complete() {
            return Err(self.fail(ResetError::Invalid("Please enter the 6-digit code")));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(self.fail(ResetError::Invalid(
                "Password must be at least 6 characters long",
            )));
        }
        if self.new_password != self.confirm_password {
            return Err(self.fail(ResetError::Invalid("Passwords do not match")));
        }

        self.send(ResetPayload {
            email: self.email.trim().to_lowercase(),
            code: Some(self.code.code()),
            new_password: Some(self.new_password.clone()),
            ..Default::default()
        })
        .await?;

        Ok(Redirect {
            to: SIGN_IN_PATH,
            after: REDIRECT_DELAY,
        })
    }
}
