//! Field rules shared by the API and the client wizards.
//!
//! Each rule returns the first failing message so that the client and the
//! server report identical text for the same input.

use std::sync::LazyLock;

use regex_lite::Regex;
use validator::ValidationError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9\s\-().]{7,20}$").expect("valid phone regex")
});
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?([\w-]+\.)+[\w-]+(/[\w\-./?%&=#]*)?$")
        .expect("valid url regex")
});
static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid code regex"));

/// Minimum length of an account password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value.trim())
}

pub fn is_phone(value: &str) -> bool {
    let value = value.trim();
    PHONE.is_match(value) && value.chars().filter(char::is_ascii_digit).count() >= 7
}

pub fn is_url(value: &str) -> bool {
    URL.is_match(value.trim())
}

/// Exactly six ASCII digits.
pub fn is_reset_code(value: &str) -> bool {
    CODE.is_match(value)
}

/// Password strength rule for administrator accounts.
pub fn password_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 6 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number");
    }
    Ok(())
}

/// Full name heuristic: two words or more, each at least two characters.
pub fn full_name(name: &str) -> Result<(), &'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Full name is required");
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err("Please enter your first and last name");
    }
    if tokens.iter().any(|t| t.chars().count() < 2) {
        return Err("Each part of the name must have at least 2 characters");
    }
    Ok(())
}

fn rejected(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() || is_phone(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

pub fn validate_full_name(name: &str) -> Result<(), ValidationError> {
    full_name(name).map_err(|message| rejected("full_name", message))
}
