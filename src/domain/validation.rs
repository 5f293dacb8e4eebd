//! Field-level validation for account input.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

pub const LOGIN_MIN: usize = 3;
pub const LOGIN_MAX: usize = 40;
pub const EMAIL_MIN: usize = 6;
pub const EMAIL_MAX: usize = 100;

/// Messages keyed by field name, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

fn login_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"^\w[\w.\-@]+$")
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"^[\w.%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
}

/// Lowercased, trimmed form used for storage and comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_login(login: &str, errors: &mut FieldErrors) {
    let len = login.chars().count();
    if login.is_empty() {
        errors.add("login", "can't be blank");
        return;
    }
    if len < LOGIN_MIN {
        errors.add("login", format!("is too short (minimum is {LOGIN_MIN} characters)"));
    } else if len > LOGIN_MAX {
        errors.add("login", format!("is too long (maximum is {LOGIN_MAX} characters)"));
    }
    if !login_regex().is_match(login) {
        errors.add("login", "use only letters, numbers, and .-_@ please");
    }
}

pub fn check_email(email: &str, errors: &mut FieldErrors) {
    let len = email.chars().count();
    if email.is_empty() {
        errors.add("email", "can't be blank");
        return;
    }
    if len < EMAIL_MIN {
        errors.add("email", format!("is too short (minimum is {EMAIL_MIN} characters)"));
    } else if len > EMAIL_MAX {
        errors.add("email", format!("is too long (maximum is {EMAIL_MAX} characters)"));
    }
    if !email_regex().is_match(email) {
        errors.add("email", "should look like an email address");
    }
}

/// Password presence, length bounds, and confirmation match.
pub fn check_password(
    password: &str,
    confirmation: &str,
    bounds: (usize, usize),
    errors: &mut FieldErrors,
) {
    let (min, max) = bounds;
    let len = password.chars().count();

    if password.is_empty() {
        errors.add("password", "can't be blank");
    } else if len < min {
        errors.add("password", format!("is too short (minimum is {min} characters)"));
    } else if len > max {
        errors.add("password", format!("is too long (maximum is {max} characters)"));
    }

    if password != confirmation {
        errors.add("password_confirmation", "doesn't match password");
    }
}
