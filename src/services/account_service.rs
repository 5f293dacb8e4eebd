//! Domain service for the account lifecycle.
//!
//! Handles registration, activation, authentication, password and email
//! changes, and the administrative state transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::validation::FieldErrors;
use crate::domain::{Account, AccountId, AccountState, ForumId, InvalidTransition};

/// Caller-visible classification of an [`AccountError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    NotFound,
    InvalidResetCode,
    Authorization,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::InvalidResetCode => "invalid_reset_code",
            Self::Authorization => "authorization",
            Self::Internal => "internal",
        }
    }
}

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(FieldErrors),

    /// A validation failure that is not tied to one field.
    #[error("{0}")]
    Rejected(String),

    #[error("The activation code was missing.  Please follow the URL from your email.")]
    MissingActivationCode,

    #[error("We couldn't find a user with that activation code -- check your email?")]
    ActivationCodeNotFound,

    #[error("You've already activated your account -- try signing in.")]
    AlreadyActive,

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Sorry the current password was incorrect")]
    IncorrectPassword,

    #[error(
        "Sorry - That is an invalid password reset code. Please check your code and try again."
    )]
    InvalidResetCode,

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccountError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Rejected(_) | Self::MissingActivationCode => {
                ErrorKind::Validation
            }
            Self::ActivationCodeNotFound | Self::AlreadyActive | Self::NotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidCredentials | Self::IncorrectPassword => ErrorKind::Authentication,
            Self::InvalidResetCode => ErrorKind::InvalidResetCode,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Field messages, for validation failures that carry them.
    #[must_use]
    pub const fn fields(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn user_not_found() -> Self {
        Self::NotFound("Sorry, that user does not exist!".to_string())
    }
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<FieldErrors> for AccountError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<InvalidTransition> for AccountError {
    fn from(err: InvalidTransition) -> Self {
        Self::Rejected(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub login: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Outcome of a successful password check.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    /// Present when the caller asked to be remembered.
    pub remember_token: Option<String>,
}

/// Domain service trait for account lifecycle management.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Creates a passive account and queues its activation mail.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Validation`] with every offending field.
    async fn register(&self, registration: Registration) -> Result<Account, AccountError>;

    /// Consumes an activation code.
    async fn activate(&self, code: Option<&str>) -> Result<Account, AccountError>;

    /// Verifies a login-or-email and password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] for every failure.
    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, AccountError>;

    /// Resolves a remember token to its active account.
    async fn resume(&self, remember_token: &str) -> Result<Option<Account>, AccountError>;

    async fn logout(&self, id: AccountId) -> Result<(), AccountError>;

    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountError>;

    /// Non-deleted account by permalink.
    async fn find_by_permalink(&self, permalink: &str) -> Result<Account, AccountError>;

    /// Any account by permalink, deleted ones included.
    async fn find_any_by_permalink(&self, permalink: &str) -> Result<Account, AccountError>;

    /// Profile view; counts a hit unless the viewer is the account itself.
    async fn show_profile(
        &self,
        permalink: &str,
        viewer: Option<AccountId>,
    ) -> Result<Account, AccountError>;

    /// The viewer's own account, marking it as seen.
    async fn hub(&self, id: AccountId) -> Result<Account, AccountError>;

    async fn latest_members(&self, limit: Option<u64>) -> Result<Vec<Account>, AccountError>;

    async fn list(&self, state: Option<AccountState>) -> Result<Vec<Account>, AccountError>;

    async fn change_password(
        &self,
        id: AccountId,
        change: PasswordChange,
    ) -> Result<(), AccountError>;

    /// Issues a reset code if an active account owns `email`. Silent otherwise.
    async fn forgot_password(&self, email: &str) -> Result<(), AccountError>;

    async fn check_reset_code(&self, code: &str) -> Result<Account, AccountError>;

    async fn reset_password(
        &self,
        code: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<Account, AccountError>;

    async fn change_email(&self, id: AccountId, new_email: &str) -> Result<(), AccountError>;

    async fn confirm_email_change(&self, code: &str) -> Result<Account, AccountError>;

    async fn suspend(&self, target: AccountId, by: AccountId) -> Result<Account, AccountError>;

    async fn unsuspend(&self, target: AccountId, by: AccountId) -> Result<Account, AccountError>;

    async fn soft_delete(&self, target: AccountId, by: AccountId)
    -> Result<Account, AccountError>;

    /// Irreversibly removes the account.
    async fn purge(&self, target: AccountId, by: AccountId) -> Result<(), AccountError>;

    async fn grant_admin(&self, target: AccountId) -> Result<Account, AccountError>;

    /// True for global admins and for holders of a moderatorship on `forum`.
    async fn is_moderator_of(&self, account: &Account, forum: ForumId)
    -> Result<bool, AccountError>;
}
