use serde::Serialize;

use super::{AccountId, AccountState, ActivationHistory};

/// An account as seen by services and handlers.
///
/// Never carries the password hash or any one-time code; those stay inside
/// the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub login: String,
    pub email: String,
    pub permalink: String,
    pub state: AccountState,
    pub admin: bool,
    /// Address awaiting confirmation through an email change.
    pub new_email: Option<String>,
    pub hits: i32,
    pub forum_posts_count: i32,
    pub created_at: String,
    pub updated_at: String,
    pub activation_sent_at: Option<String>,
    pub activated_at: Option<String>,
    pub deleted_at: Option<String>,
    pub last_seen_at: Option<String>,
}

impl Account {
    #[must_use]
    pub const fn activation_history(&self) -> ActivationHistory {
        ActivationHistory {
            activated: self.activated_at.is_some(),
            activation_mailed: self.activation_sent_at.is_some(),
        }
    }
}

/// Credential-bearing side of an account.
pub trait Authenticatable {
    fn login(&self) -> &str;

    fn lifecycle_state(&self) -> AccountState;

    /// Only active accounts may hold a session or pass a password check.
    fn can_authenticate(&self) -> bool {
        self.lifecycle_state() == AccountState::Active
    }
}

/// Role side of an account.
pub trait Roleable {
    fn is_admin(&self) -> bool;

    /// Moderation rights for a forum, given whether an explicit grant exists.
    fn can_moderate(&self, holds_grant: bool) -> bool {
        self.is_admin() || holds_grant
    }
}

impl Authenticatable for Account {
    fn login(&self) -> &str {
        &self.login
    }

    fn lifecycle_state(&self) -> AccountState {
        self.state
    }
}

impl Roleable for Account {
    fn is_admin(&self) -> bool {
        self.admin
    }
}
