//! Domain events for the application.
//!
//! Account lifecycle events are published on the event bus after the
//! corresponding state change has been committed. The audit listener
//! persists them and counts them.

use serde::Serialize;

use super::{AccountId, ForumId};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum AccountEvent {
    Registered {
        account_id: AccountId,
        login: String,
    },
    ActivationMailed {
        account_id: AccountId,
    },
    Activated {
        account_id: AccountId,
    },
    LoggedIn {
        account_id: AccountId,
        remembered: bool,
    },
    LoggedOut {
        account_id: AccountId,
    },
    PasswordChanged {
        account_id: AccountId,
    },
    PasswordResetRequested {
        account_id: AccountId,
    },
    PasswordReset {
        account_id: AccountId,
    },
    EmailChangeRequested {
        account_id: AccountId,
    },
    EmailChanged {
        account_id: AccountId,
    },
    Suspended {
        account_id: AccountId,
        by: AccountId,
    },
    Unsuspended {
        account_id: AccountId,
        by: AccountId,
    },
    Deleted {
        account_id: AccountId,
        by: AccountId,
    },
    Purged {
        account_id: AccountId,
        login: String,
        by: AccountId,
    },
    AdminGranted {
        account_id: AccountId,
    },
    ForumCreated {
        forum_id: ForumId,
        name: String,
    },
    ModeratorGranted {
        account_id: AccountId,
        forum_id: ForumId,
    },
    ModeratorRevoked {
        account_id: AccountId,
        forum_id: ForumId,
    },
}

impl AccountEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "Registered",
            Self::ActivationMailed { .. } => "ActivationMailed",
            Self::Activated { .. } => "Activated",
            Self::LoggedIn { .. } => "LoggedIn",
            Self::LoggedOut { .. } => "LoggedOut",
            Self::PasswordChanged { .. } => "PasswordChanged",
            Self::PasswordResetRequested { .. } => "PasswordResetRequested",
            Self::PasswordReset { .. } => "PasswordReset",
            Self::EmailChangeRequested { .. } => "EmailChangeRequested",
            Self::EmailChanged { .. } => "EmailChanged",
            Self::Suspended { .. } => "Suspended",
            Self::Unsuspended { .. } => "Unsuspended",
            Self::Deleted { .. } => "Deleted",
            Self::Purged { .. } => "Purged",
            Self::AdminGranted { .. } => "AdminGranted",
            Self::ForumCreated { .. } => "ForumCreated",
            Self::ModeratorGranted { .. } => "ModeratorGranted",
            Self::ModeratorRevoked { .. } => "ModeratorRevoked",
        }
    }

    /// The account the event is about, if any.
    #[must_use]
    pub const fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Registered { account_id, .. }
            | Self::ActivationMailed { account_id }
            | Self::Activated { account_id }
            | Self::LoggedIn { account_id, .. }
            | Self::LoggedOut { account_id }
            | Self::PasswordChanged { account_id }
            | Self::PasswordResetRequested { account_id }
            | Self::PasswordReset { account_id }
            | Self::EmailChangeRequested { account_id }
            | Self::EmailChanged { account_id }
            | Self::Suspended { account_id, .. }
            | Self::Unsuspended { account_id, .. }
            | Self::Deleted { account_id, .. }
            | Self::Purged { account_id, .. }
            | Self::AdminGranted { account_id }
            | Self::ModeratorGranted { account_id, .. }
            | Self::ModeratorRevoked { account_id, .. } => Some(*account_id),
            Self::ForumCreated { .. } => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Registered { login, .. } => format!("Account '{login}' registered"),
            Self::ActivationMailed { .. } => "Activation mail delivered".to_string(),
            Self::Activated { .. } => "Account activated".to_string(),
            Self::LoggedIn { remembered, .. } => {
                if *remembered {
                    "Logged in (remembered)".to_string()
                } else {
                    "Logged in".to_string()
                }
            }
            Self::LoggedOut { .. } => "Logged out".to_string(),
            Self::PasswordChanged { .. } => "Password changed".to_string(),
            Self::PasswordResetRequested { .. } => "Password reset requested".to_string(),
            Self::PasswordReset { .. } => "Password reset".to_string(),
            Self::EmailChangeRequested { .. } => "Email change requested".to_string(),
            Self::EmailChanged { .. } => "Email address changed".to_string(),
            Self::Suspended { by, .. } => format!("Suspended by account {by}"),
            Self::Unsuspended { by, .. } => format!("Unsuspended by account {by}"),
            Self::Deleted { by, .. } => format!("Deleted by account {by}"),
            Self::Purged { login, by, .. } => format!("Account '{login}' purged by account {by}"),
            Self::AdminGranted { .. } => "Admin role granted".to_string(),
            Self::ForumCreated { name, .. } => format!("Forum '{name}' created"),
            Self::ModeratorGranted { forum_id, .. } => {
                format!("Moderator of forum {forum_id}")
            }
            Self::ModeratorRevoked { forum_id, .. } => {
                format!("No longer moderator of forum {forum_id}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_tag() {
        let event = AccountEvent::Activated {
            account_id: AccountId::new(3),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Activated");
        assert_eq!(json["payload"]["account_id"], 3);
    }

    #[test]
    fn forum_events_have_no_account() {
        let event = AccountEvent::ForumCreated {
            forum_id: ForumId(1),
            name: "General".to_string(),
        };
        assert!(event.account_id().is_none());
        assert_eq!(event.message(), "Forum 'General' created");
    }
}
