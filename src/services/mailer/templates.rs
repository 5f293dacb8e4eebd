use super::Envelope;
use crate::config::MailConfig;
use crate::domain::Account;

/// Notifications sent over the account lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTemplate {
    Activation { code: String },
    Activated,
    PasswordReset { code: String },
    PasswordWasReset,
    /// Goes to the new address, not the current one.
    EmailChange { code: String },
}

impl MailTemplate {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Activation { .. } => "activation",
            Self::Activated => "activated",
            Self::PasswordReset { .. } => "password_reset",
            Self::PasswordWasReset => "password_was_reset",
            Self::EmailChange { .. } => "email_change",
        }
    }

    #[must_use]
    pub fn render(&self, account: &Account, to: &str, config: &MailConfig) -> Envelope {
        let site = &config.site_name;
        let base = config.base_url.trim_end_matches('/');
        let login = &account.login;

        let (subject, body) = match self {
            Self::Activation { code } => (
                format!("[{site}] Please activate your new account"),
                format!(
                    "Hi {login},\n\n\
                     Your account has been created.\n\n\
                     Visit this url to activate your account:\n\n  \
                     {base}/api/users/activate/{code}\n"
                ),
            ),
            Self::Activated => (
                format!("[{site}] Your account has been activated!"),
                format!(
                    "Hi {login},\n\n\
                     Your account is now active. You can sign in at:\n\n  \
                     {base}/\n"
                ),
            ),
            Self::PasswordReset { code } => (
                format!("[{site}] Request to change your password"),
                format!(
                    "Hi {login},\n\n\
                     Someone asked to reset the password for your account.\n\
                     Visit this url to choose a new one:\n\n  \
                     {base}/api/users/reset_password/{code}\n\n\
                     If you did not ask for this, ignore this message.\n"
                ),
            ),
            Self::PasswordWasReset => (
                format!("[{site}] Your password has been reset"),
                format!(
                    "Hi {login},\n\n\
                     The password for your account was just reset.\n\
                     If this wasn't you, contact an admin right away.\n"
                ),
            ),
            Self::EmailChange { code } => (
                format!("[{site}] Please confirm your new email address"),
                format!(
                    "Hi {login},\n\n\
                     Visit this url to start using this address for your account:\n\n  \
                     {base}/api/users/activate_new_email/{code}\n"
                ),
            ),
        };

        Envelope {
            to: to.to_string(),
            subject,
            body,
        }
    }
}
