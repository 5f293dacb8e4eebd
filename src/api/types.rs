use serde::{Deserialize, Serialize};

use crate::db::{AuditEntry, Forum};
use crate::domain::validation::FieldErrors;
use crate::domain::{Account, AccountState};

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
            fields: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            kind: None,
            fields: None,
        }
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Option<FieldErrors>) -> Self {
        self.fields = fields;
        self
    }
}

/// Account as rendered to clients.
///
/// The address fields are only filled in for the owner and for admins.
#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub id: i32,
    pub login: String,
    pub permalink: String,
    pub state: AccountState,
    pub admin: bool,
    pub hits: i32,
    pub forum_posts_count: i32,
    pub created_at: String,
    pub activated_at: Option<String>,
    pub last_seen_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
}

impl AccountDto {
    #[must_use]
    pub fn public(account: &Account) -> Self {
        Self {
            id: account.id.value(),
            login: account.login.clone(),
            permalink: account.permalink.clone(),
            state: account.state,
            admin: account.admin,
            hits: account.hits,
            forum_posts_count: account.forum_posts_count,
            created_at: account.created_at.clone(),
            activated_at: account.activated_at.clone(),
            last_seen_at: account.last_seen_at.clone(),
            email: None,
            new_email: None,
        }
    }

    #[must_use]
    pub fn private(account: &Account) -> Self {
        Self {
            email: Some(account.email.clone()),
            new_email: account.new_email.clone(),
            ..Self::public(account)
        }
    }

    /// Private view when `viewer` owns the account or is an admin.
    #[must_use]
    pub fn for_viewer(account: &Account, viewer: Option<&Account>) -> Self {
        match viewer {
            Some(v) if v.id == account.id || v.admin => Self::private(account),
            _ => Self::public(account),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ForumDto {
    pub id: i32,
    pub name: String,
    pub permalink: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<Forum> for ForumDto {
    fn from(forum: Forum) -> Self {
        Self {
            id: forum.id,
            name: forum.name,
            permalink: forum.permalink,
            description: forum.description,
            created_at: forum.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub id: i64,
    pub event_type: String,
    pub account_id: Option<i32>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<AuditEntry> for AuditEntryDto {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            event_type: entry.event_type,
            account_id: entry.account_id,
            message: entry.message,
            details: entry
                .details
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A message plus the account it concerns.
#[derive(Debug, Serialize)]
pub struct AccountMessage {
    pub message: String,
    pub account: AccountDto,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}
