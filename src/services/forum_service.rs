//! Domain service for forums and their moderators.

use serde::Deserialize;

use crate::db::Forum;
use crate::domain::{Account, AccountId};
use crate::services::account_service::AccountError;

#[derive(Debug, Clone, Deserialize)]
pub struct NewForum {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait::async_trait]
pub trait ForumService: Send + Sync {
    async fn create(&self, forum: NewForum, by: AccountId) -> Result<Forum, AccountError>;

    async fn list(&self) -> Result<Vec<Forum>, AccountError>;

    async fn get(&self, permalink: &str) -> Result<Forum, AccountError>;

    async fn moderators(&self, forum: &str) -> Result<Vec<Account>, AccountError>;

    /// Grants moderation of `forum` to the account at `permalink`.
    async fn grant_moderator(&self, forum: &str, permalink: &str) -> Result<Account, AccountError>;

    async fn revoke_moderator(&self, forum: &str, permalink: &str) -> Result<(), AccountError>;
}
