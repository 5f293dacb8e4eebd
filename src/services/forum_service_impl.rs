//! `SeaORM` implementation of the `ForumService` trait.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::db::{Forum, InsertError, Store};
use crate::domain::events::AccountEvent;
use crate::domain::permalink::{slugify, unique_permalink};
use crate::domain::{Account, AccountId, AccountState, ForumId};
use crate::services::account_service::AccountError;
use crate::services::forum_service::{ForumService, NewForum};

const NAME_MAX: usize = 100;

const PERMALINK_ATTEMPTS: usize = 5;

pub struct SeaOrmForumService {
    store: Store,
    event_bus: broadcast::Sender<AccountEvent>,
}

impl SeaOrmForumService {
    #[must_use]
    pub const fn new(store: Store, event_bus: broadcast::Sender<AccountEvent>) -> Self {
        Self { store, event_bus }
    }

    async fn live_account(&self, permalink: &str) -> Result<Account, AccountError> {
        self.store
            .get_account_by_permalink(permalink)
            .await?
            .filter(|account| account.state != AccountState::Deleted)
            .ok_or_else(AccountError::user_not_found)
    }
}

#[async_trait]
impl ForumService for SeaOrmForumService {
    async fn create(&self, forum: NewForum, by: AccountId) -> Result<Forum, AccountError> {
        let name = forum.name.trim().to_string();
        if name.is_empty() {
            return Err(AccountError::field("name", "can't be blank"));
        }
        if name.chars().count() > NAME_MAX {
            return Err(AccountError::field(
                "name",
                format!("is too long (maximum is {NAME_MAX} characters)"),
            ));
        }
        let description = forum
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let base = slugify(&name);
        for _ in 0..PERMALINK_ATTEMPTS {
            let taken = self.store.forum_permalinks_like(&base).await?;
            let permalink = unique_permalink(&base, &taken);

            match self
                .store
                .create_forum(&name, &permalink, description.clone())
                .await
            {
                Ok(created) => {
                    info!(forum_id = created.id, permalink = %created.permalink, by = %by, "Forum created");
                    let _ = self.event_bus.send(AccountEvent::ForumCreated {
                        forum_id: ForumId(created.id),
                        name: created.name.clone(),
                    });
                    return Ok(created);
                }
                Err(InsertError::Taken(_)) => {}
                Err(InsertError::Db(e)) => return Err(e.into()),
            }
        }

        Err(AccountError::Internal(format!(
            "Could not allocate a permalink for forum '{name}'"
        )))
    }

    async fn list(&self) -> Result<Vec<Forum>, AccountError> {
        Ok(self.store.list_forums().await?)
    }

    async fn get(&self, permalink: &str) -> Result<Forum, AccountError> {
        self.store
            .get_forum_by_permalink(permalink)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("Forum '{permalink}' not found")))
    }

    async fn moderators(&self, forum: &str) -> Result<Vec<Account>, AccountError> {
        let forum = self.get(forum).await?;
        Ok(self.store.forum_moderators(ForumId(forum.id)).await?)
    }

    async fn grant_moderator(&self, forum: &str, permalink: &str) -> Result<Account, AccountError> {
        let forum = self.get(forum).await?;
        let account = self.live_account(permalink).await?;

        if self
            .store
            .grant_moderator(account.id, ForumId(forum.id))
            .await?
        {
            info!(account_id = %account.id, forum_id = forum.id, "Moderatorship granted");
            let _ = self.event_bus.send(AccountEvent::ModeratorGranted {
                account_id: account.id,
                forum_id: ForumId(forum.id),
            });
        }

        Ok(account)
    }

    async fn revoke_moderator(&self, forum: &str, permalink: &str) -> Result<(), AccountError> {
        let forum = self.get(forum).await?;
        let account = self.live_account(permalink).await?;

        if !self
            .store
            .revoke_moderator(account.id, ForumId(forum.id))
            .await?
        {
            return Err(AccountError::NotFound(format!(
                "'{}' does not moderate '{}'",
                account.login, forum.name
            )));
        }

        info!(account_id = %account.id, forum_id = forum.id, "Moderatorship revoked");
        let _ = self.event_bus.send(AccountEvent::ModeratorRevoked {
            account_id: account.id,
            forum_id: ForumId(forum.id),
        });
        Ok(())
    }
}
