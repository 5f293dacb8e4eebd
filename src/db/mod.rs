use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{Account, AccountId, AccountState, ForumId};

pub mod migrator;
pub mod repositories;

pub use repositories::audit::AuditEntry;
pub use repositories::forum::Forum;
pub use repositories::user::{Credentials, InsertError, NewAccount, ResetTicket};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn forum_repo(&self) -> repositories::forum::ForumRepository {
        repositories::forum::ForumRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    // ========== Accounts ==========

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_account_by_permalink(&self, permalink: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_permalink(permalink).await
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_credentials(&self, identifier: &str) -> Result<Option<Credentials>> {
        self.user_repo().get_credentials(identifier).await
    }

    pub async fn get_password_hash(&self, id: AccountId) -> Result<Option<String>> {
        self.user_repo().get_password_hash(id).await
    }

    pub async fn login_taken(&self, login: &str) -> Result<bool> {
        self.user_repo().login_taken(login).await
    }

    pub async fn email_taken(&self, email: &str, except: Option<AccountId>) -> Result<bool> {
        self.user_repo().email_taken(email, except).await
    }

    pub async fn account_permalinks_like(&self, base: &str) -> Result<Vec<String>> {
        self.user_repo().permalinks_like(base).await
    }

    pub async fn insert_account(&self, new: NewAccount) -> Result<Account, InsertError> {
        self.user_repo().insert(new).await
    }

    pub async fn mark_activation_sent(&self, id: AccountId) -> Result<bool> {
        self.user_repo().mark_activation_sent(id).await
    }

    pub async fn get_account_by_activation_code(&self, code: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_activation_code(code).await
    }

    pub async fn activate_account(&self, id: AccountId, code: &str) -> Result<bool> {
        self.user_repo().activate(id, code).await
    }

    pub async fn clear_activation_code(&self, id: AccountId) -> Result<()> {
        self.user_repo().clear_activation_code(id).await
    }

    pub async fn touch_last_seen(&self, id: AccountId) -> Result<()> {
        self.user_repo().touch_last_seen(id).await
    }

    pub async fn increment_hits(&self, id: AccountId) -> Result<()> {
        self.user_repo().increment_hits(id).await
    }

    pub async fn update_password(&self, id: AccountId, password_hash: String) -> Result<()> {
        self.user_repo().update_password(id, password_hash).await
    }

    pub async fn rehash_password(&self, id: AccountId, password_hash: String) -> Result<()> {
        self.user_repo().rehash_password(id, password_hash).await
    }

    pub async fn set_reset_code(&self, id: AccountId, code: &str, expires_at: &str) -> Result<()> {
        self.user_repo().set_reset_code(id, code, expires_at).await
    }

    pub async fn get_reset_ticket(&self, code: &str) -> Result<Option<ResetTicket>> {
        self.user_repo().get_by_reset_code(code).await
    }

    pub async fn consume_reset_code(&self, code: &str, password_hash: String) -> Result<bool> {
        self.user_repo().consume_reset_code(code, password_hash).await
    }

    pub async fn request_email_change(
        &self,
        id: AccountId,
        new_email: &str,
        code: &str,
    ) -> Result<()> {
        self.user_repo()
            .request_email_change(id, new_email, code)
            .await
    }

    pub async fn get_account_by_email_code(&self, code: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_email_activation_code(code).await
    }

    pub async fn confirm_email_change(
        &self,
        id: AccountId,
        code: &str,
        new_email: &str,
    ) -> Result<bool, InsertError> {
        self.user_repo()
            .confirm_email_change(id, code, new_email)
            .await
    }

    pub async fn transition_account(
        &self,
        id: AccountId,
        from: AccountState,
        to: AccountState,
    ) -> Result<bool> {
        self.user_repo().transition(id, from, to).await
    }

    pub async fn set_admin(&self, id: AccountId, admin: bool) -> Result<()> {
        self.user_repo().set_admin(id, admin).await
    }

    pub async fn issue_remember_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.user_repo()
            .issue_remember_token(id, token, expires_at)
            .await
    }

    pub async fn revoke_remember_token(&self, id: AccountId) -> Result<()> {
        self.user_repo().revoke_remember_token(id).await
    }

    pub async fn get_account_by_remember_token(&self, token: &str) -> Result<Option<Account>> {
        self.user_repo().get_by_remember_token(token).await
    }

    pub async fn latest_accounts(&self, limit: u64) -> Result<Vec<Account>> {
        self.user_repo().latest(limit).await
    }

    pub async fn list_accounts(&self, state: Option<AccountState>) -> Result<Vec<Account>> {
        self.user_repo().list(state).await
    }

    pub async fn purge_account(&self, id: AccountId) -> Result<bool> {
        self.user_repo().purge(id).await
    }

    // ========== Forums ==========

    pub async fn create_forum(
        &self,
        name: &str,
        permalink: &str,
        description: Option<String>,
    ) -> Result<Forum, InsertError> {
        self.forum_repo().create(name, permalink, description).await
    }

    pub async fn list_forums(&self) -> Result<Vec<Forum>> {
        self.forum_repo().list().await
    }

    pub async fn get_forum_by_permalink(&self, permalink: &str) -> Result<Option<Forum>> {
        self.forum_repo().get_by_permalink(permalink).await
    }

    pub async fn forum_permalinks_like(&self, base: &str) -> Result<Vec<String>> {
        self.forum_repo().permalinks_like(base).await
    }

    pub async fn grant_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        self.forum_repo().grant_moderator(account, forum).await
    }

    pub async fn revoke_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        self.forum_repo().revoke_moderator(account, forum).await
    }

    pub async fn is_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        self.forum_repo().is_moderator(account, forum).await
    }

    pub async fn forum_moderators(&self, forum: ForumId) -> Result<Vec<Account>> {
        self.forum_repo().moderators(forum).await
    }

    // ========== Audit log ==========

    pub async fn add_audit_entry(
        &self,
        event_type: &str,
        account_id: Option<AccountId>,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        self.audit_repo()
            .add(event_type, account_id, message, details)
            .await
    }

    pub async fn list_audit_entries(
        &self,
        limit: u64,
        account_id: Option<AccountId>,
        event_type: Option<String>,
    ) -> Result<Vec<AuditEntry>> {
        self.audit_repo().list(limit, account_id, event_type).await
    }
}
