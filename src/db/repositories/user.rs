use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::domain::{Account, AccountId, AccountState, now_timestamp};
use crate::entities::{moderatorships, users};

/// Failure of a write guarded by unique indexes.
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    /// The named field collided with an existing row.
    #[error("{0} has already been taken")]
    Taken(&'static str),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl InsertError {
    /// Sorts a unique violation by the column SQLite names in its message.
    pub(crate) fn classify(err: DbErr) -> Self {
        let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() else {
            return Self::Db(err);
        };

        if message.contains("permalink") {
            Self::Taken("permalink")
        } else if message.contains("email") {
            Self::Taken("email")
        } else if message.contains("login") {
            Self::Taken("login")
        } else {
            Self::Db(err)
        }
    }
}

/// Columns written when an account is registered.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub login: String,
    pub email: String,
    pub permalink: String,
    pub password_hash: String,
    pub activation_code: String,
}

/// An account together with its stored password hash.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account: Account,
    pub password_hash: String,
}

/// An account that holds a password reset code.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub account: Account,
    pub expires_at: Option<String>,
}

impl TryFrom<users::Model> for Account {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self> {
        let state = model
            .state
            .parse::<AccountState>()
            .with_context(|| format!("Account {} has a corrupt state column", model.id))?;

        Ok(Self {
            id: AccountId::new(model.id),
            login: model.login,
            email: model.email,
            permalink: model.permalink,
            state,
            admin: model.admin,
            new_email: model.new_email,
            hits: model.hits,
            forum_posts_count: model.forum_posts_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
            activation_sent_at: model.activation_sent_at,
            activated_at: model.activated_at,
            deleted_at: model.deleted_at,
            last_seen_at: model.last_seen_at,
        })
    }
}

fn to_accounts(models: Vec<users::Model>) -> Result<Vec<Account>> {
    models.into_iter().map(Account::try_from).collect()
}

fn lower_login() -> Expr {
    Expr::expr(Func::lower(Expr::col(users::Column::Login)))
}

fn null() -> sea_orm::sea_query::SimpleExpr {
    Expr::value(Option::<String>::None)
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        user.map(Account::try_from).transpose()
    }

    pub async fn get_by_permalink(&self, permalink: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::Permalink.eq(permalink))
            .one(&self.conn)
            .await
            .context("Failed to query user by permalink")?;

        user.map(Account::try_from).transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        user.map(Account::try_from).transpose()
    }

    /// Looks an account up by login (case-insensitive) or email, with its hash.
    ///
    /// An identifier containing `@` is tried as an email first.
    pub async fn get_credentials(&self, identifier: &str) -> Result<Option<Credentials>> {
        let lowered = identifier.trim().to_lowercase();

        let mut user = None;
        if lowered.contains('@') {
            user = users::Entity::find()
                .filter(users::Column::Email.eq(lowered.as_str()))
                .one(&self.conn)
                .await
                .context("Failed to query user by email for authentication")?;
        }
        if user.is_none() {
            user = users::Entity::find()
                .filter(lower_login().eq(lowered.as_str()))
                .one(&self.conn)
                .await
                .context("Failed to query user by login for authentication")?;
        }

        user.map(|u| {
            let password_hash = u.password_hash.clone();
            Account::try_from(u).map(|account| Credentials {
                account,
                password_hash,
            })
        })
        .transpose()
    }

    pub async fn get_password_hash(&self, id: AccountId) -> Result<Option<String>> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        Ok(user.map(|u| u.password_hash))
    }

    /// Whether `login` is already some account's login or email.
    pub async fn login_taken(&self, login: &str) -> Result<bool> {
        let lowered = login.trim().to_lowercase();
        let count = users::Entity::find()
            .filter(
                Condition::any()
                    .add(lower_login().eq(lowered.as_str()))
                    .add(users::Column::Email.eq(lowered.as_str())),
            )
            .count(&self.conn)
            .await
            .context("Failed to check login availability")?;

        Ok(count > 0)
    }

    /// Whether another account already uses `email` as its email or login.
    pub async fn email_taken(&self, email: &str, except: Option<AccountId>) -> Result<bool> {
        let mut query = users::Entity::find().filter(
            Condition::any()
                .add(users::Column::Email.eq(email))
                .add(lower_login().eq(email.to_lowercase())),
        );
        if let Some(id) = except {
            query = query.filter(users::Column::Id.ne(id.value()));
        }

        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check email availability")?;

        Ok(count > 0)
    }

    /// Permalinks equal to `base` or of the form `base-N`.
    pub async fn permalinks_like(&self, base: &str) -> Result<Vec<String>> {
        let rows: Vec<String> = users::Entity::find()
            .select_only()
            .column(users::Column::Permalink)
            .filter(
                Condition::any()
                    .add(users::Column::Permalink.eq(base))
                    .add(users::Column::Permalink.like(format!("{base}-%"))),
            )
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to query permalinks")?;

        Ok(rows)
    }

    pub async fn insert(&self, new: NewAccount) -> Result<Account, InsertError> {
        let now = now_timestamp();
        let active = users::ActiveModel {
            login: Set(new.login),
            email: Set(new.email),
            permalink: Set(new.permalink),
            password_hash: Set(new.password_hash),
            state: Set(AccountState::Passive.as_str().to_string()),
            admin: Set(false),
            activation_code: Set(Some(new.activation_code)),
            activation_sent_at: Set(None),
            activated_at: Set(None),
            password_reset_code: Set(None),
            password_reset_expires_at: Set(None),
            new_email: Set(None),
            email_activation_code: Set(None),
            remember_token: Set(None),
            remember_token_expires_at: Set(None),
            hits: Set(0),
            forum_posts_count: Set(0),
            last_seen_at: Set(None),
            deleted_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active.insert(&self.conn).await.map_err(InsertError::classify)?;
        Account::try_from(model).map_err(|e| InsertError::Db(DbErr::Custom(e.to_string())))
    }

    /// Records that the activation mail went out. A passive account moves to pending.
    pub async fn mark_activation_sent(&self, id: AccountId) -> Result<bool> {
        let now = now_timestamp();

        users::Entity::update_many()
            .col_expr(users::Column::ActivationSentAt, Expr::value(now.clone()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::ActivationSentAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to stamp activation mail")?;

        let result = users::Entity::update_many()
            .col_expr(users::Column::State, Expr::value(AccountState::Pending.as_str()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::State.eq(AccountState::Passive.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to mark account pending")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn get_by_activation_code(&self, code: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::ActivationCode.eq(code))
            .one(&self.conn)
            .await
            .context("Failed to query user by activation code")?;

        user.map(Account::try_from).transpose()
    }

    /// Consumes the activation code. Only one caller can win for a given code.
    pub async fn activate(&self, id: AccountId, code: &str) -> Result<bool> {
        let now = now_timestamp();
        let awaiting = AccountState::AWAITING_ACTIVATION.map(|s| s.as_str());

        let result = users::Entity::update_many()
            .col_expr(users::Column::State, Expr::value(AccountState::Active.as_str()))
            .col_expr(users::Column::ActivationCode, null())
            .col_expr(users::Column::ActivatedAt, Expr::value(now.clone()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::ActivationCode.eq(code))
            .filter(users::Column::State.is_in(awaiting))
            .exec(&self.conn)
            .await
            .context("Failed to activate account")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn clear_activation_code(&self, id: AccountId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::ActivationCode, null())
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to clear activation code")?;

        Ok(())
    }

    pub async fn touch_last_seen(&self, id: AccountId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LastSeenAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to stamp last_seen_at")?;

        Ok(())
    }

    pub async fn increment_hits(&self, id: AccountId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::Hits, Expr::col(users::Column::Hits).add(1))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to count profile view")?;

        Ok(())
    }

    /// Stores a new password hash and drops any remember token.
    pub async fn update_password(&self, id: AccountId, password_hash: String) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::RememberToken, null())
            .col_expr(users::Column::RememberTokenExpiresAt, null())
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to update password")?;

        Ok(())
    }

    /// Replaces the hash with one using current parameters; sessions survive.
    pub async fn rehash_password(&self, id: AccountId, password_hash: String) -> Result<()> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for password migration")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(password_hash);
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn set_reset_code(&self, id: AccountId, code: &str, expires_at: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::PasswordResetCode, Expr::value(code))
            .col_expr(users::Column::PasswordResetExpiresAt, Expr::value(expires_at))
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to store password reset code")?;

        Ok(())
    }

    pub async fn get_by_reset_code(&self, code: &str) -> Result<Option<ResetTicket>> {
        let user = users::Entity::find()
            .filter(users::Column::PasswordResetCode.eq(code))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset code")?;

        user.map(|u| {
            let expires_at = u.password_reset_expires_at.clone();
            Account::try_from(u).map(|account| ResetTicket {
                account,
                expires_at,
            })
        })
        .transpose()
    }

    /// Sets the new hash and clears the reset code in one conditional update.
    pub async fn consume_reset_code(&self, code: &str, password_hash: String) -> Result<bool> {
        let now = now_timestamp();

        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::PasswordResetCode, null())
            .col_expr(users::Column::PasswordResetExpiresAt, null())
            .col_expr(users::Column::RememberToken, null())
            .col_expr(users::Column::RememberTokenExpiresAt, null())
            .col_expr(users::Column::UpdatedAt, Expr::value(now.clone()))
            .filter(users::Column::PasswordResetCode.eq(code))
            .filter(users::Column::PasswordResetExpiresAt.gt(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume password reset code")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn request_email_change(
        &self,
        id: AccountId,
        new_email: &str,
        code: &str,
    ) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::NewEmail, Expr::value(new_email))
            .col_expr(users::Column::EmailActivationCode, Expr::value(code))
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to store email change request")?;

        Ok(())
    }

    pub async fn get_by_email_activation_code(&self, code: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::EmailActivationCode.eq(code))
            .one(&self.conn)
            .await
            .context("Failed to query user by email activation code")?;

        user.map(Account::try_from).transpose()
    }

    /// Promotes `new_email` to `email` if `code` is still the outstanding one.
    pub async fn confirm_email_change(
        &self,
        id: AccountId,
        code: &str,
        new_email: &str,
    ) -> Result<bool, InsertError> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::Email, Expr::value(new_email))
            .col_expr(users::Column::NewEmail, null())
            .col_expr(users::Column::EmailActivationCode, null())
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::EmailActivationCode.eq(code))
            .exec(&self.conn)
            .await
            .map_err(InsertError::classify)?;

        Ok(result.rows_affected == 1)
    }

    /// Moves the account from `from` to `to` if it is still in `from`.
    ///
    /// Leaving `active` for suspended or deleted drops the remember token;
    /// entering `deleted` stamps `deleted_at`.
    pub async fn transition(
        &self,
        id: AccountId,
        from: AccountState,
        to: AccountState,
    ) -> Result<bool> {
        let now = now_timestamp();
        let mut update = users::Entity::update_many()
            .col_expr(users::Column::State, Expr::value(to.as_str()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now.clone()));

        if matches!(to, AccountState::Suspended | AccountState::Deleted) {
            update = update
                .col_expr(users::Column::RememberToken, null())
                .col_expr(users::Column::RememberTokenExpiresAt, null());
        }
        if to == AccountState::Deleted {
            update = update.col_expr(users::Column::DeletedAt, Expr::value(now));
        }

        let result = update
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::State.eq(from.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to change account state")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn set_admin(&self, id: AccountId, admin: bool) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::Admin, Expr::value(admin))
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to update admin flag")?;

        Ok(())
    }

    pub async fn issue_remember_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: &str,
    ) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::RememberToken, Expr::value(token))
            .col_expr(users::Column::RememberTokenExpiresAt, Expr::value(expires_at))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to store remember token")?;

        Ok(())
    }

    pub async fn revoke_remember_token(&self, id: AccountId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::RememberToken, null())
            .col_expr(users::Column::RememberTokenExpiresAt, null())
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to revoke remember token")?;

        Ok(())
    }

    /// The active account holding an unexpired remember token.
    pub async fn get_by_remember_token(&self, token: &str) -> Result<Option<Account>> {
        let user = users::Entity::find()
            .filter(users::Column::RememberToken.eq(token))
            .filter(users::Column::RememberTokenExpiresAt.gt(now_timestamp()))
            .filter(users::Column::State.eq(AccountState::Active.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to query user by remember token")?;

        user.map(Account::try_from).transpose()
    }

    /// Most recently created accounts that finished activation and are not deleted.
    pub async fn latest(&self, limit: u64) -> Result<Vec<Account>> {
        let users = users::Entity::find()
            .filter(users::Column::ActivationCode.is_null())
            .filter(users::Column::State.ne(AccountState::Deleted.as_str()))
            .order_by_desc(users::Column::CreatedAt)
            .order_by_desc(users::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query latest members")?;

        to_accounts(users)
    }

    pub async fn list(&self, state: Option<AccountState>) -> Result<Vec<Account>> {
        let mut query = users::Entity::find().order_by_asc(users::Column::Id);
        if let Some(state) = state {
            query = query.filter(users::Column::State.eq(state.as_str()));
        }

        let users = query
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        to_accounts(users)
    }

    /// Removes the row and its moderatorships.
    pub async fn purge(&self, id: AccountId) -> Result<bool> {
        let txn = self.conn.begin().await?;

        moderatorships::Entity::delete_many()
            .filter(moderatorships::Column::UserId.eq(id.value()))
            .exec(&txn)
            .await
            .context("Failed to remove moderatorships")?;

        let result = users::Entity::delete_by_id(id.value())
            .exec(&txn)
            .await
            .context("Failed to delete user")?;

        txn.commit().await?;

        Ok(result.rows_affected == 1)
    }
}

fn argon2_for(config: Option<&SecurityConfig>) -> Result<Argon2<'static>> {
    let Some(cfg) = config else {
        return Ok(Argon2::default());
    };

    let params = Params::new(
        cfg.argon2_memory_cost_kib,
        cfg.argon2_time_cost,
        cfg.argon2_parallelism,
        None, // output length (use default)
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2_for(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Hashes on a blocking thread; Argon2 would otherwise stall the runtime.
pub async fn hash_password_blocking(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();

    task::spawn_blocking(move || hash_password(&password, Some(&config)))
        .await
        .context("Password hashing task panicked")?
}

/// Verifies on a blocking thread. A malformed stored hash is an error, not a mismatch.
pub async fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let password_hash = password_hash.to_string();
    let password = password.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// True when the stored hash was produced with parameters other than the configured ones.
#[must_use]
pub fn needs_rehash(password_hash: &str, config: &SecurityConfig) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return true;
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }

    Params::try_from(&parsed).map_or(true, |params| {
        params.m_cost() != config.argon2_memory_cost_kib
            || params.t_cost() != config.argon2_time_cost
            || params.p_cost() != config.argon2_parallelism
    })
}

/// Random 40 character hex token for activation, reset and remember codes.
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 20] = rng.random();

    bytes.iter().fold(String::with_capacity(40), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_config() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            auto_migrate_password_hashes: true,
        }
    }

    #[test]
    fn tokens_are_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let config = cheap_config();
        let hash = hash_password_blocking("pw123", &config).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "pw123").await.unwrap());
        assert!(!verify_password(&hash, "pw124").await.unwrap());
    }

    #[test]
    fn rehash_detection_follows_params() {
        let config = cheap_config();
        let hash = hash_password("pw123", Some(&config)).unwrap();
        assert!(!needs_rehash(&hash, &config));

        let stronger = SecurityConfig {
            argon2_time_cost: 2,
            ..cheap_config()
        };
        assert!(needs_rehash(&hash, &stronger));
        assert!(needs_rehash("not a hash", &config));
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        assert!(verify_password("plaintext", "plaintext").await.is_err());
    }
}
