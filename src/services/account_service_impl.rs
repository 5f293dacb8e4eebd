//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, info, warn};

use crate::config::{AccountsConfig, Config, MailConfig, SecurityConfig};
use crate::constants::limits::MAX_LATEST_MEMBERS;
use crate::db::repositories::user::{
    generate_token, hash_password_blocking, needs_rehash, verify_password,
};
use crate::db::{InsertError, NewAccount, Store};
use crate::domain::events::AccountEvent;
use crate::domain::permalink::{slugify, unique_permalink};
use crate::domain::validation::{
    FieldErrors, check_email, check_login, check_password, normalize_email,
};
use crate::domain::{
    Account, AccountId, AccountState, Authenticatable, ForumId, Roleable, StateEvent, is_expired,
    timestamp,
};
use crate::services::account_service::{
    AccountError, AccountService, LoginOutcome, PasswordChange, Registration,
};
use crate::services::mailer::{MailQueue, MailTemplate};

/// Insert attempts before giving up on a permalink race.
const PERMALINK_ATTEMPTS: usize = 5;

pub struct SeaOrmAccountService {
    store: Store,
    security: SecurityConfig,
    accounts: AccountsConfig,
    mail: MailConfig,
    mail_queue: MailQueue,
    event_bus: broadcast::Sender<AccountEvent>,
    /// Verified against when the login is unknown, so both paths cost one hash check.
    dummy_hash: OnceCell<String>,
}

impl SeaOrmAccountService {
    #[must_use]
    pub fn new(
        store: Store,
        config: &Config,
        mail_queue: MailQueue,
        event_bus: broadcast::Sender<AccountEvent>,
    ) -> Self {
        Self {
            store,
            security: config.security.clone(),
            accounts: config.accounts.clone(),
            mail: config.mail.clone(),
            mail_queue,
            event_bus,
            dummy_hash: OnceCell::new(),
        }
    }

    fn publish(&self, event: AccountEvent) {
        // No subscribers is not an error.
        let _ = self.event_bus.send(event);
    }

    fn password_bounds(&self) -> (usize, usize) {
        (
            self.accounts.min_password_length,
            self.accounts.max_password_length,
        )
    }

    async fn dummy_hash(&self) -> Result<&str, AccountError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_password_blocking("not-a-real-password", &self.security))
            .await?;
        Ok(hash.as_str())
    }

    async fn require(&self, id: AccountId) -> Result<Account, AccountError> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(AccountError::user_not_found)
    }

    fn queue_mail(&self, template: &MailTemplate, account: &Account, to: &str) {
        let envelope = template.render(account, to, &self.mail);
        if self.mail_queue.enqueue(envelope).is_none() {
            warn!(account_id = %account.id, template = template.name(), "Notification dropped");
        }
    }

    /// Queues the activation mail and moves the account to pending once it is delivered.
    fn queue_activation_mail(&self, account: &Account, code: String) {
        let template = MailTemplate::Activation { code };
        let envelope = template.render(account, &account.email, &self.mail);

        let Some(receipt) = self.mail_queue.enqueue(envelope) else {
            warn!(account_id = %account.id, "Activation mail dropped");
            return;
        };

        let store = self.store.clone();
        let event_bus = self.event_bus.clone();
        let account_id = account.id;

        tokio::spawn(async move {
            match receipt.await {
                Ok(delivery) if delivery.is_sent() => match store.mark_activation_sent(account_id).await {
                    Ok(moved) => {
                        debug!(%account_id, moved, "Activation mail delivered");
                        let _ = event_bus.send(AccountEvent::ActivationMailed { account_id });
                    }
                    Err(e) => warn!(%account_id, error = %e, "Failed to record activation mail"),
                },
                Ok(_) => warn!(%account_id, "Activation mail was not delivered"),
                Err(_) => debug!(%account_id, "Activation mail receipt dropped"),
            }
        });
    }

    async fn apply_transition<F>(
        &self,
        target: AccountId,
        event: F,
    ) -> Result<(Account, Account), AccountError>
    where
        F: FnOnce(&Account) -> StateEvent + Send,
    {
        let before = self.require(target).await?;
        let next = before.state.apply(event(&before))?;

        if !self
            .store
            .transition_account(target, before.state, next)
            .await?
        {
            return Err(AccountError::Rejected(format!(
                "Account '{}' changed state while the request was running",
                before.login
            )));
        }

        let after = self.require(target).await?;
        Ok((before, after))
    }
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn register(&self, registration: Registration) -> Result<Account, AccountError> {
        let login = registration.login.trim().to_string();
        let email = normalize_email(&registration.email);

        let mut errors = FieldErrors::new();
        check_login(&login, &mut errors);
        check_email(&email, &mut errors);
        check_password(
            &registration.password,
            &registration.password_confirmation,
            self.password_bounds(),
            &mut errors,
        );

        if !errors.contains("login") && self.store.login_taken(&login).await? {
            errors.add("login", "has already been taken");
        }
        if !errors.contains("email") && self.store.email_taken(&email, None).await? {
            errors.add("email", "has already been taken");
        }
        errors.into_result()?;

        let password_hash = hash_password_blocking(&registration.password, &self.security).await?;
        let activation_code = generate_token();
        let base = slugify(&login);

        for _ in 0..PERMALINK_ATTEMPTS {
            let taken = self.store.account_permalinks_like(&base).await?;
            let permalink = unique_permalink(&base, &taken);

            let new = NewAccount {
                login: login.clone(),
                email: email.clone(),
                permalink,
                password_hash: password_hash.clone(),
                activation_code: activation_code.clone(),
            };

            match self.store.insert_account(new).await {
                Ok(account) => {
                    info!(account_id = %account.id, login = %account.login, "Account registered");
                    self.publish(AccountEvent::Registered {
                        account_id: account.id,
                        login: account.login.clone(),
                    });
                    self.queue_activation_mail(&account, activation_code);
                    return Ok(account);
                }
                Err(InsertError::Taken("permalink")) => {
                    debug!(%base, "Permalink claimed concurrently, retrying");
                }
                Err(InsertError::Taken(field)) => {
                    return Err(AccountError::field(field, "has already been taken"));
                }
                Err(InsertError::Db(e)) => return Err(e.into()),
            }
        }

        Err(AccountError::Internal(format!(
            "Could not allocate a permalink for '{login}'"
        )))
    }

    async fn activate(&self, code: Option<&str>) -> Result<Account, AccountError> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AccountError::MissingActivationCode)?;

        let account = self
            .store
            .get_account_by_activation_code(code)
            .await?
            .ok_or(AccountError::ActivationCodeNotFound)?;

        if account.state == AccountState::Active {
            self.store.clear_activation_code(account.id).await?;
            return Err(AccountError::AlreadyActive);
        }
        account.state.apply(StateEvent::Activate)?;

        if !self.store.activate_account(account.id, code).await? {
            // Someone else consumed the code first.
            let current = self.require(account.id).await?;
            return Err(if current.state == AccountState::Active {
                AccountError::AlreadyActive
            } else {
                AccountError::ActivationCodeNotFound
            });
        }

        let account = self.require(account.id).await?;
        info!(account_id = %account.id, "Account activated");
        self.publish(AccountEvent::Activated {
            account_id: account.id,
        });
        self.queue_mail(&MailTemplate::Activated, &account, &account.email);

        Ok(account)
    }

    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, AccountError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let Some(credentials) = self.store.get_credentials(identifier).await? else {
            let dummy = self.dummy_hash().await?;
            let _ = verify_password(dummy, password).await;
            return Err(AccountError::InvalidCredentials);
        };

        let account = credentials.account;
        let valid = verify_password(&credentials.password_hash, password)
            .await
            .unwrap_or_else(|e| {
                warn!(account_id = %account.id, error = %e, "Stored password hash is unreadable");
                false
            });

        if !valid || !account.can_authenticate() {
            debug!(account_id = %account.id, state = %account.state, "Authentication refused");
            return Err(AccountError::InvalidCredentials);
        }

        self.store.touch_last_seen(account.id).await?;

        if self.security.auto_migrate_password_hashes
            && needs_rehash(&credentials.password_hash, &self.security)
        {
            match hash_password_blocking(password, &self.security).await {
                Ok(hash) => {
                    if let Err(e) = self.store.rehash_password(account.id, hash).await {
                        warn!(account_id = %account.id, error = %e, "Password hash migration failed");
                    } else {
                        info!(account_id = %account.id, "Password hash migrated to current parameters");
                    }
                }
                Err(e) => warn!(account_id = %account.id, error = %e, "Password rehash failed"),
            }
        }

        let remember_token = if remember_me {
            let token = generate_token();
            let expires_at = timestamp(
                Utc::now() + chrono::Duration::days(self.accounts.remember_token_ttl_days),
            );
            self.store
                .issue_remember_token(account.id, &token, &expires_at)
                .await?;
            Some(token)
        } else {
            None
        };

        self.publish(AccountEvent::LoggedIn {
            account_id: account.id,
            remembered: remember_token.is_some(),
        });

        let account = self.store.get_account(account.id).await?.unwrap_or(account);
        Ok(LoginOutcome {
            account,
            remember_token,
        })
    }

    async fn resume(&self, remember_token: &str) -> Result<Option<Account>, AccountError> {
        if remember_token.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .get_account_by_remember_token(remember_token)
            .await?)
    }

    async fn logout(&self, id: AccountId) -> Result<(), AccountError> {
        self.store.revoke_remember_token(id).await?;
        self.publish(AccountEvent::LoggedOut { account_id: id });
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
        Ok(self.store.get_account(id).await?)
    }

    async fn find_by_permalink(&self, permalink: &str) -> Result<Account, AccountError> {
        self.store
            .get_account_by_permalink(permalink)
            .await?
            .filter(|account| account.state != AccountState::Deleted)
            .ok_or_else(AccountError::user_not_found)
    }

    async fn find_any_by_permalink(&self, permalink: &str) -> Result<Account, AccountError> {
        self.store
            .get_account_by_permalink(permalink)
            .await?
            .ok_or_else(AccountError::user_not_found)
    }

    async fn show_profile(
        &self,
        permalink: &str,
        viewer: Option<AccountId>,
    ) -> Result<Account, AccountError> {
        let mut account = self.find_by_permalink(permalink).await?;

        if viewer != Some(account.id) {
            self.store.increment_hits(account.id).await?;
            account.hits += 1;
        }

        Ok(account)
    }

    async fn hub(&self, id: AccountId) -> Result<Account, AccountError> {
        self.store.touch_last_seen(id).await?;
        self.require(id).await
    }

    async fn latest_members(&self, limit: Option<u64>) -> Result<Vec<Account>, AccountError> {
        let limit = limit
            .unwrap_or(self.accounts.latest_members_limit)
            .clamp(1, MAX_LATEST_MEMBERS);
        Ok(self.store.latest_accounts(limit).await?)
    }

    async fn list(&self, state: Option<AccountState>) -> Result<Vec<Account>, AccountError> {
        Ok(self.store.list_accounts(state).await?)
    }

    async fn change_password(
        &self,
        id: AccountId,
        change: PasswordChange,
    ) -> Result<(), AccountError> {
        let current_hash = self
            .store
            .get_password_hash(id)
            .await?
            .ok_or_else(AccountError::user_not_found)?;

        let valid = verify_password(&current_hash, &change.current_password)
            .await
            .unwrap_or(false);
        if !valid {
            return Err(AccountError::IncorrectPassword);
        }

        if change.password.is_empty() {
            return Err(AccountError::Rejected(
                "New password cannot be blank".to_string(),
            ));
        }

        let mut errors = FieldErrors::new();
        check_password(
            &change.password,
            &change.password_confirmation,
            self.password_bounds(),
            &mut errors,
        );
        errors.into_result()?;

        let new_hash = hash_password_blocking(&change.password, &self.security).await?;
        self.store.update_password(id, new_hash).await?;

        info!(account_id = %id, "Password changed");
        self.publish(AccountEvent::PasswordChanged { account_id: id });
        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AccountError::Rejected(
                "Please enter an email address".to_string(),
            ));
        }

        let account = self
            .store
            .get_account_by_email(&email)
            .await?
            .filter(|account| account.state == AccountState::Active);

        let Some(account) = account else {
            debug!("Password reset requested for an address with no active account");
            return Ok(());
        };

        let code = generate_token();
        let expires_at = timestamp(
            Utc::now() + chrono::Duration::minutes(self.accounts.reset_code_ttl_minutes),
        );
        self.store
            .set_reset_code(account.id, &code, &expires_at)
            .await?;

        info!(account_id = %account.id, "Password reset code issued");
        self.publish(AccountEvent::PasswordResetRequested {
            account_id: account.id,
        });
        self.queue_mail(&MailTemplate::PasswordReset { code }, &account, &account.email);

        Ok(())
    }

    async fn check_reset_code(&self, code: &str) -> Result<Account, AccountError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AccountError::InvalidResetCode);
        }

        let ticket = self
            .store
            .get_reset_ticket(code)
            .await?
            .ok_or(AccountError::InvalidResetCode)?;

        if ticket.account.state == AccountState::Deleted
            || is_expired(ticket.expires_at.as_deref(), Utc::now())
        {
            return Err(AccountError::InvalidResetCode);
        }

        Ok(ticket.account)
    }

    async fn reset_password(
        &self,
        code: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<Account, AccountError> {
        let account = self.check_reset_code(code).await?;

        let mut errors = FieldErrors::new();
        check_password(
            password,
            password_confirmation,
            self.password_bounds(),
            &mut errors,
        );
        errors.into_result()?;

        let new_hash = hash_password_blocking(password, &self.security).await?;
        if !self.store.consume_reset_code(code.trim(), new_hash).await? {
            return Err(AccountError::InvalidResetCode);
        }

        info!(account_id = %account.id, "Password reset");
        self.publish(AccountEvent::PasswordReset {
            account_id: account.id,
        });
        self.queue_mail(&MailTemplate::PasswordWasReset, &account, &account.email);

        self.require(account.id).await
    }

    async fn change_email(&self, id: AccountId, new_email: &str) -> Result<(), AccountError> {
        let email = normalize_email(new_email);
        if email.is_empty() {
            return Err(AccountError::Rejected(
                "Please enter an email address".to_string(),
            ));
        }

        let account = self.require(id).await?;

        let mut errors = FieldErrors::new();
        check_email(&email, &mut errors);
        if errors.is_empty() && email == account.email {
            errors.add("email", "is already the address on this account");
        }
        if errors.is_empty() && self.store.email_taken(&email, Some(id)).await? {
            errors.add("email", "has already been taken");
        }
        errors.into_result()?;

        let code = generate_token();
        self.store.request_email_change(id, &email, &code).await?;

        info!(account_id = %id, "Email change requested");
        self.publish(AccountEvent::EmailChangeRequested { account_id: id });
        self.queue_mail(&MailTemplate::EmailChange { code }, &account, &email);

        Ok(())
    }

    async fn confirm_email_change(&self, code: &str) -> Result<Account, AccountError> {
        let not_found = || AccountError::NotFound("Unable to update the email address".to_string());

        let code = code.trim();
        if code.is_empty() {
            return Err(not_found());
        }

        let account = self
            .store
            .get_account_by_email_code(code)
            .await?
            .ok_or_else(not_found)?;
        let new_email = account.new_email.clone().ok_or_else(not_found)?;

        if self.store.email_taken(&new_email, Some(account.id)).await? {
            return Err(AccountError::field("email", "has already been taken"));
        }

        match self
            .store
            .confirm_email_change(account.id, code, &new_email)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err(not_found()),
            Err(InsertError::Taken(field)) => {
                return Err(AccountError::field(field, "has already been taken"));
            }
            Err(InsertError::Db(e)) => return Err(e.into()),
        }

        info!(account_id = %account.id, "Email address changed");
        self.publish(AccountEvent::EmailChanged {
            account_id: account.id,
        });

        self.require(account.id).await
    }

    async fn suspend(&self, target: AccountId, by: AccountId) -> Result<Account, AccountError> {
        let (before, after) = self
            .apply_transition(target, |_| StateEvent::Suspend)
            .await?;

        info!(account_id = %target, by = %by, from = %before.state, "Account suspended");
        self.publish(AccountEvent::Suspended {
            account_id: target,
            by,
        });
        Ok(after)
    }

    async fn unsuspend(&self, target: AccountId, by: AccountId) -> Result<Account, AccountError> {
        let (_, after) = self
            .apply_transition(target, |account| {
                StateEvent::Unsuspend(account.activation_history())
            })
            .await?;

        info!(account_id = %target, by = %by, to = %after.state, "Account unsuspended");
        self.publish(AccountEvent::Unsuspended {
            account_id: target,
            by,
        });
        Ok(after)
    }

    async fn soft_delete(
        &self,
        target: AccountId,
        by: AccountId,
    ) -> Result<Account, AccountError> {
        let (_, after) = self
            .apply_transition(target, |_| StateEvent::Delete)
            .await?;

        info!(account_id = %target, by = %by, "Account deleted");
        self.publish(AccountEvent::Deleted {
            account_id: target,
            by,
        });
        Ok(after)
    }

    async fn purge(&self, target: AccountId, by: AccountId) -> Result<(), AccountError> {
        let account = self.require(target).await?;

        if !self.store.purge_account(target).await? {
            return Err(AccountError::user_not_found());
        }

        warn!(account_id = %target, login = %account.login, by = %by, "Account purged");
        self.publish(AccountEvent::Purged {
            account_id: target,
            login: account.login,
            by,
        });
        Ok(())
    }

    async fn grant_admin(&self, target: AccountId) -> Result<Account, AccountError> {
        self.require(target).await?;
        self.store.set_admin(target, true).await?;

        info!(account_id = %target, "Admin role granted");
        self.publish(AccountEvent::AdminGranted { account_id: target });
        self.require(target).await
    }

    async fn is_moderator_of(
        &self,
        account: &Account,
        forum: ForumId,
    ) -> Result<bool, AccountError> {
        if account.is_admin() {
            return Ok(true);
        }
        let holds_grant = self.store.is_moderator(account.id, forum).await?;
        Ok(account.can_moderate(holds_grant))
    }
}
